// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Remote transport.
//!
//! A [`NetworkAccess`] performs a single request and never follows
//! redirects itself; the loader thread follows them and enforces the cap.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::config::Config;
use crate::error::{LoaderError, TransportError};

/// Reports `(received, total)` byte counts while a body downloads.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkReply {
    /// The complete body
    Data(Bytes),
    /// The resource moved; the target is already resolved against the request URL
    Redirect(Url),
}

/// Fetches remote resources.
#[async_trait]
pub trait NetworkAccess: Send + Sync {
    /// Performs a GET request for `url`.
    async fn get(&self, url: &Url, progress: ProgressFn<'_>) -> Result<NetworkReply, TransportError>;
}

/// [`NetworkAccess`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    /// Builds a client from the timeout and user agent in `config`.
    pub fn new(config: &Config) -> Result<Self, LoaderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.request_timeout_secs.min(30)))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                debug!("Failed to build HTTP client: {}", e);
                LoaderError::Transport(TransportError::Other)
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NetworkAccess for HttpNetwork {
    #[instrument(skip(self, progress), fields(url = %url))]
    async fn get(&self, url: &Url, progress: ProgressFn<'_>) -> Result<NetworkReply, TransportError> {
        let response = self.client.get(url.clone()).send().await.map_err(map_error)?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or(TransportError::Other)?;
            let target = url.join(location).map_err(|_| TransportError::InvalidUrl)?;
            debug!("Redirected to {}", target);
            return Ok(NetworkReply::Redirect(target));
        }
        if !status.is_success() {
            return Err(TransportError::from_status(status.as_u16()));
        }

        let total = response.content_length();
        let mut body = BytesMut::with_capacity(total.unwrap_or(0).min(1 << 20) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_error)?;
            body.extend_from_slice(&chunk);
            progress(body.len() as u64, total);
        }
        Ok(NetworkReply::Data(body.freeze()))
    }
}

fn map_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        return TransportError::Timeout;
    }
    if error.is_connect() {
        let text = format!("{:?}", error).to_lowercase();
        if text.contains("dns") || text.contains("resolve") {
            return TransportError::HostNotFound;
        }
        return TransportError::ConnectionRefused;
    }
    if error.is_body() || error.is_decode() {
        return TransportError::RemoteHostClosed;
    }
    if let Some(status) = error.status() {
        return TransportError::from_status(status.as_u16());
    }
    TransportError::Other
}
