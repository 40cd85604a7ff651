// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Weft - load, compile and run declarative component documents
//!
//! This is the entry point for the `weft` CLI.
//!
//! ## Commands
//!
//! - `run`: build the object tree of a document and print it
//! - `check`: load and compile documents in parallel, reporting diagnostics
//! - `disasm`: print the bytecode listing of a compiled document

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use rayon::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use weft_engine::{Diagnostic, Engine, ObjectSnapshot, Severity};
use weft_loader::{url_from_input, Component, Config, LoadMode, TypeLoader};

const CONFIG_FILE: &str = "weft.toml";

#[derive(Debug, Parser)]
#[command(name = "weft", version, about = "Load, compile and run Weft component documents")]
struct Cli {
    /// Log loader and VM activity
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ./weft.toml, then the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Module search root; may be repeated, earlier roots win
    #[arg(short = 'I', long = "import-path", global = true, value_name = "DIR")]
    import_paths: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the document's object tree
    Run {
        /// Document URL or path
        input: String,
        /// Print the object tree with property values
        #[arg(long)]
        tree: bool,
        /// Print the object tree as JSON
        #[arg(long, conflicts_with = "tree")]
        json: bool,
    },
    /// Load and compile documents without creating them
    Check {
        /// Document URLs or paths
        #[arg(required = true)]
        inputs: Vec<String>,
    },
    /// Print a document's bytecode
    Disasm {
        /// Document URL or path
        input: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = load_config(&cli).and_then(|config| match &cli.command {
        Command::Run { input, tree, json } => run(&config, input, *tree, *json),
        Command::Check { inputs } => Ok(check(&config, inputs)),
        Command::Disasm { input } => disasm(&config, input),
    });

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("weft=debug,weft_engine=debug,weft_loader=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let user_config = dirs::config_dir().map(|dir| dir.join("weft").join(CONFIG_FILE));
    let path = cli
        .config
        .clone()
        .or_else(|| Some(PathBuf::from(CONFIG_FILE)).filter(|p| p.is_file()))
        .or_else(|| user_config.filter(|p| p.is_file()));

    let mut config = match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading configuration");
            Config::load(&path).with_context(|| format!("failed to load {}", path.display()))?
        }
        None => {
            let mut config = Config::default();
            config.apply_env()?;
            config
        }
    };
    for path in cli.import_paths.iter().rev() {
        config.add_import_path(path.clone());
    }
    Ok(config)
}

/// An initialized engine with a loader sharing its type registry.
fn open(config: &Config) -> Result<(Engine, TypeLoader)> {
    let mut engine = Engine::new();
    engine.initialize();
    // Warnings are printed below, after the tree is built.
    engine.set_output_warnings_to_stderr(false);
    let loader = TypeLoader::new(engine.registry().clone(), config.clone())?;
    Ok((engine, loader))
}

/// Loads `input` and waits for it. Prints diagnostics and returns `None`
/// when it fails.
fn load(loader: &TypeLoader, input: &str) -> Result<Option<Component>> {
    let url = url_from_input(input).with_context(|| format!("cannot open {}", input))?;
    let component = Component::load(loader, &url, LoadMode::PreferSynchronous);
    match component.wait(loader) {
        Ok(_) => Ok(Some(component)),
        Err(e) => {
            print_diagnostics(&e.diagnostics());
            Ok(None)
        }
    }
}

fn run(config: &Config, input: &str, tree: bool, json: bool) -> Result<bool> {
    let (mut engine, loader) = open(config)?;
    let Some(component) = load(&loader, input)? else {
        return Ok(false);
    };
    let root = match component.create(&mut engine) {
        Ok(root) => root,
        Err(e) => {
            print_diagnostics(&e.diagnostics());
            return Ok(false);
        }
    };

    let snapshot = engine.snapshot(root)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else if tree {
        print_tree(&snapshot, 0);
    } else {
        println!(
            "{} {} ({} objects)",
            "Created".green().bold(),
            snapshot.type_name.cyan(),
            engine.object_count()
        );
    }

    if config.output_warnings_to_stderr {
        print_diagnostics(&engine.take_warnings());
    }
    engine.shutdown();
    Ok(true)
}

fn check(config: &Config, inputs: &[String]) -> bool {
    let results: Vec<(&String, Result<Vec<Diagnostic>>)> = inputs
        .par_iter()
        .map(|input| (input, check_one(config, input)))
        .collect();

    let mut ok = true;
    for (input, result) in results {
        match result {
            Ok(errors) if errors.is_empty() => println!("{} {}", "ok".green().bold(), input),
            Ok(errors) => {
                ok = false;
                println!("{} {}", "failed".red().bold(), input);
                print_diagnostics(&errors);
            }
            Err(e) => {
                ok = false;
                println!("{} {}: {:#}", "failed".red().bold(), input, e);
            }
        }
    }
    ok
}

fn check_one(config: &Config, input: &str) -> Result<Vec<Diagnostic>> {
    let (_engine, loader) = open(config)?;
    let url = url_from_input(input)?;
    let component = Component::load(&loader, &url, LoadMode::PreferSynchronous);
    Ok(match component.wait(&loader) {
        Ok(_) => Vec::new(),
        Err(e) => e.diagnostics(),
    })
}

fn disasm(config: &Config, input: &str) -> Result<bool> {
    let (_engine, loader) = open(config)?;
    let Some(component) = load(&loader, input)? else {
        return Ok(false);
    };
    print!("{}", component.compiled_unit()?.disassemble());
    Ok(true)
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic.severity {
            Severity::Warning => eprintln!("{}: {}", "warning".yellow().bold(), diagnostic),
            Severity::Error | Severity::Critical => eprintln!("{}: {}", "error".red().bold(), diagnostic),
        }
    }
}

fn print_tree(snapshot: &ObjectSnapshot, depth: usize) {
    let indent = "  ".repeat(depth);
    match &snapshot.id {
        Some(id) => println!("{}{} {}", indent, snapshot.type_name.cyan().bold(), format!("#{}", id).dimmed()),
        None => println!("{}{}", indent, snapshot.type_name.cyan().bold()),
    }
    for property in &snapshot.properties {
        println!("{}  {}: {}", indent, property.name.white(), property.value);
    }
    for (name, group) in &snapshot.groups {
        println!("{}  {}:", indent, name.white());
        print_tree(group, depth + 2);
    }
    for child in &snapshot.children {
        print_tree(child, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["weft", "-I", "mods", "run", "Main.weft", "--tree"]).unwrap();
        assert_eq!(cli.import_paths, vec![PathBuf::from("mods")]);
        assert!(matches!(cli.command, Command::Run { tree: true, json: false, .. }));

        let cli = Cli::try_parse_from(["weft", "check", "a.weft", "b.weft", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(&cli.command, Command::Check { inputs } if inputs.len() == 2));

        assert!(Cli::try_parse_from(["weft", "check"]).is_err());
        assert!(Cli::try_parse_from(["weft", "run", "a.weft", "--tree", "--json"]).is_err());
    }

    #[test]
    fn test_import_path_precedence() {
        let cli = Cli::try_parse_from([
            "weft",
            "--config",
            "/nonexistent/weft.toml",
            "disasm",
            "Main.weft",
        ])
        .unwrap();
        assert!(load_config(&cli).is_err());

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(CONFIG_FILE);
        std::fs::write(&file, "import_paths = [\"/base\"]\n").unwrap();
        let cli = Cli::try_parse_from([
            "weft",
            "--config",
            file.to_str().unwrap(),
            "-I",
            "/first",
            "-I",
            "/second",
            "disasm",
            "Main.weft",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(&config.import_paths[..2], &[PathBuf::from("/first"), PathBuf::from("/second")]);
        assert!(config.import_paths.contains(&PathBuf::from("/base")));
    }

    #[test]
    fn test_check_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("Good.weft");
        let bad = dir.path().join("Bad.weft");
        std::fs::write(&good, "import Weft 1.0\nItem { width: 1 }").unwrap();
        std::fs::write(&bad, "import Weft 1.0\nItem { bogus: 1 }").unwrap();
        let config = Config::default();

        assert!(check_one(&config, good.to_str().unwrap()).unwrap().is_empty());
        let errors = check_one(&config, bad.to_str().unwrap()).unwrap();
        assert_eq!(errors[0].message, "Cannot assign to non-existent property \"bogus\"");
        assert!(!check(&config, &[path_string(&good), path_string(&bad)]));
        assert!(check(&config, &[path_string(&good)]));
    }

    fn path_string(path: &Path) -> String {
        path.display().to_string()
    }
}
