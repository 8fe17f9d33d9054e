//! svfs CLI entry point.
//!
//! Usage:
//!   svfs mounts [--json]         # List configured volumes
//!   svfs ls <uri>                # List a directory
//!   svfs tree <uri>              # Walk a directory recursively
//!   svfs cat <uri>               # Print a file
//!   svfs watch                   # Print change events until interrupted

mod commands;
mod config;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let config_path = take_config_flag(&mut args)?;

    match args.first().map(|s| s.as_str()) {
        None | Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("svfs {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some(command @ ("mounts" | "ls" | "tree" | "cat" | "watch")) => {
            let config = match &config_path {
                Some(path) => config::load_from(path)?,
                None => config::load()?,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::run(command, &args[1..], config))
        }

        Some(unknown) => {
            eprintln!("Unknown command: {unknown}");
            eprintln!("Run 'svfs --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Remove `--config <path>` / `--config=<path>` from `args`.
fn take_config_flag(args: &mut Vec<String>) -> Result<Option<PathBuf>> {
    let Some(index) = args
        .iter()
        .position(|arg| arg == "--config" || arg.starts_with("--config="))
    else {
        return Ok(None);
    };

    let flag = args.remove(index);
    if let Some(path) = flag.strip_prefix("--config=") {
        return Ok(Some(PathBuf::from(path)));
    }

    if index >= args.len() {
        anyhow::bail!("--config requires a path argument");
    }
    Ok(Some(PathBuf::from(args.remove(index))))
}

fn print_help() {
    println!(
        r#"svfs v{}

Usage:
  svfs [--config <path>] <command>

Commands:
  mounts [--json]              List configured volumes and their access
  ls <uri>                     List a directory (e.g. assets://textures/)
  tree <uri>                   Walk a directory recursively
  cat <uri>                    Print a file's contents
  watch                        Print change events from watched volumes

Options:
  --config <path>              Volume config (default: ~/.config/svfs/volumes.toml)
  -h, --help                   Show this help
  -V, --version                Show version

Logging is controlled by RUST_LOG (e.g. RUST_LOG=svfs_core=debug).
"#,
        env!("CARGO_PKG_VERSION")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_config_flag_forms() {
        let mut split = args(&["--config", "v.toml", "ls", "a://"]);
        assert_eq!(
            take_config_flag(&mut split).unwrap(),
            Some(PathBuf::from("v.toml"))
        );
        assert_eq!(split, args(&["ls", "a://"]));

        let mut joined = args(&["mounts", "--config=v.toml"]);
        assert_eq!(
            take_config_flag(&mut joined).unwrap(),
            Some(PathBuf::from("v.toml"))
        );
        assert_eq!(joined, args(&["mounts"]));

        let mut absent = args(&["watch"]);
        assert_eq!(take_config_flag(&mut absent).unwrap(), None);
    }

    #[test]
    fn test_config_flag_needs_value() {
        let mut dangling = args(&["ls", "--config"]);
        assert!(take_config_flag(&mut dangling).is_err());
    }
}
