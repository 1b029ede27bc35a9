// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! promptd - queued, cancelable prompts against a local generation backend.
//!
//! This is the binary entry point for the daemon.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use promptd_config::{ConfigError, PromptdConfig};

/// promptd - queued, cancelable prompts against a local generation backend.
#[derive(Parser, Debug)]
#[command(name = "promptd", version, about, long_about = None)]
struct Cli {
    /// Load this config file instead of the XDG hierarchy.
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway and the query worker.
    Serve,
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration as TOML.
    Show,
    /// Validate configuration and exit.
    Check,
}

fn load(path: Option<&PathBuf>) -> Result<PromptdConfig, Vec<ConfigError>> {
    match path {
        Some(path) => promptd_config::load_and_validate_path(path),
        None => promptd_config::load_and_validate(),
    }
}

/// Effective configuration as TOML, with the bearer token masked.
fn render_config(config: &PromptdConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if shown.server.bearer_token.is_some() {
        shown.server.bearer_token = Some("********".to_string());
    }
    toml::to_string_pretty(&shown)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            promptd_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config { action }) => match action {
            ConfigCommands::Show => match render_config(&config) {
                Ok(text) => print!("{text}"),
                Err(e) => {
                    eprintln!("error: failed to render config: {e}");
                    std::process::exit(1);
                }
            },
            ConfigCommands::Check => {
                println!("promptd: config OK (daemon.name={})", config.daemon.name);
            }
        },
        None => {
            println!("promptd: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_parses_serve_with_config() {
        let cli = Cli::try_parse_from(["promptd", "--config", "/tmp/p.toml", "serve"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p.toml")));
    }

    #[test]
    fn cli_parses_config_subcommands() {
        let cli = Cli::try_parse_from(["promptd", "config", "check"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigCommands::Check
            })
        ));

        let cli = Cli::try_parse_from(["promptd", "config", "show", "-c", "x.toml"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigCommands::Show
            })
        ));
        assert!(cli.config.is_some());
    }

    #[test]
    fn cli_rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["promptd", "shell"]).is_err());
    }

    #[test]
    fn render_config_masks_token() {
        let config = promptd_config::load_and_validate_str(
            "[server]\nbearer_token = \"hunter2\"\n",
        )
        .unwrap();
        let text = render_config(&config).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("[backend]"));
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("promptd.toml");
        std::fs::write(&path, "[backend]\nmodel = \"mistral\"\n").unwrap();
        let config = load(Some(&path)).unwrap();
        assert_eq!(config.backend.model, "mistral");
    }
}
