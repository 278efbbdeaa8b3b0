//! CLI interface for agri-payout

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::learning::{ModelLifecycle, TrainOutcome};
use crate::prediction::PredictionResult;
use crate::types::parse_claims_document;

#[derive(Parser)]
#[command(name = "agri-payout")]
#[command(about = "Online-learning payout predictor for agricultural claims", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(short, long, global = true, env = "AGRI_PAYOUT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Port to listen on (default from config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (default from config)
        #[arg(long)]
        host: Option<String>,
    },
    /// Run one training cycle from a JSON file of labeled claims
    Train {
        /// JSON array of records, or an object with a `claims` array
        file: PathBuf,
    },
    /// Predict a payout for one JSON object of features
    Predict {
        /// e.g. '{"soilMoisture":25,"airTemp":40,"humidity":22,"soilTemp":36,"expectedAmount":1500}'
        input: String,
    },
    /// Show buffer size and the committed model
    Status,
    /// Inspect configuration
    Config {
        /// Print the effective configuration as TOML
        #[arg(long)]
        show: bool,
        /// Print the config file location
        #[arg(long)]
        path: bool,
    },
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => {
            let config = load_config(cli.config.as_deref())?;
            crate::server::start(config, host, port).await?;
        }
        Commands::Train { file } => {
            let config = load_config(cli.config.as_deref())?;
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let doc: serde_json::Value = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {} as JSON", file.display()))?;
            let records = parse_claims_document(&doc)?;

            let lifecycle = ModelLifecycle::from_config(&config);
            match lifecycle.trainer.train(records)? {
                TrainOutcome::Trained { records } => {
                    let version = lifecycle
                        .registry
                        .current()?
                        .map(|m| m.version)
                        .unwrap_or_default();
                    println!("✓ Trained model v{} on {} buffered records", version, records);
                }
                TrainOutcome::Skipped { reason, records } => {
                    println!("⚠ Skipped: {} ({} records submitted)", reason, records);
                }
            }
        }
        Commands::Predict { input } => {
            let config = load_config(cli.config.as_deref())?;
            let body: serde_json::Value =
                serde_json::from_str(&input).context("Prediction input is not valid JSON")?;

            let lifecycle = ModelLifecycle::from_config(&config);
            match lifecycle.engine.predict_json(&body)? {
                PredictionResult::Available { amount, model_version } => {
                    println!("{} (model v{})", amount, model_version);
                }
                PredictionResult::Unavailable => {
                    println!("No model trained yet");
                }
            }
        }
        Commands::Status => {
            let config = load_config(cli.config.as_deref())?;
            let lifecycle = ModelLifecycle::from_config(&config);
            let status = lifecycle.status()?;

            println!("Data directory:  {}", config.storage.data_dir.display());
            println!("Buffered records: {}", status.buffer_records);
            match status.model {
                Some(model) => {
                    println!("Model version:   v{}", model.version);
                    println!("Trained at:      {}", model.trained_at.to_rfc3339());
                    println!("Samples seen:    {}", model.samples_seen);
                }
                None => println!("Model:           none"),
            }
        }
        Commands::Config { show, path } => {
            let location = match cli.config.clone() {
                Some(p) => p,
                None => config::config_path()?,
            };
            if path {
                println!("{}", location.display());
            } else if show {
                let config = load_config(cli.config.as_deref())?;
                let toml = toml::to_string_pretty(&config).context("Failed to serialize config")?;
                println!("{}", toml);
            } else {
                println!("Configuration options:");
                println!("  --show   Display the effective configuration");
                println!("  --path   Display the config file location");
                println!();
                println!("Defaults:");
                println!("{}", config::default_config_toml());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["agri-payout", "status", "--config", "/tmp/c.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::try_parse_from(["agri-payout", "serve", "--port", "8080"]).unwrap();
        match cli.command {
            Commands::Serve { port, host } => {
                assert_eq!(port, Some(8080));
                assert!(host.is_none());
            }
            _ => panic!("expected serve"),
        }
    }
}
