pub mod settings;

pub use settings::{LoggingSettings, RuntimeSettings, Settings, SpecsSettings};

#[cfg(feature = "cli")]
pub use cli::{CliCommand, CliConfig};

#[cfg(feature = "cli")]
mod cli {
    use crate::utils::error::{LimanError, Result};
    use crate::utils::validation::Validate;
    use clap::{Parser, Subcommand};
    use serde_json::{Map, Value};
    use std::path::PathBuf;

    #[derive(Debug, Clone, Parser)]
    #[command(name = "liman")]
    #[command(about = "Load, validate and inspect Liman component manifests")]
    pub struct CliConfig {
        /// Settings file (TOML)
        #[arg(long, global = true)]
        pub config: Option<PathBuf>,

        #[arg(long, global = true, help = "Enable verbose output")]
        pub verbose: bool,

        #[command(subcommand)]
        pub command: CliCommand,
    }

    #[derive(Debug, Clone, Subcommand)]
    pub enum CliCommand {
        /// Print the greeting of the core library
        Hello,

        /// Load, register and compile manifests. Uses the configured spec
        /// paths when no file is given.
        Validate {
            files: Vec<PathBuf>,
        },

        /// Print manifests as YAML
        Print {
            #[arg(required = true)]
            files: Vec<PathBuf>,

            /// Print the manifest as written instead of the validated spec
            #[arg(long)]
            initial: bool,
        },

        /// Parse and evaluate a `when` expression
        Eval {
            expression: String,

            /// Variable as key=value; values are parsed as JSON when possible
            #[arg(long = "var", value_name = "KEY=VALUE")]
            vars: Vec<String>,
        },
    }

    impl CliConfig {
        /// `--var` pairs as a context map. Keys keep their `$` prefix.
        pub fn eval_vars(vars: &[String]) -> Result<Map<String, Value>> {
            let mut map = Map::new();
            for var in vars {
                let (key, raw) = var.split_once('=').ok_or_else(|| LimanError::Config {
                    field: "var".to_string(),
                    message: format!("Expected KEY=VALUE, got '{}'", var),
                })?;
                let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
                map.insert(key.trim().to_string(), value);
            }
            Ok(map)
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            if let CliCommand::Eval { vars, .. } = &self.command {
                Self::eval_vars(vars)?;
            }
            Ok(())
        }
    }

}
