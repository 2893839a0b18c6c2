use clap::Parser;
use liman_core::core::when::{parse_when, ConditionalEvaluator};
use liman_core::utils::error::ErrorSeverity;
use liman_core::utils::{logger, validation::Validate};
use liman_core::{hello, CliCommand, CliConfig, NodeOptions, Registry, Result, Settings};
use serde_json::Map;
use std::path::{Path, PathBuf};

fn main() {
    let config = CliConfig::parse();
    let settings = load_settings(config.config.as_deref());

    let json_logs = settings.as_ref().is_ok_and(|s| s.logging.json);
    let debug = settings.as_ref().is_ok_and(|s| s.runtime.debug);
    let level = settings
        .as_ref()
        .map(|s| s.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    if json_logs {
        logger::init_json_logger(&level);
    } else {
        logger::init_cli_logger(&level, config.verbose || debug);
    }

    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    let result = match settings {
        Ok(settings) => run(&config, &settings),
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::error!("❌ {} (Severity: {:?})", e, e.severity());
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut settings = match path {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    settings.apply_env_overrides()?;
    settings.validate()?;
    Ok(settings)
}

fn run(config: &CliConfig, settings: &Settings) -> Result<()> {
    config.validate()?;

    match &config.command {
        CliCommand::Hello => println!("{}", hello()),
        CliCommand::Validate { files } => {
            let paths = if files.is_empty() {
                settings.specs.paths.clone()
            } else {
                files.clone()
            };
            let registry = load_registry(&paths, settings)?;
            registry.compile_all()?;

            for node in registry.components() {
                println!("  {}", node);
            }
            println!("✅ {} component(s) loaded and compiled", registry.len());
        }
        CliCommand::Print { files, initial } => {
            let registry = load_registry(files, settings)?;
            print!("{}", registry.print_specs(*initial)?);
        }
        CliCommand::Eval { expression, vars } => {
            let (context, state_context): (Map<_, _>, Map<_, _>) = CliConfig::eval_vars(vars)?
                .into_iter()
                .partition(|(key, _)| key.starts_with('$'));

            let expr = parse_when(expression)?;
            tracing::debug!("Parsed expression: {:?}", expr);
            let result = ConditionalEvaluator::new(context, state_context).evaluate(&expr)?;
            println!("{}", result);
        }
    }
    Ok(())
}

/// Manifests are loaded strictly. Directories contribute all their YAML files.
fn load_registry(paths: &[PathBuf], settings: &Settings) -> Result<Registry> {
    let options: NodeOptions = settings.node_options()?.strict(true);
    let mut registry = Registry::new();
    for path in paths {
        if path.is_dir() {
            registry.load_dir(path, &options)?;
        } else {
            registry.load_yaml_path_with(path, options.clone())?;
        }
    }
    tracing::info!("Registry: {} component(s)", registry.len());
    Ok(registry)
}
