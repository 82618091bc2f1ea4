//! # soapgw-cli
//!
//! Command-line entry point for the REST to SOAP gateway.
//!
//! `serve` runs the gateway from a configuration file, `compile` prints the
//! records and known paths of one WSDL operation, and `validate` checks
//! every configured route without starting the server.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use soapgw_gateway::{GatewayConfig, LogConfig, RouteCompiler, RouteRegistry, serve, shutdown_signal};
use soapgw_schema::{CompiledOperation, WsdlLoader, compile_operation};
use soapgw_validation::format_validation_errors;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "soapgw")]
#[command(about = "REST/JSON to SOAP gateway")]
#[command(version)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the configured routes
    Serve {
        /// Gateway configuration file (JSON or YAML)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the records and known paths of a WSDL operation
    Compile {
        /// WSDL file path or URL
        #[arg(short, long)]
        wsdl: String,

        /// Operation name
        #[arg(short, long)]
        operation: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },

    /// Check every configured route against its WSDL
    Validate {
        /// Gateway configuration file (JSON or YAML)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

#[derive(Serialize)]
struct CompileOutput<'a> {
    operation: &'a CompiledOperation,
    known_paths: BTreeSet<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let config = load_config(&config)?;
            init_logging(&config.logging);
            let report = serve(config, shutdown_signal()).await?;
            tracing::info!(served = report.registered.len(), "shutdown complete");
        }
        Commands::Compile {
            wsdl,
            operation,
            format,
        } => {
            init_logging(&LogConfig {
                level: "warn".to_string(),
                ..LogConfig::default()
            });
            let doc = WsdlLoader::new()
                .load(&wsdl)
                .await
                .with_context(|| format!("failed to load {wsdl}"))?;
            let compiled = compile_operation(&doc, &wsdl, &operation)?;
            let output = CompileOutput {
                known_paths: compiled.output_paths(),
                operation: &compiled,
            };
            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&output)?),
                Format::Yaml => print!("{}", serde_yaml::to_string(&output)?),
            }
        }
        Commands::Validate { config } => {
            let config = load_config(&config)?;
            init_logging(&LogConfig {
                level: "error".to_string(),
                ..config.logging.clone()
            });
            validate(&config).await?;
        }
    }
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<GatewayConfig> {
    GatewayConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

/// Logs go to stderr; `RUST_LOG` overrides the configured level
fn init_logging(logging: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn validate(config: &GatewayConfig) -> anyhow::Result<()> {
    let compiler = RouteCompiler::default();
    let report = compiler.compile_all(&RouteRegistry::new(), &config.routes).await;

    for drift in &report.reports {
        print!("{}", format_validation_errors(&drift.errors));
    }
    for (path, message) in &report.failed {
        println!("route {path}: {message}");
    }

    if !report.is_clean() {
        bail!(
            "{} of {} route(s) failed validation",
            report.failed.len() + report.reports.len(),
            config.routes.len()
        );
    }
    println!("{} route(s) valid", report.registered.len());
    Ok(())
}
