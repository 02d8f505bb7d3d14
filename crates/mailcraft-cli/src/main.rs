//! mailcraft - mail stack configuration compiler entry point

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use mailcraft_common::config::LoggingConfig;
use mailcraft_common::Config;
use mailcraft_core::preflight::{self, Severity};
use mailcraft_core::{compile, Artifact, ArtifactWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compile a user/alias model into mail server configuration
#[derive(Parser, Debug)]
#[command(name = "mailcraft")]
#[command(about = "Compile mail stack configuration", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./mailcraft.toml, then /etc/mailcraft/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile and write every artifact
    Compile {
        /// Output directory, overrides output.directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print one compiled artifact to stdout
    Show {
        /// credentials, users, recipients, aliases, regex, sieve, smtpd or dovecot
        #[arg(value_parser = parse_artifact)]
        artifact: Artifact,
    },
    /// Validate the configuration and the material collaborators provide
    Check,
}

fn parse_artifact(name: &str) -> std::result::Result<Artifact, String> {
    Artifact::from_name(name).ok_or_else(|| format!("unknown artifact: {}", name))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mailcraft: {}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    init_logging(&config.logging);

    match run(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<mailcraft_common::Error>()
                .map_or(1, mailcraft_common::Error::exit_code);
            ExitCode::from(code as u8)
        }
    }
}

fn run(command: Commands, mut config: Config) -> Result<()> {
    match command {
        Commands::Compile { output } => {
            if let Some(output) = output {
                config.output.directory = output;
            }
            let compilation = compile(&config)?;
            let writer = ArtifactWriter::new(&config.output.directory)?;
            let manifest = writer.write(&compilation)?;

            info!(
                domain = %manifest.domain,
                users = manifest.users,
                aliases = manifest.aliases,
                pipeline = manifest.pipeline_enabled,
                directory = %writer.directory().display(),
                "Artifacts written"
            );
        }
        Commands::Show { artifact } => {
            let compilation = compile(&config)?;
            let contents = compilation
                .render(artifact)
                .ok_or_else(|| anyhow!("{} is not produced: no users configured", artifact))?;
            print!("{}", contents);
        }
        Commands::Check => {
            compile(&config).context("configuration does not compile")?;
            let report = preflight::check(&config);
            for finding in &report.findings {
                let marker = match finding.severity {
                    Severity::Ok => "ok",
                    Severity::Warning => "warn",
                    Severity::Error => "FAIL",
                };
                println!("[{}] {}: {}", marker, finding.subject, finding.message);
            }
            report.into_result()?;
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},mailcraft=debug", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
