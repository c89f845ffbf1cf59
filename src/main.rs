use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use tsloader::capabilities::HostCapabilities;
use tsloader::cli::{commands, logging, Cli, Commands};
use tsloader::session::{Session, SessionOptions};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    let session = Arc::new(build_session(&cli)?);

    let output = match cli.command {
        Commands::Resolve {
            ref specifier,
            ref from,
            ref conditions,
        } => commands::run_resolve(&session, specifier, from.as_deref(), conditions, &cli.format)?,

        Commands::Load {
            ref specifier,
            ref from,
            report_dependencies,
        } => commands::run_load(
            &session,
            specifier,
            from.as_deref(),
            report_dependencies,
            &cli.format,
        )?,

        Commands::Config { ref from } => {
            commands::run_config(&session, from.as_deref(), &cli.format)?
        }
    };
    println!("{}", output);

    Ok(())
}

fn build_session(cli: &Cli) -> Result<Session> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut options = SessionOptions::new(cwd);

    if let Some(path) = &cli.tsconfig {
        options = options.tsconfig(path);
    }
    if let Some(raw) = &cli.node_version {
        let version = HostCapabilities::parse_version(raw)
            .with_context(|| format!("invalid Node.js version '{}'", raw))?;
        options = options.host_version(version);
    }

    Session::new(options).context("failed to load project configuration")
}
