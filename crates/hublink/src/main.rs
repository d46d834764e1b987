mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::commands::Ctx;
use crate::config::ModeChoice;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries command output, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a hub connection
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "hublink", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let cfg = config::load_config_or_default();
            let mut resolved = config::resolve(&cli.global, &cfg)?;
            if let Command::Commission(cli::CommissionArgs {
                poll_interval: Some(interval),
                ..
            }) = cmd
            {
                resolved.engine.poll_interval = interval;
            }

            let profile = resolved.profile_name.clone();
            let preferred = resolved.mode.preferred();
            let engine = resolved.engine_builder().build()?;

            // Probe reports on both transports itself
            let mode = match resolved.mode {
                ModeChoice::Auto(_) if !matches!(cmd, Command::Probe) => engine
                    .select_mode(preferred)
                    .await
                    .map_err(|e| CliError::from(e).in_context(preferred, &profile))?,
                _ => preferred,
            };

            tracing::debug!(command = ?cmd, %mode, profile = %profile, "dispatching command");
            let ctx = Ctx {
                engine,
                mode,
                preferred,
            };
            commands::dispatch(cmd, &ctx, &cli.global)
                .await
                .map_err(|e| e.in_context(mode, &profile))
        }
    }
}
