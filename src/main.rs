//! bastion-ops - versioned task orchestration for bastion-managed hosts
//!
//! This is the main entry point for the bastion-ops CLI.

mod cli;

use anyhow::Result;
use bastion_ops::config::{Config, LoggingConfig};
use cli::commands::{CommandContext, Runnable};
use cli::{Cli, Commands};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let (mut config, config_error) = match Config::load(cli.config.as_ref()) {
        Ok(config) => (config, None),
        Err(err) => (Config::default(), Some(err)),
    };
    if let Some(format) = cli.log_format {
        config.logging.format = format.as_str().to_string();
    }

    // Initialize logging based on verbosity
    init_logging(cli.verbosity(), &config.logging);

    if let Some(err) = config_error {
        tracing::warn!("Failed to load config, using defaults: {:#}", err);
    }
    if cli.verbosity() >= 2 {
        eprintln!("bastion-ops v{}", VERSION);
    }

    // Create command context
    let mut ctx = CommandContext::new(&cli, config);

    let exit_code = match dispatch(&cli.command, &mut ctx).await {
        Ok(code) => code,
        Err(err) => {
            ctx.output.error(&format!("{:#}", err));
            err.downcast_ref::<bastion_ops::Error>()
                .map(|e| e.exit_code())
                .unwrap_or(1)
        }
    };

    std::process::exit(exit_code);
}

/// Execute the appropriate command
async fn dispatch(command: &Commands, ctx: &mut CommandContext) -> Result<i32> {
    match command {
        Commands::Serve(args) => args.run(ctx).await,
        Commands::Declare(args) => args.run(ctx).await,
        Commands::Run(args) => args.run(ctx).await,
        Commands::Tail(args) => args.run(ctx).await,
        Commands::Tasks(args) => args.run(ctx).await,
        Commands::History(args) => args.run(ctx).await,
        Commands::Delete(args) => args.run(ctx).await,
        Commands::Inventory(args) => args.run(ctx).await,
        Commands::Exec(args) => args.run(ctx).await,
        Commands::Playbook(args) => args.run(ctx).await,
    }
}

/// Initialize logging based on verbosity level
///
/// `RUST_LOG` wins over both the `-v` flags and the configured level.
fn init_logging(verbosity: u8, logging: &LoggingConfig) {
    let filter = match verbosity {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(verbosity >= 3)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
