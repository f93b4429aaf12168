use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    roundtable_config::RoundtableConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "roundtable", about = "Roundtable, turn-taking voice conversation orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of searching the standard locations.
    #[arg(long, global = true, env = "ROUNDTABLE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestrator (room registration, WebSocket gateway, turn loop).
    Gateway {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets omitted).
    Show,
    /// Print which config file would be loaded.
    Path,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// File (or discovered) config, then environment overrides.
fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RoundtableConfig> {
    let mut config = match path {
        Some(path) => roundtable_config::load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => roundtable_config::discover_and_load(),
    };
    roundtable_config::apply_env_overrides(&mut config);
    Ok(config)
}

/// CLI flags win over everything else.
fn apply_flags(config: &mut RoundtableConfig, bind: Option<String>, port: Option<u16>) {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "roundtable starting");

    match cli.command {
        Commands::Gateway { bind, port } => {
            let mut config = load_config(cli.config.as_ref())?;
            apply_flags(&mut config, bind, port);
            roundtable_gateway::start_gateway(config).await
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(cli.config.as_ref())?;
                println!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            },
            ConfigAction::Path => {
                let path = match cli.config {
                    Some(path) => Some(path),
                    None => {
                        let mut dirs = vec![PathBuf::from(".")];
                        dirs.extend(roundtable_config::loader::config_dir());
                        roundtable_config::loader::find_config_file(&dirs)
                    },
                };
                match path {
                    Some(path) => println!("{}", path.display()),
                    None => println!("no config file found, using defaults"),
                }
                Ok(())
            },
        },
    }
}
