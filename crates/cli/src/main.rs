use std::sync::Arc;

use {
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use tailbridge_commands::serve::{setup_message, start_config_from};
use tailbridge_tailnet::{ForwardTarget, HostBackend, ServeController, site_url_matches};

#[derive(Parser)]
#[command(name = "tailbridge", about = "Tailbridge — tailnet ingress for a private chat service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge: expose the local service if serve is enabled.
    Run,
    /// Persist the auth key, start the exposure, print the public URL, and
    /// keep serving until interrupted.
    Setup {
        #[arg(long)]
        auth_key: String,
    },
    /// Print the effective configuration and forward target.
    Check,
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "tailbridge starting");

    match cli.command {
        Commands::Run => run().await,
        Commands::Setup { auth_key } => setup(&auth_key).await,
        Commands::Check => check(),
    }
}

async fn run() -> anyhow::Result<()> {
    let config = tailbridge_config::discover_and_load();
    let controller = Arc::new(ServeController::new(Arc::new(HostBackend::new())));

    if !config.serve.enabled {
        info!("serve is disabled; nothing to expose (run `tailbridge setup` first)");
    } else if config.serve.auth_key.is_empty() {
        warn!("serve is enabled but no auth key is configured");
    } else {
        let identity = controller.start(start_config_from(&config)).await?;
        info!(hostname = %identity.hostname, "exposure running");
        if !site_url_matches(&identity.hostname, &config.service.site_url) {
            warn!(
                site_url = %config.service.site_url,
                hostname = %identity.hostname,
                "configured site URL does not match the tailnet DNS name"
            );
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    controller.stop().await;
    Ok(())
}

async fn setup(auth_key: &str) -> anyhow::Result<()> {
    tailbridge_config::update_config(|c| {
        c.serve.enabled = true;
        c.serve.auth_key = auth_key.to_string();
    })?;

    let config = tailbridge_config::discover_and_load();
    let controller = ServeController::new(Arc::new(HostBackend::new()));
    let identity = controller.start(start_config_from(&config)).await?;
    println!(
        "{}",
        setup_message(&identity.hostname, &config.service.site_url)
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    controller.stop().await;
    Ok(())
}

fn check() -> anyhow::Result<()> {
    let config = tailbridge_config::discover_and_load();
    let target = ForwardTarget::parse(&config.service.listen_address)?;
    println!("listen address: {}", config.service.listen_address);
    println!("forward target: http://{target}");
    println!("site url:       {}", config.service.site_url);
    println!("serve enabled:  {}", config.serve.enabled);
    println!("tailnet host:   {}", config.serve.hostname);
    Ok(())
}
