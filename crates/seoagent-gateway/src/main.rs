use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use seoagent_core::SeoAgentConfig;
use seoagent_gateway::lambda::{LambdaRuntime, RUNTIME_API_ENV};
use seoagent_gateway::{build_router, simulate, AppState, EventRouter};

/// Streaming SEO agent gateway: HTTP server, Lambda runtime and local tools.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (default: ./seoagent.toml)
    #[arg(short, long, global = true, env = "SEOAGENT_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default outside Lambda)
    Serve,

    /// Run the AWS Lambda Runtime API loop (default inside Lambda)
    Lambda,

    /// Dispatch one event JSON and print the response
    Invoke {
        /// Event file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        event: String,
    },

    /// Run a sample HTTP, queue and scheduled event through the router
    Simulate {
        /// User message for the sample events
        #[arg(short, long, default_value = simulate::DEFAULT_MESSAGE)]
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let in_lambda = std::env::var_os("AWS_LAMBDA_FUNCTION_NAME").is_some();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "seoagent_gateway=info,seoagent_agent=info,tower_http=info".into()
            }),
        )
        // CloudWatch shows escape codes verbatim
        .with_ansi(!in_lambda)
        .init();

    let cli = Cli::parse();
    let config = SeoAgentConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        SeoAgentConfig::default()
    });

    let command = cli.command.unwrap_or_else(|| {
        if std::env::var_os(RUNTIME_API_ENV).is_some() {
            Commands::Lambda
        } else {
            Commands::Serve
        }
    });

    match command {
        Commands::Serve => serve(config).await,
        Commands::Lambda => run_lambda(config).await,
        Commands::Invoke { event } => invoke(config, &event).await,
        Commands::Simulate { message } => run_simulation(config, &message).await,
    }
}

async fn serve(config: SeoAgentConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("invalid server.bind / server.port")?;

    let state = Arc::new(AppState::from_config(config)?);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("SEO agent gateway listening on http://{}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn run_lambda(config: SeoAgentConfig) -> anyhow::Result<()> {
    let runtime = LambdaRuntime::from_env()?;
    let state = match AppState::from_config(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            if let Err(report) = runtime.init_error(&e).await {
                warn!(error = %report, "failed to report init error");
            }
            return Err(e);
        }
    };
    runtime.run(Arc::new(EventRouter::new(state))).await
}

async fn invoke(config: SeoAgentConfig, event: &str) -> anyhow::Result<()> {
    let raw = if event == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        std::fs::read(event).with_context(|| format!("reading event file {event}"))?
    };

    let router = EventRouter::new(Arc::new(AppState::from_config(config)?));
    let response = router.dispatch_raw(&raw, None).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_simulation(mut config: SeoAgentConfig, message: &str) -> anyhow::Result<()> {
    // events stay in process so the run is visible in the log
    config.transport.dev_mode = true;
    let router = EventRouter::new(Arc::new(AppState::from_config(config)?));

    for (label, event) in simulate::sample_events(message) {
        info!(event = label, "simulating invocation");
        let response = router.dispatch(event, None).await;
        println!("{label}: {}", serde_json::to_string(&response)?);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
