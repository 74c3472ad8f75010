//! apiflow CLI and REST API entry point.
//!
//! Binary name: `apiflow`
//!
//! Parses CLI arguments, loads configuration, opens the database and
//! dispatches to the command handler or starts the REST API server.

use std::process::ExitCode;

use clap::Parser;
use clap_complete::generate;

use apiflow_api::cli::{self, Cli, Commands};
use apiflow_api::http;
use apiflow_api::state::AppState;
use apiflow_infra::config::load_server_config;
use apiflow_observe::tracing_setup::{TracingOptions, init_tracing_with, shutdown_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Shell completions don't need tracing, config or state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "apiflow", &mut std::io::stdout());
        return ExitCode::SUCCESS;
    }

    let options = TracingOptions {
        default_directives: Some(cli.log_directives().to_string()),
        ..TracingOptions::from_env()
    };
    if let Err(e) = init_tracing_with(options) {
        eprintln!("warning: tracing init failed: {e}");
    }

    let code = match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("  {} {e:#}", console::style("error:").red().bold());
            ExitCode::from(1)
        }
    };
    shutdown_tracing();
    code
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_server_config().await?;
    let state = AppState::init(&config).await?;

    let result = match cli.command {
        Commands::Serve { port, host } => {
            let port = port.unwrap_or(config.port);
            serve(state.clone(), &host, port).await
        }

        Commands::Export {
            workspace,
            output,
            flows,
            examples,
        } => {
            cli::snapshot::export_workspace(&state, workspace, output.as_deref(), flows, examples, cli.json)
                .await
        }

        Commands::Import { file, remap, owner } => {
            cli::snapshot::import_workspace(&state, &file, remap, owner.as_deref(), cli.json).await
        }

        Commands::Curl { example } => cli::request::print_curl(&state, example, cli.json).await,

        Commands::Token {
            email,
            name,
            ttl_hours,
        } => cli::token::issue_token(&state, &email, name.as_deref(), ttl_hours, cli.json).await,

        Commands::Completions { .. } => Ok(()),
    };

    state.shutdown().await;
    result
}

async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "api server listening");

    println!(
        "  {} apiflow API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
