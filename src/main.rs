//! terraform-provider-ollama - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use terraform_provider_ollama::grpc::handshake::{
    Handshake, HandshakeError, NOT_A_PLUGIN_NOTICE, handshake_line, reattach_config,
};
use terraform_provider_ollama::grpc::server::{ServerOptions, serve};
use terraform_provider_ollama::grpc::tls::{ServerCertificate, parse_client_cert};
use terraform_provider_ollama::{OllamaProvider, PluginConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "terraform-provider-ollama")]
#[command(about = "Terraform provider for Ollama models", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to plugin configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run standalone and print TF_REATTACH_PROVIDERS for attaching Terraform
    #[arg(long)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TF_LOG_PROVIDER", default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "json")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the handshake, so logs go to stderr
    let filter = cli.log_level.to_lowercase();
    match cli.log_format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
    }

    let handshake = match Handshake::from_env(|key| std::env::var(key).ok(), cli.debug) {
        Err(HandshakeError::NotLaunchedByHost) => {
            eprintln!("{}", NOT_A_PLUGIN_NOTICE);
            std::process::exit(1);
        }
        other => other?,
    };

    let config = PluginConfig::load(cli.config)?;
    config.validate()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        request_timeout_secs = ?config.request_timeout_secs,
        max_message_size_mb = config.max_message_size_mb,
        "Starting Ollama provider"
    );

    let listener = handshake
        .bind()
        .await
        .context("Failed to bind plugin listener")?;
    let addr = listener.local_addr()?;

    // AutoMTLS: answer the host's certificate with a one-time server certificate
    let tls = match &handshake.client_cert {
        Some(pem) => {
            let client_cert = parse_client_cert(pem)?;
            let server_cert =
                ServerCertificate::generate().context("Failed to generate plugin certificate")?;
            let config = server_cert.server_config(client_cert)?;
            Some((server_cert.encoded(), Arc::new(config)))
        }
        None => {
            if !cli.debug {
                tracing::warn!("Host offered no client certificate, serving without TLS");
            }
            None
        }
    };

    let mut stdout = std::io::stdout();
    if cli.debug {
        let reattach = reattach_config(&config.provider_address, &addr, std::process::id());
        writeln!(
            stdout,
            "Provider started. To attach Terraform, set:\n\n\tTF_REATTACH_PROVIDERS='{}'\n",
            reattach
        )?;
    } else {
        let server_cert = tls.as_ref().map(|(encoded, _)| encoded.as_str());
        writeln!(stdout, "{}", handshake_line(&addr, server_cert))?;
    }
    stdout.flush()?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let provider = OllamaProvider::new(env!("CARGO_PKG_VERSION"), config.client_settings());
    let options = ServerOptions {
        max_message_size: config.max_message_size(),
        reflection: config.reflection,
        tls: tls.map(|(_, config)| config),
    };

    serve(listener, provider, options, shutdown)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Provider server error")?;

    tracing::info!("Shutdown complete");

    Ok(())
}

/// Cancel `shutdown` on SIGTERM.
///
/// Interrupts are ignored: Terraform forwards Ctrl+C to the whole process
/// group and then stops the provider itself through the plugin protocol.
async fn shutdown_signal(shutdown: CancellationToken) {
    let interrupts = async {
        while signal::ctrl_c().await.is_ok() {
            tracing::debug!("Ignoring interrupt, waiting for Terraform to stop the provider");
        }
        tracing::warn!("Failed to install Ctrl+C handler");
        std::future::pending::<()>().await
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupts => {},
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
    shutdown.cancel();
}
