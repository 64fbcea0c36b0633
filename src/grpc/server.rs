//! gRPC server initialization and lifecycle management

use super::controller::ShutdownController;
use super::proto::plugin::grpc_controller_server::GrpcControllerServer;
use super::proto::tfplugin6::provider_server::ProviderServer;
use super::service::ProviderService;
use crate::framework::Provider;
use futures::StreamExt;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

/// Transport options for the plugin server
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub max_message_size: usize,
    pub reflection: bool,
    /// mTLS configuration; plaintext when `None`
    pub tls: Option<Arc<rustls::ServerConfig>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_message_size: 256 * 1024 * 1024,
            reflection: false,
            tls: None,
        }
    }
}

/// Serve `provider` on an already bound listener until `shutdown` is cancelled.
///
/// The host's `GRPCController.Shutdown` call cancels `shutdown` itself.
pub async fn serve<P: Provider>(
    listener: TcpListener,
    provider: P,
    options: ServerOptions,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    let service = ProviderService::new(provider);
    let controller = ShutdownController::new(shutdown.clone());

    let reflection_service = if options.reflection {
        let file_descriptor_set: &[u8] = tonic::include_file_descriptor_set!("descriptor");
        Some(
            tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(file_descriptor_set)
                .build_v1()?,
        )
    } else {
        None
    };

    tracing::info!(
        "Serving provider on {} ({}, max message: {}MB, reflection: {})",
        addr,
        if options.tls.is_some() { "mTLS" } else { "no TLS" },
        options.max_message_size / (1024 * 1024),
        options.reflection
    );

    let router = Server::builder()
        .add_service(
            ProviderServer::new(service)
                .max_decoding_message_size(options.max_message_size)
                .max_encoding_message_size(options.max_message_size),
        )
        .add_service(GrpcControllerServer::new(controller))
        .add_optional_service(reflection_service);
    let stopped = async move { shutdown.cancelled().await };

    match options.tls {
        Some(config) => {
            let acceptor = TlsAcceptor::from(config);
            // a failed handshake drops that connection, not the server
            let incoming = TcpListenerStream::new(listener).filter_map(move |conn| {
                let acceptor = acceptor.clone();
                async move {
                    let stream = match conn {
                        Ok(stream) => stream,
                        Err(e) => return Some(Err(e)),
                    };
                    match acceptor.accept(stream).await {
                        Ok(tls) => Some(Ok(tls)),
                        Err(e) => {
                            tracing::warn!(error = %e, "TLS handshake with host failed");
                            None
                        }
                    }
                }
            });
            router
                .serve_with_incoming_shutdown(Box::pin(incoming), stopped)
                .await?;
        }
        None => {
            router
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), stopped)
                .await?;
        }
    }

    tracing::info!("Provider server stopped");
    Ok(())
}
