//! go-plugin `GRPCController` service

use super::proto::plugin::{Empty, grpc_controller_server::GrpcController};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

/// Answers the host's shutdown request by triggering graceful server shutdown
#[derive(Debug, Clone)]
pub struct ShutdownController {
    shutdown: CancellationToken,
}

impl ShutdownController {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }
}

#[tonic::async_trait]
impl GrpcController for ShutdownController {
    async fn shutdown(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        tracing::info!("Host requested plugin shutdown");
        self.shutdown.cancel();
        Ok(Response::new(Empty {}))
    }
}
