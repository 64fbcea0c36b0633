//! go-plugin handshake
//!
//! The host launches the plugin with a magic cookie, an optional port range and
//! (with AutoMTLS) its client certificate in the environment, then reads one
//! line from stdout describing where the gRPC server listens.

use serde_json::json;
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::net::TcpListener;

pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const CLIENT_CERT_KEY: &str = "PLUGIN_CLIENT_CERT";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// go-plugin core protocol version
pub const CORE_PROTOCOL_VERSION: u32 = 1;
/// Terraform plugin protocol version
pub const PROTOCOL_VERSION: u32 = 6;

/// Printed when the binary is run by hand
pub const NOT_A_PLUGIN_NOTICE: &str =
    "This binary is a plugin. These are not meant to be executed directly.\n\
Please execute the program that consumes these plugins, which will\n\
load any plugins automatically";

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("plugin was not launched by Terraform")]
    NotLaunchedByHost,

    #[error("host does not support plugin protocol version 6 (offered: {0})")]
    UnsupportedProtocol(String),

    #[error("invalid plugin port range: {0}")]
    InvalidPortRange(String),

    #[error("no free port in range {min}-{max}")]
    NoFreePort { min: u16, max: u16 },

    #[error("failed to bind plugin listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Handshake parameters taken from the launch environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    pub port_range: Option<(u16, u16)>,
    /// PEM certificate the host will present; `None` means plaintext
    pub client_cert: Option<String>,
}

impl Handshake {
    /// Validate the launch environment. `debug` skips the cookie check so the
    /// plugin can be started by hand and attached with `TF_REATTACH_PROVIDERS`.
    pub fn from_env<F>(env: F, debug: bool) -> Result<Self, HandshakeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !debug && env(MAGIC_COOKIE_KEY).as_deref() != Some(MAGIC_COOKIE_VALUE) {
            return Err(HandshakeError::NotLaunchedByHost);
        }

        if let Some(offered) = env("PLUGIN_PROTOCOL_VERSIONS").filter(|v| !v.is_empty()) {
            let supported = offered
                .split(',')
                .any(|v| v.trim().parse::<u32>() == Ok(PROTOCOL_VERSION));
            if !supported {
                return Err(HandshakeError::UnsupportedProtocol(offered));
            }
        }

        let port_range = match (env("PLUGIN_MIN_PORT"), env("PLUGIN_MAX_PORT")) {
            (Some(min), Some(max)) => {
                let parse = |raw: &str| {
                    raw.trim()
                        .parse::<u16>()
                        .map_err(|e| HandshakeError::InvalidPortRange(format!("{:?}: {}", raw, e)))
                };
                let (min, max) = (parse(&min)?, parse(&max)?);
                if min > max {
                    return Err(HandshakeError::InvalidPortRange(format!(
                        "min {} is greater than max {}",
                        min, max
                    )));
                }
                Some((min, max))
            }
            _ => None,
        };

        let client_cert = env(CLIENT_CERT_KEY).filter(|pem| !pem.trim().is_empty());

        Ok(Self {
            port_range,
            client_cert,
        })
    }

    /// Bind the plugin listener on loopback, inside the port range when one is set
    pub async fn bind(&self) -> Result<TcpListener, HandshakeError> {
        let Some((min, max)) = self.port_range else {
            return Ok(TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?);
        };

        for port in min..=max {
            match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
                Ok(listener) => return Ok(listener),
                Err(e) => tracing::trace!(port, error = %e, "Port unavailable"),
            }
        }
        Err(HandshakeError::NoFreePort { min, max })
    }
}

/// The line the host reads from stdout.
///
/// `server_cert` is the base64 DER certificate of a TLS listener; without it
/// the host dials plaintext.
pub fn handshake_line(addr: &SocketAddr, server_cert: Option<&str>) -> String {
    let line = format!(
        "{}|{}|tcp|{}|grpc",
        CORE_PROTOCOL_VERSION, PROTOCOL_VERSION, addr
    );
    match server_cert {
        Some(cert) => format!("{}|{}", line, cert),
        None => line,
    }
}

/// `TF_REATTACH_PROVIDERS` value for a plugin started with `--debug`
pub fn reattach_config(provider_address: &str, addr: &SocketAddr, pid: u32) -> serde_json::Value {
    json!({
        provider_address: {
            "Protocol": "grpc",
            "ProtocolVersion": PROTOCOL_VERSION,
            "Pid": pid,
            "Test": true,
            "Addr": {
                "Network": "tcp",
                "String": addr.to_string(),
            },
        }
    })
}
