//! Terraform plugin protocol (tfplugin6) served over gRPC
//!
//! Terraform starts the plugin, reads the go-plugin handshake line from
//! stdout ([`handshake`]) and then drives the provider through the
//! `tfplugin6.Provider` service ([`service`]), over mTLS ([`tls`]) whenever the
//! host offers a client certificate. Shutdown arrives either through
//! the go-plugin controller ([`controller`]) or a signal.

pub mod controller;
pub mod convert;
pub mod handshake;
pub mod server;
pub mod service;
pub mod tls;

pub use controller::ShutdownController;
pub use handshake::{Handshake, HandshakeError};
pub use server::serve;
pub use service::ProviderService;

// Include generated proto code
pub mod proto {
    pub mod tfplugin6 {
        include!(concat!(env!("OUT_DIR"), "/tfplugin6.rs"));
    }

    pub mod plugin {
        include!(concat!(env!("OUT_DIR"), "/plugin.rs"));
    }
}
