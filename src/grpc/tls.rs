//! go-plugin AutoMTLS
//!
//! Terraform passes its own client certificate in `PLUGIN_CLIENT_CERT` and
//! expects the plugin to answer with a one-time server certificate in the
//! handshake line. Both certificates are self-signed, so the host is trusted by
//! pinning the exact certificate it offered rather than by chain building.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, DnValue, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose,
};
use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{CertificateError, DigitallySignedStruct, DistinguishedName as HintName};
use rustls::{ServerConfig, SignatureScheme};
use std::sync::Arc;
use thiserror::Error;

/// Name the host verifies the server certificate against
pub const SERVER_NAME: &str = "localhost";

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("invalid PLUGIN_CLIENT_CERT: {0}")]
    ClientCertificate(String),

    #[error("failed to generate server certificate: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("failed to build TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

/// One-time server certificate for a single plugin run
pub struct ServerCertificate {
    cert: CertificateDer<'static>,
    key: PrivatePkcs8KeyDer<'static>,
}

impl std::fmt::Debug for ServerCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCertificate")
            .field("der_len", &self.cert.len())
            .finish_non_exhaustive()
    }
}

impl ServerCertificate {
    /// Generate a fresh self-signed certificate for [`SERVER_NAME`]
    pub fn generate() -> Result<Self, TlsError> {
        let mut params = CertificateParams::new(vec![SERVER_NAME.to_string()])?;

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(SERVER_NAME.to_string()),
        );
        dn.push(
            DnType::OrganizationName,
            DnValue::Utf8String("terraform-provider-ollama".to_string()),
        );
        params.distinguished_name = dn;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let key_pair = KeyPair::generate()?;
        let cert = params.self_signed(&key_pair)?;

        Ok(Self {
            cert: cert.der().clone(),
            key: PrivatePkcs8KeyDer::from(key_pair.serialize_der()),
        })
    }

    /// DER certificate as the handshake line carries it: standard base64, unpadded
    pub fn encoded(&self) -> String {
        STANDARD_NO_PAD.encode(self.cert.as_ref())
    }

    /// rustls server configuration that only accepts `client_cert`
    pub fn server_config(
        &self,
        client_cert: CertificateDer<'static>,
    ) -> Result<ServerConfig, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = Arc::new(PinnedClientVerifier::new(client_cert, provider.clone()));

        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(
                vec![self.cert.clone()],
                PrivateKeyDer::Pkcs8(self.key.clone_key()),
            )?;
        // grpc-go refuses connections that do not negotiate h2
        config.alpn_protocols = vec![b"h2".to_vec()];
        Ok(config)
    }
}

/// Decode the PEM certificate Terraform offers in `PLUGIN_CLIENT_CERT`
pub fn parse_client_cert(pem: &str) -> Result<CertificateDer<'static>, TlsError> {
    CertificateDer::from_pem_slice(pem.as_bytes())
        .map_err(|e| TlsError::ClientCertificate(e.to_string()))
}

/// Accepts exactly one client certificate, byte for byte
#[derive(Debug)]
pub struct PinnedClientVerifier {
    expected: CertificateDer<'static>,
    provider: Arc<CryptoProvider>,
}

impl PinnedClientVerifier {
    pub fn new(expected: CertificateDer<'static>, provider: Arc<CryptoProvider>) -> Self {
        Self { expected, provider }
    }
}

impl ClientCertVerifier for PinnedClientVerifier {
    fn root_hint_subjects(&self) -> &[HintName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        if end_entity.as_ref() == self.expected.as_ref() {
            Ok(ClientCertVerified::assertion())
        } else {
            tracing::warn!("Rejected client certificate that does not match PLUGIN_CLIENT_CERT");
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_cert() -> CertificateDer<'static> {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        cert.cert.der().clone()
    }

    #[test]
    fn test_encoded_certificate_is_unpadded_der() {
        let server = ServerCertificate::generate().unwrap();
        let encoded = server.encoded();
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('\n'));

        let der = STANDARD_NO_PAD.decode(&encoded).unwrap();
        assert_eq!(der, server.cert.as_ref());
    }

    #[test]
    fn test_each_run_gets_a_new_certificate() {
        let first = ServerCertificate::generate().unwrap();
        let second = ServerCertificate::generate().unwrap();
        assert_ne!(first.encoded(), second.encoded());
    }

    #[test]
    fn test_parse_client_cert() {
        let generated =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let parsed = parse_client_cert(&generated.cert.pem()).unwrap();
        assert_eq!(parsed.as_ref(), generated.cert.der().as_ref());

        let err = parse_client_cert("not a certificate").unwrap_err();
        assert!(matches!(err, TlsError::ClientCertificate(_)));
    }

    #[test]
    fn test_pinned_verifier_accepts_only_the_offered_cert() {
        let offered = client_cert();
        let verifier = PinnedClientVerifier::new(
            offered.clone(),
            Arc::new(rustls::crypto::ring::default_provider()),
        );

        assert!(verifier.verify_client_cert(&offered, &[], UnixTime::now()).is_ok());
        assert!(
            verifier
                .verify_client_cert(&client_cert(), &[], UnixTime::now())
                .is_err()
        );
        assert!(verifier.client_auth_mandatory());
        assert!(!verifier.supported_verify_schemes().is_empty());
    }

    #[test]
    fn test_server_config_negotiates_h2() {
        let server = ServerCertificate::generate().unwrap();
        let config = server.server_config(client_cert()).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec()]);
    }
}
