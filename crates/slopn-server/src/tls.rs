//! Ephemeral TLS identity for the QUIC listener.
//!
//! This is not the out-of-scope "TLS certificate generation" collaborator —
//! that name refers to a persistent, operator-facing certificate workflow.
//! Here we mint a throwaway self-signed keypair every time the daemon boots;
//! it is never written to disk and the client is not expected to validate
//! it (the client dials whatever SNI it was told to mimic and skips
//! verification).

use std::sync::Arc;

use quinn::crypto::rustls::QuicServerConfig;

use crate::error::Error;

/// Build a `quinn::ServerConfig` around a freshly generated self-signed
/// certificate. `alpn` should match the decoy origin's advertised protocol
/// (the reference choice is `h3`) so a TLS fingerprinter sees the same ALPN
/// list whether it reaches the real decoy or us.
pub fn build_quic_server_config(alpn: &[String]) -> Result<quinn::ServerConfig, Error> {
	let self_signed = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).map_err(Error::TlsIdentity)?;
	let cert_der = self_signed.cert.der().clone();
	let key_der = rustls::pki_types::PrivateKeyDer::try_from(self_signed.key_pair.serialize_der())
		.map_err(|_| Error::QuicConfig("generated private key was not a valid DER key".into()))?;

	let mut crypto = rustls::ServerConfig::builder()
		.with_no_client_auth()
		.with_single_cert(vec![cert_der], key_der)
		.map_err(|err| Error::QuicConfig(err.to_string()))?;
	crypto.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();

	let quic_crypto = QuicServerConfig::try_from(crypto).map_err(|err| Error::QuicConfig(err.to_string()))?;
	let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_crypto));

	let mut transport = quinn::TransportConfig::default();
	transport.max_idle_timeout(Some(quinn::VarInt::from_u32(60_000).into()));
	transport.keep_alive_interval(Some(std::time::Duration::from_secs(15)));
	// Tunneled IP packets ride QUIC DATAGRAM frames; a bare ACK-eliciting
	// reliable stream is only ever used for the one-shot login exchange, so
	// a tight concurrent-stream limit is enough.
	transport.max_concurrent_uni_streams(0u32.into());
	transport.max_concurrent_bidi_streams(1u32.into());
	server_config.transport_config(Arc::new(transport));

	Ok(server_config)
}
