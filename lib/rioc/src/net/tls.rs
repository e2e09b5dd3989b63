use crate::config::TlsConfig;
use crate::net::support::{ClientError, ClientResult};
use crate::net::transport::{sockopt, Transport};
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{
    Certificate, ClientConfig as TlsClientConfig, ClientConnection, PrivateKey, RootCertStore,
    ServerName, StreamOwned,
};
use std::fs::File;
use std::io::{self, BufReader, IoSlice, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Upper bound on a single logical write into the TLS session. Keeps every
/// plaintext fragment under the protocol record ceiling.
const TLS_WRITE_CHUNK: usize = 16_000;

/// TLS 1.3 transport. Exposes the same vectored-send contract as the plain
/// transport by funneling each buffer through record-sized writes; the full
/// concatenation is flushed before `sendv_all` returns.
pub struct TlsTransport {
    stream: StreamOwned<ClientConnection, TcpStream>,
}

impl TlsTransport {
    /// Wraps an established TCP stream in a TLS session. The handshake
    /// completes lazily with the first transfer.
    pub fn establish(stream: TcpStream, host: &str, config: &TlsConfig) -> ClientResult<TlsTransport> {
        let tls_config = build_config(config)?;

        let name = config.server_name.as_deref().unwrap_or(host);
        let server_name = ServerName::try_from(name).map_err(|_| ClientError::Param)?;

        let connection = ClientConnection::new(Arc::new(tls_config), server_name)
            .map_err(|_| ClientError::Protocol)?;

        Ok(TlsTransport {
            stream: StreamOwned::new(connection, stream),
        })
    }
}

impl Transport for TlsTransport {
    fn send_all(&mut self, data: &[u8]) -> io::Result<()> {
        write_chunked(&mut self.stream, data)?;
        self.stream.flush()
    }

    fn sendv_all(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        sendv_chunked(&mut self.stream, bufs)
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.stream.read_exact(buf)
    }

    fn set_coalesce(&mut self, enabled: bool) {
        sockopt::set_cork(&self.stream.sock, enabled);
    }

    fn close(&mut self) {
        self.stream.conn.send_close_notify();
        let _ = self.stream.flush();
        let _ = self.stream.sock.shutdown(Shutdown::Both);
    }
}

/// Writes the buffer sequence in record-sized chunks, preserving the exact
/// byte order of the concatenation, and flushes once at the end.
fn sendv_chunked<W: Write>(writer: &mut W, bufs: &[IoSlice<'_>]) -> io::Result<()> {
    for buf in bufs {
        write_chunked(writer, buf)?;
    }
    writer.flush()
}

fn write_chunked<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    for chunk in data.chunks(TLS_WRITE_CHUNK) {
        writer.write_all(chunk)?;
    }
    Ok(())
}

/// Builds the TLS 1.3 client configuration: trust anchors from `ca_path`
/// (peer verification disabled entirely when `verify_peer` is off) and an
/// optional client certificate for mutual authentication.
fn build_config(config: &TlsConfig) -> ClientResult<TlsClientConfig> {
    let builder = TlsClientConfig::builder()
        .with_safe_default_cipher_suites()
        .with_safe_default_kx_groups()
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|_| ClientError::Protocol)?;

    if config.verify_peer {
        let mut roots = RootCertStore::empty();
        if let Some(path) = &config.ca_path {
            for cert in load_certs(path)? {
                roots.add(&cert).map_err(|_| ClientError::Param)?;
            }
        }
        let builder = builder.with_root_certificates(roots);

        match (&config.cert_path, &config.key_path) {
            (Some(cert_path), Some(key_path)) => builder
                .with_client_auth_cert(load_certs(cert_path)?, load_key(key_path)?)
                .map_err(|_| ClientError::Param),
            (None, None) => Ok(builder.with_no_client_auth()),
            // A client certificate without its key (or vice versa) cannot work.
            _ => Err(ClientError::Param),
        }
    } else {
        let builder = builder.with_custom_certificate_verifier(Arc::new(AcceptAnyCert));

        match (&config.cert_path, &config.key_path) {
            (Some(cert_path), Some(key_path)) => builder
                .with_client_auth_cert(load_certs(cert_path)?, load_key(key_path)?)
                .map_err(|_| ClientError::Param),
            (None, None) => Ok(builder.with_no_client_auth()),
            // A client certificate without its key (or vice versa) cannot work.
            _ => Err(ClientError::Param),
        }
    }
}

fn load_certs(path: &Path) -> ClientResult<Vec<Certificate>> {
    let file = File::open(path).map_err(|_| ClientError::Param)?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader).map_err(|_| ClientError::Param)?;
    if certs.is_empty() {
        return Err(ClientError::Param);
    }

    Ok(certs.into_iter().map(Certificate).collect())
}

fn load_key(path: &Path) -> ClientResult<PrivateKey> {
    let file = File::open(path).map_err(|_| ClientError::Param)?;
    let mut reader = BufReader::new(file);

    for item in rustls_pemfile::read_all(&mut reader).map_err(|_| ClientError::Param)? {
        match item {
            rustls_pemfile::Item::PKCS8Key(der)
            | rustls_pemfile::Item::RSAKey(der)
            | rustls_pemfile::Item::ECKey(der) => return Ok(PrivateKey(der)),
            _ => continue,
        }
    }

    Err(ClientError::Param)
}

/// Verifier installed when `verify_peer` is off: accepts any chain.
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_sendv_chunked_matches_concatenation() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x1ab);

        // Total of 50 000 bytes split across uneven buffers, several of
        // which exceed the record ceiling on their own.
        let lengths = [17_000usize, 3, 0, 25_000, 7_997];
        let parts: Vec<Vec<u8>> = lengths
            .iter()
            .map(|&len| (0..len).map(|_| rng.gen()).collect())
            .collect();
        assert_eq!(parts.iter().map(Vec::len).sum::<usize>(), 50_000);

        let bufs: Vec<IoSlice<'_>> = parts.iter().map(|part| IoSlice::new(part)).collect();

        let mut sink = Vec::new();
        sendv_chunked(&mut sink, &bufs).unwrap();

        let mut expected = Vec::new();
        for part in &parts {
            expected.extend_from_slice(part);
        }
        assert_eq!(sink, expected);
    }

    #[test]
    fn test_write_chunked_respects_record_ceiling() {
        /// Writer that rejects any single write above the record limit.
        struct RecordSizedWriter {
            data: Vec<u8>,
        }

        impl Write for RecordSizedWriter {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                assert!(buf.len() <= TLS_WRITE_CHUNK, "write exceeds record ceiling");
                self.data.extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let payload = vec![0x5au8; 40_000];
        let mut writer = RecordSizedWriter { data: Vec::new() };

        write_chunked(&mut writer, &payload).unwrap();

        assert_eq!(writer.data, payload);
    }

    #[test]
    fn test_build_config_without_verification() {
        let config = TlsConfig {
            verify_peer: false,
            ..TlsConfig::default()
        };

        assert!(build_config(&config).is_ok());
    }

    #[test]
    fn test_build_config_rejects_missing_key() {
        let config = TlsConfig {
            cert_path: Some("client.pem".into()),
            ..TlsConfig::default()
        };

        assert_eq!(build_config(&config).err(), Some(ClientError::Param));
    }

    #[test]
    fn test_load_certs_rejects_missing_file() {
        let result = load_certs(Path::new("/nonexistent/ca.pem"));

        assert_eq!(result.unwrap_err(), ClientError::Param);
    }
}
