//! Transport to the chat gateway.
//!
//! [`establish_connection`] opens TCP (and TLS unless disabled). The stream is
//! then split: the read half becomes a [`LineReader`] owned by the read loop,
//! the write half a shared [`Writer`] used by the loop, callbacks, and any
//! other task holding a [`Bot`](crate::bot::Bot).

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::config::BotConfig;
use crate::error::{Error, Result};
use crate::irc::format_line;

const READ_CHUNK: usize = 4096;
/// Longest line kept while waiting for its terminator. Twitch allows 8 KiB
/// of tags plus a 512-byte IRC body.
pub const MAX_LINE: usize = 16 * 1024;

/// Boxed write half of the gateway stream.
pub type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// A connection that has completed TCP (and optionally TLS) but has not
/// logged in yet.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

/// Open the transport described by `config`.
pub async fn establish_connection(config: &BotConfig) -> Result<EstablishedConnection> {
    let mode = if config.tls { "TLS" } else { "plain" };

    tracing::debug!("Resolving {}...", config.server_addr);
    let tcp = TcpStream::connect(&config.server_addr)
        .await
        .map_err(|source| Error::Connect {
            addr: config.server_addr.clone(),
            source,
        })?;
    tracing::debug!("TCP connected to {} ({mode})", config.server_addr);

    if !config.tls {
        return Ok(EstablishedConnection::Plain(tcp));
    }

    let connector = TlsConnector::from(Arc::new(tls_config()?));
    let host = config.host().to_string();
    let dns_name = rustls::pki_types::ServerName::try_from(host.clone())
        .map_err(|_| Error::InvalidServerName(host))?;
    let tls_stream = connector
        .connect(dns_name, tcp)
        .await
        .map_err(|source| Error::Tls {
            addr: config.server_addr.clone(),
            source,
        })?;
    tracing::debug!("TLS handshake complete");
    Ok(EstablishedConnection::Tls(Box::new(tls_stream)))
}

/// Split any duplex stream into the loop's reader and the shared writer.
pub fn split_stream<S>(stream: S, recv_timeout: Duration) -> (LineReader, Writer)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (LineReader::new(Box::new(reader), recv_timeout), Box::new(writer))
}

/// Write `"{command} {args}\r\n"` and flush.
pub async fn write_command(writer: &mut Writer, command: &str, args: &str) -> Result<()> {
    let line = format_line(command, args);
    if command.eq_ignore_ascii_case("PASS") {
        tracing::debug!(">> PASS ***");
    } else {
        tracing::debug!(">> {}", line.trim_end());
    }
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Send the login sequence: optional `CAP REQ`, then `PASS` and `NICK`.
pub async fn login(writer: &mut Writer, config: &BotConfig) -> Result<()> {
    if !config.capabilities.is_empty() {
        let caps = config.capabilities.join(" ");
        write_command(writer, "CAP REQ", &format!(":{caps}")).await?;
    }
    write_command(writer, "PASS", &config.pass_token()).await?;
    write_command(writer, "NICK", &config.username).await?;
    Ok(())
}

/// Outcome of one receive attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Recv {
    /// Complete lines, terminators stripped. May contain empty lines.
    Lines(Vec<String>),
    /// Nothing arrived within the receive timeout.
    Timeout,
}

/// Read half of the gateway stream with line framing.
///
/// Bytes are buffered across reads so a line split over two TCP segments is
/// reassembled; `\r\n` and bare `\n` both end a line.
pub struct LineReader {
    inner: Box<dyn AsyncRead + Send + Unpin>,
    buf: Vec<u8>,
    recv_timeout: Duration,
    /// Dropping the rest of an oversized line up to its `\n`.
    discarding: bool,
}

impl LineReader {
    pub fn new(inner: Box<dyn AsyncRead + Send + Unpin>, recv_timeout: Duration) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
            recv_timeout,
            discarding: false,
        }
    }

    /// Bytes held for a line whose terminator has not arrived yet.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// One blocking receive bounded by the receive timeout.
    ///
    /// A timeout is routine, not an error. EOF is reported as
    /// [`Error::ConnectionLost`].
    pub async fn recv_cycle(&mut self) -> Result<Recv> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = match tokio::time::timeout(self.recv_timeout, self.inner.read(&mut chunk)).await {
            Err(_) => return Ok(Recv::Timeout),
            Ok(res) => res?,
        };
        if n == 0 {
            return Err(Error::ConnectionLost("EOF".to_string()));
        }
        let mut data = &chunk[..n];
        if self.discarding {
            match data.iter().position(|b| *b == b'\n') {
                Some(end) => {
                    self.discarding = false;
                    data = &data[end + 1..];
                }
                None => return Ok(Recv::Lines(Vec::new())),
            }
        }
        self.buf.extend_from_slice(data);
        let lines = self.take_lines();
        if self.buf.len() > MAX_LINE {
            tracing::warn!(
                bytes = self.buf.len(),
                "Dropping line longer than {MAX_LINE} bytes"
            );
            self.buf.clear();
            self.discarding = true;
        }
        Ok(Recv::Lines(lines))
    }

    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(end) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

#[cfg(not(any(feature = "aws-lc-rs", feature = "ring")))]
compile_error!("enable the `aws-lc-rs` or `ring` feature of tmibot-sdk");

fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    #[cfg(feature = "ring")]
    let provider = rustls::crypto::ring::default_provider();
    #[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
    let provider = rustls::crypto::aws_lc_rs::default_provider();
    Arc::new(provider)
}

/// Client TLS config trusting the bundled webpki roots.
fn tls_config() -> Result<rustls::ClientConfig> {
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(Error::TlsConfig)?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reassembles_split_lines() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (mut reader, _writer) = split_stream(client, Duration::from_millis(200));

        server.write_all(b"PING :tmi.twi").await.unwrap();
        assert_eq!(reader.recv_cycle().await.unwrap(), Recv::Lines(vec![]));

        server.write_all(b"tch.tv\r\n\r\nPART #a\n").await.unwrap();
        assert_eq!(
            reader.recv_cycle().await.unwrap(),
            Recv::Lines(vec![
                "PING :tmi.twitch.tv".to_string(),
                String::new(),
                "PART #a".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn oversized_line_is_dropped_and_buffer_stays_bounded() {
        let (client, mut server) = tokio::io::duplex(512 * 1024);
        let (mut reader, _writer) = split_stream(client, Duration::from_millis(20));

        let junk = vec![b'x'; 64 * 1024];
        for _ in 0..4 {
            server.write_all(&junk).await.unwrap();
        }
        loop {
            match reader.recv_cycle().await.unwrap() {
                Recv::Timeout => break,
                Recv::Lines(lines) => assert!(lines.is_empty()),
            }
            assert!(reader.buffered() <= MAX_LINE);
        }

        // The tail of the long line is skipped, the next line is intact.
        server.write_all(b"xxxx\r\nPING :ok\r\n").await.unwrap();
        let mut lines = Vec::new();
        while let Recv::Lines(batch) = reader.recv_cycle().await.unwrap() {
            lines.extend(batch);
        }
        assert_eq!(lines, vec!["PING :ok".to_string()]);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn tls_config_builds_with_bundled_roots() {
        assert!(tls_config().is_ok());
    }

    #[tokio::test]
    async fn idle_read_times_out() {
        let (client, _server) = tokio::io::duplex(1024);
        let (mut reader, _writer) = split_stream(client, Duration::from_millis(20));
        assert_eq!(reader.recv_cycle().await.unwrap(), Recv::Timeout);
    }

    #[tokio::test]
    async fn eof_is_connection_lost() {
        let (client, server) = tokio::io::duplex(1024);
        let (mut reader, _writer) = split_stream(client, Duration::from_millis(200));
        drop(server);
        assert!(matches!(
            reader.recv_cycle().await,
            Err(Error::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn login_sequence() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (_reader, mut writer) = split_stream(client, Duration::from_millis(200));
        let config = BotConfig::new("tok", "bot").capabilities(["twitch.tv/commands"]);
        login(&mut writer, &config).await.unwrap();
        drop(writer);
        drop(_reader);

        let mut out = String::new();
        server.read_to_string(&mut out).await.unwrap();
        assert_eq!(
            out,
            "CAP REQ :twitch.tv/commands\r\nPASS oauth:tok\r\nNICK bot\r\n"
        );
    }
}
