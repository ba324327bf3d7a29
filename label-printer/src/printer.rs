//! Printer link for sending ZPL data
//!
//! One persistent TCP connection to a raw-port printer (usually 9100).
//! The printer never acknowledges anything: a successful send only means
//! the transport accepted the bytes.

use crate::config::PrinterConfig;
use crate::error::{LinkError, LinkResult};
use std::task::Poll;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

/// Sentinel written by [`PrinterLink::probe`]; printers skip NUL between commands
const PROBE_BYTE: u8 = 0x00;

/// Connection state visible to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Trait for printer links
#[allow(async_fn_in_trait)]
pub trait Printer {
    /// Drop any existing connection and open a new one
    async fn connect(&mut self) -> LinkResult<()>;

    /// Best-effort close, always ends `Disconnected`
    async fn disconnect(&mut self);

    /// Write all bytes; a failure drops the connection
    async fn send(&mut self, data: &[u8]) -> LinkResult<()>;

    /// Cheap liveness check; a failure drops the connection
    async fn probe(&mut self) -> bool;

    fn state(&self) -> LinkState;
}

/// Network label printer link (TCP)
#[derive(Debug)]
pub struct PrinterLink {
    config: PrinterConfig,
    stream: Option<TcpStream>,
}

impl PrinterLink {
    /// Create a disconnected link for a validated config
    pub fn new(config: PrinterConfig) -> LinkResult<Self> {
        config
            .validate()
            .map_err(|e| LinkError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            config,
            stream: None,
        })
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    /// Replace the endpoint and timings, closing any live connection
    pub async fn reconfigure(&mut self, config: PrinterConfig) -> LinkResult<()> {
        config
            .validate()
            .map_err(|e| LinkError::InvalidConfig(e.to_string()))?;
        self.disconnect().await;
        info!(old = %self.config.addr(), new = %config.addr(), "Printer reconfigured");
        self.config = config;
        Ok(())
    }

    /// Open and immediately close a connection to `config`'s endpoint
    #[instrument(skip(config), fields(addr = %config.addr()))]
    pub async fn test_connection(config: &PrinterConfig) -> LinkResult<()> {
        let mut stream = open(&config.addr(), config.connect_timeout()).await?;
        let _ = stream.shutdown().await;
        info!("Printer reachable");
        Ok(())
    }

    fn drop_stream(&mut self) {
        self.stream = None;
    }
}

async fn open(addr: &str, timeout: Duration) -> LinkResult<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| LinkError::connect(format!("Connection timeout: {}", addr)))?
        .map_err(|e| LinkError::connect(format!("{}: {}", addr, e)))?;
    // Labels are small, push them out immediately
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

/// Whether the peer has already closed or reset the connection
///
/// Peeks instead of reading, so status bytes the printer may have sent stay
/// queued. Never waits: no readiness yet means the link looks alive.
async fn peer_closed(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 1];
    std::future::poll_fn(|cx| {
        let mut read_buf = ReadBuf::new(&mut buf);
        match stream.poll_peek(cx, &mut read_buf) {
            Poll::Ready(Ok(0)) | Poll::Ready(Err(_)) => Poll::Ready(true),
            Poll::Ready(Ok(_)) | Poll::Pending => Poll::Ready(false),
        }
    })
    .await
}

impl Printer for PrinterLink {
    #[instrument(skip(self), fields(addr = %self.config.addr()))]
    async fn connect(&mut self) -> LinkResult<()> {
        self.disconnect().await;

        let stream = open(&self.config.addr(), self.config.connect_timeout())
            .await
            .inspect_err(|e| warn!(error = %e, "Printer connect failed"))?;

        info!("Connected to printer");
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!(addr = %self.config.addr(), "Printer link closed");
        }
    }

    #[instrument(skip(self, data), fields(addr = %self.config.addr(), data_len = data.len()))]
    async fn send(&mut self, data: &[u8]) -> LinkResult<()> {
        let timeout = self.config.connect_timeout();
        let stream = self.stream.as_mut().ok_or(LinkError::NotConnected)?;

        let result = tokio::time::timeout(timeout, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await;

        let err = match result {
            Ok(Ok(())) => {
                debug!("Label data accepted by transport");
                return Ok(());
            }
            Ok(Err(e)) => LinkError::send(format!("Write failed: {}", e)),
            Err(_) => LinkError::send(format!("Write timeout after {:?}", timeout)),
        };

        warn!(error = %err, "Send failed, dropping link");
        self.drop_stream();
        Err(err)
    }

    async fn probe(&mut self) -> bool {
        let timeout = self.config.probe_timeout();
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };

        let peer_closed = peer_closed(stream).await;

        let alive = !peer_closed
            && matches!(
                tokio::time::timeout(timeout, stream.write_all(&[PROBE_BYTE])).await,
                Ok(Ok(()))
            );

        if !alive {
            warn!(addr = %self.config.addr(), "Printer probe failed, link marked disconnected");
            self.drop_stream();
        }
        alive
    }

    fn state(&self) -> LinkState {
        if self.stream.is_some() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, PrinterConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, PrinterConfig::new("127.0.0.1", port))
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = PrinterLink::new(PrinterConfig::new("", 9100));
        assert!(matches!(result, Err(LinkError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let mut link = PrinterLink::new(PrinterConfig::default()).unwrap();
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(link.send(b"^XA^XZ").await, Err(LinkError::NotConnected));
        assert!(!link.probe().await);
    }

    #[tokio::test]
    async fn test_connect_and_send() {
        let (listener, config) = listener().await;
        let mut link = PrinterLink::new(config).unwrap();

        link.connect().await.unwrap();
        assert_eq!(link.state(), LinkState::Connected);
        let (mut peer, _) = listener.accept().await.unwrap();

        link.send(b"^XA^XZ").await.unwrap();
        link.disconnect().await;
        assert_eq!(link.state(), LinkState::Disconnected);

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"^XA^XZ");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let (listener, config) = listener().await;
        drop(listener);

        let mut link = PrinterLink::new(config).unwrap();
        let err = link.connect().await.unwrap_err();
        assert!(matches!(err, LinkError::Connect { .. }));
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_probe_live_link() {
        let (listener, config) = listener().await;
        let mut link = PrinterLink::new(config).unwrap();
        link.connect().await.unwrap();
        let (_peer, _) = listener.accept().await.unwrap();

        assert!(link.probe().await);
        assert_eq!(link.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_probe_keeps_pending_printer_bytes() {
        let (listener, config) = listener().await;
        let mut link = PrinterLink::new(config).unwrap();
        link.connect().await.unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        peer.write_all(b"OK").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(link.probe().await);
        let mut buf = [0u8; 2];
        link.stream
            .as_mut()
            .unwrap()
            .read_exact(&mut buf)
            .await
            .unwrap();
        assert_eq!(&buf, b"OK");
    }

    #[tokio::test]
    async fn test_probe_detects_peer_close() {
        let (listener, config) = listener().await;
        let mut link = PrinterLink::new(config).unwrap();
        link.connect().await.unwrap();
        let (peer, _) = listener.accept().await.unwrap();

        drop(peer);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!link.probe().await);
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconfigure_disconnects() {
        let (listener, config) = listener().await;
        let mut link = PrinterLink::new(config).unwrap();
        link.connect().await.unwrap();
        let _peer = listener.accept().await.unwrap();

        link.reconfigure(PrinterConfig::new("10.0.0.9", 9100))
            .await
            .unwrap();
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(link.config().addr(), "10.0.0.9:9100");

        let bad = link.reconfigure(PrinterConfig::new("10.0.0.9", 0)).await;
        assert!(matches!(bad, Err(LinkError::InvalidConfig(_))));
        assert_eq!(link.config().addr(), "10.0.0.9:9100");
    }

    #[tokio::test]
    async fn test_connection_check() {
        let (listener, config) = listener().await;
        assert!(PrinterLink::test_connection(&config).await.is_ok());
        drop(listener);
        assert!(PrinterLink::test_connection(&config).await.is_err());
    }
}
