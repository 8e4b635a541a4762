//! In-memory duplex transport.
//!
//! A transport is a listener/connector pair. The listener side plugs into
//! tonic's `serve_with_incoming`; the connector side hands out lazy client
//! channels whose connections are tokio duplex pipes. Once the server stops
//! polling the listener, new connection attempts fail with
//! `ConnectionRefused`.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::transport::server::Connected;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

/// Buffer size of each duplex pipe half.
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Factory for in-process listener/connector pairs.
#[derive(Debug)]
pub struct InProcessTransport;

impl InProcessTransport {
    pub fn new() -> (InProcessListener, InProcessConnector) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            InProcessListener {
                incoming: UnboundedReceiverStream::new(rx),
            },
            InProcessConnector { tx },
        )
    }
}

/// Server half: a stream of accepted in-memory connections.
#[derive(Debug)]
pub struct InProcessListener {
    incoming: UnboundedReceiverStream<Result<InProcessIo, io::Error>>,
}

impl InProcessListener {
    /// Consume the listener into the incoming stream tonic serves from.
    pub fn into_incoming(self) -> UnboundedReceiverStream<Result<InProcessIo, io::Error>> {
        self.incoming
    }
}

/// Client half: produces in-memory connections and lazy channels.
///
/// Cloning is cheap; every clone feeds the same listener.
#[derive(Debug, Clone)]
pub struct InProcessConnector {
    tx: mpsc::UnboundedSender<Result<InProcessIo, io::Error>>,
}

impl InProcessConnector {
    /// Open one duplex connection to the server.
    pub fn connect(&self) -> io::Result<DuplexStream> {
        let (client, server) = tokio::io::duplex(STREAM_BUFFER_SIZE);
        self.tx.send(Ok(InProcessIo(server))).map_err(|_| {
            io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "in-process server is not accepting connections",
            )
        })?;
        debug!("opened in-process connection");
        Ok(client)
    }

    /// Lazy tonic channel over this connector.
    ///
    /// The channel connects on first use, so requests made after the server
    /// stopped fail with a transport error instead of hanging.
    pub fn channel(&self) -> Channel {
        let connector = self.clone();
        Endpoint::from_static("http://in-process")
            .connect_with_connector_lazy(service_fn(move |_: Uri| {
                let connector = connector.clone();
                async move { connector.connect().map(TokioIo::new) }
            }))
    }
}

/// Accepted server-side connection with in-process connect info.
#[derive(Debug)]
pub struct InProcessIo(DuplexStream);

/// Connect info advertised for in-process connections. There is no peer
/// address to report.
#[derive(Debug, Clone)]
pub struct InProcessConnectInfo;

impl Connected for InProcessIo {
    type ConnectInfo = InProcessConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        InProcessConnectInfo
    }
}

impl AsyncRead for InProcessIo {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for InProcessIo {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_stream::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_duplex_roundtrip() {
        let (listener, connector) = InProcessTransport::new();
        let mut incoming = listener.into_incoming();

        let mut client = connector.connect().unwrap();
        let mut server = incoming.next().await.unwrap().unwrap();

        client.write_all(b"ping").await.unwrap();
        client.shutdown().await.unwrap();

        let mut buf = Vec::new();
        server.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"ping");
    }

    #[tokio::test]
    async fn test_connect_after_listener_dropped_is_refused() {
        let (listener, connector) = InProcessTransport::new();
        drop(listener);

        let error = connector.connect().unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn test_clones_feed_same_listener() {
        let (listener, connector) = InProcessTransport::new();
        let mut incoming = listener.into_incoming();

        let clone = connector.clone();
        let _a = connector.connect().unwrap();
        let _b = clone.connect().unwrap();

        assert!(incoming.next().await.is_some());
        assert!(incoming.next().await.is_some());
    }
}
