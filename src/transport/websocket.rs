//! WebSocket client transport over `tokio-tungstenite`.
//!
//! Only text frames are surfaced. Binary frames are dropped with a debug
//! log; ping/pong replies are handled by the library on read.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};
use url::Url;

use crate::error::{Error, Result};

use super::{Connector, Transport};

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream.
type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// WsConnector
// ============================================================================

/// Opens WebSocket client connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Creates a new connector.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>> {
        let (stream, response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(connect_error)?;

        info!(%url, status = %response.status(), "WebSocket connection established");

        Ok(Box::new(WsTransport::new(stream)))
    }
}

/// Maps a handshake-phase library error onto the crate taxonomy.
fn connect_error(err: WsError) -> Error {
    match err {
        WsError::Http(response) => {
            Error::handshake(format!("server responded with HTTP {}", response.status()))
        }
        WsError::Protocol(e) => Error::handshake(e.to_string()),
        WsError::Url(e) => Error::config(e.to_string()),
        other => Error::connect(other.to_string()),
    }
}

// ============================================================================
// WsTransport
// ============================================================================

/// An open WebSocket client connection.
pub struct WsTransport {
    stream: ClientStream,
    last_seen: Instant,
}

impl WsTransport {
    /// Wraps an established stream.
    pub(crate) fn new(stream: ClientStream) -> Self {
        Self {
            stream,
            last_seen: Instant::now(),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::send(e.to_string()))
    }

    async fn receive(&mut self) -> Result<Option<String>> {
        loop {
            let next = self.stream.next().await;
            if matches!(next, Some(Ok(_))) {
                self.last_seen = Instant::now();
            }

            match next {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_str().to_owned()));
                }

                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return Ok(None);
                }

                Some(Ok(Message::Binary(data))) => {
                    debug!(len = data.len(), "Ignoring binary frame");
                }

                // Ping, Pong, raw frames
                Some(Ok(_)) => {
                    trace!("Control frame");
                }

                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }

                Some(Err(e)) => return Err(Error::receive(e.to_string())),
            }
        }
    }

    async fn heartbeat(&mut self) -> Result<()> {
        self.stream
            .send(Message::Ping(Default::default()))
            .await
            .map_err(|e| Error::send(format!("ping failed: {e}")))
    }

    fn last_seen(&self) -> Option<Instant> {
        Some(self.last_seen)
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    /// Binds a loopback listener and returns it with its `ws://` URL.
    async fn listener() -> (TcpListener, Url) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/chat")).expect("valid url");
        (listener, url)
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let (listener, url) = listener().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() && ws.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let mut transport = WsConnector::new().connect(&url).await.expect("connect");
        transport.send("hello".into()).await.expect("send");
        transport.heartbeat().await.expect("ping");

        let echoed = transport.receive().await.expect("receive");
        assert_eq!(echoed.as_deref(), Some("hello"));

        transport.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_binary_frames_skipped() {
        let (listener, url) = listener().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.expect("binary");
            ws.send(Message::Text("after".into())).await.expect("text");
            ws.close(None).await.expect("close");
        });

        let mut transport = WsConnector::new().connect(&url).await.expect("connect");
        assert_eq!(transport.receive().await.expect("text").as_deref(), Some("after"));
        assert_eq!(transport.receive().await.expect("close"), None);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let (listener, url) = listener().await;
        drop(listener);

        let err = WsConnector::new().connect(&url).await.err().expect("refused");
        assert!(matches!(err, Error::Connect { .. }), "got {err:?}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_non_websocket_server_is_handshake_error() {
        let (listener, url) = listener().await;

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 1024];
            let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await;
        });

        let err = WsConnector::new().connect(&url).await.err().expect("rejected");
        assert!(matches!(err, Error::Handshake { .. }), "got {err:?}");
    }
}
