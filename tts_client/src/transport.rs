// Transport abstraction over the duplex connection

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::config::{SessionConfig, API_KEY_HEADER};
use crate::error::ClientError;

/// Outgoing half of a connection. Carries opaque binary frame
/// payloads; encoding happens in the session.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), ClientError>;
}

/// Incoming half of a connection. Yields binary payloads only;
/// text/control frames from the transport are not protocol frames and
/// are dropped here, before the codec. `None` means the peer closed.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_binary(&mut self) -> Result<Option<Vec<u8>>, ClientError>;
}

/// Opens one connection per session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &SessionConfig,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), ClientError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production connector: WebSocket with the endpoint URL built from
/// the session config and the API key attached as a header.
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        config: &SessionConfig,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), ClientError> {
        let url = config.endpoint_url()?;
        debug!(%url, "opening TTS stream");

        let mut request = url.as_str().into_client_request()?;
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| ClientError::Transport(format!("invalid API key header: {e}")))?;
        request.headers_mut().insert(API_KEY_HEADER, key);

        let (stream, _response) = connect_async(request).await?;
        let (write, read) = stream.split();
        Ok((Box::new(WsSink { inner: write }), Box::new(WsSource { inner: read })))
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), ClientError> {
        self.inner.send(Message::Binary(payload)).await?;
        Ok(())
    }
}

struct WsSource {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_binary(&mut self) -> Result<Option<Vec<u8>>, ClientError> {
        while let Some(message) = self.inner.next().await {
            match message? {
                Message::Binary(data) => return Ok(Some(data)),
                Message::Close(_) => return Ok(None),
                // Text, ping and pong frames are not protocol frames.
                _ => continue,
            }
        }
        Ok(None)
    }
}
