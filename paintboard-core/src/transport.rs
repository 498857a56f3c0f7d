//! Transport seam.
//!
//! A [`Connector`] opens one message-oriented session: a sink taking
//! whole outbound transmissions and a stream yielding whole inbound
//! transmissions. The end of the stream means the session closed.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::error::PaintError;

/// Outbound half of a session.
pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = PaintError> + Send>>;
/// Inbound half of a session.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, PaintError>> + Send>>;

/// One established transport session.
pub struct Session {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Session {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens transport sessions on demand.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Session, PaintError>;
}

// ── WsConnector ──────────────────────────────────────────────────

/// WebSocket transport carrying protocol frames in binary messages.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Session, PaintError> {
        let (ws, _response) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        info!(url = %self.url, "websocket connected");
        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(PaintError::from)
            .with(|frame: Bytes| future::ready(Ok::<_, PaintError>(Message::Binary(frame))));

        let stream = read.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Binary(data)) => Some(Ok(data)),
                Ok(Message::Close(frame)) => Some(Err(PaintError::Transport(format!(
                    "closed by server: {frame:?}"
                )))),
                Ok(other) => {
                    debug!("ignoring non-binary message ({} bytes)", other.len());
                    None
                }
                Err(e) => Some(Err(e.into())),
            })
        });

        Ok(Session::new(Box::pin(sink), Box::pin(stream)))
    }
}
