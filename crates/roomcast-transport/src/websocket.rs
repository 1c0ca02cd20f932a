//! WebSocket transport implementation.
//!
//! Adapts an upgraded axum [`WebSocket`] to the frame traits. Text and
//! binary frames from the client are forwarded as opaque bytes. Outbound
//! payloads that are valid UTF-8 go out as text frames, anything else as
//! binary.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, trace};

use crate::traits::{FrameSink, FrameSource, TransportError};

/// Split an upgraded socket into its outbound and inbound halves.
#[must_use]
pub fn split(socket: WebSocket) -> (WebSocketSink, WebSocketSource) {
    let (sink, stream) = socket.split();
    (WebSocketSink { inner: sink }, WebSocketSource { inner: stream })
}

/// Outbound half of a WebSocket connection.
pub struct WebSocketSink {
    inner: SplitSink<WebSocket, Message>,
}

/// Inbound half of a WebSocket connection.
pub struct WebSocketSource {
    inner: SplitStream<WebSocket>,
}

/// Encode a payload as a WebSocket message.
fn to_message(payload: Bytes) -> Message {
    match String::from_utf8(payload.to_vec()) {
        Ok(text) => Message::Text(text),
        Err(err) => Message::Binary(err.into_bytes()),
    }
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(Bytes::from(text))),
                Some(Ok(Message::Binary(data))) => return Ok(Some(Bytes::from(data))),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pongs are answered by the socket itself
                    trace!("Control frame");
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.inner
            .send(to_message(frame))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // The client may already be gone; a failed close frame is not an error.
        if let Err(e) = self.inner.send(Message::Close(None)).await {
            trace!(error = %e, "Close frame not sent");
        }
        self.inner
            .close()
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }
}
