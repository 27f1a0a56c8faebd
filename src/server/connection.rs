//! Per-client signaling connection
//!
//! One task per WebSocket. The task owns the session's
//! [`SignalingController`] and is the only writer to its registry: inbound
//! frames and connection-state events are both handled here, one at a time.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::engine::MediaBackend;
use crate::error::{Error, Result};
use crate::registry::StateEvent;
use crate::signaling::{ServerMessage, SignalingController};

/// Complete the WebSocket upgrade for `path` within `timeout`
///
/// Requests for any other path are answered with 404.
pub async fn accept<S>(stream: S, path: &str, timeout: Duration) -> Result<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let expected = path.to_string();
    let callback = move |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
        if req.uri().path() == expected {
            return Ok(resp);
        }
        let mut err = ErrorResponse::new(Some(format!(
            "no signaling endpoint at {}",
            req.uri().path()
        )));
        *err.status_mut() = StatusCode::NOT_FOUND;
        Err(err)
    };

    match tokio::time::timeout(timeout, tokio_tungstenite::accept_hdr_async(stream, callback)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::HandshakeTimeout(timeout)),
    }
}

/// A signaling session bound to one WebSocket
pub struct Connection<S, B: MediaBackend> {
    session_id: u64,
    peer_addr: SocketAddr,
    ws: WebSocketStream<S>,
    controller: SignalingController<B>,
    events: mpsc::UnboundedReceiver<StateEvent>,
    shutdown: CancellationToken,
}

impl<S, B> Connection<S, B>
where
    S: AsyncRead + AsyncWrite + Unpin,
    B: MediaBackend,
{
    pub fn new(
        peer_addr: SocketAddr,
        ws: WebSocketStream<S>,
        controller: SignalingController<B>,
        events: mpsc::UnboundedReceiver<StateEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session_id: controller.session_id(),
            peer_addr,
            ws,
            controller,
            events,
            shutdown,
        }
    }

    /// Run the session until the client goes away or `shutdown` is cancelled
    ///
    /// Every stream the session opened is released before this returns,
    /// whether the session ended cleanly or on a transport error.
    pub async fn run(&mut self) -> Result<()> {
        tracing::debug!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            "Session started"
        );

        let greeting = self.controller.on_connect();
        let result = match self.send(&greeting).await {
            Ok(()) => self.event_loop().await,
            Err(e) => Err(e),
        };

        self.controller.on_disconnect().await;

        if result.is_ok() {
            if let Err(e) = self.ws.close(None).await {
                tracing::debug!(session_id = self.session_id, error = %e, "Close handshake failed");
            }
        }

        result
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                frame = self.ws.next() => {
                    let Some(frame) = frame else {
                        return Ok(());
                    };

                    match frame? {
                        Message::Text(text) => {
                            if let Some(reply) = self.controller.handle_text(&text).await {
                                self.send(&reply).await?;
                            }
                        }
                        Message::Binary(data) => {
                            tracing::debug!(
                                session_id = self.session_id,
                                len = data.len(),
                                "Ignoring binary frame"
                            );
                        }
                        Message::Close(frame) => {
                            tracing::debug!(session_id = self.session_id, ?frame, "Client closed");
                            return Ok(());
                        }
                        // Ping/pong are answered by tungstenite
                        _ => {}
                    }
                }
                Some(event) = self.events.recv() => {
                    self.controller.handle_state_event(event).await;
                }
                _ = self.shutdown.cancelled() => {
                    tracing::debug!(session_id = self.session_id, "Closing session for shutdown");
                    return Ok(());
                }
            }
        }
    }

    async fn send(&mut self, msg: &ServerMessage) -> Result<()> {
        let json = msg.to_json()?;
        self.ws.send(Message::text(json)).await?;
        Ok(())
    }
}
