//! Signaling server listener
//!
//! Handles the TCP accept loop and spawns one session task per WebSocket.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::catalog::SourceCatalog;
use crate::engine::MediaBackend;
use crate::error::Result;
use crate::server::config::{ServerConfig, SessionConfig};
use crate::server::connection::{self, Connection};
use crate::signaling::SignalingController;
use crate::stats::{ServerCounters, ServerStats};

/// WebSocket signaling server
pub struct SignalingServer<B: MediaBackend> {
    config: ServerConfig,
    backend: Arc<B>,
    catalog: Arc<SourceCatalog>,
    session_config: Arc<SessionConfig>,
    counters: Arc<ServerCounters>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<B: MediaBackend> SignalingServer<B> {
    /// Create a new server with the given configuration, backend and catalog
    pub fn new(config: ServerConfig, backend: B, catalog: SourceCatalog) -> Self {
        Self::with_shared(config, Arc::new(backend), Arc::new(catalog))
    }

    /// Create a new server around an already shared backend and catalog
    pub fn with_shared(config: ServerConfig, backend: Arc<B>, catalog: Arc<SourceCatalog>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            session_config: Arc::new(config.session.clone()),
            config,
            backend,
            catalog,
            counters: Arc::new(ServerCounters::new()),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get the source catalog
    pub fn catalog(&self) -> &Arc<SourceCatalog> {
        &self.catalog
    }

    /// Snapshot of connection counters
    pub fn stats(&self) -> ServerStats {
        self.counters.snapshot()
    }

    /// Run the server
    ///
    /// Runs forever unless binding the listener fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown every running session is told to stop, and this returns
    /// only once all of them have released their streams.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let sessions = TaskTracker::new();
        let cancel = CancellationToken::new();

        tracing::info!(
            addr = %listener.local_addr()?,
            path = %self.config.path,
            streams = self.catalog.len(),
            "Signaling server listening"
        );

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener, &sessions, &cancel) => result,
        };

        tracing::info!(sessions = sessions.len(), "Draining signaling sessions");
        cancel.cancel();
        sessions.close();
        sessions.wait().await;

        result
    }

    async fn accept_loop(
        &self,
        listener: &TcpListener,
        sessions: &TaskTracker,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr, sessions, cancel);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(
        &self,
        socket: TcpStream,
        peer_addr: SocketAddr,
        sessions: &TaskTracker,
        cancel: &CancellationToken,
    ) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.counters.connection_rejected();
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let path = self.config.path.clone();
        let timeout = self.config.connection_timeout;
        let backend = Arc::clone(&self.backend);
        let catalog = Arc::clone(&self.catalog);
        let session_config = Arc::clone(&self.session_config);
        let counters = Arc::clone(&self.counters);
        let shutdown = cancel.child_token();

        sessions.spawn(async move {
            // Held for the whole session
            let _permit = permit;

            let handshake = tokio::select! {
                result = connection::accept(socket, &path, timeout) => result,
                _ = shutdown.cancelled() => return,
            };
            let ws = match handshake {
                Ok(ws) => ws,
                Err(e) => {
                    counters.connection_rejected();
                    tracing::debug!(session_id = session_id, error = %e, "Handshake failed");
                    return;
                }
            };

            counters.connection_opened();

            let (controller, events) =
                SignalingController::new(session_id, backend, catalog, session_config);
            let mut connection = Connection::new(peer_addr, ws, controller, events, shutdown);

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            counters.connection_closed();
            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use super::*;
    use crate::engine::mock::{MockBackend, OFFER};
    use crate::signaling::ServerMessage;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    struct TestServer {
        addr: SocketAddr,
        backend: Arc<MockBackend>,
        server: Arc<SignalingServer<MockBackend>>,
        shutdown: Option<oneshot::Sender<()>>,
        handle: tokio::task::JoinHandle<Result<()>>,
    }

    impl TestServer {
        async fn start(config: ServerConfig) -> Self {
            init_tracing();

            let backend = Arc::new(MockBackend::new());
            let catalog = Arc::new(SourceCatalog::repeated("rtsp://localhost:8554/live.sdp", 8));
            let server = Arc::new(SignalingServer::with_shared(config, backend.clone(), catalog));

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (tx, rx) = oneshot::channel::<()>();

            let srv = server.clone();
            let handle = tokio::spawn(async move {
                srv.serve(listener, async {
                    let _ = rx.await;
                })
                .await
            });

            Self {
                addr,
                backend,
                server,
                shutdown: Some(tx),
                handle,
            }
        }

        async fn connect(&self) -> Client {
            let (ws, _) = connect_async(format!("ws://{}/ws/stream/", self.addr))
                .await
                .unwrap();
            ws
        }

        async fn stop(mut self) {
            if let Some(tx) = self.shutdown.take() {
                let _ = tx.send(());
            }
            tokio_test::assert_ok!(self.handle.await.unwrap());
        }
    }

    async fn recv(ws: &mut Client) -> ServerMessage {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for message")
                .expect("stream ended")
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn send(ws: &mut Client, msg: serde_json::Value) {
        ws.send(Message::text(msg.to_string())).await.unwrap();
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_end_to_end_session() {
        let ts = TestServer::start(ServerConfig::default()).await;
        let mut ws = ts.connect().await;

        assert_eq!(recv(&mut ws).await, ServerMessage::StreamCount { count: 8 });

        send(&mut ws, json!({"type": "offer", "streamId": 2, "sdp": OFFER})).await;
        match recv(&mut ws).await {
            ServerMessage::Answer { stream_id, sdp } => {
                assert_eq!(stream_id, 2);
                assert!(sdp.contains("a=sendonly"));
                assert!(sdp.contains("b=AS:800"));
                assert!(sdp.contains("b=TIAS:800000"));
            }
            other => panic!("expected answer, got {other:?}"),
        }

        // Candidate for a stream never offered: no reply, session keeps going
        send(
            &mut ws,
            json!({"type": "ice", "streamId": 5, "candidate": {"sdpMid": "0", "sdpMLineIndex": 0, "candidate": "candidate:1 1 udp 1 10.0.0.1 9 typ host"}}),
        )
        .await;
        send(&mut ws, json!({"type": "offer", "streamId": 4, "sdp": OFFER})).await;
        assert!(matches!(
            recv(&mut ws).await,
            ServerMessage::Answer { stream_id: 4, .. }
        ));
        assert_eq!(ts.backend.live_peers(), 2);

        ws.close(None).await.unwrap();

        let backend = ts.backend.clone();
        wait_for(move || backend.live_peers() == 0 && backend.live_media() == 0).await;

        let server = ts.server.clone();
        wait_for(move || server.stats().active_connections == 0).await;
        assert_eq!(ts.server.stats().total_connections, 1);

        ts.stop().await;
    }

    #[tokio::test]
    async fn test_abrupt_disconnect_releases_streams() {
        let ts = TestServer::start(ServerConfig::default()).await;
        let mut ws = ts.connect().await;
        recv(&mut ws).await;

        for id in [0, 1, 4] {
            send(&mut ws, json!({"type": "offer", "streamId": id, "sdp": OFFER})).await;
            recv(&mut ws).await;
        }
        assert_eq!(ts.backend.live_peers(), 3);

        drop(ws);

        let backend = ts.backend.clone();
        wait_for(move || backend.live_peers() == 0 && backend.live_media() == 0).await;

        ts.stop().await;
    }

    #[tokio::test]
    async fn test_bad_messages_keep_session_open() {
        let ts = TestServer::start(ServerConfig::default()).await;
        let mut ws = ts.connect().await;
        recv(&mut ws).await;

        ws.send(Message::text("{not json")).await.unwrap();
        send(&mut ws, json!({"type": "offer", "streamId": 99, "sdp": OFFER})).await;
        send(&mut ws, json!({"type": "bye"})).await;
        ws.send(Message::binary(vec![1, 2, 3])).await.unwrap();

        send(&mut ws, json!({"type": "offer", "streamId": 0, "sdp": OFFER})).await;
        assert!(matches!(
            recv(&mut ws).await,
            ServerMessage::Answer { stream_id: 0, .. }
        ));

        ts.stop().await;
    }

    #[tokio::test]
    async fn test_wrong_path_rejected() {
        let ts = TestServer::start(ServerConfig::default()).await;

        let result = connect_async(format!("ws://{}/other/", ts.addr)).await;

        assert!(result.is_err());
        let server = ts.server.clone();
        wait_for(move || server.stats().rejected_connections == 1).await;
        assert_eq!(ts.server.stats().total_connections, 0);

        ts.stop().await;
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let ts = TestServer::start(ServerConfig::default()).await;
        let mut first = ts.connect().await;
        let mut second = ts.connect().await;
        recv(&mut first).await;
        recv(&mut second).await;

        send(&mut first, json!({"type": "offer", "streamId": 1, "sdp": OFFER})).await;
        recv(&mut first).await;
        send(&mut second, json!({"type": "offer", "streamId": 1, "sdp": OFFER})).await;
        recv(&mut second).await;

        // Same stream id in two sessions means two independent bridges
        assert_eq!(ts.backend.live_peers(), 2);

        first.close(None).await.unwrap();
        let backend = ts.backend.clone();
        wait_for(move || backend.live_peers() == 1).await;

        send(&mut second, json!({"type": "offer", "streamId": 1, "sdp": OFFER})).await;
        assert!(matches!(
            recv(&mut second).await,
            ServerMessage::Answer { stream_id: 1, .. }
        ));

        ts.stop().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_sessions() {
        let ts = TestServer::start(ServerConfig::default()).await;
        let mut ws = ts.connect().await;
        recv(&mut ws).await;

        for id in [2, 5] {
            send(&mut ws, json!({"type": "offer", "streamId": id, "sdp": OFFER})).await;
            recv(&mut ws).await;
        }
        assert_eq!(ts.backend.live_peers(), 2);

        let backend = ts.backend.clone();
        let server = ts.server.clone();
        ts.stop().await;

        // serve() returned only after the session released its streams
        assert_eq!(backend.live_peers(), 0);
        assert_eq!(backend.live_media(), 0);
        assert_eq!(server.stats().active_connections, 0);

        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for close");
        assert!(matches!(frame, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
    }
}
