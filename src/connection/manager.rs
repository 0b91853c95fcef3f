use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at, sleep};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tokio_tungstenite::tungstenite::Message;

use super::FrameSink;
use super::backoff::Backoff;
use crate::metrics::{METRICS, RuntimeMetrics};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the outbound command queue between handles and the socket.
const COMMAND_QUEUE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts exhausted
    Failed,
    /// Closed on request
    Closed,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("max reconnect attempts reached ({attempts})")]
    Exhausted { attempts: u32 },

    #[error("connection closed on request")]
    Closed,
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Closed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub url: String,
    pub base_delay: Duration,
    pub max_attempts: u32,
    pub ping_interval: Duration,
    pub log_frames: bool,
}

#[derive(Debug)]
enum Command {
    Send(String),
    Close,
}

enum PumpEnd {
    CloseRequested,
    Lost(String),
}

/// Cloneable front door to the connection.
///
/// Used by the dispatcher to send subscribe requests and by `main` to
/// request shutdown. Only `shutdown` ever waits.
#[derive(Clone)]
pub struct ConnectionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Serializes and hands `message` to the socket.
    ///
    /// Behavior:
    /// - Connected: queued for the writer, returns `true`
    /// - Anything else: logged and dropped, returns `false`
    ///
    /// Nothing is kept for later delivery.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        if !self.is_connected() {
            RuntimeMetrics::bump(&METRICS.sends_dropped);
            warn!("WebSocket not connected, dropping outbound message");
            return false;
        }

        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                error!("Error serializing WebSocket message: {}", e);
                return false;
            }
        };

        match self.commands.try_send(Command::Send(text)) {
            Ok(()) => true,
            Err(e) => {
                RuntimeMetrics::bump(&METRICS.sends_dropped);
                warn!("Outbound queue unavailable, dropping message: {}", e);
                false
            }
        }
    }

    /// Requests the connection to close. Cancels a pending reconnect.
    ///
    /// Dropped with a warning when the command queue is full; use
    /// [`shutdown`](Self::shutdown) where the request must get through.
    pub fn close(&self) {
        if self.commands.try_send(Command::Close).is_err() {
            warn!("Could not deliver close request to connection");
        }
    }

    /// Like `close`, but waits for room in the command queue instead of
    /// giving up. Outbound messages already queued are written first.
    pub async fn shutdown(&self) {
        if self.commands.send(Command::Close).await.is_err() {
            warn!("Connection already gone, nothing to shut down");
        }
    }
}

/// Owns the websocket to the venue.
///
/// State machine:
/// Disconnected → Connecting → Connected → Disconnected (loss)
/// → Connecting (after backoff) → … → Failed (attempts exhausted)
///
/// GUARANTEES:
/// - At most one transport at a time
/// - One backoff timer per loss, however the loss was reported
/// - Inbound frames are handed to the sink strictly in arrival order
pub struct ConnectionManager {
    url: String,
    backoff: Backoff,
    ping_interval: Duration,
    log_frames: bool,
    socket: Option<WsStream>,
    state: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    commands_tx: mpsc::Sender<Command>,
    commands: mpsc::Receiver<Command>,
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings) -> (Self, ConnectionHandle) {
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE);

        let manager = Self {
            url: settings.url,
            backoff: Backoff::new(settings.base_delay, settings.max_attempts),
            ping_interval: settings.ping_interval,
            log_frames: settings.log_frames,
            socket: None,
            state,
            state_rx,
            commands_tx,
            commands,
        };
        let handle = manager.handle();
        (manager, handle)
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            commands: self.commands_tx.clone(),
            state: self.state_rx.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Opens the transport once. Resets the attempt counter on success.
    ///
    /// Commands still queued from an earlier session (a close nobody
    /// acted on, sends that never reached a socket) are discarded first,
    /// so they cannot tear down or leak into the new session.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.discard_stale_commands();
        self.open().await
    }

    fn discard_stale_commands(&mut self) {
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                Command::Send(_) => {
                    RuntimeMetrics::bump(&METRICS.sends_dropped);
                    warn!("Discarding message queued before reconnect");
                }
                Command::Close => debug!("Discarding close request from previous session"),
            }
        }
    }

    async fn open(&mut self) -> Result<(), ConnectionError> {
        self.socket = None;
        self.set_state(ConnectionState::Connecting);
        info!("Connecting to WebSocket: {}", self.url);

        match connect_async(self.url.as_str()).await {
            Ok((ws, _)) => {
                self.socket = Some(ws);
                self.backoff.reset();
                self.set_state(ConnectionState::Connected);
                RuntimeMetrics::bump(&METRICS.connects);
                info!("WebSocket connected");
                Ok(())
            }
            Err(source) => {
                self.set_state(ConnectionState::Disconnected);
                Err(ConnectionError::Connect {
                    url: self.url.clone(),
                    source,
                })
            }
        }
    }

    /// Connects, retrying with backoff until success, exhaustion, or a
    /// close request.
    ///
    /// Unlike `connect`, queued commands are kept: a close requested
    /// before or during the retries still stops the session.
    pub async fn establish(&mut self) -> Result<(), ConnectionError> {
        loop {
            match self.open().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    error!("{}", e);
                    self.wait_before_retry().await?;
                }
            }
        }
    }

    /// Drives the connection until it is closed on request or retries
    /// are exhausted. Reconnects on any loss.
    ///
    /// If the transport is not open yet, it is established first.
    pub async fn run<S: FrameSink>(&mut self, sink: &mut S) -> SessionEnd {
        loop {
            if self.socket.is_none() {
                match self.establish().await {
                    Ok(()) => sink.on_reconnected(),
                    Err(ConnectionError::Closed) => return SessionEnd::Closed,
                    Err(_) => return SessionEnd::Failed,
                }
            }

            match self.pump(sink).await {
                PumpEnd::CloseRequested => {
                    self.socket = None;
                    self.set_state(ConnectionState::Closed);
                    info!("WebSocket closed on request");
                    return SessionEnd::Closed;
                }
                PumpEnd::Lost(reason) => {
                    self.socket = None;
                    self.set_state(ConnectionState::Disconnected);
                    warn!("WebSocket closed: {}", reason);

                    match self.wait_before_retry().await {
                        Ok(()) => {}
                        Err(ConnectionError::Closed) => return SessionEnd::Closed,
                        Err(_) => return SessionEnd::Failed,
                    }
                }
            }
        }
    }

    /// Sleeps out the next backoff delay.
    ///
    /// Errors with `Exhausted` when no attempt is left (state → Failed)
    /// and with `Closed` when a close request arrives while waiting.
    async fn wait_before_retry(&mut self) -> Result<(), ConnectionError> {
        let Some(delay) = self.backoff.next_delay() else {
            self.set_state(ConnectionState::Failed);
            error!("Max reconnect attempts reached ({})", self.backoff.max_attempts());
            return Err(ConnectionError::Exhausted {
                attempts: self.backoff.max_attempts(),
            });
        };

        RuntimeMetrics::bump(&METRICS.reconnects);
        info!(
            "Reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            self.backoff.attempt(),
            self.backoff.max_attempts()
        );

        let timer = sleep(delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => return Ok(()),

                cmd = self.commands.recv() => match cmd {
                    Some(Command::Send(_)) => {
                        RuntimeMetrics::bump(&METRICS.sends_dropped);
                        warn!("WebSocket not connected, dropping outbound message");
                    }
                    Some(Command::Close) | None => {
                        self.set_state(ConnectionState::Closed);
                        info!("Close requested, pending reconnect cancelled");
                        return Err(ConnectionError::Closed);
                    }
                },
            }
        }
    }

    /// Reads frames and writes queued commands until the socket is lost
    /// or a close is requested.
    async fn pump<S: FrameSink>(&mut self, sink: &mut S) -> PumpEnd {
        let log_frames = self.log_frames;
        let ping_every = self.ping_interval;

        let Some(ws) = self.socket.as_mut() else {
            return PumpEnd::Lost("no transport".to_string());
        };

        let mut ping = interval_at(Instant::now() + ping_every, ping_every);

        loop {
            tokio::select! {
                // Inbound frames
                msg = ws.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        RuntimeMetrics::bump(&METRICS.frames_received);
                        if log_frames {
                            trace!("[WS RECV] {}", text.as_str());
                        }
                        if let Some(frame) = decode_frame(text.as_str()) {
                            sink.on_frame(frame);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return PumpEnd::Lost(format!("closed by peer: {:?}", frame));
                    }
                    // Ping/pong/binary frames carry no data for us
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return PumpEnd::Lost(e.to_string()),
                    None => return PumpEnd::Lost("stream ended".to_string()),
                },

                // Outbound messages from handles
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Send(text)) => {
                        if log_frames {
                            trace!("[WS SEND] {}", text);
                        }
                        if let Err(e) = ws.send(Message::Text(text.into())).await {
                            error!("Error sending WebSocket message: {}", e);
                            return PumpEnd::Lost(e.to_string());
                        }
                    }
                    Some(Command::Close) | None => {
                        if let Err(e) = ws.close(None).await {
                            debug!("WebSocket close handshake failed: {}", e);
                        }
                        return PumpEnd::CloseRequested;
                    }
                },

                // Heartbeat
                _ = ping.tick() => {
                    let ping_msg = json!({"method": "ping"}).to_string();
                    if let Err(e) = ws.send(Message::Text(ping_msg.into())).await {
                        return PumpEnd::Lost(format!("ping failed: {}", e));
                    }
                }
            }
        }
    }
}

/// Parses one inbound text frame. Bad JSON is logged and dropped.
pub fn decode_frame(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Some(value),
        Err(e) => {
            RuntimeMetrics::bump(&METRICS.decode_errors);
            error!("Error parsing WebSocket message: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    struct Collect {
        frames: Vec<Value>,
        reconnects: u32,
        stop_after: usize,
        handle: ConnectionHandle,
    }

    impl Collect {
        fn new(handle: ConnectionHandle, stop_after: usize) -> Self {
            Self {
                frames: Vec::new(),
                reconnects: 0,
                stop_after,
                handle,
            }
        }
    }

    impl FrameSink for Collect {
        fn on_frame(&mut self, frame: Value) {
            self.frames.push(frame);
            if self.frames.len() >= self.stop_after {
                self.handle.close();
            }
        }

        fn on_reconnected(&mut self) {
            self.reconnects += 1;
        }
    }

    fn settings(url: String, base_ms: u64, max_attempts: u32) -> ConnectionSettings {
        ConnectionSettings {
            url,
            base_delay: Duration::from_millis(base_ms),
            max_attempts,
            ping_interval: Duration::from_secs(50),
            log_frames: false,
        }
    }

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn dead_url() -> String {
        let (listener, url) = listener().await;
        drop(listener);
        url
    }

    #[tokio::test]
    async fn sends_while_connected_and_delivers_frames_in_order() {
        let (listener, url) = listener().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let request = match ws.next().await {
                Some(Ok(Message::Text(text))) => text.as_str().to_string(),
                other => panic!("expected text frame, got {:?}", other),
            };
            let echoed: Value = serde_json::from_str(&request).unwrap();

            ws.send(Message::Text("not json".into())).await.unwrap();
            for frame in [
                json!({"channel": "echo", "data": echoed}),
                json!({"channel": "second", "data": 2}),
            ] {
                ws.send(Message::Text(frame.to_string().into())).await.unwrap();
            }
            let _ = ws.next().await;
        });

        let (mut manager, handle) = ConnectionManager::new(settings(url, 10, 3));
        assert!(!handle.send(&json!({"early": true})));

        manager.connect().await.unwrap();
        assert!(handle.is_connected());

        let request = json!({"method": "subscribe", "subscription": {"type": "allMids"}});
        assert!(handle.send(&request));

        let mut sink = Collect::new(handle.clone(), 2);
        let end = timeout(Duration::from_secs(5), manager.run(&mut sink))
            .await
            .unwrap();

        assert_eq!(end, SessionEnd::Closed);
        assert_eq!(sink.frames.len(), 2);
        assert_eq!(sink.frames[0]["data"], request);
        assert_eq!(sink.frames[1]["channel"], "second");
        assert_eq!(sink.reconnects, 0);
        assert_eq!(handle.state(), ConnectionState::Closed);
        assert!(!handle.send(&request));
    }

    #[tokio::test]
    async fn reconnects_after_loss_and_notifies_sink() {
        let (listener, url) = listener().await;

        tokio::spawn(async move {
            for n in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                let frame = json!({"channel": "session", "data": n});
                ws.send(Message::Text(frame.to_string().into())).await.unwrap();
                if n == 0 {
                    drop(ws);
                } else {
                    let _ = ws.next().await;
                }
            }
        });

        let (mut manager, handle) = ConnectionManager::new(settings(url, 10, 5));
        manager.connect().await.unwrap();

        let mut sink = Collect::new(handle.clone(), 2);
        let end = timeout(Duration::from_secs(5), manager.run(&mut sink))
            .await
            .unwrap();

        assert_eq!(end, SessionEnd::Closed);
        assert_eq!(sink.reconnects, 1);
        let sessions: Vec<&Value> = sink.frames.iter().map(|f| &f["data"]).collect();
        assert_eq!(sessions, vec![&json!(0), &json!(1)]);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (mut manager, handle) = ConnectionManager::new(settings(dead_url().await, 1, 3));
        let mut sink = Collect::new(handle.clone(), usize::MAX);

        let end = timeout(Duration::from_secs(5), manager.run(&mut sink))
            .await
            .unwrap();

        assert_eq!(end, SessionEnd::Failed);
        assert_eq!(handle.state(), ConnectionState::Failed);
        assert!(sink.frames.is_empty());
    }

    #[tokio::test]
    async fn close_cancels_pending_reconnect() {
        let (mut manager, handle) = ConnectionManager::new(settings(dead_url().await, 60_000, 10));
        let mut sink = Collect::new(handle.clone(), usize::MAX);

        let closer = handle.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            closer.close();
        });

        let end = timeout(Duration::from_secs(5), manager.run(&mut sink))
            .await
            .unwrap();

        assert_eq!(end, SessionEnd::Closed);
        assert_eq!(handle.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn reconnecting_after_close_starts_a_clean_session() {
        let (listener, url) = listener().await;
        let (received_tx, received_rx) = tokio::sync::oneshot::channel::<Value>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let first = accept_async(stream).await.unwrap();

            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            drop(first);
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = received_tx.send(serde_json::from_str(text.as_str()).unwrap());
            }
            let _ = ws.next().await;
        });

        let (mut manager, handle) = ConnectionManager::new(settings(url, 10, 3));
        manager.connect().await.unwrap();
        handle.close();

        manager.connect().await.unwrap();
        assert!(handle.send(&json!({"after": "reconnect"})));

        let closer = handle.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            closer.close();
        });

        let mut sink = Collect::new(handle.clone(), usize::MAX);
        let end = timeout(Duration::from_secs(5), manager.run(&mut sink))
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Closed);

        let received = timeout(Duration::from_secs(2), received_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, json!({"after": "reconnect"}));
    }

    #[tokio::test]
    async fn heartbeat_pings_while_idle() {
        let (listener, url) = listener().await;
        let (received_tx, received_rx) = tokio::sync::oneshot::channel::<Value>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = received_tx.send(serde_json::from_str(text.as_str()).unwrap());
            }
            let done = json!({"channel": "done", "data": null});
            ws.send(Message::Text(done.to_string().into())).await.unwrap();
            let _ = ws.next().await;
        });

        let mut config = settings(url, 10, 3);
        config.ping_interval = Duration::from_millis(50);
        let (mut manager, handle) = ConnectionManager::new(config);
        manager.connect().await.unwrap();

        let mut sink = Collect::new(handle.clone(), 1);
        let end = timeout(Duration::from_secs(5), manager.run(&mut sink))
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Closed);

        let first = timeout(Duration::from_secs(2), received_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, json!({"method": "ping"}));
    }

    #[tokio::test]
    async fn shutdown_waits_for_room_in_a_full_queue() {
        let (listener, url) = listener().await;
        let (count_tx, count_rx) = tokio::sync::oneshot::channel::<usize>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut count = 0;
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(_) => count += 1,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            let _ = count_tx.send(count);
        });

        let (mut manager, handle) = ConnectionManager::new(settings(url, 10, 3));
        manager.connect().await.unwrap();

        for n in 0..COMMAND_QUEUE {
            assert!(handle.send(&json!({"n": n})));
        }
        handle.close();

        let stopper = handle.clone();
        let shutdown = tokio::spawn(async move { stopper.shutdown().await });
        sleep(Duration::from_millis(50)).await;
        assert!(!shutdown.is_finished());

        let mut sink = Collect::new(handle.clone(), usize::MAX);
        let end = timeout(Duration::from_secs(5), manager.run(&mut sink))
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Closed);
        timeout(Duration::from_secs(2), shutdown).await.unwrap().unwrap();

        let written = timeout(Duration::from_secs(2), count_rx).await.unwrap().unwrap();
        assert_eq!(written, COMMAND_QUEUE);
    }

    #[test]
    fn bad_json_is_dropped() {
        assert!(decode_frame("{oops").is_none());
        assert_eq!(decode_frame(r#"{"channel":"x"}"#).unwrap()["channel"], "x");
    }
}
