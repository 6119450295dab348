use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use syncgate_core::*;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::*;

/// Configuration for connecting to a broker bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host address (e.g. "127.0.0.1").
    pub host: String,
    /// Port the bridge is listening on.
    pub port: u16,
    /// Connect and handshake deadline in milliseconds.
    pub connect_timeout_ms: u64,
    pub max_frame_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7496,
            connect_timeout_ms: 5_000,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl BridgeConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Transport over a TCP bridge.
///
/// Owns a small runtime with one reader task and one writer task. `send`
/// only queues the encoded frame, so callers never block on the socket.
pub struct BridgeTransport {
    max_frame_bytes: usize,
    server_version: i32,
    open: Arc<AtomicBool>,
    outbox: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    sink: Arc<dyn InboundSink>,
    runtime: Mutex<Option<Runtime>>,
}

impl BridgeTransport {
    /// Connect, complete the handshake and start delivering pushes to `sink`.
    pub fn connect(config: &BridgeConfig, client_id: ClientId, sink: Arc<dyn InboundSink>) -> Result<Arc<Self>, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("bridge-io")
            .enable_all()
            .build()
            .map_err(|e| TransportError::ConnectionFailed(format!("Runtime start failed: {}", e)))?;

        let addr = config.address();
        info!(%addr, client_id, "Connecting to broker bridge");
        let (reader, writer, server_version) = runtime.block_on(async {
            tokio::time::timeout(config.connect_timeout(), handshake(&addr, client_id, config.max_frame_bytes))
                .await
                .map_err(|_| TransportError::ConnectionFailed(format!("Handshake with {} timed out", addr)))?
        })?;
        info!(server_version, "Connected to broker bridge");

        let open = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(write_loop(writer, rx, open.clone()));
        sink.on_connection(ConnectionEvent::Connected { server_version });
        let reader = runtime.spawn(read_loop(reader, sink.clone(), open.clone(), config.max_frame_bytes));

        Ok(Arc::new(Self {
            max_frame_bytes: config.max_frame_bytes,
            server_version,
            open,
            outbox: Mutex::new(Some(tx)),
            reader: Mutex::new(Some(reader)),
            sink,
            runtime: Mutex::new(Some(runtime)),
        }))
    }

    pub fn server_version(&self) -> i32 {
        self.server_version
    }
}

async fn handshake(addr: &str, client_id: ClientId, max_frame_bytes: usize) -> Result<(OwnedReadHalf, OwnedWriteHalf, i32), TransportError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("TCP connect failed: {}", e)))?;
    let _ = stream.set_nodelay(true);

    let hello = encode_frame(&ClientFrame::Hello { client_id }, max_frame_bytes)?;
    stream
        .write_all(&hello)
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("Write error: {}", e)))?;

    let body = read_frame(&mut stream, max_frame_bytes)
        .await?
        .ok_or_else(|| TransportError::ConnectionFailed("Bridge closed during handshake".to_string()))?;
    let server_version = match decode_frame::<ServerFrame>(&body)? {
        ServerFrame::Hello { server_version } => server_version,
        ServerFrame::Rejected { reason } => return Err(TransportError::ConnectionFailed(reason)),
        ServerFrame::Push { .. } => {
            return Err(TransportError::ConnectionFailed("Unexpected initial frame".to_string()));
        }
    };

    let (reader, writer) = stream.into_split();
    Ok((reader, writer, server_version))
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>, open: Arc<AtomicBool>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!(error = %e, "Bridge write failed");
            open.store(false, Ordering::Release);
            break;
        }
    }
    let _ = writer.shutdown().await;
    debug!("Bridge writer stopped");
}

async fn read_loop(mut reader: OwnedReadHalf, sink: Arc<dyn InboundSink>, open: Arc<AtomicBool>, max_frame_bytes: usize) {
    let reason = loop {
        match read_frame(&mut reader, max_frame_bytes).await {
            Ok(Some(body)) => match decode_frame::<ServerFrame>(&body) {
                Ok(ServerFrame::Push { message }) => sink.on_message(message),
                Ok(other) => debug!(frame = ?other, "Ignoring control frame after handshake"),
                Err(e) => warn!(error = %e, bytes = body.len(), "Skipping malformed frame"),
            },
            Ok(None) => break "connection closed by bridge".to_string(),
            Err(e) => break e.to_string(),
        }
    };
    if open.swap(false, Ordering::AcqRel) {
        warn!(%reason, "Broker bridge disconnected");
        sink.on_connection(ConnectionEvent::Disconnected { reason });
    }
}

impl Transport for BridgeTransport {
    fn send(&self, request: &OutboundRequest) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let frame = encode_frame(
            &ClientFrame::Request { request: request.clone() },
            self.max_frame_bytes,
        )?;
        debug!(op = request.name(), bytes = frame.len(), "Bridge request");
        match self.outbox.lock().as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.outbox.lock().take();
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        if self.open.swap(false, Ordering::AcqRel) {
            info!("Disconnected from broker bridge");
            self.sink.on_connection(ConnectionEvent::Disconnected {
                reason: "closed by client".to_string(),
            });
        }
    }
}

impl Drop for BridgeTransport {
    fn drop(&mut self) {
        self.close();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
    }
}
