use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use syncgate_core::*;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Configuration for the simulated broker.
#[derive(Debug, Clone)]
pub struct SimulatedBrokerConfig {
    /// Server version reported on connect.
    pub server_version: i32,
    /// Delay applied before each delivered push.
    pub latency: Duration,
}

impl Default for SimulatedBrokerConfig {
    fn default() -> Self {
        Self {
            server_version: 76,
            latency: Duration::ZERO,
        }
    }
}

/// Maps each outbound request to the pushes the broker answers with.
pub type Responder = dyn Fn(&OutboundRequest) -> Vec<InboundMessage> + Send + Sync;

enum Envelope {
    Message(InboundMessage),
    Connection(ConnectionEvent),
    Barrier(oneshot::Sender<()>),
}

/// An in-process broker.
///
/// Requests are answered by a responder closure; replies are delivered to the
/// inbound sink from a single background thread, like a real socket reader.
pub struct SimulatedBroker {
    config: SimulatedBrokerConfig,
    responder: Box<Responder>,
    outbox: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    sent: Mutex<Vec<OutboundRequest>>,
    open: AtomicBool,
}

impl SimulatedBroker {
    pub fn new(
        config: SimulatedBrokerConfig,
        sink: Arc<dyn InboundSink>,
        responder: impl Fn(&OutboundRequest) -> Vec<InboundMessage> + Send + Sync + 'static,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let latency = config.latency;
        let worker = thread::Builder::new()
            .name("simulated-broker".to_string())
            .spawn(move || deliver(rx, sink, latency))
            .ok();
        if worker.is_none() {
            warn!("Failed to spawn simulated broker delivery thread");
        }
        Arc::new(Self {
            config,
            responder: Box::new(responder),
            outbox: Mutex::new(Some(tx)),
            worker: Mutex::new(worker),
            sent: Mutex::new(Vec::new()),
            open: AtomicBool::new(false),
        })
    }

    /// A broker that never answers anything.
    pub fn silent(config: SimulatedBrokerConfig, sink: Arc<dyn InboundSink>) -> Arc<Self> {
        Self::new(config, sink, |_| Vec::new())
    }

    fn enqueue(&self, envelope: Envelope) -> bool {
        match self.outbox.lock().as_ref() {
            Some(tx) => tx.send(envelope).is_ok(),
            None => false,
        }
    }

    /// Open the session and announce it to the sink.
    pub fn connect(&self) {
        self.open.store(true, Ordering::Release);
        info!(server_version = self.config.server_version, "Simulated broker connected");
        self.enqueue(Envelope::Connection(ConnectionEvent::Connected {
            server_version: self.config.server_version,
        }));
    }

    /// Drop the session as if the socket closed.
    pub fn disconnect(&self, reason: &str) {
        self.open.store(false, Ordering::Release);
        self.enqueue(Envelope::Connection(ConnectionEvent::Disconnected {
            reason: reason.to_string(),
        }));
    }

    /// Deliver an unsolicited push.
    pub fn push(&self, message: InboundMessage) {
        self.enqueue(Envelope::Message(message));
    }

    /// Block until everything queued so far has been delivered.
    pub fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.enqueue(Envelope::Barrier(tx)) {
            let _ = rx.blocking_recv();
        }
    }

    /// Every request sent so far, in order.
    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self, name: &str) -> usize {
        self.sent.lock().iter().filter(|r| r.name() == name).count()
    }
}

impl Transport for SimulatedBroker {
    fn send(&self, request: &OutboundRequest) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        debug!(op = request.name(), "Simulated request");
        self.sent.lock().push(request.clone());
        for message in (self.responder)(request) {
            if !self.enqueue(Envelope::Message(message)) {
                return Err(TransportError::Closed);
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.enqueue(Envelope::Connection(ConnectionEvent::Disconnected {
                reason: "closed by client".to_string(),
            }));
        }
    }
}

impl Drop for SimulatedBroker {
    fn drop(&mut self) {
        self.outbox.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

fn deliver(mut rx: mpsc::UnboundedReceiver<Envelope>, sink: Arc<dyn InboundSink>, latency: Duration) {
    while let Some(envelope) = rx.blocking_recv() {
        match envelope {
            Envelope::Message(message) => {
                if !latency.is_zero() {
                    thread::sleep(latency);
                }
                sink.on_message(message);
            }
            Envelope::Connection(event) => sink.on_connection(event),
            Envelope::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}
