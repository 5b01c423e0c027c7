//! Request queue
//!
//! Serializes submissions from any number of callers into one FIFO stream
//! drained by a single worker task. Each caller holds the receiving half of
//! a oneshot channel and sees only its own result.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::agent::{Agent, Message};
use crate::error::Error;
use crate::response::StructuredResponse;
use crate::Result;

type Reply = Result<StructuredResponse>;

/// One queued submission.
struct Request {
    text: String,
    metadata: Map<String, Value>,
    reply: oneshot::Sender<Reply>,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Result handle returned to callers outside the runtime.
#[derive(Debug)]
pub struct SubmissionHandle {
    rx: oneshot::Receiver<Reply>,
}

impl SubmissionHandle {
    /// Block the current OS thread until the result lands.
    ///
    /// Must not be called from inside an async task; use [`recv`](Self::recv) there.
    pub fn wait(self) -> Reply {
        self.rx.blocking_recv().map_err(|_| Error::Cancelled)?
    }

    pub async fn recv(self) -> Reply {
        self.rx.await.map_err(|_| Error::Cancelled)?
    }
}

/// Single entry point in front of one agent.
pub struct RequestQueue {
    agent: Arc<dyn Agent>,
    tx: mpsc::UnboundedSender<Request>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Request>>>,
    worker: Mutex<Option<Worker>>,
    runtime: Handle,
}

impl RequestQueue {
    /// Create a queue bound to the current tokio runtime.
    pub fn new(agent: Arc<dyn Agent>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Queue(format!("no tokio runtime: {}", e)))?;
        Ok(Self::with_runtime(agent, runtime))
    }

    pub fn with_runtime(agent: Arc<dyn Agent>, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            agent,
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            worker: Mutex::new(None),
            runtime,
        }
    }

    /// Submit and wait for this request's result.
    pub async fn submit(&self, text: &str, metadata: Map<String, Value>) -> Reply {
        let rx = self.enqueue(text, metadata)?;
        rx.await.map_err(|_| Error::Cancelled)?
    }

    /// Submit from any thread, including ones with no runtime.
    ///
    /// `history` travels with the request metadata under `"history"`.
    pub fn submit_threadsafe(
        &self,
        text: &str,
        mut metadata: Map<String, Value>,
        history: &[Message],
    ) -> Result<SubmissionHandle> {
        if !history.is_empty() {
            metadata.insert("history".to_string(), serde_json::to_value(history)?);
        }
        let rx = self.enqueue(text, metadata)?;
        Ok(SubmissionHandle { rx })
    }

    /// Start the worker if it is not running.
    pub fn start(&self) {
        let mut worker = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = self.runtime.spawn(run_worker(
            Arc::clone(&self.agent),
            Arc::clone(&self.rx),
            shutdown_rx,
        ));
        *worker = Some(Worker { shutdown, handle });
        info!("Request queue worker started for {}", self.agent.name());
    }

    /// Stop the worker after its in-flight request, if any, completes.
    ///
    /// Requests still queued stay queued and run once the worker restarts.
    pub async fn stop(&self) {
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(worker) = worker else {
            return;
        };
        let _ = worker.shutdown.send(true);
        if let Err(e) = worker.handle.await {
            warn!("Request queue worker ended abnormally: {}", e);
        }
        info!("Request queue worker stopped");
    }

    pub fn is_running(&self) -> bool {
        match self.worker.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|w| !w.handle.is_finished()),
            Err(_) => false,
        }
    }

    fn enqueue(&self, text: &str, metadata: Map<String, Value>) -> Result<oneshot::Receiver<Reply>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidRequest("text is required".to_string()));
        }
        self.start();

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request {
                text: text.to_string(),
                metadata,
                reply,
            })
            .map_err(|_| Error::Queue("queue is closed".to_string()))?;
        Ok(rx)
    }
}

/// Printable text for a result: the response, else thinking, else
/// observation, else the whole result as JSON.
pub fn extract_response(result: &StructuredResponse) -> String {
    result.best_text()
}

async fn run_worker(
    agent: Arc<dyn Agent>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Request>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut rx = rx.lock().await;
    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = rx.recv() => match next {
                Some(request) => request,
                None => break,
            },
        };
        process(agent.as_ref(), request).await;
    }
    debug!("Request queue worker exiting");
}

async fn process(agent: &dyn Agent, request: Request) {
    debug!(
        "Processing request ({} chars, {} metadata keys)",
        request.text.len(),
        request.metadata.len()
    );
    let outcome = AssertUnwindSafe(agent.invoke(&request.text))
        .catch_unwind()
        .await;
    let reply = match outcome {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => {
            error!("Agent {} failed: {}", agent.name(), e);
            Err(e)
        }
        Err(_) => {
            error!("Agent {} panicked", agent.name());
            Err(Error::Queue(format!("agent {} panicked", agent.name())))
        }
    };
    if request.reply.send(reply).is_err() {
        debug!("Caller stopped waiting; result dropped");
    }
}
