//! Observability: a correlated, strictly ordered event log.
//!
//! Every event gets a process-wide `seq`, is appended to an [`EventStore`]
//! and is handed to each registered sink. Nothing here ever fails the
//! operation being observed: store and sink errors are logged at `debug`
//! and dropped.
//!
//! Correlation uses a trace id scoped to the call chain (see
//! [`Tracer::trace_scope`]); a root invocation and every nested agent it
//! calls share one id.

mod analysis;
mod context;
mod event;
mod store;

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ObservabilityConfig;

pub use analysis::{
    format_event, format_stats, format_trace_summary, list_traces, show_trace, stats, tail,
    DurationStats, Stats, TraceSummary,
};
pub use context::{current_trace_id, new_trace_id};
pub use event::{sanitize, truncate, EventFields, TraceEvent, TRUNCATION_SUFFIX};
pub use store::{EventStore, InMemoryEventStore, JsonlEventStore};

/// Callback receiving every logged event.
pub type EventSink = Arc<dyn Fn(&TraceEvent) + Send + Sync>;

/// Handle returned by [`Tracer::register_sink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

pub struct Tracer {
    enabled: bool,
    max_detail: usize,
    /// Last allocated seq. Held while appending so store order matches seq order.
    seq: Mutex<u64>,
    store: Arc<dyn EventStore>,
    sinks: RwLock<Vec<(SinkId, EventSink)>>,
    next_sink: AtomicU64,
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.enabled)
            .field("max_detail", &self.max_detail)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Tracer {
    pub const DEFAULT_MAX_DETAIL: usize = 2000;

    /// Open a tracer over `store`, continuing after its highest stored seq.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        let last = store.last_seq().unwrap_or_else(|e| {
            debug!("Could not read last seq from event store: {}", e);
            0
        });
        Self {
            enabled: true,
            max_detail: Self::DEFAULT_MAX_DETAIL,
            seq: Mutex::new(last),
            store,
            sinks: RwLock::new(Vec::new()),
            next_sink: AtomicU64::new(1),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryEventStore::new()))
    }

    /// JSONL log at the configured path.
    pub fn from_config(config: &ObservabilityConfig) -> Self {
        Self::new(Arc::new(JsonlEventStore::new(&config.log_path)))
            .with_enabled(config.enabled)
            .with_max_detail(config.max_detail)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_detail(mut self, max_detail: usize) -> Self {
        self.max_detail = max_detail;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn register_sink(&self, sink: impl Fn(&TraceEvent) + Send + Sync + 'static) -> SinkId {
        let id = SinkId(self.next_sink.fetch_add(1, Ordering::Relaxed));
        let mut sinks = self.sinks.write().unwrap_or_else(|p| p.into_inner());
        sinks.push((id, Arc::new(sink)));
        id
    }

    /// Returns whether the sink was registered.
    pub fn unregister_sink(&self, id: SinkId) -> bool {
        let mut sinks = self.sinks.write().unwrap_or_else(|p| p.into_inner());
        let before = sinks.len();
        sinks.retain(|(sink_id, _)| *sink_id != id);
        sinks.len() != before
    }

    /// Record one event. Returns `None` only when the tracer is disabled.
    ///
    /// Without an explicit trace id the ambient one of the current call
    /// chain is used. The message and every string in `meta` are capped at
    /// `max_detail` characters.
    pub fn log_event(&self, event_type: &str, fields: EventFields) -> Option<TraceEvent> {
        if !self.enabled {
            return None;
        }

        let trace_id = fields.trace_id.or_else(current_trace_id);
        let message = fields
            .message
            .filter(|m| !m.is_empty())
            .map(|m| truncate(&m, self.max_detail));
        let meta = event::sanitize_map(&fields.meta, self.max_detail);

        let event = {
            let mut seq = lock(&self.seq);
            *seq += 1;
            let event = TraceEvent {
                id: TraceEvent::new_id(),
                seq: *seq,
                timestamp: Utc::now(),
                event_type: event_type.to_string(),
                agent: fields.agent,
                trace_id,
                status: fields.status,
                message,
                meta,
            };
            if let Err(e) = self.store.append(&event) {
                debug!("Failed to persist event {}: {}", event.seq, e);
            }
            event
        };

        self.fan_out(&event);
        Some(event)
    }

    fn fan_out(&self, event: &TraceEvent) {
        let sinks: Vec<EventSink> = self
            .sinks
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, sink)| Arc::clone(sink))
            .collect();
        for sink in sinks {
            if catch_unwind(AssertUnwindSafe(|| sink(event))).is_err() {
                debug!("Event sink panicked on event {}", event.seq);
            }
        }
    }

    /// The last `limit` stored events, oldest first. Empty on read failure.
    pub fn read_recent(&self, limit: usize) -> Vec<TraceEvent> {
        self.store.read_recent(limit).unwrap_or_else(|e| {
            debug!("Failed to read events: {}", e);
            Vec::new()
        })
    }

    /// Run `body` inside a trace scope and return its output.
    ///
    /// With no trace id in the current call chain a new one is minted and
    /// installed for everything `body` awaits, bracketed by
    /// `trace_start`/`trace_end`. Otherwise the existing id is reused and the
    /// scope emits `agent_start`/`agent_end`. End events carry `duration_ms`.
    pub async fn trace_scope<F, Fut, T>(
        &self,
        agent: &str,
        query: Option<&str>,
        meta: Map<String, Value>,
        body: F,
    ) -> T
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = T>,
    {
        let existing = current_trace_id();
        let is_root = existing.is_none();
        let trace_id = existing.unwrap_or_else(new_trace_id);
        let (start_type, end_type) = if is_root {
            ("trace_start", "trace_end")
        } else {
            ("agent_start", "agent_end")
        };

        let started = Instant::now();
        let mut fields = EventFields::new()
            .agent(agent)
            .trace_id(&trace_id)
            .with_meta(meta);
        if let Some(query) = query {
            fields = fields.message(query);
        }
        self.log_event(start_type, fields);

        let fut = body(trace_id.clone());
        let output = if is_root {
            context::with_trace_id(trace_id.clone(), fut).await
        } else {
            fut.await
        };

        self.log_event(
            end_type,
            EventFields::new()
                .agent(agent)
                .trace_id(trace_id)
                .meta("duration_ms", started.elapsed().as_millis() as u64),
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct BrokenStore;

    impl EventStore for BrokenStore {
        fn append(&self, _event: &TraceEvent) -> crate::Result<()> {
            Err(Error::Other("disk full".to_string()))
        }

        fn load_all(&self) -> crate::Result<Vec<TraceEvent>> {
            Err(Error::Other("unreadable".to_string()))
        }
    }

    #[test]
    fn test_seq_gapless_across_threads() {
        let tracer = Arc::new(Tracer::in_memory());
        let producers = 8;
        let per_producer = 50;

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let tracer = Arc::clone(&tracer);
                std::thread::spawn(move || {
                    (0..per_producer)
                        .map(|i| {
                            tracer
                                .log_event("tick", EventFields::new().meta("p", p).meta("i", i))
                                .unwrap()
                                .seq
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seqs: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seqs.sort_unstable();
        let expected: Vec<u64> = (1..=(producers * per_producer) as u64).collect();
        assert_eq!(seqs, expected);

        let stored: Vec<u64> = tracer.store().load_all().unwrap().iter().map(|e| e.seq).collect();
        assert_eq!(stored, expected);
    }

    #[test]
    fn test_sinks_receive_and_unregister() {
        let tracer = Tracer::in_memory();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let id = tracer.register_sink(move |e| seen_clone.lock().unwrap().push(e.seq));

        tracer.log_event("a", EventFields::new());
        assert!(tracer.unregister_sink(id));
        assert!(!tracer.unregister_sink(id));
        tracer.log_event("b", EventFields::new());

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_failures_never_escape() {
        let tracer = Tracer::new(Arc::new(BrokenStore));
        tracer.register_sink(|_| panic!("sink exploded"));
        let count = Arc::new(AtomicU64::new(0));
        let count_clone = Arc::clone(&count);
        tracer.register_sink(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let event = tracer.log_event("error", EventFields::new().status("error"));
        assert_eq!(event.map(|e| e.seq), Some(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(tracer.read_recent(10).is_empty());
    }

    #[test]
    fn test_disabled_tracer_logs_nothing() {
        let tracer = Tracer::in_memory().with_enabled(false);
        assert!(tracer.log_event("x", EventFields::new()).is_none());
        assert!(tracer.read_recent(10).is_empty());
    }

    #[test]
    fn test_message_and_meta_capped() {
        let tracer = Tracer::in_memory().with_max_detail(8);
        let event = tracer
            .log_event(
                "tool_end",
                EventFields::new()
                    .message("a very long message")
                    .meta("inputs", serde_json::json!({"query": "another long value"})),
            )
            .unwrap();
        assert_eq!(event.message.as_deref(), Some("a ver..."));
        assert_eq!(event.meta["inputs"]["query"], serde_json::json!("anoth..."));
    }

    #[test]
    fn test_seq_resumes_from_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.jsonl");
        {
            let tracer = Tracer::new(Arc::new(JsonlEventStore::new(&path)));
            tracer.log_event("a", EventFields::new());
            tracer.log_event("b", EventFields::new());
        }
        let tracer = Tracer::new(Arc::new(JsonlEventStore::new(&path)));
        let event = tracer.log_event("c", EventFields::new()).unwrap();
        assert_eq!(event.seq, 3);
        let recent: Vec<String> = tracer.read_recent(2).into_iter().map(|e| e.event_type).collect();
        assert_eq!(recent, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_nested_scopes_share_trace_id() {
        let tracer = &Tracer::in_memory();

        let (outer_id, inner_id) = tracer
            .trace_scope("root", Some("hello"), Map::new(), |outer| async move {
                tracer.log_event("thought", EventFields::new().agent("root"));
                let inner = tracer
                    .trace_scope("child", Some("sub task"), Map::new(), |inner| async move {
                        inner
                    })
                    .await;
                (outer, inner)
            })
            .await;

        assert_eq!(outer_id, inner_id);
        assert_eq!(current_trace_id(), None);

        let events = tracer.read_recent(100);
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["trace_start", "thought", "agent_start", "agent_end", "trace_end"]
        );
        assert!(events.iter().all(|e| e.trace_id.as_deref() == Some(outer_id.as_str())));
        assert_eq!(events[0].message.as_deref(), Some("hello"));
        assert!(events[4].duration_ms().is_some());
    }

    #[tokio::test]
    async fn test_sibling_roots_get_distinct_ids() {
        let tracer = Tracer::in_memory();
        let a = tracer.trace_scope("a", None, Map::new(), |id| async move { id }).await;
        let b = tracer.trace_scope("b", None, Map::new(), |id| async move { id }).await;
        assert_ne!(a, b);
    }
}
