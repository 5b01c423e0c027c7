//! Durable event storage.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::event::TraceEvent;
use crate::Result;

/// Append-only sink for trace events.
pub trait EventStore: Send + Sync {
    fn append(&self, event: &TraceEvent) -> Result<()>;

    /// Every stored event, in append order.
    fn load_all(&self) -> Result<Vec<TraceEvent>>;

    /// The last `limit` events, oldest first.
    fn read_recent(&self, limit: usize) -> Result<Vec<TraceEvent>> {
        let events = self.load_all()?;
        let start = events.len().saturating_sub(limit.max(1));
        Ok(events[start..].to_vec())
    }

    /// Highest stored `seq`, 0 when empty.
    fn last_seq(&self) -> Result<u64> {
        Ok(self.load_all()?.iter().map(|e| e.seq).max().unwrap_or(0))
    }
}

/// One JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlEventStore {
    path: PathBuf,
}

impl JsonlEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Visit every parseable line; malformed lines are skipped.
    fn scan(&self, mut visit: impl FnMut(TraceEvent)) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new().read(true).open(&self.path)?;
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TraceEvent>(&line) {
                Ok(event) => visit(event),
                Err(e) => debug!("Skipping malformed event at line {}: {}", lineno + 1, e),
            }
        }
        Ok(())
    }
}

impl EventStore for JsonlEventStore {
    fn append(&self, event: &TraceEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<TraceEvent>> {
        let mut events = Vec::new();
        self.scan(|e| events.push(e))?;
        Ok(events)
    }

    fn read_recent(&self, limit: usize) -> Result<Vec<TraceEvent>> {
        let limit = limit.max(1);
        let mut window = VecDeque::with_capacity(limit);
        self.scan(|e| {
            if window.len() == limit {
                window.pop_front();
            }
            window.push_back(e);
        })?;
        Ok(window.into())
    }

    fn last_seq(&self) -> Result<u64> {
        let mut last = 0;
        self.scan(|e| last = last.max(e.seq))?;
        Ok(last)
    }
}

/// Keeps events in memory; used when no log path is configured and in tests.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<TraceEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, event: &TraceEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|e| crate::Error::Other(e.to_string()))?
            .push(event.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<TraceEvent>> {
        let events = self
            .events
            .lock()
            .map_err(|e| crate::Error::Other(e.to_string()))?;
        Ok(events.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Map;

    fn event(seq: u64) -> TraceEvent {
        TraceEvent {
            id: TraceEvent::new_id(),
            seq,
            timestamp: Utc::now(),
            event_type: "thought".to_string(),
            agent: Some("tester".to_string()),
            trace_id: Some("trc_x".to_string()),
            status: None,
            message: Some(format!("event {seq}")),
            meta: Map::new(),
        }
    }

    #[test]
    fn test_jsonl_append_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlEventStore::new(dir.path().join("nested/log.jsonl"));
        for seq in 1..=5 {
            store.append(&event(seq)).unwrap();
        }

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].seq, 1);

        let recent: Vec<u64> = store.read_recent(2).unwrap().iter().map(|e| e.seq).collect();
        assert_eq!(recent, vec![4, 5]);
        assert_eq!(store.last_seq().unwrap(), 5);
    }

    #[test]
    fn test_jsonl_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let store = JsonlEventStore::new(&path);
        store.append(&event(1)).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "{{not json").unwrap();
            writeln!(file).unwrap();
        }
        store.append(&event(2)).unwrap();

        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlEventStore::new(dir.path().join("absent.jsonl"));
        assert!(store.load_all().unwrap().is_empty());
        assert_eq!(store.last_seq().unwrap(), 0);
    }

    #[test]
    fn test_in_memory_read_recent() {
        let store = InMemoryEventStore::new();
        for seq in 1..=3 {
            store.append(&event(seq)).unwrap();
        }
        let recent: Vec<u64> = store.read_recent(10).unwrap().iter().map(|e| e.seq).collect();
        assert_eq!(recent, vec![1, 2, 3]);
    }
}
