//! Read-side views over a loaded event log. Nothing here mutates the log.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::event::TraceEvent;

/// One root invocation and everything nested under it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub agents: Vec<String>,
    pub event_count: usize,
    /// From the last `trace_end`/`agent_end` carrying a duration.
    pub duration_ms: Option<u64>,
    pub started: Option<DateTime<Utc>>,
    pub types: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DurationStats {
    pub count: usize,
    pub avg_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
}

impl DurationStats {
    fn from_samples(mut samples: Vec<u64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();
        let count = samples.len();
        let total: u64 = samples.iter().sum();
        let avg = total as f64 / count as f64;
        Self {
            count,
            avg_ms: (avg * 10.0).round() / 10.0,
            p50_ms: percentile(&samples, 0.50),
            p95_ms: percentile(&samples, 0.95),
        }
    }
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    let idx = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[idx]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total_events: usize,
    /// Most frequent first.
    pub by_type: Vec<(String, usize)>,
    pub by_agent: Vec<(String, usize)>,
    pub tools: DurationStats,
    pub model: DurationStats,
    pub errors: usize,
}

fn lifecycle_end(event: &TraceEvent) -> bool {
    matches!(event.event_type.as_str(), "trace_end" | "agent_end")
}

fn by_seq(events: &[TraceEvent]) -> Vec<TraceEvent> {
    let mut sorted = events.to_vec();
    sorted.sort_by_key(|e| e.seq);
    sorted
}

/// Per-trace summaries, ordered by the first event of each trace.
pub fn list_traces(events: &[TraceEvent]) -> Vec<TraceSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<&TraceEvent>> = HashMap::new();
    let sorted = by_seq(events);
    for event in &sorted {
        let Some(trace_id) = event.trace_id.as_deref() else {
            continue;
        };
        grouped
            .entry(trace_id.to_string())
            .or_insert_with(|| {
                order.push(trace_id.to_string());
                Vec::new()
            })
            .push(event);
    }

    order
        .into_iter()
        .filter_map(|trace_id| {
            let trace_events = grouped.remove(&trace_id)?;
            let agents: BTreeSet<String> = trace_events
                .iter()
                .filter_map(|e| e.agent.clone())
                .collect();
            let mut types = BTreeMap::new();
            for e in &trace_events {
                *types.entry(e.event_type.clone()).or_insert(0) += 1;
            }
            let duration_ms = trace_events
                .iter()
                .rev()
                .filter(|e| lifecycle_end(e))
                .find_map(|e| e.duration_ms());
            Some(TraceSummary {
                trace_id,
                agents: agents.into_iter().collect(),
                event_count: trace_events.len(),
                duration_ms,
                started: trace_events.first().map(|e| e.timestamp),
                types,
            })
        })
        .collect()
}

/// Every event of one trace, in seq order.
pub fn show_trace(events: &[TraceEvent], trace_id: &str) -> Vec<TraceEvent> {
    let mut matched: Vec<TraceEvent> = events
        .iter()
        .filter(|e| e.trace_id.as_deref() == Some(trace_id))
        .cloned()
        .collect();
    matched.sort_by_key(|e| e.seq);
    matched
}

fn counted(counts: HashMap<String, usize>) -> Vec<(String, usize)> {
    let mut out: Vec<_> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

pub fn stats(events: &[TraceEvent]) -> Stats {
    let mut by_type = HashMap::new();
    let mut by_agent = HashMap::new();
    let mut tool_durations = Vec::new();
    let mut model_durations = Vec::new();
    let mut errors = 0;

    for event in events {
        *by_type.entry(event.event_type.clone()).or_insert(0) += 1;
        let agent = event.agent.clone().unwrap_or_else(|| "?".to_string());
        *by_agent.entry(agent).or_insert(0) += 1;

        match (event.event_type.as_str(), event.duration_ms()) {
            ("tool_end", Some(ms)) => tool_durations.push(ms),
            ("model_end", Some(ms)) => model_durations.push(ms),
            ("error" | "tool_error", _) => errors += 1,
            _ => {}
        }
    }

    Stats {
        total_events: events.len(),
        by_type: counted(by_type),
        by_agent: counted(by_agent),
        tools: DurationStats::from_samples(tool_durations),
        model: DurationStats::from_samples(model_durations),
        errors,
    }
}

/// The last `n` events in seq order.
pub fn tail(events: &[TraceEvent], n: usize) -> Vec<TraceEvent> {
    let sorted = by_seq(events);
    let start = sorted.len().saturating_sub(n);
    sorted[start..].to_vec()
}

fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub fn format_event(event: &TraceEvent) -> String {
    let ts = event.timestamp.format("%Y-%m-%d %H:%M:%S");
    let mut out = format!(
        "[{:>4}] {} {:<16} {:<20}",
        event.seq,
        ts,
        event.event_type,
        event.agent.as_deref().unwrap_or("")
    );
    if let Some(message) = event.message.as_deref().filter(|m| !m.is_empty()) {
        out.push_str(&format!("\n  {}", clip(message, 120)));
    }
    let compact: serde_json::Map<_, _> = event
        .meta
        .iter()
        .filter(|(k, _)| k.as_str() != "tool")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !compact.is_empty() {
        let meta = serde_json::Value::Object(compact).to_string();
        out.push_str(&format!("\n  meta: {}", clip(&meta, 200)));
    }
    out
}

pub fn format_trace_summary(summary: &TraceSummary) -> String {
    let agents = if summary.agents.is_empty() {
        "?".to_string()
    } else {
        summary.agents.join(", ")
    };
    let duration = summary
        .duration_ms
        .map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "?".to_string());
    let started = summary
        .started
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    format!(
        "  {}…  events={:<4}  duration={:<8}  agents={}  started={}",
        clip(&summary.trace_id, 20),
        summary.event_count,
        duration,
        agents,
        started
    )
}

pub fn format_stats(stats: &Stats) -> String {
    let mut lines = vec![format!("Total events: {}", stats.total_events)];
    lines.push(format!("Errors:       {}", stats.errors));
    lines.push(format!(
        "Tool calls:   {} (avg {}ms, p50 {}ms, p95 {}ms)",
        stats.tools.count, stats.tools.avg_ms, stats.tools.p50_ms, stats.tools.p95_ms
    ));
    lines.push(format!(
        "Model calls:  {} (avg {}ms, p50 {}ms, p95 {}ms)",
        stats.model.count, stats.model.avg_ms, stats.model.p50_ms, stats.model.p95_ms
    ));
    lines.push(String::new());
    lines.push("By type:".to_string());
    lines.extend(stats.by_type.iter().map(|(t, n)| format!("  {t:<20} {n}")));
    lines.push(String::new());
    lines.push("By agent:".to_string());
    lines.extend(stats.by_agent.iter().map(|(a, n)| format!("  {a:<20} {n}")));
    lines.join("\n")
}
