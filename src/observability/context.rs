//! Call-chain scoped trace id.
//!
//! The id lives in a tokio task-local, so it follows `.await` points of one
//! call chain and is never shared between unrelated tasks. Work handed to
//! `tokio::spawn` does not inherit it.

use std::future::Future;

use uuid::Uuid;

tokio::task_local! {
    static TRACE_ID: String;
}

/// The trace id installed by an enclosing root scope, if any.
pub fn current_trace_id() -> Option<String> {
    TRACE_ID.try_with(String::clone).ok()
}

pub fn new_trace_id() -> String {
    format!("trc_{}", Uuid::new_v4().simple())
}

/// Run `fut` with `trace_id` installed; it is removed when `fut` completes.
pub(crate) async fn with_trace_id<F: Future>(trace_id: String, fut: F) -> F::Output {
    TRACE_ID.scope(trace_id, fut).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_installs_and_removes() {
        assert_eq!(current_trace_id(), None);
        let seen = with_trace_id("trc_a".to_string(), async { current_trace_id() }).await;
        assert_eq!(seen.as_deref(), Some("trc_a"));
        assert_eq!(current_trace_id(), None);
    }

    #[tokio::test]
    async fn test_concurrent_chains_are_independent() {
        let a = with_trace_id("trc_a".to_string(), async {
            tokio::task::yield_now().await;
            current_trace_id()
        });
        let b = with_trace_id("trc_b".to_string(), async {
            tokio::task::yield_now().await;
            current_trace_id()
        });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.as_deref(), Some("trc_a"));
        assert_eq!(b.as_deref(), Some("trc_b"));
    }

    #[test]
    fn test_new_trace_id_shape() {
        let id = new_trace_id();
        assert!(id.starts_with("trc_"));
        assert_eq!(id.len(), 4 + 32);
    }
}
