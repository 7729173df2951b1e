//! Continuous search sessions.
//!
//! A session repeatedly issues `search` for one query, emitting each result
//! as it arrives, until one of these holds (checked in this order at the
//! top of every iteration):
//!
//! 1. the engine is disposed
//! 2. the session was cancelled
//! 3. consecutive failures reached the budget
//! 4. enough results were collected
//!
//! Cancellation is cooperative: an in-flight request is allowed to finish.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::protocol::{OutboundRequest, SearchResult};

use super::config::SearchConfig;
use super::core::Engine;

// ============================================================================
// Types
// ============================================================================

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The engine was disposed.
    Disposed,
    /// [`Engine::stop_search`] was called.
    Cancelled,
    /// Too many consecutive failures.
    FailureBudget,
    /// The result limit was reached.
    Completed,
}

/// Item on the search stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    /// A new result for `query`.
    Result {
        query: String,
        /// 0-based position within the session.
        index: u32,
        result: SearchResult,
    },
    /// The session for `query` ended.
    Finished {
        query: String,
        reason: StopReason,
        result_count: u32,
    },
}

impl SearchEvent {
    /// The query this event belongs to.
    #[must_use]
    pub fn query(&self) -> &str {
        match self {
            Self::Result { query, .. } | Self::Finished { query, .. } => query,
        }
    }
}

// ============================================================================
// SearchSessions
// ============================================================================

/// Registry of running sessions plus the shared event stream.
pub struct SearchSessions {
    /// Cancellation flag per running query.
    active: Mutex<FxHashMap<String, Arc<AtomicBool>>>,
    events: broadcast::Sender<SearchEvent>,
}

impl SearchSessions {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            active: Mutex::new(FxHashMap::default()),
            events,
        }
    }

    /// Cancels every session.
    pub fn cancel_all(&self) {
        for flag in self.active.lock().values() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn emit(&self, event: SearchEvent) {
        let _ = self.events.send(event);
    }
}

// ============================================================================
// SearchSessionState
// ============================================================================

/// Per-session counters.
struct SearchSessionState {
    query: String,
    result_count: u32,
    failures: u32,
    started_at: Instant,
}

impl SearchSessionState {
    fn new(query: String) -> Self {
        Self {
            query,
            result_count: 0,
            failures: 0,
            started_at: Instant::now(),
        }
    }

    fn stop_reason(&self, disposed: bool, cancelled: bool, limits: &SearchConfig) -> Option<StopReason> {
        if disposed {
            Some(StopReason::Disposed)
        } else if cancelled {
            Some(StopReason::Cancelled)
        } else if self.failures >= limits.max_failures {
            Some(StopReason::FailureBudget)
        } else if self.result_count >= limits.max_results {
            Some(StopReason::Completed)
        } else {
            None
        }
    }
}

// ============================================================================
// Engine - Search
// ============================================================================

impl Engine {
    /// Starts a session for `query`.
    ///
    /// Returns `false` if one is already running for the same query or the
    /// engine is disposed.
    pub fn start_search(&self, query: impl Into<String>) -> bool {
        if self.is_disposed() {
            return false;
        }

        let query = query.into();
        let cancelled = {
            let mut active = self.inner.searches.active.lock();
            if active
                .get(&query)
                .is_some_and(|flag| !flag.load(Ordering::SeqCst))
            {
                debug!(query = %query, "Search already running");
                return false;
            }

            let flag = Arc::new(AtomicBool::new(false));
            active.insert(query.clone(), Arc::clone(&flag));
            flag
        };

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_search(query, cancelled).await;
        });
        true
    }

    /// Requests cancellation of the session for `query`.
    ///
    /// Returns `false` if no session is running for it.
    pub fn stop_search(&self, query: &str) -> bool {
        match self.inner.searches.active.lock().get(query) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                debug!(query, "Search cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Returns a receiver for results and session ends.
    #[must_use]
    pub fn search_events(&self) -> broadcast::Receiver<SearchEvent> {
        self.inner.searches.events.subscribe()
    }

    /// Queries with a running, uncancelled session, sorted.
    #[must_use]
    pub fn active_searches(&self) -> Vec<String> {
        let mut queries: Vec<String> = self
            .inner
            .searches
            .active
            .lock()
            .iter()
            .filter(|(_, flag)| !flag.load(Ordering::SeqCst))
            .map(|(query, _)| query.clone())
            .collect();
        queries.sort();
        queries
    }

    async fn run_search(self, query: String, cancelled: Arc<AtomicBool>) {
        let limits = self.inner.config.search;
        let timeout = self.inner.config.timeouts.search;
        let sessions = &self.inner.searches;
        let mut state = SearchSessionState::new(query);

        info!(query = %state.query, "Search started");

        let reason = loop {
            if let Some(reason) =
                state.stop_reason(self.is_disposed(), cancelled.load(Ordering::SeqCst), &limits)
            {
                break reason;
            }

            let request = OutboundRequest::search(&state.query, state.result_count, state.failures);
            let outcome = self
                .send(request, Some(timeout))
                .await
                .and_then(|response| SearchResult::from_response(&response));

            match outcome {
                Ok(result) => {
                    let index = state.result_count;
                    state.result_count += 1;
                    state.failures = 0;
                    debug!(query = %state.query, index, id = %result.id, "Search result");
                    sessions.emit(SearchEvent::Result {
                        query: state.query.clone(),
                        index,
                        result,
                    });
                }
                Err(Error::Disposed) => break StopReason::Disposed,
                Err(e) => {
                    state.failures += 1;
                    warn!(
                        query = %state.query,
                        failures = state.failures,
                        error = %e,
                        "Search request failed"
                    );
                    if state.failures < limits.max_failures {
                        sleep(limits.retry_delay).await;
                    }
                }
            }
        };

        {
            let mut active = sessions.active.lock();
            if active
                .get(&state.query)
                .is_some_and(|flag| Arc::ptr_eq(flag, &cancelled))
            {
                active.remove(&state.query);
            }
        }

        info!(
            query = %state.query,
            ?reason,
            results = state.result_count,
            elapsed_ms = state.started_at.elapsed().as_millis() as u64,
            "Search finished"
        );
        sessions.emit(SearchEvent::Finished {
            query: state.query,
            reason,
            result_count: state.result_count,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::{Value, json};

    use crate::testing::{MockServer, engine_builder_for, engine_for, reply_err, reply_ok};

    fn result_for(frame: &Value) -> Value {
        let n = frame["searchCount"].as_u64().unwrap_or(0);
        reply_ok(
            frame,
            json!({ "result": {
                "id": format!("r{n}"),
                "title": format!("Result {n}"),
                "description": "desc",
            }}),
        )
    }

    async fn finished(events: &mut broadcast::Receiver<SearchEvent>) -> (StopReason, u32, Vec<u32>) {
        let mut indices = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
                .await
                .expect("in time")
                .expect("event");
            match event {
                SearchEvent::Result { index, .. } => indices.push(index),
                SearchEvent::Finished { reason, result_count, .. } => {
                    return (reason, result_count, indices);
                }
            }
        }
    }

    #[test]
    fn test_stop_priority() {
        let limits = SearchConfig::default().with_max_results(4).with_max_failures(3);
        let mut state = SearchSessionState::new("q".into());

        assert_eq!(state.stop_reason(false, false, &limits), None);

        state.result_count = 4;
        state.failures = 3;
        assert_eq!(state.stop_reason(true, true, &limits), Some(StopReason::Disposed));
        assert_eq!(state.stop_reason(false, true, &limits), Some(StopReason::Cancelled));
        assert_eq!(state.stop_reason(false, false, &limits), Some(StopReason::FailureBudget));

        state.failures = 0;
        assert_eq!(state.stop_reason(false, false, &limits), Some(StopReason::Completed));
    }

    #[tokio::test]
    async fn test_stops_after_max_results() {
        let server = MockServer::with_responder(Arc::new(|frame| vec![result_for(frame)])).await;
        let engine = engine_builder_for(&server)
            .search(SearchConfig::default().with_max_results(4).with_max_failures(3))
            .build()
            .expect("engine");
        let mut events = engine.search_events();

        assert!(engine.start_search("cats"));
        let (reason, count, indices) = finished(&mut events).await;

        assert_eq!(reason, StopReason::Completed);
        assert_eq!(count, 4);
        assert_eq!(indices, [0, 1, 2, 3]);

        let counts: Vec<u64> = server
            .frames_for("search")
            .iter()
            .map(|f| f["searchCount"].as_u64().unwrap_or(99))
            .collect();
        assert_eq!(counts, [0, 1, 2, 3]);
        assert!(engine.active_searches().is_empty());
        engine.dispose().await;
    }

    #[tokio::test]
    async fn test_stops_after_failure_budget() {
        let server = MockServer::with_responder(Arc::new(|frame| vec![reply_err(frame, "no results")])).await;
        let engine = engine_builder_for(&server)
            .search(
                SearchConfig::default()
                    .with_max_results(4)
                    .with_max_failures(3)
                    .with_retry_delay(Duration::from_millis(10)),
            )
            .build()
            .expect("engine");
        let mut events = engine.search_events();

        engine.start_search("dogs");
        let (reason, count, _) = finished(&mut events).await;

        assert_eq!(reason, StopReason::FailureBudget);
        assert_eq!(count, 0);

        let attempts: Vec<u64> = server
            .frames_for("search")
            .iter()
            .map(|f| f["attemptCount"].as_u64().unwrap_or(99))
            .collect();
        assert_eq!(attempts, [0, 1, 2]);
        engine.dispose().await;
    }

    #[tokio::test]
    async fn test_malformed_result_counts_as_failure() {
        let server = MockServer::with_responder(Arc::new(|frame| vec![reply_ok(frame, json!({}))])).await;
        let engine = engine_builder_for(&server)
            .search(
                SearchConfig::default()
                    .with_max_failures(2)
                    .with_retry_delay(Duration::from_millis(10)),
            )
            .build()
            .expect("engine");
        let mut events = engine.search_events();

        engine.start_search("birds");
        let (reason, _, _) = finished(&mut events).await;

        assert_eq!(reason, StopReason::FailureBudget);
        assert_eq!(server.frames_for("search").len(), 2);
        engine.dispose().await;
    }

    #[tokio::test]
    async fn test_stop_halts_before_next_request() {
        let server = MockServer::with_responder(Arc::new(|frame| vec![result_for(frame)])).await;
        let engine = engine_for(&server);
        let mut events = engine.search_events();

        engine.start_search("fish");
        assert!(!engine.start_search("fish"));

        let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("in time")
            .expect("first result");
        assert!(matches!(first, SearchEvent::Result { index: 0, .. }));
        assert!(engine.stop_search("fish"));

        let (reason, count, _) = finished(&mut events).await;
        assert_eq!(reason, StopReason::Cancelled);
        assert_eq!(server.frames_for("search").len() as u32, count);
        engine.dispose().await;
    }

    #[tokio::test]
    async fn test_dispose_ends_search_without_retry_delay() {
        let server = MockServer::with_responder(Arc::new(|_| Vec::new())).await;
        let engine = engine_builder_for(&server)
            .search(SearchConfig::default().with_retry_delay(Duration::from_secs(60)))
            .build()
            .expect("engine");
        let mut events = engine.search_events();

        engine.start_search("owls");
        server.wait_for_action("search").await;
        engine.dispose().await;

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("finished before the retry delay")
            .expect("event");
        assert!(matches!(
            event,
            SearchEvent::Finished { reason: StopReason::Disposed, result_count: 0, .. }
        ));
        assert_eq!(server.frames_for("search").len(), 1);
    }

    #[tokio::test]
    async fn test_independent_queries() {
        let server = MockServer::with_responder(Arc::new(|frame| vec![result_for(frame)])).await;
        let engine = engine_builder_for(&server)
            .search(SearchConfig::default().with_max_results(2))
            .build()
            .expect("engine");
        let mut events = engine.search_events();

        engine.start_search("a");
        engine.start_search("b");
        assert!(!engine.stop_search("c"));

        let mut done = Vec::new();
        while done.len() < 2 {
            if let SearchEvent::Finished { query, reason, .. } = events.recv().await.expect("event") {
                assert_eq!(reason, StopReason::Completed);
                done.push(query);
            }
        }
        done.sort();
        assert_eq!(done, ["a", "b"]);
        engine.dispose().await;
    }
}
