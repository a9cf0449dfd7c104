//! Progress Channel.
//!
//! In-memory mapping ticket_id → ordered append-only event buffer, streamed
//! to clients as server-sent events. One `tokio::sync::broadcast` channel
//! per ticket bucket rather than a single process-wide channel, so a
//! terminal event purges only that ticket's buffer.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::{DateTime, Utc};
use futures::Stream;
use futures::stream::unfold;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// `type ∈ {connected, progress, tool_start, tool_result, completed,
/// failed, timeout, heartbeat}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    Connected,
    Progress,
    ToolStart,
    ToolResult,
    Completed,
    Failed,
    Timeout,
    Heartbeat,
}

impl ProgressEventType {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProgressEventType::Completed | ProgressEventType::Failed | ProgressEventType::Timeout
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: ProgressEventType,
    pub timestamp: DateTime<Utc>,
    pub ticket_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ProgressEvent {
    pub fn new(ticket_id: Uuid, event_type: ProgressEventType) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            ticket_id,
            current_step: None,
            status: None,
            payload: None,
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

struct Bucket {
    tx: broadcast::Sender<ProgressEvent>,
    /// FIFO log, replayed to a late-joining consumer so ordering is
    /// observed even if the subscriber attaches after the first events
    /// fired.
    log: Vec<ProgressEvent>,
}

/// Per-ticket append-only event buffer. Cross-ticket ordering is not
/// defined; each ticket gets its own broadcast channel and lock.
pub struct ProgressChannel {
    buckets: Mutex<HashMap<Uuid, Bucket>>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Producers call this to append one event. Non-blocking: a
    /// short-held lock per ticket bucket.
    pub async fn emit(&self, event: ProgressEvent) {
        let ticket_id = event.ticket_id;
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(ticket_id).or_insert_with(|| Bucket {
            tx: broadcast::channel(256).0,
            log: Vec::new(),
        });
        bucket.log.push(event.clone());
        let _ = bucket.tx.send(event);
    }

    /// Purges the buffer for a ticket on termination.
    pub async fn purge(&self, ticket_id: Uuid) {
        self.buckets.lock().await.remove(&ticket_id);
    }

    async fn replay_and_subscribe(
        &self,
        ticket_id: Uuid,
    ) -> (Vec<ProgressEvent>, broadcast::Receiver<ProgressEvent>) {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(ticket_id).or_insert_with(|| Bucket {
            tx: broadcast::channel(256).0,
            log: Vec::new(),
        });
        (bucket.log.clone(), bucket.tx.subscribe())
    }

    /// Opens an SSE stream for one ticket. Terminates on a terminal
    /// event, a direct ticket-status read
    /// observing a terminal status, or a 10-minute idle bound, whichever
    /// comes first.
    pub fn stream(
        self: Arc<Self>,
        ticket_id: Uuid,
        already_terminal: bool,
    ) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
        let state = UnfoldState {
            channel: self,
            ticket_id,
            phase: Phase::Connected { already_terminal },
            rx: None,
        };

        let stream = unfold(state, |mut state| async move {
            loop {
                let phase = std::mem::replace(&mut state.phase, Phase::Done);
                match phase {
                    Phase::Connected { already_terminal } => {
                        let event = ProgressEvent::new(state.ticket_id, ProgressEventType::Connected);
                        state.phase = if already_terminal {
                            Phase::Done
                        } else {
                            let (backlog, rx) =
                                state.channel.replay_and_subscribe(state.ticket_id).await;
                            state.rx = Some(rx);
                            Phase::Backlog(backlog.into())
                        };
                        return Some((Ok(to_sse_event(&event)), state));
                    }
                    Phase::Backlog(mut queue) => {
                        let Some(event) = queue.pop_front() else {
                            state.phase = Phase::Live;
                            continue;
                        };
                        let terminal = event.event_type.is_terminal();
                        state.phase = if terminal {
                            state.channel.purge(state.ticket_id).await;
                            Phase::Done
                        } else {
                            Phase::Backlog(queue)
                        };
                        return Some((Ok(to_sse_event(&event)), state));
                    }
                    Phase::Live => {
                        let rx = state.rx.as_mut().expect("rx subscribed before Live phase");
                        match tokio::time::timeout(IDLE_TIMEOUT, rx.recv()).await {
                            Ok(Ok(event)) => {
                                let terminal = event.event_type.is_terminal();
                                state.phase = if terminal {
                                    state.channel.purge(state.ticket_id).await;
                                    Phase::Done
                                } else {
                                    Phase::Live
                                };
                                return Some((Ok(to_sse_event(&event)), state));
                            }
                            Ok(Err(broadcast::error::RecvError::Lagged(_))) => {
                                state.phase = Phase::Live;
                                continue;
                            }
                            Ok(Err(broadcast::error::RecvError::Closed)) => {
                                state.phase = Phase::Done;
                                continue;
                            }
                            Err(_elapsed) => {
                                let event = ProgressEvent::new(state.ticket_id, ProgressEventType::Timeout);
                                state.channel.purge(state.ticket_id).await;
                                state.phase = Phase::Done;
                                return Some((Ok(to_sse_event(&event)), state));
                            }
                        }
                    }
                    Phase::Done => return None,
                }
            }
        });

        Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
    }
}

enum Phase {
    Connected { already_terminal: bool },
    Backlog(VecDeque<ProgressEvent>),
    Live,
    Done,
}

struct UnfoldState {
    channel: Arc<ProgressChannel>,
    ticket_id: Uuid,
    phase: Phase,
    rx: Option<broadcast::Receiver<ProgressEvent>>,
}

fn to_sse_event(event: &ProgressEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default().data(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_then_purge_clears_backlog() {
        let channel = ProgressChannel::new();
        let ticket_id = Uuid::new_v4();
        channel
            .emit(ProgressEvent::new(ticket_id, ProgressEventType::Progress))
            .await;
        let (backlog, _rx) = channel.replay_and_subscribe(ticket_id).await;
        assert_eq!(backlog.len(), 1);

        channel.purge(ticket_id).await;
        let (backlog, _rx) = channel.replay_and_subscribe(ticket_id).await;
        assert!(backlog.is_empty());
    }

    #[tokio::test]
    async fn fifo_ordering_is_preserved() {
        let channel = ProgressChannel::new();
        let ticket_id = Uuid::new_v4();
        for i in 0..5 {
            channel
                .emit(
                    ProgressEvent::new(ticket_id, ProgressEventType::Progress)
                        .with_step(format!("step-{i}")),
                )
                .await;
        }
        let (backlog, _rx) = channel.replay_and_subscribe(ticket_id).await;
        let steps: Vec<_> = backlog.iter().filter_map(|e| e.current_step.clone()).collect();
        assert_eq!(
            steps,
            vec!["step-0", "step-1", "step-2", "step-3", "step-4"]
        );
    }
}
