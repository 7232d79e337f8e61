//! In-memory transport that behaves like a single-stream presence server.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use viewdeck_protocol::{
    PresenceAction, PresenceMutationResponse, PresenceRequest, PresenceSnapshotResponse,
    ViewerSession, WindowCount,
};

use crate::error::AgentError;
use crate::transport::PresenceTransport;

#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    sent: Arc<Mutex<Vec<PresenceRequest>>>,
    viewers: Arc<Mutex<Vec<ViewerSession>>>,
    failing: Arc<AtomicBool>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn actions(&self) -> Vec<PresenceAction> {
        self.sent
            .lock()
            .expect("sent lock")
            .iter()
            .map(|r| r.action)
            .collect()
    }

    pub fn requests(&self) -> Vec<PresenceRequest> {
        self.sent.lock().expect("sent lock").clone()
    }

    /// Seed another viewer as if a different tab had joined.
    pub fn add_viewer(&self, stream_id: &str, user_id: &str, session_id: &str) {
        self.viewers.lock().expect("viewers lock").push(ViewerSession {
            stream_id: stream_id.to_string(),
            user_id: user_id.to_string(),
            user_email: format!("{user_id}@example.com"),
            session_id: session_id.to_string(),
            last_seen_at: 0,
        });
    }
}

fn window_counts(viewers: &[ViewerSession]) -> Vec<WindowCount> {
    let mut counts: Vec<WindowCount> = Vec::new();
    for viewer in viewers {
        match counts.iter_mut().find(|c| c.user_id == viewer.user_id) {
            Some(count) => count.window_count += 1,
            None => counts.push(WindowCount {
                user_id: viewer.user_id.clone(),
                user_email: viewer.user_email.clone(),
                window_count: 1,
            }),
        }
    }
    counts
}

#[async_trait]
impl PresenceTransport for FakeTransport {
    async fn send(&self, request: &PresenceRequest) -> Result<PresenceMutationResponse, AgentError> {
        self.sent.lock().expect("sent lock").push(request.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(AgentError::Rejected {
                status: 500,
                error: "Internal server error".to_string(),
            });
        }

        let mut viewers = self.viewers.lock().expect("viewers lock");
        match request.action {
            PresenceAction::Join => {
                if !viewers
                    .iter()
                    .any(|v| v.is_session(&request.user_id, &request.session_id))
                {
                    viewers.push(ViewerSession {
                        stream_id: request.stream_id.clone(),
                        user_id: request.user_id.clone(),
                        user_email: request.user_email.clone().unwrap_or_default(),
                        session_id: request.session_id.clone(),
                        last_seen_at: 0,
                    });
                }
            }
            PresenceAction::Leave => {
                viewers.retain(|v| !v.is_session(&request.user_id, &request.session_id));
            }
            PresenceAction::Heartbeat => {}
        }

        Ok(PresenceMutationResponse {
            success: true,
            viewers: viewers.clone(),
            total_viewers: viewers.len(),
            window_counts: window_counts(&viewers),
            action: request.action,
            stream_id: request.stream_id.clone(),
        })
    }

    async fn snapshot(&self) -> Result<PresenceSnapshotResponse, AgentError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AgentError::Rejected {
                status: 500,
                error: "Internal server error".to_string(),
            });
        }

        let viewers = self.viewers.lock().expect("viewers lock").clone();
        let mut by_stream: BTreeMap<String, Vec<ViewerSession>> = BTreeMap::new();
        for viewer in viewers {
            by_stream
                .entry(viewer.stream_id.clone())
                .or_default()
                .push(viewer);
        }
        let window_counts = by_stream
            .iter()
            .map(|(stream, list)| (stream.clone(), window_counts(list)))
            .collect();

        Ok(PresenceSnapshotResponse {
            success: true,
            viewers: by_stream,
            window_counts,
        })
    }
}
