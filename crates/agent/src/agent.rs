//! One viewing session, kept alive while the viewer is watching.
//!
//! Lifecycle: `Idle -> Joining -> Active` (heartbeating) `-> Leaving -> Idle`.
//! Hiding, unmounting or unloading leaves; becoming visible again rejoins
//! with the same session id.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use viewdeck_protocol::{
    new_session_token, PresenceAction, PresenceMutationResponse, PresenceRequest, ViewerSession,
    WindowCount,
};

use crate::error::AgentError;
use crate::transport::PresenceTransport;

pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(15);

/// Who is watching what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceContext {
    pub stream_id: String,
    pub user_id: String,
    pub user_email: String,
}

impl PresenceContext {
    pub fn new(
        stream_id: impl Into<String>,
        user_id: impl Into<String>,
        user_email: impl Into<String>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            user_id: user_id.into(),
            user_email: user_email.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.stream_id.is_empty() && !self.user_id.is_empty() && !self.user_email.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Idle,
    Joining,
    Active,
    Leaving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Local copy of the stream's presence as last reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceView {
    pub viewers: Vec<ViewerSession>,
    pub window_counts: Vec<WindowCount>,
    pub connected: bool,
}

impl PresenceView {
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }
}

struct Shared<T> {
    transport: T,
    context: PresenceContext,
    session_id: String,
    view: watch::Sender<PresenceView>,
}

impl<T: PresenceTransport> Shared<T> {
    async fn send(&self, action: PresenceAction) -> Result<PresenceMutationResponse, AgentError> {
        let request = PresenceRequest {
            action,
            stream_id: self.context.stream_id.clone(),
            user_id: self.context.user_id.clone(),
            session_id: self.session_id.clone(),
            user_email: Some(self.context.user_email.clone()),
        };

        match self.transport.send(&request).await {
            Ok(response) if response.success => {
                self.view.send_modify(|view| {
                    view.viewers = response.viewers.clone();
                    view.window_counts = response.window_counts.clone();
                    view.connected = true;
                });
                Ok(response)
            }
            Ok(_) => {
                self.mark_disconnected();
                Err(AgentError::Unsuccessful(action))
            }
            Err(err) => {
                self.mark_disconnected();
                Err(err)
            }
        }
    }

    fn mark_disconnected(&self) {
        self.view.send_if_modified(|view| {
            let was_connected = view.connected;
            view.connected = false;
            was_connected
        });
    }
}

/// Presence for one tab on one stream.
pub struct PresenceAgent<T: PresenceTransport> {
    shared: Arc<Shared<T>>,
    phase: AgentPhase,
    heartbeat_period: Duration,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl<T: PresenceTransport> PresenceAgent<T> {
    pub fn new(transport: T, context: PresenceContext) -> Self {
        let (view, _) = watch::channel(PresenceView::default());
        Self {
            shared: Arc::new(Shared {
                transport,
                context,
                session_id: new_session_token(),
                view,
            }),
            phase: AgentPhase::Idle,
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            heartbeat_task: None,
        }
    }

    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn context(&self) -> &PresenceContext {
        &self.shared.context
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    pub fn subscribe(&self) -> watch::Receiver<PresenceView> {
        self.shared.view.subscribe()
    }

    pub fn view(&self) -> PresenceView {
        self.shared.view.borrow().clone()
    }

    /// Start watching. A no-op unless the agent is idle.
    pub async fn mount(&mut self) -> Result<(), AgentError> {
        if self.phase != AgentPhase::Idle {
            return Ok(());
        }
        self.join().await
    }

    async fn join(&mut self) -> Result<(), AgentError> {
        if !self.shared.context.is_complete() {
            return Err(AgentError::IncompleteContext);
        }

        self.stop_heartbeat();
        self.phase = AgentPhase::Joining;

        match self.shared.send(PresenceAction::Join).await {
            Ok(response) => {
                info!(
                    component = "agent",
                    event = "agent.joined",
                    stream_id = %self.shared.context.stream_id,
                    session_id = %self.shared.session_id,
                    total_viewers = response.total_viewers,
                    "Joined stream"
                );
                self.phase = AgentPhase::Active;
                self.start_heartbeat();
                Ok(())
            }
            Err(err) => {
                warn!(
                    component = "agent",
                    event = "agent.join_failed",
                    stream_id = %self.shared.context.stream_id,
                    error = %err,
                    "Join failed"
                );
                self.phase = AgentPhase::Idle;
                Err(err)
            }
        }
    }

    /// Send one heartbeat now. Skipped unless active.
    pub async fn heartbeat(&self) -> Result<(), AgentError> {
        if self.phase != AgentPhase::Active {
            debug!(
                component = "agent",
                event = "agent.heartbeat_skipped",
                phase = ?self.phase,
                "Heartbeat skipped while not active"
            );
            return Ok(());
        }
        self.shared.send(PresenceAction::Heartbeat).await.map(|_| ())
    }

    /// Stop heartbeating and withdraw the session. The view is marked
    /// disconnected whatever the server answers.
    pub async fn leave(&mut self) -> Result<(), AgentError> {
        if self.phase == AgentPhase::Idle {
            return Ok(());
        }

        self.stop_heartbeat();
        self.phase = AgentPhase::Leaving;

        let result = self.shared.send(PresenceAction::Leave).await.map(|_| ());
        self.shared.mark_disconnected();
        self.phase = AgentPhase::Idle;

        match &result {
            Ok(()) => info!(
                component = "agent",
                event = "agent.left",
                stream_id = %self.shared.context.stream_id,
                session_id = %self.shared.session_id,
                "Left stream"
            ),
            Err(err) => warn!(
                component = "agent",
                event = "agent.leave_failed",
                stream_id = %self.shared.context.stream_id,
                error = %err,
                "Leave failed"
            ),
        }
        result
    }

    pub async fn set_visibility(&mut self, visibility: Visibility) -> Result<(), AgentError> {
        match visibility {
            Visibility::Hidden => self.leave().await,
            Visibility::Visible if self.phase == AgentPhase::Idle => self.join().await,
            Visibility::Visible => Ok(()),
        }
    }

    /// The page is going away.
    pub async fn unload(&mut self) -> Result<(), AgentError> {
        self.leave().await
    }

    /// Tear the agent down, leaving first.
    pub async fn unmount(mut self) -> Result<(), AgentError> {
        self.leave().await
    }

    fn start_heartbeat(&mut self) {
        let shared = Arc::clone(&self.shared);
        let period = self.heartbeat_period;

        self.heartbeat_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = shared.send(PresenceAction::Heartbeat).await {
                    debug!(
                        component = "agent",
                        event = "agent.heartbeat_failed",
                        stream_id = %shared.context.stream_id,
                        error = %err,
                        "Heartbeat failed"
                    );
                }
            }
        }));
    }

    fn stop_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
    }
}

impl<T: PresenceTransport> Drop for PresenceAgent<T> {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeTransport;

    fn context() -> PresenceContext {
        PresenceContext::new("stream-1", "user-a", "a@example.com")
    }

    #[tokio::test(start_paused = true)]
    async fn mount_joins_then_heartbeats_every_period() {
        let transport = FakeTransport::new();
        let mut agent = PresenceAgent::new(transport.clone(), context());

        agent.mount().await.expect("mount");
        assert_eq!(agent.phase(), AgentPhase::Active);
        assert_eq!(transport.actions(), vec![PresenceAction::Join]);

        let view = agent.view();
        assert!(view.connected);
        assert_eq!(view.viewer_count(), 1);
        assert_eq!(view.window_counts[0].window_count, 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(
            transport.actions(),
            vec![
                PresenceAction::Join,
                PresenceAction::Heartbeat,
                PresenceAction::Heartbeat
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn leave_stops_heartbeats_and_disconnects() {
        let transport = FakeTransport::new();
        let mut agent = PresenceAgent::new(transport.clone(), context());

        agent.mount().await.expect("mount");
        agent.leave().await.expect("leave");
        assert_eq!(agent.phase(), AgentPhase::Idle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(
            transport.actions(),
            vec![PresenceAction::Join, PresenceAction::Leave]
        );

        let view = agent.view();
        assert!(!view.connected);
        assert!(view.viewers.is_empty());
    }

    #[tokio::test]
    async fn requests_carry_context_and_stable_session_id() {
        let transport = FakeTransport::new();
        let mut agent = PresenceAgent::new(transport.clone(), context());
        let session_id = agent.session_id().to_string();

        agent.mount().await.expect("mount");
        agent.heartbeat().await.expect("heartbeat");
        agent.leave().await.expect("leave");

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        for request in requests {
            assert_eq!(request.stream_id, "stream-1");
            assert_eq!(request.user_id, "user-a");
            assert_eq!(request.user_email.as_deref(), Some("a@example.com"));
            assert_eq!(request.session_id, session_id);
        }
    }

    #[tokio::test]
    async fn incomplete_context_never_joins() {
        let transport = FakeTransport::new();
        let mut agent = PresenceAgent::new(
            transport.clone(),
            PresenceContext::new("stream-1", "user-a", ""),
        );

        let err = agent.mount().await.expect_err("missing email");
        assert!(matches!(err, AgentError::IncompleteContext));
        assert_eq!(agent.phase(), AgentPhase::Idle);
        assert!(transport.actions().is_empty());
    }

    #[tokio::test]
    async fn failures_mark_disconnected_until_next_success() {
        let transport = FakeTransport::new();
        let mut agent = PresenceAgent::new(transport.clone(), context());
        let mut updates = agent.subscribe();

        agent.mount().await.expect("mount");
        assert!(updates.borrow_and_update().connected);

        transport.set_failing(true);
        agent.heartbeat().await.expect_err("server down");
        assert!(updates.has_changed().expect("sender alive"));
        assert!(!updates.borrow_and_update().connected);
        assert_eq!(agent.phase(), AgentPhase::Active);

        transport.set_failing(false);
        agent.heartbeat().await.expect("server back");
        assert!(agent.view().connected);
    }

    #[tokio::test]
    async fn failed_join_returns_to_idle() {
        let transport = FakeTransport::new();
        transport.set_failing(true);
        let mut agent = PresenceAgent::new(transport.clone(), context());

        agent.mount().await.expect_err("join fails");
        assert_eq!(agent.phase(), AgentPhase::Idle);
        assert!(!agent.view().connected);

        transport.set_failing(false);
        agent.mount().await.expect("retry");
        assert_eq!(agent.phase(), AgentPhase::Active);
    }

    #[tokio::test]
    async fn hide_and_show_rejoin_with_same_session() {
        let transport = FakeTransport::new();
        transport.add_viewer("stream-1", "user-b", "other-tab");
        let mut agent = PresenceAgent::new(transport.clone(), context());

        agent.mount().await.expect("mount");
        assert_eq!(agent.view().viewer_count(), 2);

        agent
            .set_visibility(Visibility::Hidden)
            .await
            .expect("hide");
        assert_eq!(agent.phase(), AgentPhase::Idle);

        agent
            .set_visibility(Visibility::Visible)
            .await
            .expect("show");
        assert_eq!(agent.phase(), AgentPhase::Active);
        assert_eq!(agent.view().viewer_count(), 2);

        // Already visible: nothing more is sent.
        agent
            .set_visibility(Visibility::Visible)
            .await
            .expect("still visible");

        let requests = transport.requests();
        assert_eq!(
            requests.iter().map(|r| r.action).collect::<Vec<_>>(),
            vec![PresenceAction::Join, PresenceAction::Leave, PresenceAction::Join]
        );
        assert!(requests.iter().all(|r| r.session_id == agent.session_id()));
    }

    #[tokio::test]
    async fn unload_and_unmount_leave_once() {
        let transport = FakeTransport::new();
        let mut agent = PresenceAgent::new(transport.clone(), context());

        agent.mount().await.expect("mount");
        agent.unload().await.expect("unload");
        agent.unmount().await.expect("unmount after unload");

        assert_eq!(
            transport.actions(),
            vec![PresenceAction::Join, PresenceAction::Leave]
        );
    }
}
