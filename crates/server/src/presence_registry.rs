//! Presence registry — who is watching which stream, right now.
//!
//! One table per process, keyed by stream id, holding one entry per
//! (user, tab) pair. Every mutation runs under a single lock so a reader never
//! observes a half-filtered stream list. Nothing here is persisted.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;
use viewdeck_protocol::{now_millis, ViewerSession, WindowCount};

/// Sessions not refreshed for this long are evicted by the reaper.
pub const STALE_THRESHOLD_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    stream_id: String,
    user_id: String,
    session_id: String,
}

impl SessionKey {
    fn new(stream_id: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    streams: HashMap<String, Vec<ViewerSession>>,
    /// Sessions that explicitly left, with the time they left. A heartbeat for
    /// one of these is a straggler and must not bring the session back.
    departed: HashMap<SessionKey, u64>,
}

impl Table {
    fn touch(
        &mut self,
        stream_id: &str,
        user_id: &str,
        user_email: &str,
        session_id: &str,
        now: u64,
    ) -> Vec<ViewerSession> {
        let sessions = self.streams.entry(stream_id.to_string()).or_default();
        match sessions
            .iter_mut()
            .find(|viewer| viewer.is_session(user_id, session_id))
        {
            Some(existing) => {
                existing.last_seen_at = existing.last_seen_at.max(now);
                existing.user_email = user_email.to_string();
            }
            None => sessions.push(ViewerSession {
                stream_id: stream_id.to_string(),
                user_id: user_id.to_string(),
                user_email: user_email.to_string(),
                session_id: session_id.to_string(),
                last_seen_at: now,
            }),
        }
        sessions.clone()
    }

    fn sessions(&self, stream_id: &str) -> Vec<ViewerSession> {
        self.streams.get(stream_id).cloned().unwrap_or_default()
    }
}

/// All streams at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub viewers: BTreeMap<String, Vec<ViewerSession>>,
    pub window_counts: BTreeMap<String, Vec<WindowCount>>,
}

/// Process-wide table of active viewing sessions.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    table: Mutex<Table>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // Every mutation leaves the table consistent before it can panic, so a
        // poisoned lock still guards valid data.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or refresh one tab's session and return the stream's viewers.
    ///
    /// A join is an explicit re-registration, so it also clears any leave
    /// fence for the same tab.
    pub fn upsert(
        &self,
        stream_id: &str,
        user_id: &str,
        user_email: &str,
        session_id: &str,
    ) -> Vec<ViewerSession> {
        self.upsert_at(stream_id, user_id, user_email, session_id, now_millis())
    }

    pub fn upsert_at(
        &self,
        stream_id: &str,
        user_id: &str,
        user_email: &str,
        session_id: &str,
        now: u64,
    ) -> Vec<ViewerSession> {
        let mut table = self.lock();
        table
            .departed
            .remove(&SessionKey::new(stream_id, user_id, session_id));
        table.touch(stream_id, user_id, user_email, session_id, now)
    }

    /// Refresh a tab's session unless that tab has already left.
    ///
    /// Heartbeats race with leaves over the network; one that lands after the
    /// leave for the same tab is dropped instead of resurrecting the session.
    pub fn heartbeat(
        &self,
        stream_id: &str,
        user_id: &str,
        user_email: &str,
        session_id: &str,
    ) -> Vec<ViewerSession> {
        self.heartbeat_at(stream_id, user_id, user_email, session_id, now_millis())
    }

    pub fn heartbeat_at(
        &self,
        stream_id: &str,
        user_id: &str,
        user_email: &str,
        session_id: &str,
        now: u64,
    ) -> Vec<ViewerSession> {
        let mut table = self.lock();
        if table
            .departed
            .contains_key(&SessionKey::new(stream_id, user_id, session_id))
        {
            debug!(
                component = "presence",
                event = "presence.heartbeat.fenced",
                stream_id = %stream_id,
                user_id = %user_id,
                session_id = %session_id,
                "Ignoring heartbeat for a session that already left"
            );
            return table.sessions(stream_id);
        }
        table.touch(stream_id, user_id, user_email, session_id, now)
    }

    /// Drop one tab's session. Removing an absent session is a no-op.
    pub fn remove(&self, stream_id: &str, user_id: &str, session_id: &str) -> Vec<ViewerSession> {
        self.remove_at(stream_id, user_id, session_id, now_millis())
    }

    pub fn remove_at(
        &self,
        stream_id: &str,
        user_id: &str,
        session_id: &str,
        now: u64,
    ) -> Vec<ViewerSession> {
        let mut table = self.lock();
        table
            .departed
            .insert(SessionKey::new(stream_id, user_id, session_id), now);

        let Some(sessions) = table.streams.get_mut(stream_id) else {
            return Vec::new();
        };
        sessions.retain(|viewer| !viewer.is_session(user_id, session_id));
        if sessions.is_empty() {
            table.streams.remove(stream_id);
            return Vec::new();
        }
        sessions.clone()
    }

    pub fn list_for_stream(&self, stream_id: &str) -> Vec<ViewerSession> {
        self.lock().sessions(stream_id)
    }

    /// Every stream's sessions and window counts, read under one lock so the
    /// two maps always describe the same table.
    pub fn snapshot(&self) -> PresenceSnapshot {
        let table = self.lock();
        let mut snapshot = PresenceSnapshot::default();
        for (stream_id, sessions) in &table.streams {
            snapshot
                .window_counts
                .insert(stream_id.clone(), count_windows(sessions));
            snapshot.viewers.insert(stream_id.clone(), sessions.clone());
        }
        snapshot
    }

    #[cfg(test)]
    pub fn list_all(&self) -> BTreeMap<String, Vec<ViewerSession>> {
        self.snapshot().viewers
    }

    #[cfg(test)]
    pub fn window_counts_all(&self) -> BTreeMap<String, Vec<WindowCount>> {
        self.snapshot().window_counts
    }

    #[cfg(test)]
    pub fn viewer_count(&self, stream_id: &str) -> usize {
        self.lock().streams.get(stream_id).map_or(0, Vec::len)
    }

    #[cfg(test)]
    pub fn window_counts(&self, stream_id: &str) -> Vec<WindowCount> {
        count_windows(&self.list_for_stream(stream_id))
    }

    /// Evict every session with `now - last_seen_at >= threshold_ms` and
    /// forget leave fences of the same age. Returns how many sessions went.
    pub fn evict_stale_sessions(&self, now: u64, threshold_ms: u64) -> usize {
        let mut table = self.lock();
        let mut evicted = 0;

        table.streams.retain(|_, sessions| {
            let before = sessions.len();
            sessions.retain(|viewer| now.saturating_sub(viewer.last_seen_at) < threshold_ms);
            evicted += before - sessions.len();
            !sessions.is_empty()
        });
        table
            .departed
            .retain(|_, left_at| now.saturating_sub(*left_at) < threshold_ms);

        evicted
    }

    #[cfg(test)]
    fn is_fenced(&self, stream_id: &str, user_id: &str, session_id: &str) -> bool {
        self.lock()
            .departed
            .contains_key(&SessionKey::new(stream_id, user_id, session_id))
    }
}

/// Group a stream's sessions by user, in order of each user's first session.
pub fn count_windows(sessions: &[ViewerSession]) -> Vec<WindowCount> {
    let mut counts: Vec<WindowCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for viewer in sessions {
        match index.get(viewer.user_id.as_str()) {
            Some(&i) => counts[i].window_count += 1,
            None => {
                index.insert(viewer.user_id.as_str(), counts.len());
                counts.push(WindowCount {
                    user_id: viewer.user_id.clone(),
                    user_email: viewer.user_email.clone(),
                    window_count: 1,
                });
            }
        }
    }

    counts
}
