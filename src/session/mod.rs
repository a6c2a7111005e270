//! Per-connection session state for stateful rule evaluation.
//!
//! The tracker owns the session map; mutation for a given connection key is
//! serialized by the map's shard lock while different keys proceed in
//! parallel. Flowbits (chain-rule state) and request history live on the
//! session and die with it.

use crate::rules::rule::{FlowDirection, Protocol};
use ahash::AHashSet;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Connection identifier: 4-tuple plus protocol
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnKey {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub protocol: Protocol,
}

impl fmt::Display for ConnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{}",
            self.protocol, self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    New,
    Established,
    Closed,
}

/// Compact record of one observed request, kept in the bounded history ring
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub timestamp: DateTime<Utc>,
    pub direction: FlowDirection,
    pub payload_len: usize,
    pub uri: Option<String>,
}

/// Mutable per-connection state
#[derive(Debug)]
pub struct Session {
    pub id: u64,
    pub state: SessionState,
    pub last_direction: Option<FlowDirection>,
    pub last_seen: DateTime<Utc>,
    created: DateTime<Utc>,
    seen_to_server: bool,
    seen_to_client: bool,
    history: VecDeque<RequestSummary>,
    history_depth: usize,
    flowbits: AHashSet<String>,
}

impl Session {
    fn new(id: u64, now: DateTime<Utc>, history_depth: usize) -> Self {
        Self {
            id,
            state: SessionState::New,
            last_direction: None,
            last_seen: now,
            created: now,
            seen_to_server: false,
            seen_to_client: false,
            history: VecDeque::with_capacity(history_depth.min(16)),
            history_depth,
            flowbits: AHashSet::new(),
        }
    }

    fn observe(&mut self, direction: FlowDirection, now: DateTime<Utc>) {
        self.last_seen = now;
        self.last_direction = Some(direction);
        match direction {
            FlowDirection::ToServer => self.seen_to_server = true,
            FlowDirection::ToClient => self.seen_to_client = true,
        }
        // No handshake signal reaches this core; a flow counts as established
        // once traffic has been seen in both directions.
        if self.state == SessionState::New && self.seen_to_server && self.seen_to_client {
            self.state = SessionState::Established;
        }
    }

    /// Force the established state (caller saw handshake completion)
    pub fn mark_established(&mut self) {
        if self.state == SessionState::New {
            self.state = SessionState::Established;
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created
    }

    pub fn set_flowbit(&mut self, name: &str) -> bool {
        self.flowbits.insert(name.to_string())
    }

    pub fn unset_flowbit(&mut self, name: &str) -> bool {
        self.flowbits.remove(name)
    }

    pub fn has_flowbit(&self, name: &str) -> bool {
        self.flowbits.contains(name)
    }

    /// Append a request summary, evicting the oldest entry at capacity
    pub fn push_history(&mut self, summary: RequestSummary) {
        if self.history_depth == 0 {
            return;
        }
        while self.history.len() >= self.history_depth {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }

    pub fn history(&self) -> impl Iterator<Item = &RequestSummary> {
        self.history.iter()
    }
}

/// Session map with idle expiry
pub struct SessionTracker {
    sessions: DashMap<ConnKey, Session>,
    next_id: AtomicU64,
    history_depth: usize,
    idle_timeout: Duration,
}

impl SessionTracker {
    pub fn new(idle_timeout: Duration, history_depth: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            history_depth,
            idle_timeout,
        }
    }

    fn fresh(&self, now: DateTime<Utc>) -> Session {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Session::new(id, now, self.history_depth)
    }

    /// Observe one segment: create-or-update the session for the key and
    /// return it (still locked) for the evaluator to consult. A segment on a
    /// closed or idle-expired key starts a brand-new session.
    pub fn observe(
        &self,
        key: &ConnKey,
        direction: FlowDirection,
        now: DateTime<Utc>,
    ) -> RefMut<'_, ConnKey, Session> {
        let mut entry = self
            .sessions
            .entry(key.clone())
            .or_insert_with(|| self.fresh(now));

        let expired = now - entry.last_seen > self.idle_timeout;
        if entry.state == SessionState::Closed || expired {
            trace!(conn = %key, session = entry.id, expired, "replacing stale session");
            *entry.value_mut() = self.fresh(now);
        }

        entry.observe(direction, now);
        entry
    }

    /// Mark the session closed; no further alerts are produced for it and the
    /// next segment on the key starts fresh
    pub fn close(&self, key: &ConnKey) {
        if let Some(mut session) = self.sessions.get_mut(key) {
            session.state = SessionState::Closed;
        }
    }

    /// Purge sessions idle past the configured timeout; returns removed count
    pub fn expire(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            session.state != SessionState::Closed
                && now - session.last_seen <= self.idle_timeout
        });
        let removed = before - self.sessions.len();
        if removed > 0 {
            debug!(removed, remaining = self.sessions.len(), "expired idle sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn key() -> ConnKey {
        ConnKey {
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
            src_port: 49152,
            dst_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            dst_port: 80,
            protocol: Protocol::Tcp,
        }
    }

    fn tracker() -> SessionTracker {
        SessionTracker::new(Duration::seconds(60), 8)
    }

    #[test]
    fn test_established_after_both_directions() {
        let tracker = tracker();
        let now = Utc::now();

        let state = tracker.observe(&key(), FlowDirection::ToServer, now).state;
        assert_eq!(state, SessionState::New);

        tracker.observe(&key(), FlowDirection::ToClient, now);
        let state = tracker.observe(&key(), FlowDirection::ToServer, now).state;
        assert_eq!(state, SessionState::Established);
    }

    #[test]
    fn test_idle_expiry_creates_fresh_session() {
        let tracker = tracker();
        let now = Utc::now();

        let first_id = {
            let mut session = tracker.observe(&key(), FlowDirection::ToServer, now);
            session.set_flowbit("stage1");
            session.id
        };

        let later = now + Duration::seconds(120);
        assert_eq!(tracker.expire(later), 1);
        assert!(tracker.is_empty());

        let session = tracker.observe(&key(), FlowDirection::ToServer, later);
        assert_ne!(session.id, first_id);
        assert_eq!(session.state, SessionState::New);
        assert!(!session.has_flowbit("stage1"));
    }

    #[test]
    fn test_observe_replaces_expired_in_place() {
        // Even without an expire() sweep, a segment past the idle timeout
        // must start a fresh session.
        let tracker = tracker();
        let now = Utc::now();

        let first_id = tracker.observe(&key(), FlowDirection::ToServer, now).id;
        let later = now + Duration::seconds(3600);
        let session = tracker.observe(&key(), FlowDirection::ToServer, later);
        assert_ne!(session.id, first_id);
        assert_eq!(session.state, SessionState::New);
    }

    #[test]
    fn test_close_then_fresh() {
        let tracker = tracker();
        let now = Utc::now();

        let first_id = tracker.observe(&key(), FlowDirection::ToServer, now).id;
        tracker.close(&key());

        let session = tracker.observe(&key(), FlowDirection::ToServer, now);
        assert_ne!(session.id, first_id);
    }

    #[test]
    fn test_history_is_bounded() {
        let tracker = SessionTracker::new(Duration::seconds(60), 3);
        let now = Utc::now();
        let mut session = tracker.observe(&key(), FlowDirection::ToServer, now);

        for i in 0..5 {
            session.push_history(RequestSummary {
                timestamp: now,
                direction: FlowDirection::ToServer,
                payload_len: i,
                uri: None,
            });
        }

        let lens: Vec<usize> = session.history().map(|s| s.payload_len).collect();
        assert_eq!(lens, vec![2, 3, 4]);
    }

    #[test]
    fn test_flowbits() {
        let tracker = tracker();
        let mut session = tracker.observe(&key(), FlowDirection::ToServer, Utc::now());

        assert!(session.set_flowbit("dvwa.csrf.page"));
        assert!(!session.set_flowbit("dvwa.csrf.page"));
        assert!(session.has_flowbit("dvwa.csrf.page"));
        assert!(session.unset_flowbit("dvwa.csrf.page"));
        assert!(!session.has_flowbit("dvwa.csrf.page"));
    }
}
