// Per-peer link state machine with the invitation tie-break
//
// Both sides of a discovered pair see each other at roughly the same moment
// and could both dial. The rule: only the node whose identity string sorts
// lexicographically before the peer's sends the invitation; the other side
// only accepts. Deterministic, symmetric, no coordinator.
//
// The tracker works on opaque identity strings so every transport can reuse
// it: the in-memory hub feeds it display names, the libp2p mesh feeds it
// peer ids.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Discovered,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug)]
pub struct LinkTracker {
    local: String,
    links: HashMap<String, LinkState>,
}

impl LinkTracker {
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            links: HashMap::new(),
        }
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn state(&self, peer: &str) -> Option<LinkState> {
        self.links.get(peer).copied()
    }

    /// A peer appeared in discovery. Returns `true` iff this node should
    /// send the invitation (tie-break passed and no attempt is in flight).
    pub fn on_discovered(&mut self, peer: &str) -> bool {
        if peer == self.local {
            return false;
        }
        if matches!(
            self.links.get(peer),
            Some(LinkState::Connecting | LinkState::Connected)
        ) {
            return false;
        }
        self.links.insert(peer.to_string(), LinkState::Discovered);
        self.local.as_str() < peer
    }

    /// An invitation arrived. Accept unless a link is already up.
    pub fn on_invited(&mut self, peer: &str) -> bool {
        if matches!(self.links.get(peer), Some(LinkState::Connected)) {
            return false;
        }
        self.links.insert(peer.to_string(), LinkState::Connecting);
        true
    }

    pub fn on_connecting(&mut self, peer: &str) {
        self.links.insert(peer.to_string(), LinkState::Connecting);
    }

    /// Returns `true` if this is a fresh connection (not a duplicate event)
    pub fn on_connected(&mut self, peer: &str) -> bool {
        self.links.insert(peer.to_string(), LinkState::Connected) != Some(LinkState::Connected)
    }

    /// Link lost or attempt failed. The entry drops back to `Disconnected`
    /// so a later rediscovery can invite again.
    pub fn on_disconnected(&mut self, peer: &str) {
        self.links.insert(peer.to_string(), LinkState::Disconnected);
    }

    pub fn is_connected(&self, peer: &str) -> bool {
        self.state(peer) == Some(LinkState::Connected)
    }

    pub fn connected(&self) -> Vec<String> {
        let mut peers: Vec<String> = self
            .links
            .iter()
            .filter(|(_, s)| **s == LinkState::Connected)
            .map(|(p, _)| p.clone())
            .collect();
        peers.sort();
        peers
    }

    /// Stop of discovery/advertising: every in-flight attempt collapses to
    /// disconnected. Idempotent.
    pub fn clear(&mut self) {
        for state in self.links.values_mut() {
            *state = LinkState::Disconnected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tie_break_exactly_one_initiator() {
        let mut alex = LinkTracker::new("Alex");
        let mut jordan = LinkTracker::new("Jordan");

        // Simultaneous discovery: Alex sorts first, so only Alex invites
        assert!(alex.on_discovered("Jordan"));
        assert!(!jordan.on_discovered("Alex"));
    }

    #[test]
    fn test_tie_break_is_symmetric_rule_not_race() {
        // Whichever order discovery fires in, the initiator is the same
        let mut jordan = LinkTracker::new("Jordan");
        let mut alex = LinkTracker::new("Alex");

        assert!(!jordan.on_discovered("Alex"));
        assert!(alex.on_discovered("Jordan"));
    }

    #[test]
    fn test_no_duplicate_invite_while_connecting() {
        let mut alex = LinkTracker::new("Alex");

        assert!(alex.on_discovered("Jordan"));
        alex.on_connecting("Jordan");

        // mDNS can re-announce while the dial is in flight
        assert!(!alex.on_discovered("Jordan"));
    }

    #[test]
    fn test_no_invite_when_already_connected() {
        let mut alex = LinkTracker::new("Alex");
        alex.on_connected("Jordan");

        assert!(!alex.on_discovered("Jordan"));
    }

    #[test]
    fn test_self_discovery_ignored() {
        let mut alex = LinkTracker::new("Alex");
        assert!(!alex.on_discovered("Alex"));
        assert!(alex.state("Alex").is_none());
    }

    #[test]
    fn test_reconnect_after_disconnect() {
        let mut alex = LinkTracker::new("Alex");

        assert!(alex.on_discovered("Jordan"));
        alex.on_connected("Jordan");
        alex.on_disconnected("Jordan");

        // Peer walks back into range
        assert!(alex.on_discovered("Jordan"));
    }

    #[test]
    fn test_connected_dedupes_events() {
        let mut alex = LinkTracker::new("Alex");
        assert!(alex.on_connected("Jordan"));
        assert!(!alex.on_connected("Jordan"));
    }

    #[test]
    fn test_invited_accepted_unless_connected() {
        let mut jordan = LinkTracker::new("Jordan");
        assert!(jordan.on_invited("Alex"));

        jordan.on_connected("Alex");
        assert!(!jordan.on_invited("Alex"));
    }

    #[test]
    fn test_clear_collapses_in_flight_attempts() {
        let mut alex = LinkTracker::new("Alex");
        alex.on_connecting("Jordan");
        alex.on_connected("Sam");

        alex.clear();
        alex.clear(); // idempotent

        assert_eq!(alex.state("Jordan"), Some(LinkState::Disconnected));
        assert_eq!(alex.state("Sam"), Some(LinkState::Disconnected));
        assert!(alex.connected().is_empty());
    }

    #[test]
    fn test_connected_list_sorted() {
        let mut t = LinkTracker::new("A");
        t.on_connected("Zoe");
        t.on_connected("Ben");

        assert_eq!(t.connected(), vec!["Ben".to_string(), "Zoe".to_string()]);
    }
}
