use std::sync::Arc;
use tokio::sync::Mutex;
use crate::identity::PeerIdentity;

// Announce event, modelled as an exhaustive enum rather than bare strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Started,
    Stopped,
    ReAnnounce,
    None,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Event::Started => "started",
            Event::Stopped => "stopped",
            Event::ReAnnounce => "re_announce",
            Event::None => "none",
        };
        f.write_str(s)
    }
}

// Mutable per-peer bookkeeping: identity, the torrent it's bound to, and
// the counters/event that go out with every announce. Exclusive mutation
// only - readers take a shared view through `PeerStateHandle`.
#[derive(Debug, Clone)]
pub struct PeerState {

    pub identity: PeerIdentity,

    pub info_hash: [u8; 20],

    // Counters are in pieces, not bytes.
    pub uploaded: u64,

    pub downloaded: u64,

    pub left: u32,

    pub event: Event,
}

impl PeerState {

    pub fn new_seeder(identity: PeerIdentity, info_hash: [u8; 20]) -> Self {
        Self { identity, info_hash, uploaded: 0, downloaded: 0, left: 0, event: Event::None }
    }

    pub fn new_leecher(identity: PeerIdentity, info_hash: [u8; 20], piece_count: u32) -> Self {
        Self { identity, info_hash, uploaded: 0, downloaded: 0, left: piece_count as u32, event: Event::None }
    }

    pub fn completed(&self) -> bool {
        self.left == 0
    }
}

// Shared handle to the single peer-state lock.
#[derive(Debug, Clone)]
pub struct PeerStateHandle(Arc<Mutex<PeerState>>);

impl PeerStateHandle {

    pub fn new(state: PeerState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, PeerState> {
        self.0.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use crate::identity::PeerId;

    fn identity() -> PeerIdentity {
        PeerIdentity {
            peer_id: PeerId::generate(b"RS001"),
            peer_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            peer_port: 6881,
        }
    }

    #[test]
    fn seeder_starts_completed() {
        let state = PeerState::new_seeder(identity(), [0; 20]);
        assert!(state.completed());
    }

    #[test]
    fn leecher_completes_when_left_reaches_zero() {
        let mut state = PeerState::new_leecher(identity(), [0; 20], 3);
        assert!(!state.completed());
        state.left -= 3;
        assert!(state.completed());
    }

    #[tokio::test]
    async fn handle_allows_exclusive_mutation_across_tasks() {
        let handle = PeerStateHandle::new(PeerState::new_leecher(identity(), [0; 20], 1));
        {
            let mut guard = handle.lock().await;
            guard.downloaded += 1;
            guard.left -= 1;
        }
        assert!(handle.lock().await.completed());
    }
}
