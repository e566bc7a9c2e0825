use std::sync::Arc;
use serde::Serialize;
use serde_derive::{Deserialize, Serialize as DeriveSerialize};
use tokio::sync::RwLock;

// State of a single piece index, as reported to peers that send INTEREST.
// There is no rarest-first or endgame mode - a piece is simply one of
// these three things.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveSerialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PieceState {
    Unavailable,
    Downloading,
    Available,
}

// Fixed-size, index-aligned piece table - no frequency/rarest-first
// bookkeeping, since this crate only ever needs to know what state each
// of its own pieces is in, never what its peers hold.
#[derive(Debug)]
pub struct PieceTracker {
    pieces: RwLock<Vec<PieceState>>,
}

impl PieceTracker {

    // All pieces already on disk - used when seeding a completed torrent.
    pub fn new_seeder(piece_count: u32) -> Self {
        Self { pieces: RwLock::new(vec![PieceState::Available; piece_count as usize]) }
    }

    // No pieces on disk yet.
    pub fn new_leecher(piece_count: u32) -> Self {
        Self { pieces: RwLock::new(vec![PieceState::Unavailable; piece_count as usize]) }
    }

    pub async fn set_downloading(&self, idx: u32) {
        let mut pieces = self.pieces.write().await;
        pieces[idx as usize] = PieceState::Downloading;
    }

    pub async fn set_available(&self, idx: u32) {
        let mut pieces = self.pieces.write().await;
        pieces[idx as usize] = PieceState::Available;
    }

    pub async fn set_unavailable(&self, idx: u32) {
        let mut pieces = self.pieces.write().await;
        pieces[idx as usize] = PieceState::Unavailable;
    }

    pub async fn state_of(&self, idx: u32) -> PieceState {
        self.pieces.read().await[idx as usize]
    }

    pub async fn all_available(&self) -> bool {
        self.pieces.read().await.iter().all(|s| *s == PieceState::Available)
    }

    pub async fn missing_count(&self) -> u32 {
        self.pieces.read().await.iter().filter(|s| **s != PieceState::Available).count() as u32
    }

    // Snapshot served in response to a HAVING request: a JSON object
    // mapping stringified piece index to its state.
    pub async fn snapshot(&self) -> PieceSnapshot {
        let pieces = self.pieces.read().await;
        PieceSnapshot(
            pieces.iter()
                .enumerate()
                .map(|(idx, state)| (idx.to_string(), *state))
                .collect(),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct PieceSnapshot(std::collections::BTreeMap<String, PieceState>);

impl PieceSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }
}

pub type PieceTrackerHandle = Arc<PieceTracker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeder_starts_all_available() {
        let tracker = PieceTracker::new_seeder(4);
        assert!(tracker.all_available().await);
        assert_eq!(tracker.missing_count().await, 0);
    }

    #[tokio::test]
    async fn leecher_transitions_through_states() {
        let tracker = PieceTracker::new_leecher(2);
        assert_eq!(tracker.state_of(0).await, PieceState::Unavailable);
        tracker.set_downloading(0).await;
        assert_eq!(tracker.state_of(0).await, PieceState::Downloading);
        tracker.set_available(0).await;
        assert_eq!(tracker.state_of(0).await, PieceState::Available);
        assert!(!tracker.all_available().await);
        tracker.set_available(1).await;
        assert!(tracker.all_available().await);
    }

    #[tokio::test]
    async fn snapshot_serializes_as_index_to_state_map() {
        let tracker = PieceTracker::new_leecher(2);
        tracker.set_available(0).await;
        let json = tracker.snapshot().await.to_json().unwrap();
        assert_eq!(json, r#"{"0":"AVAILABLE","1":"UNAVAILABLE"}"#);
    }
}
