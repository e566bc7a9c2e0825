use std::collections::HashMap;
use std::time::{Duration, Instant};
use serde_derive::Serialize;
use tokio::sync::RwLock;

pub type InfoHash = [u8; 20];

// One peer's last-announced fields plus the bookkeeping the cleaner
// needs. Field names mirror the announce query parameters, per the
// tracker's single "peer fields are the same on the way in and out" rule.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedPeer {
    pub peer_id: String,
    pub peer_ip: String,
    pub peer_port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u32,

    #[serde(skip)]
    pub last_announce_time: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReAnnounceOutcome {
    Updated,
    Reinserted,
}

// Keyed map from torrent identity to the live set of peers. One lock over
// the whole structure rather than a sharded map.
#[derive(Debug, Default)]
pub struct SwarmRegistry {
    swarms: RwLock<HashMap<InfoHash, HashMap<String, TrackedPeer>>>,
}

impl SwarmRegistry {

    pub fn new() -> Self {
        Self { swarms: RwLock::new(HashMap::new()) }
    }

    // STARTED: insert, creating the swarm if absent. A duplicate peer_id
    // overwrites the existing record.
    pub async fn started(&self, info_hash: InfoHash, peer: TrackedPeer) {
        let mut swarms = self.swarms.write().await;
        swarms.entry(info_hash).or_default().insert(peer.peer_id.clone(), peer);
    }

    // STOPPED: remove the peer; drop the swarm entry if it's now empty.
    pub async fn stopped(&self, info_hash: InfoHash, peer_id: &str) {
        let mut swarms = self.swarms.write().await;
        if let Some(swarm) = swarms.get_mut(&info_hash) {
            swarm.remove(peer_id);
            if swarm.is_empty() {
                swarms.remove(&info_hash);
            }
        }
    }

    // RE_ANNOUNCE: update in place and refresh the announce time if
    // found; otherwise reinsert as if STARTED (covers eviction by the
    // cleaner racing with a re-announce).
    pub async fn re_announce(&self, info_hash: InfoHash, peer: TrackedPeer) -> ReAnnounceOutcome {
        let mut swarms = self.swarms.write().await;
        let swarm = swarms.entry(info_hash).or_default();
        let outcome = if swarm.contains_key(&peer.peer_id) {
            ReAnnounceOutcome::Updated
        } else {
            ReAnnounceOutcome::Reinserted
        };
        swarm.insert(peer.peer_id.clone(), peer);
        outcome
    }

    pub async fn snapshot(&self, info_hash: InfoHash) -> Vec<TrackedPeer> {
        let swarms = self.swarms.read().await;
        swarms.get(&info_hash).map(|s| s.values().cloned().collect()).unwrap_or_default()
    }

    // Removes every peer whose `last_announce_time` is older than
    // `threshold`, dropping any swarm left empty. Returns the number of
    // peers evicted.
    pub async fn evict_stale(&self, threshold: Duration) -> usize {
        let now = Instant::now();
        let mut swarms = self.swarms.write().await;
        let mut evicted = 0;

        swarms.retain(|_info_hash, swarm| {
            swarm.retain(|_peer_id, peer| {
                let stale = now.duration_since(peer.last_announce_time) >= threshold;
                if stale {
                    evicted += 1;
                }
                !stale
            });
            !swarm.is_empty()
        });

        evicted
    }

    #[cfg(test)]
    pub async fn swarm_count(&self) -> usize {
        self.swarms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str) -> TrackedPeer {
        TrackedPeer {
            peer_id: id.to_string(),
            peer_ip: "127.0.0.1".to_string(),
            peer_port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 3,
            last_announce_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn started_then_started_again_replaces_fields() {
        let registry = SwarmRegistry::new();
        let info_hash = [1u8; 20];
        registry.started(info_hash, peer("p1")).await;

        let mut updated = peer("p1");
        updated.left = 0;
        registry.started(info_hash, updated).await;

        let snapshot = registry.snapshot(info_hash).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].left, 0);
    }

    #[tokio::test]
    async fn stopped_is_idempotent_and_drops_empty_swarm() {
        let registry = SwarmRegistry::new();
        let info_hash = [2u8; 20];
        registry.started(info_hash, peer("p1")).await;

        registry.stopped(info_hash, "p1").await;
        assert_eq!(registry.swarm_count().await, 0);

        registry.stopped(info_hash, "p1").await;
        assert_eq!(registry.swarm_count().await, 0);
    }

    #[tokio::test]
    async fn re_announce_reinserts_when_evicted() {
        let registry = SwarmRegistry::new();
        let info_hash = [3u8; 20];

        let outcome = registry.re_announce(info_hash, peer("p1")).await;
        assert_eq!(outcome, ReAnnounceOutcome::Reinserted);

        let outcome = registry.re_announce(info_hash, peer("p1")).await;
        assert_eq!(outcome, ReAnnounceOutcome::Updated);
    }

    #[tokio::test]
    async fn evict_stale_removes_peers_past_threshold() {
        let registry = SwarmRegistry::new();
        let info_hash = [4u8; 20];

        let mut stale_peer = peer("stale");
        stale_peer.last_announce_time = Instant::now() - Duration::from_secs(200);
        registry.started(info_hash, stale_peer).await;
        registry.started(info_hash, peer("fresh")).await;

        let evicted = registry.evict_stale(Duration::from_secs(90)).await;
        assert_eq!(evicted, 1);

        let snapshot = registry.snapshot(info_hash).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].peer_id, "fresh");
    }
}
