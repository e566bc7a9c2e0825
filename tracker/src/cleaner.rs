use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;
use crate::registry::SwarmRegistry;

pub const CHECKING_TIME: Duration = Duration::from_secs(10);
pub const THRESHOLD: Duration = Duration::from_secs(90);

// Background eviction loop. Eviction itself is infallible - there is
// nothing in the hot path that can fail or panic.
pub fn spawn(registry: Arc<SwarmRegistry>) -> JoinHandle<()> {
    spawn_with_period(registry, CHECKING_TIME, THRESHOLD)
}

pub fn spawn_with_period(registry: Arc<SwarmRegistry>, checking_time: Duration, threshold: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(checking_time);
        loop {
            interval.tick().await;
            let evicted = registry.evict_stale(threshold).await;
            if evicted > 0 {
                tracing::info!(evicted, "cleaner evicted stale peers");
            }
        }
    }.instrument(tracing::info_span!("cleaner")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TrackedPeer;
    use std::time::Instant;

    #[tokio::test]
    async fn cleaner_evicts_on_its_own_schedule() {
        let registry = Arc::new(SwarmRegistry::new());
        let info_hash = [9u8; 20];

        registry.started(info_hash, TrackedPeer {
            peer_id: "stale".to_string(),
            peer_ip: "127.0.0.1".to_string(),
            peer_port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 1,
            last_announce_time: Instant::now() - Duration::from_millis(50),
        }).await;

        let handle = spawn_with_period(registry.clone(), Duration::from_millis(10), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(registry.snapshot(info_hash).await.len(), 0);
    }
}
