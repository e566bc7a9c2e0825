use std::time::Duration;
use serde_derive::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::Instrument;
use url::Url;
use crate::identity::PeerId;
use crate::state::{Event, PeerStateHandle};

const DEFAULT_INTERVAL: u64 = 60;
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum AnnouncerError {

    #[error("tracker request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("tracker unreachable: {0}")]
    TrackerUnreachable(String),

    #[error("error decoding tracker response: {0}")]
    DecodeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnnouncerError>;

// One entry of the swarm list returned by the tracker, with the same
// field names it was announced with.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnnouncedPeer {
    pub peer_id: String,
    pub peer_ip: String,
    pub peer_port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u32,
}

#[derive(Debug, Deserialize)]
struct AnnounceResponse {
    interval: u64,
    #[serde(default)]
    peers: Vec<AnnouncedPeer>,
}

// Shared swarm view the talker reads - replaced wholesale under lock by
// the announcer rather than swapped by reference, per the design note on
// avoiding handing raw references to the talker across replacements.
pub type SwarmView = std::sync::Arc<RwLock<Vec<AnnouncedPeer>>>;

// Builds the announce query with `reqwest`, GETs it, decodes the JSON
// response - one tracker URL, no tiers.
pub struct Announcer {
    client: reqwest::Client,
    announce_url: Url,
    state: PeerStateHandle,
    swarm: SwarmView,
}

impl Announcer {

    pub fn new(announce_url: Url, state: PeerStateHandle) -> Self {
        // A tracker that accepts the connection but never responds must
        // not hang the announce call forever - §5 requires a finite
        // timeout on every HTTP call.
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client builder with only a timeout never fails");
        Self {
            client,
            announce_url,
            state,
            swarm: std::sync::Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn swarm_view(&self) -> SwarmView {
        self.swarm.clone()
    }

    #[tracing::instrument(skip(self))]
    pub async fn started_announce(&self) -> Result<(u64, Vec<AnnouncedPeer>)> {
        {
            let mut state = self.state.lock().await;
            state.event = Event::Started;
        }
        let (interval, peers) = self.do_announce().await
            .map_err(|e| AnnouncerError::TrackerUnreachable(e.to_string()))?;
        *self.swarm.write().await = peers.clone();
        Ok((interval, peers))
    }

    // Best-effort: a failure here is logged, never propagated, per the
    // "not fatal to process shutdown" rule - this holds even if called
    // with no prior successful announce.
    #[tracing::instrument(skip(self))]
    pub async fn stop_announce(&self) {
        {
            let mut state = self.state.lock().await;
            state.event = Event::Stopped;
        }
        if let Err(e) = self.do_announce().await {
            tracing::warn!(error = %e, "stop_announce failed, continuing shutdown");
        }
    }

    // Background loop: sleep `interval`, re-announce, replace the shared
    // swarm list in place. Transient failures log and keep the previous
    // interval; persistent failure just means no new peers are discovered.
    pub fn spawn_reannounce_loop(self: std::sync::Arc<Self>, mut initial_interval: u64) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(initial_interval)).await;

                {
                    let mut state = self.state.lock().await;
                    state.event = Event::ReAnnounce;
                }

                match self.do_announce().await {
                    Ok((interval, peers)) => {
                        *self.swarm.write().await = peers;
                        initial_interval = interval;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "re-announce failed, retaining previous interval");
                    }
                }
            }
        }.instrument(tracing::info_span!("announcer")))
    }

    async fn do_announce(&self) -> Result<(u64, Vec<AnnouncedPeer>)> {
        let (info_hash, peer_id, peer_ip, peer_port, uploaded, downloaded, left, event) = {
            let state = self.state.lock().await;
            (
                hex::encode(state.info_hash),
                state.identity.peer_id.to_string(),
                state.identity.peer_ip.to_string(),
                state.identity.peer_port,
                state.uploaded,
                state.downloaded,
                state.left,
                state.event,
            )
        };

        let url = self.announce_url.clone();
        let response = self.client
            .get(url)
            .query(&[
                ("info_hash", info_hash.as_str()),
                ("peer_id", peer_id.as_str()),
                ("peer_ip", peer_ip.as_str()),
                ("peer_port", &peer_port.to_string()),
                ("uploaded", &uploaded.to_string()),
                ("downloaded", &downloaded.to_string()),
                ("left", &left.to_string()),
                ("event", &event.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AnnouncerError::TrackerUnreachable(response.status().to_string()));
        }

        let parsed: AnnounceResponse = response.json().await?;
        tracing::debug!(interval = parsed.interval, num_peers = parsed.peers.len(), "announce ok");
        Ok((parsed.interval, parsed.peers))
    }
}

pub fn default_interval() -> u64 {
    DEFAULT_INTERVAL
}

// Convenience used by the talker to recognise its own identity in the
// swarm list.
pub fn is_self(peer: &AnnouncedPeer, self_id: &PeerId) -> bool {
    peer.peer_id == self_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_peers_default_to_empty_when_absent() {
        let raw = r#"{"interval": 60}"#;
        let resp: AnnounceResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.interval, 60);
        assert!(resp.peers.is_empty());
    }

    #[test]
    fn response_parses_peer_list() {
        let raw = r#"{"interval": 60, "peers": [
            {"peer_id": "RS0010000000000000001", "peer_ip": "127.0.0.1", "peer_port": 6881, "uploaded": 0, "downloaded": 0, "left": 0}
        ]}"#;
        let resp: AnnounceResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.peers.len(), 1);
        assert_eq!(resp.peers[0].peer_port, 6881);
    }
}
