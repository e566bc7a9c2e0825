use std::sync::Arc;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_derive::{Deserialize, Serialize};
use std::time::Instant;
use crate::registry::{ReAnnounceOutcome, SwarmRegistry, TrackedPeer};

const DEFAULT_INTERVAL: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {

    #[error("missing or empty required field: {0}")]
    MissingField(&'static str),

    #[error("peer_port must be greater than zero")]
    InvalidPort,

    #[error("info_hash must be exactly 20 bytes hex-encoded")]
    InvalidInfoHash,

    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

// Raw query parameters as they arrive on the wire. `info_hash` is
// hex-encoded since this tracker speaks plain query strings, not
// urlencoded binary.
#[derive(Debug, Deserialize)]
pub struct AnnounceQuery {
    pub info_hash: String,
    pub peer_id: String,
    pub peer_ip: String,
    pub peer_port: i64,
    #[serde(default)]
    pub uploaded: u64,
    #[serde(default)]
    pub downloaded: u64,
    #[serde(default)]
    pub left: u32,
    #[serde(default)]
    pub event: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnnounceEvent {
    Started,
    Stopped,
    ReAnnounce,
}

impl std::str::FromStr for AnnounceEvent {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "started" => Ok(AnnounceEvent::Started),
            "stopped" => Ok(AnnounceEvent::Stopped),
            "re_announce" | "reannounce" => Ok(AnnounceEvent::ReAnnounce),
            other => Err(TrackerError::UnknownEvent(other.to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnnounceResponse {
    pub interval: u64,
    pub peers: Vec<TrackedPeer>,
}

fn validate(query: &AnnounceQuery) -> Result<AnnounceEvent, TrackerError> {
    if query.info_hash.is_empty() {
        return Err(TrackerError::MissingField("info_hash"));
    }
    if query.peer_id.is_empty() {
        return Err(TrackerError::MissingField("peer_id"));
    }
    if query.peer_ip.is_empty() {
        return Err(TrackerError::MissingField("peer_ip"));
    }
    if query.peer_port <= 0 {
        return Err(TrackerError::InvalidPort);
    }
    query.event.parse()
}

fn parse_info_hash(raw: &str) -> Result<[u8; 20], TrackerError> {
    let bytes = hex::decode(raw).map_err(|_| TrackerError::InvalidInfoHash)?;
    bytes.try_into().map_err(|_| TrackerError::InvalidInfoHash)
}

pub fn router(registry: Arc<SwarmRegistry>) -> Router {
    Router::new()
        .route("/announce", get(announce_handler))
        .with_state(registry)
}

async fn announce_handler(State(registry): State<Arc<SwarmRegistry>>, Query(query): Query<AnnounceQuery>) -> Response {
    let event = match validate(&query) {
        Ok(event) => event,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let info_hash = match parse_info_hash(&query.info_hash) {
        Ok(h) => h,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let peer = TrackedPeer {
        peer_id: query.peer_id.clone(),
        peer_ip: query.peer_ip.clone(),
        peer_port: query.peer_port as u16,
        uploaded: query.uploaded,
        downloaded: query.downloaded,
        left: query.left,
        last_announce_time: Instant::now(),
    };

    match event {
        AnnounceEvent::Started => {
            registry.started(info_hash, peer).await;
            let peers = registry.snapshot(info_hash).await;
            Json(AnnounceResponse { interval: DEFAULT_INTERVAL, peers }).into_response()
        }
        AnnounceEvent::Stopped => {
            registry.stopped(info_hash, &query.peer_id).await;
            "stopped".into_response()
        }
        AnnounceEvent::ReAnnounce => {
            let outcome = registry.re_announce(info_hash, peer).await;
            tracing::debug!(?outcome, peer_id = %query.peer_id, "re-announce handled");
            let peers = registry.snapshot(info_hash).await;
            Json(AnnounceResponse { interval: DEFAULT_INTERVAL, peers }).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(SwarmRegistry::new()))
    }

    #[tokio::test]
    async fn started_returns_interval_and_peer_list() {
        let response = app()
            .oneshot(Request::get(
                "/announce?info_hash=0000000000000000000000000000000000000001&peer_id=peer-one&peer_ip=127.0.0.1&peer_port=6881&event=started"
            ).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_peer_id_is_a_bad_request() {
        let response = app()
            .oneshot(Request::get(
                "/announce?info_hash=0000000000000000000000000000000000000001&peer_id=&peer_ip=127.0.0.1&peer_port=6881&event=started"
            ).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn zero_port_is_a_bad_request() {
        let response = app()
            .oneshot(Request::get(
                "/announce?info_hash=0000000000000000000000000000000000000001&peer_id=peer-one&peer_ip=127.0.0.1&peer_port=0&event=started"
            ).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stopped_returns_plain_text_acknowledgement() {
        let registry = Arc::new(SwarmRegistry::new());
        let app = router(registry);

        let response = app
            .oneshot(Request::get(
                "/announce?info_hash=0000000000000000000000000000000000000001&peer_id=peer-one&peer_ip=127.0.0.1&peer_port=6881&event=stopped"
            ).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
