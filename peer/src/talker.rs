use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;
use sha1::Digest;
use crate::announcer::{is_self, AnnouncedPeer, SwarmView};
use crate::file::BackingFile;
use crate::identity::PeerId;
use crate::piece_tracker::{PieceState, PieceTrackerHandle};
use crate::state::PeerStateHandle;

const SCAN_PERIOD: Duration = Duration::from_secs(40);
const HAVING_REQUEST_TIME: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const DONE_OK: &[u8] = b"DONE_OK";

#[derive(Debug, thiserror::Error)]
enum RequesterError {

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("socket read timed out")]
    ReadTimeout,

    #[error("remote closed mid-frame")]
    TruncatedFrame,

    #[error(transparent)]
    Decode(#[from] serde_json::Error),

    #[error("unexpected DONE acknowledgement")]
    UnexpectedDoneAck,

    #[error("piece {0} failed hash verification")]
    HashMismatch(u32),

    #[error(transparent)]
    FileError(#[from] crate::file::FileError),
}

type Result<T> = std::result::Result<T, RequesterError>;

pub struct TalkerContext {
    pub self_id: PeerId,
    pub swarm: SwarmView,
    pub pieces: PieceTrackerHandle,
    pub state: PeerStateHandle,
    pub file: BackingFile,
    pub piece_hashes: Vec<[u8; 20]>,
}

// Owns the dial set and the periodic scan loop: one requester per known
// remote peer, no capped connection pool.
pub struct Talker {
    ctx: Arc<TalkerContext>,
    dial_set: Arc<Mutex<HashSet<String>>>,
}

impl Talker {

    pub fn new(ctx: TalkerContext) -> Self {
        Self { ctx: Arc::new(ctx), dial_set: Arc::new(Mutex::new(HashSet::new())) }
    }

    // Runs until the local peer completes, waking every `SCAN_PERIOD` to
    // dial any swarm member not already in the dial set.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if self.ctx.state.lock().await.completed() {
                    tracing::info!("talker exiting, torrent complete");
                    return;
                }
                self.scan_and_dial().await;
                tokio::time::sleep(SCAN_PERIOD).await;
            }
        }.instrument(tracing::info_span!("talker")))
    }

    async fn scan_and_dial(&self) {
        let swarm = self.ctx.swarm.read().await.clone();
        for peer in swarm {
            if is_self(&peer, &self.ctx.self_id) {
                continue;
            }
            let mut dial_set = self.dial_set.lock().await;
            if dial_set.contains(&peer.peer_id) {
                continue;
            }
            dial_set.insert(peer.peer_id.clone());
            drop(dial_set);

            let ctx = self.ctx.clone();
            let dial_set = self.dial_set.clone();
            let peer_id = peer.peer_id.clone();
            tokio::spawn(
                async move {
                    run_requester(ctx, peer.clone()).await;
                    dial_set.lock().await.remove(&peer_id);
                }
                .instrument(tracing::info_span!("requester", remote = %peer_id)),
            );
        }
    }
}

async fn run_requester(ctx: Arc<TalkerContext>, peer: AnnouncedPeer) {
    let addr = format!("{}:{}", peer.peer_ip, peer.peer_port);

    let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "dial failed");
            drop_from_swarm(&ctx, &peer.peer_id).await;
            return;
        }
        Err(_) => {
            tracing::debug!("dial timed out");
            drop_from_swarm(&ctx, &peer.peer_id).await;
            return;
        }
    };

    if let Err(e) = fetch_loop(&ctx, stream).await {
        tracing::debug!(error = %e, "requester ended");
    }
}

async fn drop_from_swarm(ctx: &TalkerContext, peer_id: &str) {
    ctx.swarm.write().await.retain(|p| p.peer_id != peer_id);
}

async fn fetch_loop(ctx: &Arc<TalkerContext>, stream: TcpStream) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    while !ctx.state.lock().await.completed() {
        tokio::time::sleep(HAVING_REQUEST_TIME).await;

        write_half.write_all(b"HAVING\n").await?;
        let remote_state = read_having(&mut reader).await?;

        for (idx, state) in remote_state {
            if state != PieceState::Available {
                continue;
            }
            if ctx.pieces.state_of(idx).await != PieceState::Unavailable {
                continue;
            }
            fetch_piece(ctx, idx, &mut reader, &mut write_half).await;
        }
    }

    write_half.write_all(b"DONE\n").await?;
    let mut ack = [0u8; 7];
    read_exact_timed(reader, &mut ack).await?;
    if ack != *DONE_OK {
        return Err(RequesterError::UnexpectedDoneAck);
    }
    write_half.shutdown().await.ok();
    Ok(())
}

// Every socket read is an explicit suspension point per §5, and an
// indefinite hang there is a correctness bug - a remote that stalls
// mid-frame times out rather than wedging the requester forever. A timeout
// is reported distinctly from a short read (the latter is a truncated
// frame, per the ConsistencyFailure/TransportFailure taxonomy in §7).
async fn read_exact_timed(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>, buf: &mut [u8]) -> Result<()> {
    match tokio::time::timeout(READ_TIMEOUT, reader.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => Err(RequesterError::TruncatedFrame),
        Err(_) => Err(RequesterError::ReadTimeout),
    }
}

async fn read_having(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Result<BTreeMap<u32, PieceState>> {
    let mut len_buf = [0u8; 4];
    read_exact_timed(reader, &mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut body = vec![0u8; len];
    read_exact_timed(reader, &mut body).await?;

    let raw: BTreeMap<String, PieceState> = serde_json::from_slice(&body)?;
    Ok(raw.into_iter()
        .filter_map(|(k, v)| k.parse::<u32>().ok().map(|idx| (idx, v)))
        .collect())
}

// Races against other requesters: the DOWNLOADING transition is the only
// thing that decides which connection serves a given index.
async fn fetch_piece(
    ctx: &Arc<TalkerContext>,
    idx: u32,
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
) {
    ctx.pieces.set_downloading(idx).await;

    if let Err(e) = try_fetch_piece(ctx, idx, reader, writer).await {
        tracing::debug!(idx, error = %e, "piece fetch failed, reverting to unavailable");
        ctx.pieces.set_unavailable(idx).await;
    }
}

async fn try_fetch_piece(
    ctx: &Arc<TalkerContext>,
    idx: u32,
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
) -> Result<()> {
    writer.write_all(format!("INTEREST {}\n", idx).as_bytes()).await?;

    let len = ctx.file.store_info().piece_length(idx) as usize;
    let mut data = vec![0u8; len];
    read_exact_timed(reader, &mut data).await?;

    let mut hasher = sha1::Sha1::new();
    hasher.update(&data);
    let actual: [u8; 20] = hasher.finalize().into();
    let expected = ctx.piece_hashes[idx as usize];

    if actual != expected {
        return Err(RequesterError::HashMismatch(idx));
    }

    ctx.file.write_piece(idx, data, expected).await?;
    ctx.pieces.set_available(idx).await;

    let mut state = ctx.state.lock().await;
    state.left = state.left.saturating_sub(1);
    state.downloaded += 1;

    Ok(())
}
