use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tracing::Instrument;
use crate::file::BackingFile;
use crate::piece_tracker::PieceTrackerHandle;
use crate::state::PeerStateHandle;

const LISTEN_BACKLOG: u32 = 10;
const DONE_OK: &[u8] = b"DONE_OK";

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ListenerError>;

#[derive(Debug, thiserror::Error)]
enum HandlerError {

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    PieceRead(#[from] crate::file::FileError),

    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct ListenerContext {
    pub pieces: PieceTrackerHandle,
    pub state: PeerStateHandle,
    pub file: BackingFile,
}

// Grounded on `torrent.rs::run`'s accept loop and `p2p/session.rs`'s
// per-connection task spawn, replacing the BitTorrent handshake/message
// codec with the HAVING/INTEREST/DONE text protocol. Handlers share no
// per-connection state beyond `Arc`/`Clone` handles to the piece tracker,
// peer state and backing file.
pub struct Listener {
    listener: TcpListener,
    ctx: Arc<ListenerContext>,
}

impl Listener {

    // Bound via `TcpSocket` rather than `TcpListener::bind` so the accept
    // backlog is actually `LISTEN_BACKLOG` rather than whatever the OS
    // defaults to.
    pub async fn bind(addr: std::net::SocketAddr, ctx: ListenerContext) -> Result<Self> {
        let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        tracing::info!(%addr, backlog = LISTEN_BACKLOG, "peer listener bound");
        Ok(Self { listener, ctx: Arc::new(ctx) })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    // Runs the accept loop forever. A failed accept is logged and does
    // not tear down the listener.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, addr)) => {
                        let ctx = self.ctx.clone();
                        tokio::spawn(
                            async move {
                                if let Err(e) = handle_connection(stream, ctx).await {
                                    tracing::debug!(error = %e, "handler exited");
                                }
                            }
                            .instrument(tracing::info_span!("inbound", %addr)),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }.instrument(tracing::info_span!("listener")))
    }
}

async fn handle_connection(stream: TcpStream, ctx: Arc<ListenerContext>) -> std::result::Result<(), HandlerError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            // Peer disconnected, possibly mid-frame - discard any partial line.
            return Ok(());
        }
        let request = line.trim_end_matches(['\n', '\r']);
        if request.is_empty() {
            continue;
        }

        if request == "HAVING" {
            handle_having(&ctx, &mut write_half).await?;
        } else if let Some(rest) = request.strip_prefix("INTEREST ") {
            let idx: u32 = rest.trim().parse()
                .map_err(|_| HandlerError::MalformedRequest(request.to_string()))?;
            handle_interest(&ctx, idx, &mut write_half).await?;
        } else if request == "DONE" {
            write_half.write_all(DONE_OK).await?;
            write_half.shutdown().await?;
            return Ok(());
        } else {
            return Err(HandlerError::MalformedRequest(request.to_string()));
        }
    }
}

async fn handle_having(ctx: &ListenerContext, out: &mut tokio::net::tcp::OwnedWriteHalf) -> std::result::Result<(), HandlerError> {
    let json = ctx.pieces.snapshot().await.to_json()?;
    let len = json.len() as u32;
    out.write_all(&len.to_be_bytes()).await?;
    out.write_all(json.as_bytes()).await?;
    Ok(())
}

// Serves whatever is on disk regardless of the piece tracker's current
// state for `idx` - there is no gate here, only on the HAVING snapshot
// callers use to decide what to request.
async fn handle_interest(ctx: &ListenerContext, idx: u32, out: &mut tokio::net::tcp::OwnedWriteHalf) -> std::result::Result<(), HandlerError> {
    let data = ctx.file.read_piece(idx).await?;
    out.write_all(&data).await?;
    let mut state = ctx.state.lock().await;
    state.uploaded += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{PeerId, PeerIdentity};
    use crate::piece_tracker::PieceTracker;
    use crate::state::{PeerState, PeerStateHandle};
    use crate::store::StoreInfo;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::AsyncReadExt;

    fn identity() -> PeerIdentity {
        PeerIdentity {
            peer_id: PeerId::generate(b"RS001"),
            peer_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            peer_port: 0,
        }
    }

    async fn context(dir: &std::path::Path) -> ListenerContext {
        let info = StoreInfo {
            file_length: 20,
            piece_length: 10,
            last_piece_length: 10,
            piece_count: 2,
            file_path: dir.join("f.bin"),
        };
        let file = BackingFile::preallocate(info).unwrap();
        let pieces = Arc::new(PieceTracker::new_leecher(2));
        pieces.set_available(0).await;
        let state = PeerStateHandle::new(PeerState::new_leecher(identity(), [0; 20], 1));
        ListenerContext { pieces, state, file }
    }

    #[tokio::test]
    async fn having_returns_length_prefixed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;

        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), ctx).await.unwrap();
        let addr = listener.local_addr().unwrap();
        listener.spawn();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"HAVING\n").await.unwrap();

        let mut len_buf = [0u8; 4];
        client.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        client.read_exact(&mut body).await.unwrap();

        let json = String::from_utf8(body).unwrap();
        assert_eq!(json, r#"{"0":"AVAILABLE","1":"UNAVAILABLE"}"#);
    }

    #[tokio::test]
    async fn interest_serves_piece_and_increments_uploaded() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        ctx.file.write_piece(0, vec![5u8; 10], {
            let mut h = sha1::Sha1::new();
            use sha1::Digest;
            h.update(vec![5u8; 10]);
            h.finalize().into()
        }).await.unwrap();

        let state = ctx.state.clone();
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), ctx).await.unwrap();
        let addr = listener.local_addr().unwrap();
        listener.spawn();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"INTEREST 0\n").await.unwrap();
        let mut body = vec![0u8; 10];
        client.read_exact(&mut body).await.unwrap();
        assert_eq!(body, vec![5u8; 10]);

        assert_eq!(state.lock().await.uploaded, 1);
    }
}
