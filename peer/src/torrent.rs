use std::net::SocketAddr;
use std::sync::Arc;
use crate::announcer::Announcer;
use crate::file::BackingFile;
use crate::identity::PeerIdentity;
use crate::listener::{Listener, ListenerContext};
use crate::metainfo::MetaInfo;
use crate::piece_tracker::PieceTracker;
use crate::state::{PeerState, PeerStateHandle};
use crate::store::StoreInfo;
use crate::talker::{Talker, TalkerContext};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {

    #[error("failed to bind peer listener: {0}")]
    BindFailed(#[from] crate::listener::ListenerError),

    #[error("initial announce failed: {0}")]
    InitialAnnounceFailed(#[from] crate::announcer::AnnouncerError),

    #[error(transparent)]
    FileError(#[from] crate::file::FileError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

// Ties announcer, listener, talker and the shared piece tracker/peer
// state together for one running peer process.
pub struct PeerRuntime {
    announcer: Arc<Announcer>,
    pieces: Arc<PieceTracker>,
    state: PeerStateHandle,
    listen_addr: SocketAddr,
    listener_ctx: Option<ListenerContext>,
    talker_ctx: Option<TalkerContext>,
}

impl PeerRuntime {

    // Joining an existing swarm as a leecher (no pieces on disk yet).
    pub fn join(metainfo: &MetaInfo, identity: PeerIdentity, output_dir: &std::path::Path) -> Result<Self> {
        let store_info = StoreInfo::new(metainfo, output_dir);
        let file = BackingFile::preallocate(store_info)?;
        Self::build(metainfo, identity, file, false)
    }

    // Seeding a torrent whose file already exists in full on disk.
    pub fn seed(metainfo: &MetaInfo, identity: PeerIdentity, file_path: &std::path::Path) -> Result<Self> {
        let store_info = StoreInfo::new(metainfo, file_path.parent().unwrap_or(std::path::Path::new(".")));
        let file = BackingFile::open_existing(file_path, store_info)?;
        Self::build(metainfo, identity, file, true)
    }

    fn build(metainfo: &MetaInfo, identity: PeerIdentity, file: BackingFile, is_seeder: bool) -> Result<Self> {
        let piece_count = metainfo.piece_count();
        let info_hash = metainfo.info_hash();

        let pieces = Arc::new(if is_seeder {
            PieceTracker::new_seeder(piece_count)
        } else {
            PieceTracker::new_leecher(piece_count)
        });

        let peer_state = if is_seeder {
            PeerState::new_seeder(identity, info_hash)
        } else {
            PeerState::new_leecher(identity, info_hash, piece_count)
        };
        let state = PeerStateHandle::new(peer_state);

        let announcer = Arc::new(Announcer::new(metainfo.announce.clone(), state.clone()));

        let listen_addr = SocketAddr::new(identity.peer_ip, identity.peer_port);
        let listener_ctx = ListenerContext { pieces: pieces.clone(), state: state.clone(), file: file.clone() };
        let talker_ctx = TalkerContext {
            self_id: identity.peer_id,
            swarm: announcer.swarm_view(),
            pieces: pieces.clone(),
            state: state.clone(),
            file,
            piece_hashes: metainfo.piece_hashes(),
        };

        Ok(Self {
            announcer,
            pieces,
            state,
            listen_addr,
            listener_ctx: Some(listener_ctx),
            talker_ctx: Some(talker_ctx),
        })
    }

    pub fn piece_tracker(&self) -> Arc<PieceTracker> {
        self.pieces.clone()
    }

    pub fn peer_state(&self) -> PeerStateHandle {
        self.state.clone()
    }

    // Starts every background task: initial announce (fatal on failure,
    // per the error taxonomy), the re-announce loop, the listener accept
    // loop, and the talker scan loop. The runtime stays alive afterwards
    // so the caller can poll `peer_state()` for completion and later
    // call `stop()`.
    pub async fn run(&mut self) -> Result<()> {
        let (interval, _peers) = self.announcer.started_announce().await?;
        tracing::info!(interval, "started announce ok");

        self.announcer.clone().spawn_reannounce_loop(interval);

        let listener_ctx = self.listener_ctx.take().expect("run called twice");
        let listener = Listener::bind(self.listen_addr, listener_ctx).await?;
        tracing::info!(addr = %listener.local_addr()?, "peer runtime listening");
        listener.spawn();

        let talker_ctx = self.talker_ctx.take().expect("run called twice");
        Talker::new(talker_ctx).spawn();

        Ok(())
    }

    // Best-effort, never fatal - called on shutdown regardless of
    // whether any prior announce succeeded.
    pub async fn stop(&self) {
        self.announcer.stop_announce().await;
    }
}
