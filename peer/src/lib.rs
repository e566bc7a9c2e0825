#![allow(dead_code)]

mod announcer;
mod de;
mod file;
mod identity;
mod listener;
mod metainfo;
mod piece_tracker;
mod state;
mod store;
mod talker;
mod torrent;

pub use announcer::{AnnouncedPeer, Announcer, AnnouncerError};
pub use file::{BackingFile, FileError};
pub use identity::{IdentityError, PeerId, PeerIdentity};
pub use listener::{Listener, ListenerContext, ListenerError};
pub use metainfo::{MetaInfo, MetaInfoError};
pub use piece_tracker::{PieceState, PieceTracker, PieceTrackerHandle};
pub use state::{Event, PeerState, PeerStateHandle};
pub use store::StoreInfo;
pub use torrent::{PeerRuntime, RuntimeError};
