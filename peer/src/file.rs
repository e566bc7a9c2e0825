use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use sha1::Digest;
use crate::store::StoreInfo;

#[derive(Debug, thiserror::Error)]
pub enum FileError {

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("piece {0} failed hash verification")]
    HashMismatch(u32),

    #[error("blocking task panicked: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, FileError>;

// The single backing file a torrent downloads into or seeds from.
//
// Pieces never overlap on disk, so reads and writes use positioned I/O
// (`pread`/`pwrite`) directly on a shared file handle - there is nothing
// left to serialise through an actor task or write buffer.
#[derive(Debug, Clone)]
pub struct BackingFile {
    handle: Arc<std::fs::File>,
    info: StoreInfo,
}

impl BackingFile {

    // Opens (creating if necessary) and preallocates the file to its
    // final size so that out-of-order piece writes never extend it.
    pub fn preallocate(info: StoreInfo) -> Result<Self> {
        if let Some(parent) = info.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let handle = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&info.file_path)?;
        handle.set_len(info.file_length)?;
        tracing::info!(path = %info.file_path.display(), len = info.file_length, "preallocated backing file");
        Ok(Self { handle: Arc::new(handle), info })
    }

    pub fn open_existing(path: &Path, info: StoreInfo) -> Result<Self> {
        let handle = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { handle: Arc::new(handle), info })
    }

    pub async fn read_piece(&self, idx: u32) -> Result<Vec<u8>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.read_piece_blocking(idx)).await?
    }

    fn read_piece_blocking(&self, idx: u32) -> Result<Vec<u8>> {
        let len = self.info.piece_length(idx) as usize;
        let offset = self.info.piece_offset(idx);
        let mut buf = vec![0u8; len];
        self.handle.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }

    // Verifies a piece against the expected hash before writing it at its
    // aligned offset. On mismatch nothing is written and the caller is
    // expected to discard the piece and re-request it.
    pub async fn write_piece(&self, idx: u32, data: Vec<u8>, expected_hash: [u8; 20]) -> Result<()> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.write_piece_blocking(idx, data, expected_hash)).await?
    }

    fn write_piece_blocking(&self, idx: u32, data: Vec<u8>, expected_hash: [u8; 20]) -> Result<()> {
        debug_assert_eq!(data.len(), self.info.piece_length(idx) as usize);

        let mut hasher = sha1::Sha1::new();
        hasher.update(&data);
        let actual: [u8; 20] = hasher.finalize().into();
        if actual != expected_hash {
            return Err(FileError::HashMismatch(idx));
        }

        let offset = self.info.piece_offset(idx);
        self.handle.write_all_at(&data, offset)?;
        Ok(())
    }

    pub fn store_info(&self) -> &StoreInfo {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(data: &[u8]) -> [u8; 20] {
        let mut hasher = sha1::Sha1::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    fn store_info(dir: &Path, file_length: u64, piece_length: u32, piece_count: u32) -> StoreInfo {
        let last = (file_length - (piece_length as u64 * (piece_count as u64 - 1))) as u32;
        StoreInfo {
            file_length,
            piece_length,
            last_piece_length: last,
            piece_count,
            file_path: dir.join("sample.bin"),
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let info = store_info(dir.path(), 30, 10, 3);
        let file = BackingFile::preallocate(info).unwrap();

        let piece1 = vec![7u8; 10];
        file.write_piece(1, piece1.clone(), hash_of(&piece1)).await.unwrap();

        let read_back = file.read_piece(1).await.unwrap();
        assert_eq!(read_back, piece1);
    }

    #[tokio::test]
    async fn mismatched_hash_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let info = store_info(dir.path(), 30, 10, 3);
        let file = BackingFile::preallocate(info).unwrap();

        let piece = vec![1u8; 10];
        let err = file.write_piece(0, piece, [0; 20]).await.unwrap_err();
        assert!(matches!(err, FileError::HashMismatch(0)));
    }

    #[tokio::test]
    async fn short_last_piece_reads_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        let info = store_info(dir.path(), 25, 10, 3);
        let file = BackingFile::preallocate(info).unwrap();

        let last = vec![9u8; 5];
        file.write_piece(2, last.clone(), hash_of(&last)).await.unwrap();
        assert_eq!(file.read_piece(2).await.unwrap(), last);
    }
}
