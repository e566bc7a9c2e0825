use std::path::PathBuf;
use crate::metainfo::MetaInfo;

// General information on how a single-file torrent is laid out on disk.
#[derive(Debug, Clone)]
pub struct StoreInfo {

    // Length of the file in bytes.
    pub file_length: u64,

    // Length of a full piece, in bytes.
    pub piece_length: u32,

    // Length of the last piece - may be shorter than `piece_length`.
    pub last_piece_length: u32,

    // Number of pieces in the torrent.
    pub piece_count: u32,

    // Path of the backing file on disk.
    pub file_path: PathBuf,
}

impl StoreInfo {

    pub fn new(metainfo: &MetaInfo, output_dir: &std::path::Path) -> Self {

        let file_length = metainfo.file_length();
        let piece_count = metainfo.piece_count();
        let piece_length = metainfo.piece_length();
        let last_piece_length =
            (file_length - (piece_length as u64 * (piece_count as u64 - 1))) as u32;

        Self {
            file_length,
            piece_length,
            last_piece_length,
            piece_count,
            file_path: output_dir.join(metainfo.file_name()),
        }
    }

    // Returns the length of the piece at `idx`, accounting for the short
    // final piece.
    pub fn piece_length(&self, idx: u32) -> u32 {
        debug_assert!(idx < self.piece_count, "piece index out of bounds");
        if idx == self.piece_count - 1 {
            self.last_piece_length
        } else {
            self.piece_length
        }
    }

    pub fn piece_offset(&self, idx: u32) -> u64 {
        idx as u64 * self.piece_length as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(file_length: u64, piece_length: u32, piece_count: u32) -> StoreInfo {
        let last = (file_length - (piece_length as u64 * (piece_count as u64 - 1))) as u32;
        StoreInfo {
            file_length,
            piece_length,
            last_piece_length: last,
            piece_count,
            file_path: PathBuf::from("f"),
        }
    }

    #[test]
    fn short_last_piece() {
        // 1,200,000 B file, 524,288 B pieces -> 3 pieces, last = 151,424 B.
        let info = info(1_200_000, 524_288, 3);
        assert_eq!(info.piece_length(0), 524_288);
        assert_eq!(info.piece_length(1), 524_288);
        assert_eq!(info.piece_length(2), 151_424);
        assert_eq!(info.piece_offset(2), 1_048_576);
    }
}
