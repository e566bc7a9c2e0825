use serde_derive::{Deserialize, Serialize};
use sha1::Digest;

#[derive(Debug, thiserror::Error)]
pub enum MetaInfoError {

    #[error("bencode error whilst decoding metainfo: {0}")]
    BencodeError(#[from] bencode::Error),

    #[error("invalid file extension, expected .torrent")]
    InvalidExtension,

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("invalid pieces length, must be divisible by 20")]
    InvalidPiecesLength,

    #[error("file has size 0")]
    EmptyFile,
}

pub type Result<T> = std::result::Result<T, MetaInfoError>;

// The info sub-dictionary of a torrent metafile. One file, one set of
// piece hashes - multi-file torrents are out of scope.
#[derive(Clone, Deserialize, Serialize)]
pub struct Info {

    // File name.
    pub name: String,

    // Length of the file in bytes.
    pub length: u64,

    // Number of bytes in each piece.
    #[serde(rename = "piece length")]
    pub piece_length: u32,

    // Concatenation of all 20-byte SHA1 hashes, one per piece.
    #[serde(with = "serde_bytes")]
    pub pieces: Vec<u8>,
}

impl Info {
    fn info_hash(&self) -> Result<[u8; 20]> {
        let info_data = bencode::encode_to_raw(&self)?;
        let mut hasher = sha1::Sha1::new();
        hasher.update(info_data);
        Ok(hasher.finalize().into())
    }
}

// Immutable torrent metadata, decoded from a bencoded .torrent file.
#[derive(Clone, Deserialize)]
pub struct MetaInfo {

    // The announce URL of the tracker.
    #[serde(deserialize_with = "crate::de::url_deserialize")]
    pub announce: url::Url,

    pub info: Info,

    #[serde(skip)]
    info_hash: [u8; 20],

    #[serde(default)]
    #[serde(rename = "creation date")]
    pub creation_date: Option<i64>,

    #[serde(default)]
    #[serde(rename = "created by")]
    pub created_by: Option<String>,

    #[serde(default)]
    pub version: Option<String>,
}

impl MetaInfo {

    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<MetaInfo> {

        if path.as_ref().extension().unwrap_or_default() != "torrent" {
            return Err(MetaInfoError::InvalidExtension);
        }

        let mut metainfo: MetaInfo = bencode::decode_bytes(&std::fs::read(path)?)?;

        if metainfo.info.pieces.is_empty() || metainfo.info.pieces.len() % 20 != 0 {
            return Err(MetaInfoError::InvalidPiecesLength);
        }
        if metainfo.info.length == 0 {
            return Err(MetaInfoError::EmptyFile);
        }

        metainfo.info_hash = metainfo.info.info_hash()?;
        tracing::debug!(name = %metainfo.info.name, "metainfo loaded");
        Ok(metainfo)
    }

    // Builds a metainfo dictionary and bencodes it, for the `torrent`
    // subcommand. Mirrors the structure of `load` in reverse.
    pub fn create(
        announce: url::Url,
        name: String,
        file_length: u64,
        piece_length: u32,
        piece_hashes: &[[u8; 20]],
        created_by: Option<String>,
        creation_date: Option<i64>,
    ) -> Result<Vec<u8>> {
        if file_length == 0 {
            return Err(MetaInfoError::EmptyFile);
        }

        let pieces: Vec<u8> = piece_hashes.iter().flatten().copied().collect();
        let info = Info {
            name,
            length: file_length,
            piece_length,
            pieces,
        };

        #[derive(Serialize)]
        struct Raw {
            announce: String,
            #[serde(rename = "created by", skip_serializing_if = "Option::is_none")]
            created_by: Option<String>,
            #[serde(rename = "creation date", skip_serializing_if = "Option::is_none")]
            creation_date: Option<i64>,
            info: Info,
        }

        let raw = Raw {
            announce: announce.to_string(),
            created_by,
            creation_date,
            info,
        };

        Ok(bencode::encode_to_raw(&raw)?)
    }

    pub fn piece_hashes(&self) -> Vec<[u8; 20]> {
        self.info.pieces
            .chunks_exact(20)
            // Safe: length checked to be a multiple of 20 in `load`.
            .map(|c| c.try_into().unwrap())
            .collect()
    }

    pub fn piece_length(&self) -> u32 { self.info.piece_length }

    pub fn piece_count(&self) -> u32 { self.info.pieces.len() as u32 / 20 }

    pub fn file_length(&self) -> u64 { self.info.length }

    pub fn file_name(&self) -> &str { &self.info.name }

    pub fn info_hash(&self) -> [u8; 20] { self.info_hash }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}

impl std::fmt::Debug for MetaInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaInfo")
            .field("announce", &self.announce.as_str())
            .field("name", &self.info.name)
            .field("length", &self.info.length)
            .field("piece_length", &self.info.piece_length)
            .field("num_pieces", &(self.info.pieces.len() / 20))
            .field("info_hash", &self.info_hash_hex())
            .field("created_by", &self.created_by)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hashes(n: usize) -> Vec<[u8; 20]> {
        (0..n).map(|i| {
            let mut h = [0u8; 20];
            h[0] = i as u8;
            h
        }).collect()
    }

    #[test]
    fn create_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let torrent_path = dir.path().join("sample.torrent");

        let hashes = sample_hashes(3);
        let bytes = MetaInfo::create(
            url::Url::parse("http://127.0.0.1:8000/announce").unwrap(),
            "sample.bin".to_string(),
            1_200_000,
            524_288,
            &hashes,
            Some("test-suite".to_string()),
            Some(1_700_000_000),
        ).unwrap();
        std::fs::write(&torrent_path, bytes).unwrap();

        let metainfo = MetaInfo::load(&torrent_path).unwrap();
        assert_eq!(metainfo.file_name(), "sample.bin");
        assert_eq!(metainfo.file_length(), 1_200_000);
        assert_eq!(metainfo.piece_length(), 524_288);
        assert_eq!(metainfo.piece_count(), 3);
        assert_eq!(metainfo.piece_hashes(), hashes);
        assert_eq!(metainfo.announce.as_str(), "http://127.0.0.1:8000/announce");
    }

    #[test]
    fn info_hash_is_stable_for_same_content() {
        let hashes = sample_hashes(2);
        let a = MetaInfo::create(
            url::Url::parse("http://127.0.0.1:8000/announce").unwrap(),
            "x".to_string(), 100, 50, &hashes, None, None,
        ).unwrap();
        let b = MetaInfo::create(
            url::Url::parse("http://127.0.0.1:8000/announce").unwrap(),
            "x".to_string(), 100, 50, &hashes, None, None,
        ).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_empty_file() {
        let err = MetaInfo::create(
            url::Url::parse("http://127.0.0.1:8000/announce").unwrap(),
            "empty".to_string(), 0, 50, &[], None, None,
        ).unwrap_err();
        assert!(matches!(err, MetaInfoError::EmptyFile));
    }

    #[test]
    fn rejects_non_torrent_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        std::fs::write(&path, b"not a torrent").unwrap();
        let err = MetaInfo::load(&path).unwrap_err();
        assert!(matches!(err, MetaInfoError::InvalidExtension));
    }
}
