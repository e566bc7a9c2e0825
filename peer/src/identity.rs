use rand::Rng;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {

    #[error("peer id must be exactly 20 ASCII characters, got {0}")]
    InvalidLength(usize),

    #[error("peer id must be ASCII")]
    NotAscii,
}

// A swarm-wide unique peer identifier: a 5-byte client prefix followed by
// 15 random alphanumeric characters, 20 ASCII bytes in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 20]);

impl PeerId {

    pub fn generate(client_prefix: &[u8; 5]) -> Self {
        let mut id = [0u8; 20];
        id[..5].copy_from_slice(client_prefix);
        let mut rng = rand::thread_rng();
        for byte in id[5..].iter_mut() {
            *byte = ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())];
        }
        PeerId(id)
    }

    pub fn as_bytes(&self) -> &[u8; 20] { &self.0 }

    pub fn as_str(&self) -> &str {
        // Safe: every byte is drawn from ASCII alphanumerics, and the
        // prefix is validated to be ASCII on construction.
        std::str::from_utf8(&self.0).expect("peer id is always ASCII")
    }
}

impl TryFrom<&[u8]> for PeerId {
    type Error = IdentityError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != 20 {
            return Err(IdentityError::InvalidLength(value.len()));
        }
        if !value.is_ascii() {
            return Err(IdentityError::NotAscii);
        }
        let mut id = [0u8; 20];
        id.copy_from_slice(value);
        Ok(PeerId(id))
    }
}

impl TryFrom<&str> for PeerId {
    type Error = IdentityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        PeerId::try_from(value.as_bytes())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

// Identity of a peer within a swarm - its id plus the address it listens
// for inbound connections on.
#[derive(Debug, Clone, Copy)]
pub struct PeerIdentity {
    pub peer_id: PeerId,
    pub peer_ip: std::net::IpAddr,
    pub peer_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_is_20_ascii_bytes_with_prefix() {
        let id = PeerId::generate(b"RS001");
        assert_eq!(id.as_bytes().len(), 20);
        assert!(id.as_str().is_ascii());
        assert_eq!(&id.as_str()[..5], "RS001");
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(PeerId::try_from("short"), Err(IdentityError::InvalidLength(5))));
        assert!(matches!(PeerId::try_from(&b"x"[..].repeat(21)[..]), Err(IdentityError::InvalidLength(21))));
    }

    #[test]
    fn accepts_exact_20_bytes() {
        let raw = "ABCDE123456789012345";
        assert_eq!(raw.len(), 20);
        assert!(PeerId::try_from(raw).is_ok());
    }
}
