#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub malformed_frames: u64,
}

impl NetworkStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.frames_received += 1;
        self.bytes_received += bytes as u64;
    }
}

pub fn rand_u64() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default(),
    );
    hasher.finish()
}

/// Lowercase base-36 token of `len` characters.
pub fn random_token(len: usize) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut token = String::with_capacity(len);
    let mut bits = rand_u64();
    for i in 0..len {
        // 12 characters drain a u64; draw again for longer tokens
        if i > 0 && i % 12 == 0 {
            bits = rand_u64();
        }
        token.push(ALPHABET[(bits % 36) as usize] as char);
        bits /= 36;
    }
    token
}
