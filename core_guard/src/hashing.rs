use std::{fs, hash::Hasher, io, path::Path};

/// FNV-1a 64-bit hasher.
///
/// Stable across runs and platforms, which is all drift detection needs from
/// a content fingerprint.
#[derive(Debug)]
pub struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}

pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = FnvHasher::new();
    hasher.write(bytes);
    hasher.finish()
}

pub fn hash_file(path: &Path) -> io::Result<u64> {
    fs::read(path).map(|bytes| hash_bytes(&bytes))
}
