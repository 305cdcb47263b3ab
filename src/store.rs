//! The content-addressed blob repository collaborator (spec §1, §6.4).
//!
//! The core only ever needs `put`/`get`; everything about how blobs are
//! actually persisted (filesystem, object storage, a database BLOB column)
//! lives outside this crate.

use std::collections::HashMap;
use std::sync::RwLock;

use sha2::{Digest as _, Sha256};

use crate::model::Digest;

pub trait Store: Send + Sync {
    fn put(&self, bytes: &[u8]) -> anyhow::Result<Digest>;
    fn get(&self, digest: &Digest) -> anyhow::Result<Vec<u8>>;
}

/// An in-memory `Store`, content-addressed by SHA-256. Used by this
/// crate's own tests and suitable as a starting point for callers who
/// don't yet have a real blob repository wired up.
#[derive(Default)]
pub struct InMemoryStore {
    blobs: RwLock<HashMap<Digest, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn put(&self, bytes: &[u8]) -> anyhow::Result<Digest> {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = Digest(format!("{:x}", hasher.finalize()));
        self.blobs
            .write()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?
            .insert(digest.clone(), bytes.to_vec());
        Ok(digest)
    }

    fn get(&self, digest: &Digest) -> anyhow::Result<Vec<u8>> {
        self.blobs
            .read()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?
            .get(digest)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such digest: {digest}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let store = InMemoryStore::new();
        let digest = store.put(b"7\n").unwrap();
        assert_eq!(store.get(&digest).unwrap(), b"7\n");
    }

    #[test]
    fn identical_bytes_share_a_digest() {
        let store = InMemoryStore::new();
        let a = store.put(b"same").unwrap();
        let b = store.put(b"same").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_digest_is_an_error() {
        let store = InMemoryStore::new();
        assert!(store.get(&Digest::from("nope")).is_err());
    }
}
