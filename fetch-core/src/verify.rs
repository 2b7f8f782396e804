/// Content digest over a stored artifact
use core::fmt;
use core::marker::PhantomData;

use sha2::{Digest, Sha256};

use crate::error::VerifyError;
use crate::storage::{ArtifactReader, StorageSink};

/// Finalized digest bytes; length is defined by the algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestResult(Vec<u8>);

impl DigestResult {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DigestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

pub struct IntegrityVerifier<D: Digest = Sha256> {
    page_size: usize,
    _digest: PhantomData<D>,
}

impl IntegrityVerifier<Sha256> {
    pub fn sha256(page_size: usize) -> Self {
        Self::new(page_size)
    }
}

impl<D: Digest> IntegrityVerifier<D> {
    pub fn new(page_size: usize) -> Self {
        Self { page_size: page_size.max(1), _digest: PhantomData }
    }

    pub fn algorithm_len(&self) -> usize {
        <D as Digest>::output_size()
    }

    /// Stream the artifact at `path` through the digest in page-sized reads
    pub fn digest<S: StorageSink>(&self, storage: &S, path: &str) -> Result<DigestResult, VerifyError> {
        let mut reader = storage.open_read(path).map_err(VerifyError::Open)?;

        let mut page = Vec::new();
        page.try_reserve_exact(self.page_size)
            .map_err(|_| VerifyError::OutOfMemory { requested: self.page_size })?;
        page.resize(self.page_size, 0);

        let mut hasher = D::new();
        let mut total = 0u64;
        while reader.has_more() {
            let n = reader.read(&mut page).map_err(VerifyError::Read)?;
            if n == 0 {
                break;
            }
            hasher.update(&page[..n]);
            total += n as u64;
        }

        let result = DigestResult(hasher.finalize().to_vec());
        log::debug!("Digested {} bytes from {}", total, path);
        Ok(result)
    }

    /// Digest an in-memory buffer with the same algorithm
    pub fn digest_bytes(bytes: &[u8]) -> DigestResult {
        DigestResult(D::digest(bytes).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemStorage;
    use quickcheck_macros::quickcheck;

    fn stored(bytes: &[u8]) -> MemStorage {
        let storage = MemStorage::new();
        storage.insert("/bootcode.bin", bytes.to_vec());
        storage
    }

    #[test]
    fn test_known_sha256_vector() {
        let storage = stored(b"abc");
        let digest = IntegrityVerifier::sha256(4096).digest(&storage, "/bootcode.bin").unwrap();
        assert_eq!(
            digest.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest.len(), 32);
    }

    #[test]
    fn test_page_size_does_not_change_result() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let storage = stored(&payload);
        let small = IntegrityVerifier::sha256(7).digest(&storage, "/bootcode.bin").unwrap();
        let large = IntegrityVerifier::sha256(4096).digest(&storage, "/bootcode.bin").unwrap();
        assert_eq!(small, large);
        assert_eq!(small, IntegrityVerifier::<Sha256>::digest_bytes(&payload));
    }

    #[test]
    fn test_missing_artifact_is_reported() {
        let storage = MemStorage::new();
        let result = IntegrityVerifier::sha256(4096).digest(&storage, "/bootcode.bin");
        assert!(matches!(result, Err(VerifyError::Open(_))));
    }

    #[test]
    fn test_empty_artifact_digest() {
        let storage = stored(&[]);
        let digest = IntegrityVerifier::sha256(4096).digest(&storage, "/bootcode.bin").unwrap();
        assert_eq!(
            digest.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[quickcheck]
    fn prop_digest_is_deterministic(bytes: Vec<u8>) -> bool {
        let storage = stored(&bytes);
        let verifier = IntegrityVerifier::sha256(64);
        verifier.digest(&storage, "/bootcode.bin") == verifier.digest(&storage, "/bootcode.bin")
    }

    #[quickcheck]
    fn prop_same_length_different_content_differs(bytes: Vec<u8>) -> bool {
        if bytes.is_empty() {
            return true;
        }
        let mut flipped = bytes.clone();
        flipped[0] ^= 0xff;
        IntegrityVerifier::<Sha256>::digest_bytes(&bytes)
            != IntegrityVerifier::<Sha256>::digest_bytes(&flipped)
    }
}
