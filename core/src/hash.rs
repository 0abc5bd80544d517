//! Content hashing and perceptual image hashing.

use std::path::Path;

use image::imageops::FilterType;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::instrument;

use crate::error::CoreError;

/// Above this size, `hash_file` switches from hashing every byte to the
/// adaptive first/middle/last-N-KiB strategy. The quick digest is
/// namespaced `quick:<sha256>` so it can never collide with, or be
/// mistaken for, a full-file hash.
const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 52_428_800;
const QUICK_HASH_SAMPLE_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentHash {
    /// Full sha-256 over the entire file.
    Full(String),
    /// Adaptive hash over first/middle/last `N` KiB, namespaced so it
    /// is never treated as an authoritative `content_hash`.
    Quick(String),
}

impl ContentHash {
    pub fn as_stored(&self) -> String {
        match self {
            ContentHash::Full(hex) => hex.clone(),
            ContentHash::Quick(hex) => format!("quick:{hex}"),
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, ContentHash::Full(_))
    }
}

pub struct HashService {
    large_file_threshold: u64,
}

impl Default for HashService {
    fn default() -> Self {
        Self {
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
        }
    }
}

impl HashService {
    pub fn new(large_file_threshold: u64) -> Self {
        Self { large_file_threshold }
    }

    /// Hashes `path`, using the full-file strategy below the
    /// configured threshold and the adaptive quick strategy above it.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn hash_file(&self, path: &Path) -> Result<ContentHash, CoreError> {
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > self.large_file_threshold {
            self.quick_hash(path, metadata.len()).await
        } else {
            self.full_hash(path).await
        }
    }

    pub async fn full_hash(&self, path: &Path) -> Result<ContentHash, CoreError> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 1 << 16];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(ContentHash::Full(hex::encode(hasher.finalize())))
    }

    /// Hashes the first/middle/last `QUICK_HASH_SAMPLE_BYTES` of the
    /// file plus its total length, instead of every byte.
    async fn quick_hash(&self, path: &Path, total_len: u64) -> Result<ContentHash, CoreError> {
        use tokio::io::{AsyncSeekExt, SeekFrom};

        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        hasher.update(total_len.to_le_bytes());

        let sample = QUICK_HASH_SAMPLE_BYTES.min(total_len);
        let mid_start = total_len.saturating_sub(sample) / 2;
        let tail_start = total_len.saturating_sub(sample);

        for start in [0, mid_start, tail_start] {
            file.seek(SeekFrom::Start(start)).await?;
            let mut buf = vec![0u8; sample as usize];
            let n = file.read(&mut buf).await?;
            hasher.update(&buf[..n]);
        }

        Ok(ContentHash::Quick(hex::encode(hasher.finalize())))
    }

    /// Perceptual hash: resize to 8x8 grayscale, threshold against the
    /// mean pixel value, render as 16 hex chars.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn perceptual_hash(&self, path: &Path) -> Result<u64, CoreError> {
        let img = image::open(path)
            .map_err(|e| CoreError::ProviderInvalidResponse(format!("unreadable image: {e}")))?;
        let small = img.resize_exact(8, 8, FilterType::Lanczos3).into_luma8();
        let pixels: Vec<u8> = small.pixels().map(|p| p.0[0]).collect();
        let mean = pixels.iter().map(|&p| p as u32).sum::<u32>() as f64 / pixels.len() as f64;

        let mut bits: u64 = 0;
        for (i, &pixel) in pixels.iter().enumerate() {
            if (pixel as f64) > mean {
                bits |= 1 << i;
            }
        }
        Ok(bits)
    }

    pub fn perceptual_hash_hex(&self, path: &Path) -> Result<String, CoreError> {
        Ok(format!("{:016x}", self.perceptual_hash(path)?))
    }

    /// `1 - hamming_distance/64`; 1.0 means identical.
    pub fn similarity(a: u64, b: u64) -> f64 {
        let distance = (a ^ b).count_ones();
        1.0 - (distance as f64 / 64.0)
    }

    pub fn similarity_hex(a: &str, b: &str) -> Result<f64, CoreError> {
        let a = u64::from_str_radix(a, 16)
            .map_err(|_| CoreError::Validation(format!("invalid perceptual hash: {a}")))?;
        let b = u64::from_str_radix(b, 16)
            .map_err(|_| CoreError::Validation(format!("invalid perceptual hash: {b}")))?;
        Ok(Self::similarity(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn identical_bytes_hash_to_same_full_hash() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::File::create(&a).unwrap().write_all(b"hello world").unwrap();
        std::fs::File::create(&b).unwrap().write_all(b"hello world").unwrap();

        let service = HashService::default();
        let hash_a = service.hash_file(&a).await.unwrap();
        let hash_b = service.hash_file(&b).await.unwrap();
        assert_eq!(hash_a, hash_b);
        assert!(hash_a.is_full());
    }

    #[tokio::test]
    async fn files_above_threshold_use_quick_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![7u8; 1024]).unwrap();

        let service = HashService::new(512);
        let hash = service.hash_file(&path).await.unwrap();
        assert!(matches!(hash, ContentHash::Quick(_)));
        assert!(hash.as_stored().starts_with("quick:"));
    }

    #[test]
    fn identical_hashes_have_similarity_one() {
        assert_eq!(HashService::similarity(0xabcd, 0xabcd), 1.0);
    }

    #[test]
    fn fully_opposite_bits_have_similarity_zero() {
        assert_eq!(HashService::similarity(0, u64::MAX), 0.0);
    }
}
