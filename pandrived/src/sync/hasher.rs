use std::io;
use std::path::Path;

use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;

/// SHA-1 of empty content; size-zero files get this without touching disk.
pub const EMPTY_CONTENT_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

const READ_CHUNK: usize = 64 * 1024;

/// Streaming SHA-1 of a file, returned as lowercase hex. Inventory and
/// action records always store the lowercase form so hash comparisons stay
/// idempotent across re-admissions.
pub async fn sha1_of_file(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn hashes_known_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let digest = sha1_of_file(&path).await.unwrap();
        assert_eq!(digest, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }

    #[tokio::test]
    async fn empty_file_matches_empty_content_constant() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        tokio::fs::write(&path, b"").await.unwrap();

        let digest = sha1_of_file(&path).await.unwrap();
        assert_eq!(digest, EMPTY_CONTENT_SHA1);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = sha1_of_file(&dir.path().join("nope")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
