use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::Client;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("transfer cancelled")]
    Cancelled,
    #[error("download integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub download_block_size: usize,
    pub upload_block_size: usize,
    /// Bytes per second; 0 means unlimited.
    pub max_download_rate: u64,
    pub max_upload_rate: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_block_size: 256 * 1024,
            upload_block_size: 256 * 1024,
            max_download_rate: 0,
            max_upload_rate: 0,
        }
    }
}

/// Moves file bytes between disk and the drive's transfer endpoints.
/// Downloads land in a `.partial` sibling and are renamed into place only
/// after the integrity check passes.
#[derive(Clone)]
pub struct TransferClient {
    http: Client,
    config: TransferConfig,
}

impl TransferClient {
    pub fn new(config: TransferConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    pub async fn download_to_path(
        &self,
        url: &Url,
        target: &Path,
        expected_sha1: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let response = self.http.get(url.clone()).send().await?.error_for_status()?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        let mut digest = expected_sha1.map(|_| Sha1::new());
        let mut limiter = RateLimiter::new(self.config.max_download_rate);

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                drop(file);
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(TransferError::Cancelled);
            }
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            if let Some(hasher) = digest.as_mut() {
                hasher.update(&chunk);
            }
            limiter.throttle(chunk.len() as u64).await;
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = expected_sha1 {
            let hasher = digest.take().unwrap_or_default();
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(TransferError::IntegrityMismatch {
                    expected: expected.to_ascii_lowercase(),
                    actual,
                });
            }
        }

        tokio::fs::rename(partial, target).await?;
        Ok(())
    }

    pub async fn upload_from_path(
        &self,
        url: &Url,
        source: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let file = tokio::fs::File::open(source).await?;
        let block = self.config.upload_block_size.max(1);
        let limiter = RateLimiter::new(self.config.max_upload_rate);
        let cancel = cancel.clone();

        let stream = futures_util::stream::try_unfold(
            (file, limiter, cancel),
            move |(mut file, mut limiter, cancel)| async move {
                if cancel.is_cancelled() {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
                }
                let mut buf = vec![0u8; block];
                let read = file.read(&mut buf).await?;
                if read == 0 {
                    return Ok(None);
                }
                buf.truncate(read);
                limiter.throttle(read as u64).await;
                Ok(Some((buf, (file, limiter, cancel))))
            },
        );

        let body = reqwest::Body::wrap_stream(stream);
        self.http
            .put(url.clone())
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Paces a byte stream to at most `rate` bytes per second with plain sleeps:
/// after `n` bytes the elapsed wall clock must be at least `n / rate`.
#[derive(Debug)]
struct RateLimiter {
    rate: u64,
    started: Instant,
    sent: u64,
}

impl RateLimiter {
    fn new(rate: u64) -> Self {
        Self {
            rate,
            started: Instant::now(),
            sent: 0,
        }
    }

    async fn throttle(&mut self, bytes: u64) {
        if self.rate == 0 {
            return;
        }
        self.sent = self.sent.saturating_add(bytes);
        let expected = Duration::from_secs_f64(self.sent as f64 / self.rate as f64);
        let elapsed = self.started.elapsed();
        if expected > elapsed {
            tokio::time::sleep(expected - elapsed).await;
        }
    }
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::{body_bytes, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parse(server: &MockServer, suffix: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), suffix)).unwrap()
    }

    #[tokio::test]
    async fn downloads_file_and_verifies_sha1() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/out.txt");
        let client = TransferClient::new(TransferConfig::default());

        client
            .download_to_path(
                &parse(&server, "/file"),
                &target,
                Some("AAF4C61DDCC5E8A2DABEDE0F3B482CD9AEA9434D"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(target).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn failed_integrity_check_removes_the_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let target = dir.path().join("bad.txt");
        let client = TransferClient::new(TransferConfig::default());

        let err = client
            .download_to_path(
                &parse(&server, "/file"),
                &target,
                Some("deadbeef"),
                &CancellationToken::new(),
            )
            .await
            .expect_err("expected sha1 mismatch");

        assert!(matches!(err, TransferError::IntegrityMismatch { .. }));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn uploads_file_contents_in_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload"))
            .and(body_bytes(b"payload"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let source = dir.path().join("in.bin");
        std::fs::write(&source, b"payload").unwrap();

        let client = TransferClient::new(TransferConfig {
            upload_block_size: 3,
            ..TransferConfig::default()
        });
        client
            .upload_from_path(&parse(&server, "/upload"), &source, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_download_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1024]))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let client = TransferClient::new(TransferConfig::default());
        let token = CancellationToken::new();
        token.cancel();

        let err = client
            .download_to_path(&parse(&server, "/file"), &target, None, &token)
            .await
            .expect_err("expected cancellation");

        assert!(matches!(err, TransferError::Cancelled));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn rate_limiter_paces_bytes_per_second() {
        let mut limiter = RateLimiter::new(100_000);
        let start = Instant::now();
        limiter.throttle(10_000).await;
        limiter.throttle(10_000).await;
        // 20k bytes at 100k/s should take roughly 200ms of wall clock
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn unlimited_rate_never_sleeps() {
        let mut limiter = RateLimiter::new(0);
        let start = Instant::now();
        limiter.throttle(u64::MAX).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn partial_path_keeps_the_original_extension() {
        assert_eq!(
            partial_path(Path::new("/tmp/a.txt")),
            PathBuf::from("/tmp/a.txt.partial")
        );
        assert_eq!(
            partial_path(Path::new("/tmp/noext")),
            PathBuf::from("/tmp/noext.partial")
        );
    }
}
