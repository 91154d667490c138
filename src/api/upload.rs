//! PDF upload with progress reporting
//!
//! Progress is published on a `watch` channel: observers always see the
//! latest stage and never block the upload.

use super::{ApiClient, ApiFailure, ApiResult, FailureKind, UploadResponse, UPLOAD};
use crate::validation;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::info;

/// Bytes handed to the transport per chunk
const UPLOAD_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Queued,
    Sending { sent: u64, total: u64 },
    /// Every byte is sent; the server is extracting and indexing
    Indexing,
    Finished { ok: bool },
}

impl UploadStage {
    pub fn percent(&self) -> u16 {
        match *self {
            UploadStage::Queued => 0,
            UploadStage::Sending { sent, total } if total > 0 => {
                ((sent.min(total) * 100) / total) as u16
            }
            UploadStage::Sending { .. } => 0,
            UploadStage::Indexing | UploadStage::Finished { .. } => 100,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UploadStage::Queued => "Preparing",
            UploadStage::Sending { .. } => "Uploading",
            UploadStage::Indexing => "Indexing",
            UploadStage::Finished { ok: true } => "Done",
            UploadStage::Finished { ok: false } => "Failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, UploadStage::Finished { .. })
    }
}

/// Read side of an upload's progress
#[derive(Debug, Clone)]
pub struct UploadProgress {
    rx: watch::Receiver<UploadStage>,
}

impl UploadProgress {
    /// Create a progress pair; the sender goes to [`ApiClient::upload_pdf`].
    pub fn channel() -> (watch::Sender<UploadStage>, Self) {
        let (tx, rx) = watch::channel(UploadStage::Queued);
        (tx, Self { rx })
    }

    pub fn latest(&self) -> UploadStage {
        *self.rx.borrow()
    }

    /// Wait for the next stage change. `None` once the upload is gone.
    pub async fn changed(&mut self) -> Option<UploadStage> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Stream of stages, starting with the current one
    pub fn into_stream(self) -> WatchStream<UploadStage> {
        WatchStream::new(self.rx)
    }
}

impl ApiClient {
    /// Upload a PDF for indexing under `system_name`.
    ///
    /// The file is validated locally first (PDF signature, 50MB cap). When
    /// `progress` is given it receives every stage of the upload.
    pub async fn upload_pdf(
        &self,
        path: &Path,
        system_name: &str,
        progress: Option<watch::Sender<UploadStage>>,
    ) -> ApiResult<UploadResponse> {
        let progress = progress.map(Arc::new);
        let result = self.upload_inner(path, system_name, progress.clone()).await;
        if let Some(tx) = &progress {
            let _ = tx.send(UploadStage::Finished { ok: result.is_ok() });
        }
        result
    }

    async fn upload_inner(
        &self,
        path: &Path,
        system_name: &str,
        progress: Option<Arc<watch::Sender<UploadStage>>>,
    ) -> ApiResult<UploadResponse> {
        validation::validate_pdf(path)?;
        let system_name = validation::validate_system_name(system_name)?.to_string();

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ApiFailure::new(
                FailureKind::Validation,
                format!("Could not read {}: {}", path.display(), e),
            )
        })?;
        let total = bytes.len() as u64;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        info!("Uploading {} ({} bytes) for system '{}'", file_name, total, system_name);

        let chunks: Vec<Vec<u8>> = bytes.chunks(UPLOAD_CHUNK).map(<[u8]>::to_vec).collect();
        let reporter = progress.clone();
        let stream = futures::stream::iter(chunks.into_iter().scan(0u64, move |sent, chunk| {
            *sent += chunk.len() as u64;
            if let Some(tx) = &reporter {
                let stage = if *sent >= total {
                    UploadStage::Indexing
                } else {
                    UploadStage::Sending { sent: *sent, total }
                };
                let _ = tx.send(stage);
            }
            Some(Ok::<_, std::io::Error>(chunk))
        }));

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(file_name)
            .mime_str("application/pdf")
            .map_err(|e| ApiFailure::new(FailureKind::Validation, e.to_string()))?;
        let form = Form::new()
            .text("system_name", system_name)
            .part("file", part);

        if let Some(tx) = &progress {
            let _ = tx.send(UploadStage::Sending { sent: 0, total });
        }

        let request = self
            .http
            .post(self.url("/documents/upload"))
            .multipart(form);
        let body = self.execute(request, UPLOAD).await?;
        let response: UploadResponse = super::decode(&body, UPLOAD)?;
        info!("Indexed document {}", response.file_hash);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_percent() {
        assert_eq!(UploadStage::Queued.percent(), 0);
        assert_eq!(UploadStage::Sending { sent: 50, total: 200 }.percent(), 25);
        assert_eq!(UploadStage::Sending { sent: 0, total: 0 }.percent(), 0);
        assert_eq!(UploadStage::Indexing.percent(), 100);
        assert!(UploadStage::Finished { ok: false }.is_finished());
    }

    #[tokio::test]
    async fn test_progress_reports_latest_value() {
        let (tx, mut progress) = UploadProgress::channel();
        assert_eq!(progress.latest(), UploadStage::Queued);

        tx.send(UploadStage::Sending { sent: 1, total: 4 }).unwrap();
        tx.send(UploadStage::Indexing).unwrap();
        assert_eq!(progress.changed().await, Some(UploadStage::Indexing));

        drop(tx);
        assert_eq!(progress.changed().await, None);
    }

    #[tokio::test]
    async fn test_invalid_file_never_reaches_network() {
        let (session, _rx) = crate::SessionContext::new(true);
        let config = crate::RagdeskConfig::new(std::env::temp_dir())
            .with_base_url("http://127.0.0.1:9");
        let api = ApiClient::new(
            &config,
            std::sync::Arc::new(crate::api::MemoryCredentialStore::new()),
            session,
        )
        .unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain").unwrap();

        let (tx, progress) = UploadProgress::channel();
        let err = api.upload_pdf(&path, "SAP", Some(tx)).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
        assert_eq!(progress.latest(), UploadStage::Finished { ok: false });
    }
}
