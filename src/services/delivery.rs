use axum::body::Bytes;
use futures::{ready, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::models::job::{Artifact, JobId, JobStatus};
use crate::services::job_store::JobStore;

/// An opened artifact, ready to be streamed to the client.
pub struct Delivery {
    pub artifact: Artifact,
    pub size_bytes: u64,
    file: File,
    receipt: DeliveryReceipt,
}

impl Delivery {
    /// Body stream for the artifact. The job is recorded as delivered only
    /// once the whole file has been read.
    pub fn into_stream(self) -> DeliveryStream {
        DeliveryStream {
            inner: ReaderStream::new(self.file),
            receipt: Some(self.receipt),
        }
    }
}

struct DeliveryReceipt {
    store: Arc<JobStore>,
    job_id: JobId,
    filename: String,
    size_bytes: u64,
}

impl DeliveryReceipt {
    fn complete(self) {
        match self.store.update(self.job_id, |job| job.mark_delivered()) {
            Ok(true) => {
                metrics::counter!("media_jobs_delivered_total").increment(1);
                tracing::info!(
                    job_id = %self.job_id,
                    filename = %self.filename,
                    size_bytes = self.size_bytes,
                    "Artifact delivered"
                );
            }
            Ok(false) => {
                tracing::debug!(job_id = %self.job_id, "Artifact delivered again");
            }
            Err(_) => {
                tracing::debug!(job_id = %self.job_id, "Job evicted during delivery");
            }
        }
    }
}

/// Streams an artifact and records the delivery when it reaches the end.
pub struct DeliveryStream {
    inner: ReaderStream<File>,
    receipt: Option<DeliveryReceipt>,
}

impl Stream for DeliveryStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match ready!(this.inner.poll_next_unpin(cx)) {
            Some(Ok(chunk)) => Poll::Ready(Some(Ok(chunk))),
            Some(Err(e)) => {
                if let Some(receipt) = this.receipt.take() {
                    tracing::warn!(job_id = %receipt.job_id, error = %e, "Artifact stream failed");
                }
                Poll::Ready(Some(Err(e)))
            }
            None => {
                if let Some(receipt) = this.receipt.take() {
                    receipt.complete();
                }
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for DeliveryStream {
    fn drop(&mut self) {
        if let Some(receipt) = &self.receipt {
            tracing::debug!(job_id = %receipt.job_id, "Artifact stream closed before completion");
        }
    }
}

/// Hands finished artifacts to clients. Re-delivery is allowed until the job
/// is evicted.
pub struct DeliveryHandler {
    store: Arc<JobStore>,
}

impl DeliveryHandler {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    pub async fn deliver(&self, job_id: JobId) -> Result<Delivery, AppError> {
        let job = self.store.get(job_id)?;
        if job.status != JobStatus::Finished {
            return Err(AppError::NotReady {
                job_id,
                status: job.status,
            });
        }
        let artifact = job
            .result
            .ok_or_else(|| AppError::Internal(format!("finished job {job_id} has no artifact")))?;

        let file = match File::open(&artifact.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(job_id = %job_id, path = %artifact.path.display(), "Artifact missing on disk");
                return Err(AppError::NotFound(format!(
                    "artifact for job {job_id} is no longer available"
                )));
            }
            Err(e) => return Err(AppError::Internal(format!("failed to open artifact: {e}"))),
        };
        let size_bytes = file
            .metadata()
            .await
            .map_err(|e| AppError::Internal(format!("failed to stat artifact: {e}")))?
            .len();

        tracing::info!(job_id = %job_id, filename = %artifact.filename, size_bytes, "Streaming artifact");

        let receipt = DeliveryReceipt {
            store: Arc::clone(&self.store),
            job_id,
            filename: artifact.filename.clone(),
            size_bytes,
        };
        Ok(Delivery {
            artifact,
            size_bytes,
            file,
            receipt,
        })
    }
}
