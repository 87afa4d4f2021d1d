// SPDX-License-Identifier: GPL-3.0-or-later

//! Classification of a media item's download lifecycle.
//!
//! The state is never stored. It is derived on every query from the media's
//! `downloaded` flag and whatever the external job queue currently reports.

use reelsync_domain::{DownloadState, Media, MediaId};
use thiserror::Error;
use tracing::warn;

/// Snapshot of the external download job for one media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobStatus {
    /// The job is locked by a live worker.
    pub is_running: bool,
    /// The last attempt recorded an error.
    pub has_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobStatusError {
    #[error("job status unavailable: {0}")]
    Unavailable(String),
}

pub type JobStatusResult<T> = Result<T, JobStatusError>;

/// Lookup of download jobs owned by the external task queue.
pub trait JobStatusSource: Send + Sync {
    /// `Ok(None)` when no job exists for the media item.
    fn job_status(&self, media_id: MediaId) -> JobStatusResult<Option<JobStatus>>;
}

/// Pure mapping from persisted and external facts to a state label.
pub fn derive_download_state(downloaded: bool, job: Option<&JobStatus>) -> DownloadState {
    if downloaded {
        return DownloadState::Downloaded;
    }
    match job {
        None => DownloadState::Unknown,
        Some(job) if job.is_running => DownloadState::Downloading,
        Some(job) if job.has_error => DownloadState::Error,
        Some(_) => DownloadState::Scheduled,
    }
}

/// Current state of `media`. A failed job lookup counts as "no job".
pub fn download_state(media: &Media, jobs: &dyn JobStatusSource) -> DownloadState {
    if media.downloaded {
        return DownloadState::Downloaded;
    }
    let job = match jobs.job_status(media.id) {
        Ok(job) => job,
        Err(err) => {
            warn!(target: "catalog", media_id = %media.id, error = %err, "job status lookup failed");
            None
        }
    };
    derive_download_state(false, job.as_ref())
}
