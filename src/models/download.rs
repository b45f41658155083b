//! Download task records exposed by the download manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Cancelled
        )
    }
}

/// Snapshot of one audio download task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub video_id: String,
    pub video_url: String,
    #[serde(skip)]
    pub cache_file: PathBuf,
    pub status: DownloadStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub file_size_bytes: u64,
}

impl DownloadTask {
    pub fn new(video_id: &str, cache_file: PathBuf, max_attempts: u32) -> Self {
        Self {
            video_url: format!("https://www.youtube.com/watch?v={}", video_id),
            video_id: video_id.to_string(),
            cache_file,
            status: DownloadStatus::Queued,
            attempts: 0,
            max_attempts,
            error: None,
            started_at: None,
            completed_at: None,
            file_size_bytes: 0,
        }
    }
}

/// Aggregate download manager statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadStatistics {
    pub total_downloads: u64,
    pub successful_downloads: u64,
    pub failed_downloads: u64,
    pub success_rate: f64,
    pub active_downloads: usize,
    pub queued_downloads: usize,
    pub max_parallel: u32,
}
