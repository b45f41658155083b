//! Parallel audio download manager.
//!
//! A fixed pool of workers consumes a shared FIFO queue of video ids. A
//! counting semaphore enforces the configured parallelism (hot-reloadable by
//! swapping the semaphore; workers pick it up on their next task) and a
//! per-id lock guarantees at most one in-flight download per video.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::models::{DownloadStatistics, DownloadStatus, DownloadTask};
use crate::services::media_cache::MediaCache;

/// Upper bound of the parallelism range; also the worker pool size.
const MAX_PARALLEL_LIMIT: u32 = 10;
/// Default size estimate handed to the cache before a download starts.
const NEW_FILE_ESTIMATE: u64 = 10 * 1024 * 1024;
/// Audio container extensions yt-dlp may produce.
const AUDIO_EXTENSIONS: &[&str] = &["webm", "m4a", "mp4", "opus", "ogg"];

pub struct DownloadManager {
    cache: Arc<MediaCache>,
    queue: Mutex<VecDeque<String>>,
    tasks: DashMap<String, DownloadTask>,
    id_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    semaphore: RwLock<Arc<Semaphore>>,
    max_parallel: AtomicU32,
    download_timeout_secs: AtomicU64,
    max_attempts: AtomicU32,
    running: AtomicBool,
    total_downloads: AtomicU64,
    successful_downloads: AtomicU64,
    failed_downloads: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DownloadManager {
    pub fn new(cache: Arc<MediaCache>, max_parallel: u32, download_timeout_secs: u64) -> Self {
        let max_parallel = max_parallel.clamp(1, MAX_PARALLEL_LIMIT);
        tracing::info!(
            max_parallel,
            download_timeout_secs,
            "Download manager initialized"
        );
        Self {
            cache,
            queue: Mutex::new(VecDeque::new()),
            tasks: DashMap::new(),
            id_locks: DashMap::new(),
            semaphore: RwLock::new(Arc::new(Semaphore::new(max_parallel as usize))),
            max_parallel: AtomicU32::new(max_parallel),
            download_timeout_secs: AtomicU64::new(download_timeout_secs),
            max_attempts: AtomicU32::new(3),
            running: AtomicBool::new(false),
            total_downloads: AtomicU64::new(0),
            successful_downloads: AtomicU64::new(0),
            failed_downloads: AtomicU64::new(0),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker pool. Idempotent.
    pub fn start_workers(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut workers = self.workers.lock().unwrap();
        for worker_id in 0..MAX_PARALLEL_LIMIT {
            let manager = Arc::clone(self);
            workers.push(tokio::spawn(async move {
                manager.worker_loop(worker_id).await;
            }));
        }
        tracing::info!("Started {} download workers", MAX_PARALLEL_LIMIT);
    }

    /// Signal shutdown. Queued tasks become CANCELLED; in-flight downloads
    /// run to completion or time out.
    pub async fn stop_workers(&self) {
        self.running.store(false, Ordering::SeqCst);
        let drained: Vec<String> = {
            let mut queue = self.queue.lock().unwrap();
            queue.drain(..).collect()
        };
        for video_id in drained {
            if let Some(mut task) = self.tasks.get_mut(&video_id) {
                task.status = DownloadStatus::Cancelled;
            }
        }
        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.workers.lock().unwrap();
            guard.drain(..).collect()
        };
        for worker in workers {
            let _ = worker.await;
        }
        tracing::info!("Stopped all download workers");
    }

    async fn worker_loop(self: Arc<Self>, worker_id: u32) {
        tracing::debug!(worker_id, "Download worker started");
        while self.running.load(Ordering::SeqCst) {
            let next = self.queue.lock().unwrap().pop_front();
            let Some(video_id) = next else {
                // Short tick so the shutdown flag is observed promptly.
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            };

            let semaphore = self.semaphore.read().unwrap().clone();
            let Ok(_permit) = semaphore.acquire().await else {
                continue;
            };
            self.execute_download(&video_id, worker_id).await;
        }
        tracing::debug!(worker_id, "Download worker stopped");
    }

    async fn execute_download(&self, video_id: &str, worker_id: u32) {
        // Per-id serialization: two callers requesting the same id share one
        // download.
        let id_lock = self
            .id_locks
            .entry(video_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = id_lock.lock().await;

        if self.cache.lookup(video_id).is_some() {
            if let Some(mut task) = self.tasks.get_mut(video_id) {
                task.status = DownloadStatus::Completed;
                task.completed_at = Some(Utc::now());
            }
            return;
        }

        let (attempts, max_attempts, cache_file) = {
            let Some(mut task) = self.tasks.get_mut(video_id) else {
                return;
            };
            task.attempts += 1;
            task.status = DownloadStatus::Downloading;
            task.started_at = Some(Utc::now());
            (task.attempts, task.max_attempts, task.cache_file.clone())
        };

        tracing::info!(
            worker_id,
            video_id,
            attempt = attempts,
            max_attempts,
            "Starting download"
        );

        self.clean_partial_artifacts(video_id);
        self.cache.make_room(NEW_FILE_ESTIMATE);

        let timeout = Duration::from_secs(self.download_timeout_secs.load(Ordering::SeqCst));
        let result = self.fetch_audio(video_id, &cache_file, timeout).await;

        match result {
            Ok((final_path, size)) => {
                let filename = final_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                self.cache.admit(video_id, &filename, size);
                if let Some(mut task) = self.tasks.get_mut(video_id) {
                    task.status = DownloadStatus::Completed;
                    task.completed_at = Some(Utc::now());
                    task.file_size_bytes = size;
                }
                self.total_downloads.fetch_add(1, Ordering::SeqCst);
                self.successful_downloads.fetch_add(1, Ordering::SeqCst);
                tracing::info!(
                    worker_id,
                    video_id,
                    size_mb = size as f64 / 1024.0 / 1024.0,
                    "Download completed"
                );
            }
            Err(err) => {
                tracing::error!(worker_id, video_id, error = %err, "Download failed");
                self.remove_failed_files(&cache_file);
                if let Some(mut task) = self.tasks.get_mut(video_id) {
                    task.status = DownloadStatus::Failed;
                    task.error = Some(err.to_string());
                }

                if attempts < max_attempts {
                    let backoff = Duration::from_secs((1u64 << attempts.min(5)).min(30));
                    tracing::info!(
                        video_id,
                        backoff_secs = backoff.as_secs(),
                        "Retrying download"
                    );
                    tokio::time::sleep(backoff).await;
                    if let Some(mut task) = self.tasks.get_mut(video_id) {
                        task.status = DownloadStatus::Queued;
                    }
                    self.queue.lock().unwrap().push_back(video_id.to_string());
                } else {
                    self.total_downloads.fetch_add(1, Ordering::SeqCst);
                    self.failed_downloads.fetch_add(1, Ordering::SeqCst);
                    tracing::error!(video_id, attempts, "Download failed permanently");
                }
            }
        }
    }

    /// Invoke the external stream fetcher and locate the produced file.
    async fn fetch_audio(
        &self,
        video_id: &str,
        cache_file: &PathBuf,
        timeout: Duration,
    ) -> anyhow::Result<(PathBuf, u64)> {
        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        let template = cache_file.with_extension("%(ext)s");

        let mut command = tokio::process::Command::new("yt-dlp");
        command
            .arg("-f")
            .arg("bestaudio[ext=opus]/bestaudio[ext=m4a]/bestaudio[ext=webm]/bestaudio/best")
            .arg("-o")
            .arg(&template)
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--retries")
            .arg("3")
            .arg(&url)
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| anyhow::anyhow!("Download timeout after {}s", timeout.as_secs()))??;

        if !output.status.success() {
            anyhow::bail!(
                "yt-dlp exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let final_path = self
            .locate_downloaded_file(cache_file)
            .ok_or_else(|| anyhow::anyhow!("Downloaded file not found"))?;
        let size = std::fs::metadata(&final_path)?.len();
        if size == 0 {
            let _ = std::fs::remove_file(&final_path);
            anyhow::bail!("Downloaded file is empty");
        }
        Ok((final_path, size))
    }

    fn locate_downloaded_file(&self, cache_file: &PathBuf) -> Option<PathBuf> {
        if cache_file.is_file() {
            return Some(cache_file.clone());
        }
        AUDIO_EXTENSIONS
            .iter()
            .map(|ext| cache_file.with_extension(ext))
            .find(|candidate| candidate.is_file())
    }

    /// Delete residual partial artifacts left behind by an interrupted run.
    fn clean_partial_artifacts(&self, video_id: &str) {
        let Ok(entries) = std::fs::read_dir(self.cache.cache_dir()) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(video_id)
                && (name.contains(".part") || name.contains(".ytdl") || name.contains("Frag"))
            {
                tracing::debug!(file = %name, "Removing partial artifact");
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }

    fn remove_failed_files(&self, cache_file: &PathBuf) {
        for ext in AUDIO_EXTENSIONS {
            let candidate = cache_file.with_extension(ext);
            if candidate.is_file() {
                let _ = std::fs::remove_file(candidate);
            }
        }
    }

    /// Queue a download, or return the cached path when already present.
    /// Idempotent per id: a second call while a task is pending resolves to
    /// the same eventual download.
    pub fn download(&self, video_id: &str, priority: bool) -> Option<PathBuf> {
        if let Some(path) = self.cache.lookup(video_id) {
            return Some(path);
        }

        if let Some(task) = self.tasks.get(video_id) {
            if !task.status.is_terminal() {
                tracing::debug!(video_id, "Already queued or downloading");
                return None;
            }
        }

        let cache_file = self.cache.cache_dir().join(format!("{}.webm", video_id));
        let task = DownloadTask::new(
            video_id,
            cache_file,
            self.max_attempts.load(Ordering::SeqCst),
        );
        self.tasks.insert(video_id.to_string(), task);

        let mut queue = self.queue.lock().unwrap();
        if priority {
            tracing::info!(video_id, "Queuing download (priority)");
            queue.push_front(video_id.to_string());
        } else {
            tracing::info!(video_id, "Queuing download");
            queue.push_back(video_id.to_string());
        }
        None
    }

    /// Queue a playlist: the current track first, the next two with
    /// priority, then the rest in order.
    pub fn download_playlist(&self, video_ids: &[String], current_index: usize) {
        if video_ids.is_empty() {
            return;
        }
        tracing::info!(
            tracks = video_ids.len(),
            current_index,
            "Queuing playlist downloads"
        );

        // Priority ids are pushed to the queue front, so enqueue them in
        // reverse to keep the current track first.
        let priority_end = (current_index + 3).min(video_ids.len());
        if current_index < video_ids.len() {
            for id in video_ids[current_index..priority_end].iter().rev() {
                self.download(id, true);
            }
        }
        for (i, id) in video_ids.iter().enumerate() {
            if i < current_index || i >= current_index + 3 {
                self.download(id, false);
            }
        }
    }

    pub fn status(&self, video_id: &str) -> Option<DownloadTask> {
        self.tasks.get(video_id).map(|t| t.clone())
    }

    pub fn is_downloading(&self, video_id: &str) -> bool {
        self.tasks
            .get(video_id)
            .map(|t| matches!(t.status, DownloadStatus::Queued | DownloadStatus::Downloading))
            .unwrap_or(false)
    }

    pub fn statistics(&self) -> DownloadStatistics {
        let mut active = 0usize;
        let mut queued = 0usize;
        for task in self.tasks.iter() {
            match task.status {
                DownloadStatus::Downloading => active += 1,
                DownloadStatus::Queued => queued += 1,
                _ => {}
            }
        }
        let total = self.total_downloads.load(Ordering::SeqCst);
        let successful = self.successful_downloads.load(Ordering::SeqCst);
        DownloadStatistics {
            total_downloads: total,
            successful_downloads: successful,
            failed_downloads: self.failed_downloads.load(Ordering::SeqCst),
            success_rate: if total > 0 {
                successful as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            active_downloads: active,
            queued_downloads: queued,
            max_parallel: self.max_parallel.load(Ordering::SeqCst),
        }
    }

    /// Hot-reload the parallelism cap. Workers observe the new semaphore on
    /// their next task; in-flight downloads are unaffected.
    pub fn update_max_parallel(&self, new_max: u32) {
        let clamped = new_max.clamp(1, MAX_PARALLEL_LIMIT);
        let old = self.max_parallel.swap(clamped, Ordering::SeqCst);
        *self.semaphore.write().unwrap() = Arc::new(Semaphore::new(clamped as usize));
        tracing::info!(old, new = clamped, "Max parallel downloads updated");
    }

    pub fn update_download_timeout(&self, seconds: u64) {
        self.download_timeout_secs.store(seconds, Ordering::SeqCst);
    }

    pub fn update_max_attempts(&self, attempts: u32) {
        self.max_attempts.store(attempts.max(1), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager() -> (tempfile::TempDir, Arc<DownloadManager>) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(MediaCache::new(dir.path(), 1.0).unwrap());
        let manager = Arc::new(DownloadManager::new(cache, 3, 300));
        (dir, manager)
    }

    #[tokio::test]
    async fn cached_id_returns_path_synchronously() {
        let (dir, manager) = test_manager();
        std::fs::write(dir.path().join("abc.webm"), b"audio").unwrap();
        manager.cache.admit("abc", "abc.webm", 5);

        let path = manager.download("abc", false);
        assert_eq!(path, Some(dir.path().join("abc.webm")));
        assert_eq!(manager.statistics().queued_downloads, 0);
    }

    #[tokio::test]
    async fn duplicate_requests_share_one_task() {
        let (_dir, manager) = test_manager();

        assert!(manager.download("video1", false).is_none());
        assert!(manager.download("video1", false).is_none());

        let stats = manager.statistics();
        assert_eq!(stats.queued_downloads, 1, "second request must not enqueue");
        assert!(manager.is_downloading("video1"));
    }

    #[tokio::test]
    async fn playlist_prioritizes_current_and_next_two() {
        let (_dir, manager) = test_manager();
        let ids: Vec<String> = (0..6).map(|i| format!("v{}", i)).collect();

        manager.download_playlist(&ids, 2);

        let queue: Vec<String> = manager.queue.lock().unwrap().iter().cloned().collect();
        // Current track first, its two successors next, remainder in order.
        assert_eq!(queue, ["v2", "v3", "v4", "v0", "v1", "v5"]);
    }

    #[tokio::test]
    async fn max_parallel_is_clamped() {
        let (_dir, manager) = test_manager();
        manager.update_max_parallel(50);
        assert_eq!(manager.statistics().max_parallel, 10);
        manager.update_max_parallel(0);
        assert_eq!(manager.statistics().max_parallel, 1);
    }

    #[tokio::test]
    async fn statistics_start_empty() {
        let (_dir, manager) = test_manager();
        let stats = manager.statistics();
        assert_eq!(stats.total_downloads, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.max_parallel, 3);
    }
}
