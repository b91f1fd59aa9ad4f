//! Append-only bag file writer: one dedicated worker thread per open
//! file, bounded in-memory queue, size/time rotation, age/count
//! retention.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam::channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;

use crate::bag::dto::BagMessage;
use crate::bag::footer::{RetentionPolicy, RotationPolicy};
use crate::bag::indexer::Indexer;
use crate::error::BagError;

#[derive(Debug, Clone, Default)]
pub struct BagWriterStats {
    pub current_file_path: String,
    pub rotation_count: u64,
    pub messages_written: u64,
    pub messages_dropped: u64,
    pub bytes_written: u64,
    pub current_file_size: u64,
}

#[derive(Default)]
struct Counters {
    written: AtomicU64,
    dropped: AtomicU64,
    bytes: AtomicU64,
}

enum Command {
    Append(BagMessage),
    Flush(Sender<()>),
}

struct ActiveFile {
    command_tx: Sender<Command>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
    file_start: Instant,
    filepath: PathBuf,
}

struct Totals {
    messages_written: u64,
    messages_dropped: u64,
    bytes_written: u64,
    rotation_count: u64,
}

/// Writes `BagMessage`s to a JSON-lines data section followed by a
/// binary index and footer, rotating and retaining files per policy.
pub struct BagWriter {
    bag_directory: PathBuf,
    base_filename: String,
    queue_capacity: usize,
    rotation_policy: Mutex<RotationPolicy>,
    retention_policy: Mutex<RetentionPolicy>,
    active: Mutex<Option<ActiveFile>>,
    totals: Mutex<Totals>,
}

impl BagWriter {
    pub fn new(bag_directory: impl Into<PathBuf>, base_filename: impl Into<String>, queue_capacity: usize) -> Self {
        let bag_directory = bag_directory.into();
        if let Err(e) = fs::create_dir_all(&bag_directory) {
            log::warn!("failed to create bag directory {}: {}", bag_directory.display(), e);
        }
        let writer = Self {
            bag_directory,
            base_filename: base_filename.into(),
            queue_capacity,
            rotation_policy: Mutex::new(RotationPolicy::default()),
            retention_policy: Mutex::new(RetentionPolicy::default()),
            active: Mutex::new(None),
            totals: Mutex::new(Totals {
                messages_written: 0,
                messages_dropped: 0,
                bytes_written: 0,
                rotation_count: 0,
            }),
        };
        log::info!(
            "bag writer created: directory={}, queue_capacity={}",
            writer.bag_directory.display(),
            queue_capacity
        );
        writer
    }

    pub fn set_rotation_policy(&self, policy: RotationPolicy) {
        *self.rotation_policy.lock() = policy;
    }

    pub fn set_retention_policy(&self, policy: RetentionPolicy) {
        *self.retention_policy.lock() = policy;
    }

    pub fn is_open(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn current_file_path(&self) -> Option<String> {
        self.active
            .lock()
            .as_ref()
            .map(|a| a.filepath.to_string_lossy().into_owned())
    }

    /// Create a new timestamped bag file and spawn its writer thread.
    pub fn start(&self) -> Result<(), BagError> {
        let mut active = self.active.lock();
        if active.is_some() {
            log::warn!("bag writer already started");
            return Ok(());
        }
        let filepath = self.create_new_bag_file();
        *active = Some(Self::open_file(&filepath, self.queue_capacity)?);
        log::info!("bag writer started: {}", filepath.display());
        Ok(())
    }

    pub fn stop(&self) {
        let mut active = self.active.lock();
        if let Some(a) = active.take() {
            Self::finalize(a, &mut self.totals.lock());
        }
        log::info!("bag writer stopped");
    }

    fn open_file(filepath: &Path, queue_capacity: usize) -> Result<ActiveFile, BagError> {
        let (tx, rx) = bounded::<Command>(queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker_counters = counters.clone();
        let worker_path = filepath.to_path_buf();
        let worker = std::thread::Builder::new()
            .name("bag-writer".into())
            .spawn(move || run_worker(worker_path, rx, worker_counters))
            .map_err(|e| BagError::Io(std::io::Error::other(e.to_string())))?;

        Ok(ActiveFile {
            command_tx: tx,
            worker: Some(worker),
            counters,
            file_start: Instant::now(),
            filepath: filepath.to_path_buf(),
        })
    }

    /// Non-blocking enqueue. Returns `false` if the in-memory queue is
    /// full (counted as a drop).
    pub fn append_async(&self, msg: BagMessage) -> bool {
        let active = self.active.lock();
        let Some(active) = active.as_ref() else {
            log::warn!("bag writer not open");
            return false;
        };
        match active.command_tx.try_send(Command::Append(msg)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                active.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Enqueue then block until the worker has flushed it to disk.
    pub fn append(&self, msg: BagMessage) -> bool {
        if !self.append_async(msg) {
            return false;
        }
        let flushed = self.flush(Duration::from_millis(1000));
        self.check_and_rotate();
        flushed
    }

    pub fn flush(&self, timeout: Duration) -> bool {
        let active = self.active.lock();
        let Some(active) = active.as_ref() else {
            return false;
        };
        let (ack_tx, ack_rx) = bounded(1);
        if active.command_tx.send(Command::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    fn check_and_rotate(&self) {
        if self.should_rotate() {
            if let Err(e) = self.rotate() {
                log::error!("bag writer failed to rotate: {}", e);
            }
        }
    }

    pub fn should_rotate(&self) -> bool {
        let active = self.active.lock();
        let Some(active) = active.as_ref() else {
            return false;
        };
        let current_size = active.counters.bytes.load(Ordering::Relaxed);
        let elapsed = active.file_start.elapsed().as_secs();
        self.rotation_policy.lock().should_rotate(current_size, elapsed)
    }

    /// Finalize the active file, apply retention, and open a fresh one.
    pub fn rotate(&self) -> Result<(), BagError> {
        let mut active_slot = self.active.lock();
        let Some(active) = active_slot.take() else {
            return Ok(());
        };
        log::info!("rotating bag file: {}", active.filepath.display());
        Self::finalize(active, &mut self.totals.lock());

        self.apply_retention_policy();

        let new_path = self.create_new_bag_file();
        let opened = Self::open_file(&new_path, self.queue_capacity)?;
        self.totals.lock().rotation_count += 1;
        log::info!(
            "bag file rotated: new={}, rotation_count={}",
            new_path.display(),
            self.totals.lock().rotation_count
        );
        *active_slot = Some(opened);
        Ok(())
    }

    fn finalize(mut active: ActiveFile, totals: &mut Totals) {
        let (ack_tx, ack_rx) = bounded(1);
        let _ = active.command_tx.send(Command::Flush(ack_tx));
        let _ = ack_rx.recv_timeout(Duration::from_millis(5000));
        drop(active.command_tx);
        if let Some(handle) = active.worker.take() {
            let _ = handle.join();
        }
        totals.messages_written += active.counters.written.load(Ordering::Relaxed);
        totals.messages_dropped += active.counters.dropped.load(Ordering::Relaxed);
        totals.bytes_written += active.counters.bytes.load(Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> BagWriterStats {
        let active = self.active.lock();
        let totals = self.totals.lock();
        match active.as_ref() {
            Some(a) => {
                let written = a.counters.written.load(Ordering::Relaxed);
                let dropped = a.counters.dropped.load(Ordering::Relaxed);
                let bytes = a.counters.bytes.load(Ordering::Relaxed);
                BagWriterStats {
                    current_file_path: a.filepath.to_string_lossy().into_owned(),
                    rotation_count: totals.rotation_count,
                    messages_written: totals.messages_written + written,
                    messages_dropped: totals.messages_dropped + dropped,
                    bytes_written: totals.bytes_written + bytes,
                    current_file_size: bytes,
                }
            }
            None => BagWriterStats {
                current_file_path: String::new(),
                rotation_count: totals.rotation_count,
                messages_written: totals.messages_written,
                messages_dropped: totals.messages_dropped,
                bytes_written: totals.bytes_written,
                current_file_size: 0,
            },
        }
    }

    fn create_new_bag_file(&self) -> PathBuf {
        let now = Utc::now();
        let filename = format!(
            "{}_{}.bag",
            self.base_filename,
            now.format("%Y-%m-%d_%H-%M-%S-%3f")
        );
        self.bag_directory.join(filename)
    }

    /// List `*.bag` files in the bag directory, oldest first, and
    /// delete those the retention policy marks for removal.
    fn apply_retention_policy(&self) -> usize {
        let mut files = match list_bag_files(&self.bag_directory) {
            Ok(files) => files,
            Err(e) => {
                log::error!("bag writer failed to list directory for retention: {}", e);
                return 0;
            }
        };
        files.sort_by_key(|(_, modified)| *modified);

        let policy = *self.retention_policy.lock();
        let total = files.len();
        let now = std::time::SystemTime::now();
        let mut deleted = 0usize;

        for (index, (path, modified)) in files.iter().enumerate() {
            let age_hours = now
                .duration_since(*modified)
                .unwrap_or(Duration::ZERO)
                .as_secs()
                / 3600;
            if policy.should_delete(age_hours, total, index) {
                if let Err(e) = fs::remove_file(path) {
                    log::error!("failed to delete bag file {}: {}", path.display(), e);
                } else {
                    deleted += 1;
                }
            }
        }

        if deleted > 0 {
            log::info!("retention policy applied: {} files deleted", deleted);
        }
        deleted
    }

    /// Delete the oldest files until at least `bytes_needed` bytes are
    /// freed, ignoring the configured retention policy. Used when disk
    /// space runs critically low.
    pub fn emergency_delete(&self, bytes_needed: u64) -> usize {
        let mut files = match list_bag_files(&self.bag_directory) {
            Ok(files) => files,
            Err(e) => {
                log::error!("bag writer failed to list directory for emergency delete: {}", e);
                return 0;
            }
        };
        files.sort_by_key(|(_, modified)| *modified);

        let mut freed = 0u64;
        let mut deleted = 0usize;
        for (path, _) in files {
            if freed >= bytes_needed {
                break;
            }
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if fs::remove_file(&path).is_ok() {
                freed += size;
                deleted += 1;
            }
        }
        if deleted > 0 {
            log::warn!("emergency delete freed {} bytes across {} files", freed, deleted);
        }
        deleted
    }
}

impl Drop for BagWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn list_bag_files(dir: &Path) -> std::io::Result<Vec<(PathBuf, std::time::SystemTime)>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("bag") {
            let modified = entry.metadata()?.modified()?;
            files.push((path, modified));
        }
    }
    Ok(files)
}

fn run_worker(path: PathBuf, rx: crossbeam::channel::Receiver<Command>, counters: Arc<Counters>) {
    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            log::error!("bag writer failed to open {}: {}", path.display(), e);
            return;
        }
    };
    let mut writer = BufWriter::new(file);
    let mut indexer = Indexer::new();
    let mut data_size: u64 = 0;

    for cmd in rx.iter() {
        match cmd {
            Command::Append(msg) => match msg.to_json_line() {
                Ok(line) => {
                    let bytes = line.as_bytes();
                    indexer.add_entry(msg.timestamp_ns.max(0) as u64, data_size);
                    if let Err(e) = writer.write_all(bytes) {
                        log::error!("bag writer write failed: {}", e);
                        counters.dropped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    data_size += bytes.len() as u64;
                    counters.written.fetch_add(1, Ordering::Relaxed);
                    counters.bytes.store(data_size, Ordering::Relaxed);
                }
                Err(e) => {
                    log::error!("bag writer failed to serialize message: {}", e);
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
            },
            Command::Flush(ack) => {
                let _ = writer.flush();
                let _ = ack.send(());
            }
        }
    }

    let _ = writer.flush();
    let file = match writer.into_inner() {
        Ok(f) => f,
        Err(e) => e.into_inner(),
    };
    let mut file: File = file;
    if let Err(e) = indexer.write_to_file(&mut file, data_size) {
        log::error!("bag writer failed to finalize {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::dto::DataType;

    fn msg(ts: i64, topic: &str) -> BagMessage {
        BagMessage::new(ts, topic, DataType::Event, "1")
    }

    #[test]
    fn writes_and_finalizes_a_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = BagWriter::new(dir.path(), "test", 16);
        writer.start().unwrap();
        assert!(writer.append(msg(1, "a")));
        assert!(writer.append(msg(2, "b")));
        let path = writer.current_file_path().unwrap();
        writer.stop();

        let mut indexer = Indexer::new();
        let footer = indexer.read_from_file(Path::new(&path)).unwrap();
        assert_eq!(footer.index_count, 2);
    }

    #[test]
    fn stats_reflect_written_messages() {
        let dir = tempfile::tempdir().unwrap();
        let writer = BagWriter::new(dir.path(), "test", 16);
        writer.start().unwrap();
        writer.append(msg(1, "a"));
        writer.append(msg(2, "a"));
        let stats = writer.get_stats();
        assert_eq!(stats.messages_written, 2);
        writer.stop();
    }

    #[test]
    fn rotation_creates_a_second_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = BagWriter::new(dir.path(), "test", 16);
        writer.set_rotation_policy(RotationPolicy::size(0));
        writer.start().unwrap();
        assert!(writer.append(msg(1, "a")));
        // A zero-byte threshold rotates on the very next check.
        writer.rotate().unwrap();
        writer.append(msg(2, "a"));
        writer.stop();

        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 2);
    }
}
