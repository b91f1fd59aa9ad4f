//! Replays a closed bag file on a dedicated worker thread, scheduling
//! messages by their recorded timestamp (or as fast as possible).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::bag::dto::BagMessage;
use crate::bag::reader::BagReader;
use crate::error::BagError;

/// How quickly recorded messages are delivered.
#[derive(Debug, Clone, Copy)]
pub enum ReplaySpeed {
    /// Wall-clock matches the recorded timestamps exactly.
    Realtime,
    /// Recorded intervals divided by `multiplier` (2.0 = twice as fast).
    Fast(f64),
    /// No inter-message delay at all.
    AsFastAsPossible,
}

impl ReplaySpeed {
    fn multiplier(self) -> Option<f64> {
        match self {
            ReplaySpeed::Realtime => Some(1.0),
            ReplaySpeed::Fast(m) if m > 0.0 => Some(m),
            ReplaySpeed::Fast(_) => Some(1.0),
            ReplaySpeed::AsFastAsPossible => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplayStats {
    pub messages_replayed: u64,
    pub messages_skipped: u64,
    pub elapsed_secs: f64,
    pub progress: f64,
}

type MessageCallback = Arc<dyn Fn(&BagMessage) + Send + Sync>;

/// Owns a `BagReader` and a worker thread; message delivery and replay
/// control are safe to call from any thread.
pub struct BagReplayer {
    reader: Arc<Mutex<BagReader>>,
    callback: Mutex<Option<MessageCallback>>,
    topic_filter: Mutex<Option<String>>,
    time_range: Mutex<(u64, u64)>,
    worker: Mutex<Option<JoinHandle<()>>>,
    is_playing: Arc<AtomicBool>,
    is_paused: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
    stats: Arc<Mutex<ReplayStats>>,
}

impl BagReplayer {
    pub fn new() -> Self {
        Self {
            reader: Arc::new(Mutex::new(BagReader::new())),
            callback: Mutex::new(None),
            topic_filter: Mutex::new(None),
            time_range: Mutex::new((0, u64::MAX)),
            worker: Mutex::new(None),
            is_playing: Arc::new(AtomicBool::new(false)),
            is_paused: Arc::new(AtomicBool::new(false)),
            should_stop: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(ReplayStats::default())),
        }
    }

    pub fn open(&self, filepath: impl Into<std::path::PathBuf>) -> Result<(), BagError> {
        if self.is_playing.load(Ordering::Acquire) {
            return Err(BagError::NotOpen);
        }
        self.reader.lock().unwrap().open(filepath)
    }

    pub fn close(&self) {
        self.stop();
        self.reader.lock().unwrap().close();
    }

    pub fn set_message_callback<F>(&self, callback: F)
    where
        F: Fn(&BagMessage) + Send + Sync + 'static,
    {
        *self.callback.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn set_topic_filter(&self, topic: impl Into<String>) {
        *self.topic_filter.lock().unwrap() = Some(topic.into());
    }

    pub fn set_time_range(&self, start_ns: u64, end_ns: u64) {
        *self.time_range.lock().unwrap() = (start_ns, end_ns);
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused.load(Ordering::Acquire)
    }

    pub fn get_stats(&self) -> ReplayStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn pause(&self) {
        if self.is_playing.load(Ordering::Acquire) {
            self.is_paused.store(true, Ordering::Release);
        }
    }

    pub fn resume(&self) {
        if self.is_playing.load(Ordering::Acquire) {
            self.is_paused.store(false, Ordering::Release);
        }
    }

    /// Start the replay worker thread. Fails if already playing or if
    /// no file is open.
    pub fn start(&self, speed: ReplaySpeed) -> bool {
        if self.is_playing.load(Ordering::Acquire) {
            log::warn!("bag replayer already playing");
            return false;
        }

        {
            let mut reader = self.reader.lock().unwrap();
            let (start_ns, _) = *self.time_range.lock().unwrap();
            if start_ns > 0 {
                reader.seek_to_timestamp(start_ns);
            } else {
                reader.seek_to_start();
            }
        }

        *self.stats.lock().unwrap() = ReplayStats::default();
        self.should_stop.store(false, Ordering::Release);
        self.is_paused.store(false, Ordering::Release);
        self.is_playing.store(true, Ordering::Release);

        let reader = self.reader.clone();
        let callback = self.callback.lock().unwrap().clone();
        let topic_filter = self.topic_filter.lock().unwrap().clone();
        let (start_ns, end_ns) = *self.time_range.lock().unwrap();
        let is_playing = self.is_playing.clone();
        let is_paused = self.is_paused.clone();
        let should_stop = self.should_stop.clone();
        let stats = self.stats.clone();

        let handle = std::thread::Builder::new()
            .name("bag-replayer".into())
            .spawn(move || {
                run_replay(
                    reader,
                    callback,
                    topic_filter,
                    start_ns,
                    end_ns,
                    speed,
                    is_playing,
                    is_paused,
                    should_stop,
                    stats,
                )
            })
            .expect("failed to spawn bag replayer thread");

        *self.worker.lock().unwrap() = Some(handle);
        log::info!("bag replayer started");
        true
    }

    pub fn stop(&self) {
        if !self.is_playing.load(Ordering::Acquire) {
            return;
        }
        self.should_stop.store(true, Ordering::Release);
        self.is_paused.store(false, Ordering::Release);
        self.wait_until_finished();
        log::info!("bag replayer stopped");
    }

    pub fn wait_until_finished(&self) {
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Default for BagReplayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BagReplayer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_replay(
    reader: Arc<Mutex<BagReader>>,
    callback: Option<MessageCallback>,
    topic_filter: Option<String>,
    start_ns: u64,
    end_ns: u64,
    speed: ReplaySpeed,
    is_playing: Arc<AtomicBool>,
    is_paused: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
    stats: Arc<Mutex<ReplayStats>>,
) {
    let replay_start = Instant::now();
    let mut previous_ts: Option<i64> = None;
    let total = reader.lock().unwrap().get_message_count();

    loop {
        while is_paused.load(Ordering::Acquire) && !should_stop.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(10));
        }
        if should_stop.load(Ordering::Acquire) {
            break;
        }

        let next = {
            let mut reader = reader.lock().unwrap();
            if !reader.has_next() {
                None
            } else {
                reader.read_next()
            }
        };
        let Some(msg) = next else {
            break;
        };

        if let Some(filter) = &topic_filter {
            if &msg.topic != filter {
                stats.lock().unwrap().messages_skipped += 1;
                continue;
            }
        }

        let ts = msg.timestamp_ns.max(0) as u64;
        if ts < start_ns || ts > end_ns {
            stats.lock().unwrap().messages_skipped += 1;
            continue;
        }

        if let (Some(prev), Some(multiplier)) = (previous_ts, speed.multiplier()) {
            let diff_ns = msg.timestamp_ns - prev;
            if diff_ns > 0 {
                let adjusted = (diff_ns as f64) / multiplier;
                std::thread::sleep(Duration::from_nanos(adjusted.max(0.0) as u64));
            }
        }

        if let Some(cb) = &callback {
            cb(&msg);
        }

        {
            let mut stats = stats.lock().unwrap();
            stats.messages_replayed += 1;
            stats.elapsed_secs = replay_start.elapsed().as_secs_f64();
            if total > 0 {
                stats.progress = stats.messages_replayed as f64 / total as f64;
            }
        }

        previous_ts = Some(msg.timestamp_ns);
    }

    is_playing.store(false, Ordering::Release);
    let final_stats = stats.lock().unwrap().clone();
    log::info!(
        "bag replay finished: replayed={}, skipped={}, elapsed={:.2}s",
        final_stats.messages_replayed,
        final_stats.messages_skipped,
        final_stats.elapsed_secs
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::dto::DataType;
    use crate::bag::writer::BagWriter;
    use std::sync::atomic::AtomicUsize;

    fn write_sample(dir: &std::path::Path) -> std::path::PathBuf {
        let writer = BagWriter::new(dir, "replay", 16);
        writer.start().unwrap();
        for i in 0..5 {
            writer.append(BagMessage::new(100 + i, "topic", DataType::Event, "1"));
        }
        let path = writer.current_file_path().unwrap();
        writer.stop();
        std::path::PathBuf::from(path)
    }

    #[test]
    fn replays_all_messages_as_fast_as_possible() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let replayer = BagReplayer::new();
        replayer.open(&path).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        replayer.set_message_callback(move |_msg| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        replayer.start(ReplaySpeed::AsFastAsPossible);
        replayer.wait_until_finished();

        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(replayer.get_stats().messages_replayed, 5);
    }

    #[test]
    fn time_range_filters_out_of_window_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let replayer = BagReplayer::new();
        replayer.open(&path).unwrap();
        replayer.set_time_range(102, 103);

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        replayer.set_message_callback(move |_msg| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        replayer.start(ReplaySpeed::AsFastAsPossible);
        replayer.wait_until_finished();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
