//! Sequential and timestamp-indexed reading of a closed bag file.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::bag::dto::BagMessage;
use crate::bag::footer::BagFooter;
use crate::bag::indexer::Indexer;
use crate::error::BagError;

pub struct BagReader {
    filepath: PathBuf,
    reader: Option<BufReader<File>>,
    footer: BagFooter,
    indexer: Indexer,
    topic_filter: Option<String>,
    current_position: u64,
}

impl BagReader {
    pub fn new() -> Self {
        Self {
            filepath: PathBuf::new(),
            reader: None,
            footer: BagFooter::new(0, 0, 0, 0),
            indexer: Indexer::new(),
            topic_filter: None,
            current_position: 0,
        }
    }

    pub fn open(&mut self, filepath: impl Into<PathBuf>) -> Result<(), BagError> {
        if self.reader.is_some() {
            self.close();
        }

        let filepath = filepath.into();
        let mut indexer = Indexer::new();
        let footer = indexer.read_from_file(&filepath)?;

        let file = File::open(&filepath)?;
        self.filepath = filepath;
        self.reader = Some(BufReader::new(file));
        self.footer = footer;
        self.indexer = indexer;
        self.current_position = 0;
        self.seek_to_start();

        log::debug!(
            "bag reader opened {}, {} messages",
            self.filepath.display(),
            self.get_message_count()
        );
        Ok(())
    }

    pub fn close(&mut self) {
        self.reader = None;
        self.filepath = PathBuf::new();
        self.indexer.clear();
        self.topic_filter = None;
        self.current_position = 0;
    }

    pub fn has_next(&self) -> bool {
        self.reader.is_some() && self.is_in_data_area()
    }

    /// Next message not excluded by the topic filter, or `None` at end
    /// of the data region. Lines that fail to parse are skipped.
    pub fn read_next(&mut self) -> Option<BagMessage> {
        if !self.has_next() {
            return None;
        }
        while self.is_in_data_area() {
            let Some(line) = self.read_line() else {
                return None;
            };
            match BagMessage::from_json_line(&line) {
                Ok(msg) => {
                    if let Some(filter) = &self.topic_filter {
                        if &msg.topic != filter {
                            continue;
                        }
                    }
                    return Some(msg);
                }
                Err(e) => {
                    log::error!("bag reader failed to parse message: {}", e);
                    continue;
                }
            }
        }
        None
    }

    pub fn seek_to_timestamp(&mut self, timestamp_ns: u64) -> bool {
        let Some(reader) = self.reader.as_mut() else {
            log::error!("bag reader seek_to_timestamp: file not open");
            return false;
        };
        if self.indexer.is_empty() {
            log::warn!("bag reader seek_to_timestamp: no index available");
            return false;
        }
        let Some(entry) = self.indexer.find_by_timestamp(timestamp_ns) else {
            log::error!("bag reader seek_to_timestamp: timestamp not found: {}", timestamp_ns);
            return false;
        };
        if reader.seek(SeekFrom::Start(entry.file_offset)).is_err() {
            log::error!("bag reader failed to seek to offset {}", entry.file_offset);
            return false;
        }
        self.current_position = entry.file_offset;
        true
    }

    pub fn seek_to_start(&mut self) {
        if let Some(reader) = self.reader.as_mut() {
            let _ = reader.seek(SeekFrom::Start(0));
            self.current_position = 0;
        }
    }

    pub fn set_topic_filter(&mut self, topic: impl Into<String>) {
        self.topic_filter = Some(topic.into());
    }

    pub fn clear_topic_filter(&mut self) {
        self.topic_filter = None;
    }

    pub fn get_message_count(&self) -> usize {
        self.indexer.len()
    }

    pub fn get_start_timestamp(&self) -> u64 {
        self.indexer.find_by_timestamp(0).map(|e| e.timestamp_ns).unwrap_or(0)
    }

    pub fn get_end_timestamp(&self) -> u64 {
        self.indexer
            .find_by_timestamp(u64::MAX)
            .map(|e| e.timestamp_ns)
            .unwrap_or(0)
    }

    fn read_line(&mut self) -> Option<String> {
        loop {
            let reader = self.reader.as_mut()?;
            if !self.is_in_data_area() {
                return None;
            }
            let mut line = String::new();
            let read = reader.read_line(&mut line).ok()?;
            if read == 0 {
                return None;
            }
            self.current_position = reader.stream_position().ok()?;
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            return Some(line);
        }
    }

    fn is_in_data_area(&self) -> bool {
        self.reader.is_some() && self.current_position < self.footer.index_offset
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }
}

impl Default for BagReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::dto::DataType;
    use crate::bag::writer::BagWriter;

    fn write_sample(dir: &Path) -> PathBuf {
        let writer = BagWriter::new(dir, "test", 16);
        writer.start().unwrap();
        writer.append(BagMessage::new(100, "a", DataType::Event, "1"));
        writer.append(BagMessage::new(200, "b", DataType::Event, "2"));
        writer.append(BagMessage::new(300, "a", DataType::Event, "3"));
        let path = writer.current_file_path().unwrap();
        writer.stop();
        PathBuf::from(path)
    }

    #[test]
    fn reads_messages_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let mut reader = BagReader::new();
        reader.open(&path).unwrap();
        assert_eq!(reader.get_message_count(), 3);

        let first = reader.read_next().unwrap();
        assert_eq!(first.topic, "a");
        let second = reader.read_next().unwrap();
        assert_eq!(second.topic, "b");
        let third = reader.read_next().unwrap();
        assert_eq!(third.topic, "a");
        assert!(reader.read_next().is_none());
    }

    #[test]
    fn topic_filter_skips_other_topics() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let mut reader = BagReader::new();
        reader.open(&path).unwrap();
        reader.set_topic_filter("b");
        let only = reader.read_next().unwrap();
        assert_eq!(only.topic, "b");
        assert!(reader.read_next().is_none());
    }

    #[test]
    fn seek_to_timestamp_positions_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let mut reader = BagReader::new();
        reader.open(&path).unwrap();
        assert!(reader.seek_to_timestamp(200));
        let msg = reader.read_next().unwrap();
        assert_eq!(msg.topic, "b");
    }

    #[test]
    fn start_and_end_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let mut reader = BagReader::new();
        reader.open(&path).unwrap();
        assert_eq!(reader.get_start_timestamp(), 100);
        assert_eq!(reader.get_end_timestamp(), 300);
    }
}
