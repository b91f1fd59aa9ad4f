//! Bag Logger: append-only, indexed, rotated/retained binary log with
//! replay support.

mod crc32;
mod dto;
mod footer;
mod indexer;
mod reader;
mod replayer;
mod writer;

pub use dto::{BagMessage, DataType};
pub use footer::{BagFooter, IndexEntry, RetentionPolicy, RetentionType, RotationPolicy, RotationType};
pub use indexer::Indexer;
pub use reader::BagReader;
pub use replayer::{BagReplayer, ReplaySpeed, ReplayStats};
pub use writer::{BagWriter, BagWriterStats};
