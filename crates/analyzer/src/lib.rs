pub mod cache;
pub mod chain;
pub mod config;
mod download;
mod process_block;
mod process_book;
mod process_epoch;

pub use chain::{ChainAnalyzer, StopHandle};
pub use config::{AnalyzerConfig, DownloadMode, Metrics};
