pub mod download_manager;

pub use download_manager::{DownloadConfig, DownloadManager, DownloadOptions};
