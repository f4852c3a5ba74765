//! Download orchestration core for the resource sharing platform.
//!
//! Two layers, leaf first: [`validation`] and [`transfer`] are pure,
//! self-contained primitives (URL policy, file-name sanitization, the
//! type/size gate, streaming and buffered byte transfer); [`application`]
//! wraps them in the [`DownloadManager`], which tracks one state machine per
//! caller-chosen identifier with de-duplication, progress reporting, and
//! timed cleanup of finished entries. [`api`] resolves logical resource ids
//! into transfer targets.
//!
//! ```no_run
//! use resource_downloader::{DownloadManager, DownloadOptions, TransferTarget};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = DownloadManager::default();
//! let target = TransferTarget::new("https://files.example/notes.pdf", "notes.pdf");
//!
//! if manager.start("resource-42", target, DownloadOptions::default()) {
//!     // Poll manager.get("resource-42") to render status and progress.
//! }
//! # }
//! ```

pub mod api;
pub mod application;
pub mod domain;
pub mod transfer;
pub mod validation;

pub use api::{ApiClient, ApiConfig, ResourceDescriptor};
pub use application::{DownloadConfig, DownloadManager, DownloadOptions};
pub use domain::{DownloadError, TransferState, TransferStatus, TransferTarget};
pub use transfer::{TransferClient, TransferStrategy};
pub use validation::{sanitize_file_name, validate_declared_type, validate_target_url};
