use serde::Serialize;

use super::error::DownloadError;

/// Placeholder display name used until sanitization resolves the real one.
pub const FALLBACK_FILE_NAME: &str = "download";

/// What to fetch: a resolved or site-relative URL plus whatever the caller
/// already knows about the file. Constructed fresh per download; never stored
/// beyond the pipeline that consumes it.
#[derive(Debug, Clone)]
pub struct TransferTarget {
    pub url: String,
    pub suggested_name: String,
    /// MIME type or bare extension, when the caller knows it.
    pub declared_type: Option<String>,
    /// Declared size in bytes. Frequently unknown; absence is not an error.
    pub declared_size: Option<u64>,
}

impl TransferTarget {
    pub fn new(url: impl Into<String>, suggested_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            suggested_name: suggested_name.into(),
            declared_type: None,
            declared_size: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Preparing,
    Downloading,
    Completed,
    Error,
}

impl TransferStatus {
    /// A second `start` for the same identifier is rejected while this holds.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Preparing | Self::Downloading)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// The record tracked per identifier while a download is in flight or
/// awaiting cleanup. Mutated only by the manager; callers see clones.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferState {
    pub identifier: String,
    pub status: TransferStatus,
    /// Integer percentage 0-100; meaningful only while active.
    pub progress: u8,
    pub display_name: String,
    pub declared_type: Option<String>,
    pub declared_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TransferState {
    pub fn new(identifier: String, target: &TransferTarget) -> Self {
        Self {
            identifier,
            status: TransferStatus::Preparing,
            progress: 0,
            display_name: FALLBACK_FILE_NAME.to_string(),
            declared_type: target.declared_type.clone(),
            declared_size: target.declared_size,
            error_message: None,
        }
    }

    pub(crate) fn fail(&mut self, error: &DownloadError) {
        self.status = TransferStatus::Error;
        self.error_message = Some(error.to_string());
    }

    /// Human-readable one-liner for progress UIs.
    pub fn status_line(&self) -> String {
        match self.status {
            TransferStatus::Preparing => format!("Preparing {}...", self.display_name),
            TransferStatus::Downloading => {
                format!("Downloading {}: {}%", self.display_name, self.progress)
            }
            TransferStatus::Completed => format!("Downloaded {}", self.display_name),
            TransferStatus::Error => self
                .error_message
                .clone()
                .unwrap_or_else(|| "Download failed".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TransferTarget {
        TransferTarget::new("https://files.example/notes.pdf", "notes.pdf")
    }

    #[test]
    fn test_new_state_is_preparing() {
        let state = TransferState::new("r1".to_string(), &target());
        assert_eq!(state.status, TransferStatus::Preparing);
        assert_eq!(state.progress, 0);
        assert_eq!(state.display_name, FALLBACK_FILE_NAME);
        assert!(state.error_message.is_none());
    }

    #[test]
    fn test_status_activity() {
        assert!(TransferStatus::Preparing.is_active());
        assert!(TransferStatus::Downloading.is_active());
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Error.is_terminal());
    }

    #[test]
    fn test_status_line_shows_progress() {
        let mut state = TransferState::new("r1".to_string(), &target());
        state.status = TransferStatus::Downloading;
        state.display_name = "notes.pdf".to_string();
        state.progress = 42;
        assert_eq!(state.status_line(), "Downloading notes.pdf: 42%");
    }

    #[test]
    fn test_fail_records_message() {
        let mut state = TransferState::new("r1".to_string(), &target());
        state.fail(&DownloadError::Cancelled);
        assert_eq!(state.status, TransferStatus::Error);
        assert_eq!(
            state.error_message.as_deref(),
            Some("Download cancelled by user")
        );
    }

    #[test]
    fn test_serialized_casing_matches_wire_format() {
        let state = TransferState::new("r1".to_string(), &target());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "preparing");
        assert_eq!(json["displayName"], FALLBACK_FILE_NAME);
        assert!(json.get("errorMessage").is_none());
    }
}
