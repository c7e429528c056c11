use serde::{Deserialize, Serialize};

/// Size limits applied by the workspace operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Limits {
    /// Largest file the text endpoints will read or write.
    pub max_text_bytes: u64,
    /// Largest accepted upload request body.
    pub max_upload_bytes: u64,
    /// Upper bound on the total size of a zip bundle expanded at upload.
    pub max_expanded_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_text_bytes: 2048 * 1024,
            max_upload_bytes: 11111 * 1024 * 1024,
            max_expanded_bytes: 4 * 11111 * 1024 * 1024,
        }
    }
}

impl Limits {
    pub fn from_units(max_text_kb: u64, max_upload_mb: u64) -> Self {
        let max_upload_bytes = max_upload_mb.saturating_mul(1024 * 1024);
        Self {
            max_text_bytes: max_text_kb.saturating_mul(1024),
            max_upload_bytes,
            max_expanded_bytes: max_upload_bytes.saturating_mul(4),
        }
    }
}
