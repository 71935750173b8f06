use serde::{Deserialize, Serialize};

/// Liveness marker the walkers stamp on every inventory entry. `Normal`
/// means the entry was observed during the last scan; `Discard` means it is
/// tombstoned and waiting for the mirror side to confirm before removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Normal,
    Discard,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Normal => "normal",
            ScanStatus::Discard => "discard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(ScanStatus::Normal),
            "discard" => Some(ScanStatus::Discard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileItem {
    pub path: String,
    pub is_folder: bool,
    pub size: i64,
    /// Unix seconds of the last local modification.
    pub modified: i64,
    /// Lowercase hex SHA-1; empty until the differ computes it.
    pub sha1: String,
    pub scan_status: ScanStatus,
    /// Walker-observed change marker, compared on `NotExisted` re-admission.
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanFileItem {
    pub path: String,
    pub file_id: String,
    pub is_folder: bool,
    pub size: i64,
    pub modified: i64,
    pub sha1: String,
    pub scan_status: ScanStatus,
    /// Server-side version token.
    pub updated_at: String,
}
