use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use super::item::{LocalFileItem, PanFileItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Upload,
    Download,
    DeleteLocal,
    DeleteRemote,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Upload => "upload",
            ActionKind::Download => "download",
            ActionKind::DeleteLocal => "delete_local",
            ActionKind::DeleteRemote => "delete_remote",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "upload" => Some(ActionKind::Upload),
            "download" => Some(ActionKind::Download),
            "delete_local" => Some(ActionKind::DeleteLocal),
            "delete_remote" => Some(ActionKind::DeleteRemote),
            _ => None,
        }
    }

    /// Status a claimed action is flipped to while a worker holds it.
    /// Remote-mutating kinds ride the upload lane, local-mutating kinds the
    /// download lane, so the in-process invariant covers all four.
    pub fn in_flight_status(&self) -> ActionStatus {
        match self {
            ActionKind::Upload | ActionKind::DeleteRemote => ActionStatus::Uploading,
            ActionKind::Download | ActionKind::DeleteLocal => ActionStatus::Downloading,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Create,
    Uploading,
    Downloading,
    Success,
    NotExisted,
    Illegal,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Create => "create",
            ActionStatus::Uploading => "uploading",
            ActionStatus::Downloading => "downloading",
            ActionStatus::Success => "success",
            ActionStatus::NotExisted => "not_existed",
            ActionStatus::Illegal => "illegal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(ActionStatus::Create),
            "uploading" => Some(ActionStatus::Uploading),
            "downloading" => Some(ActionStatus::Downloading),
            "success" => Some(ActionStatus::Success),
            "not_existed" => Some(ActionStatus::NotExisted),
            "illegal" => Some(ActionStatus::Illegal),
            _ => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, ActionStatus::Uploading | ActionStatus::Downloading)
    }
}

/// One unit of pending sync work, persisted in the action store. Two
/// emissions for the same kind and relative target collapse onto the same id
/// by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncAction {
    pub kind: ActionKind,
    /// Target path relative to the sync root.
    pub rel_path: String,
    pub status: ActionStatus,
    /// Unix seconds of the last status change.
    pub status_updated: i64,
    /// Snapshot of the local record at emission time.
    pub local_file: Option<LocalFileItem>,
    /// Snapshot of the remote record at emission time.
    pub pan_file: Option<PanFileItem>,
    pub drive_id: String,
    pub download_block_size: i64,
    pub upload_block_size: i64,
    pub use_internal_url: bool,
    pub created: i64,
}

impl SyncAction {
    pub fn id(&self) -> String {
        action_id(self.kind, &self.rel_path)
    }
}

pub fn action_id(kind: ActionKind, rel_path: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(rel_path.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_kind_and_target_collide_on_id() {
        assert_eq!(
            action_id(ActionKind::Upload, "/a.txt"),
            action_id(ActionKind::Upload, "/a.txt")
        );
        assert_ne!(
            action_id(ActionKind::Upload, "/a.txt"),
            action_id(ActionKind::Download, "/a.txt")
        );
        assert_ne!(
            action_id(ActionKind::Upload, "/a.txt"),
            action_id(ActionKind::Upload, "/b.txt")
        );
    }

    #[test]
    fn kind_and_status_round_trip_their_wire_form() {
        for kind in [
            ActionKind::Upload,
            ActionKind::Download,
            ActionKind::DeleteLocal,
            ActionKind::DeleteRemote,
        ] {
            assert_eq!(ActionKind::parse(kind.as_str()), Some(kind));
        }
        for status in [
            ActionStatus::Create,
            ActionStatus::Uploading,
            ActionStatus::Downloading,
            ActionStatus::Success,
            ActionStatus::NotExisted,
            ActionStatus::Illegal,
        ] {
            assert_eq!(ActionStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn delete_kinds_map_onto_transfer_lanes() {
        assert_eq!(
            ActionKind::DeleteRemote.in_flight_status(),
            ActionStatus::Uploading
        );
        assert_eq!(
            ActionKind::DeleteLocal.in_flight_status(),
            ActionStatus::Downloading
        );
    }
}
