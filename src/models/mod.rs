mod grpo;
mod picklist;
mod queue;
mod status;
mod transfer;

pub use grpo::{GrpoDocument, GrpoItem};
pub use picklist::{PickList, PickListItem};
pub use queue::{
    GrpoMutation, Operation, PickListMutation, QueuePayload, TransferMutation, GRPO_TABLE,
    PICK_LIST_TABLE, TRANSFER_TABLE,
};
pub use status::DocumentStatus;
pub use transfer::{InventoryTransfer, TransferItem};

use chrono::{DateTime, Utc};

/// Accessors the download-phase merge needs from any server-side document.
pub trait ServerRecord {
    fn record_id(&self) -> i64;
    fn last_updated(&self) -> DateTime<Utc>;
}

/// Parse an RFC 3339 timestamp column. Bad data falls back to the Unix
/// epoch so a corrupt local row always loses a last-write-wins comparison
/// against the server copy.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_round_trips_rfc3339() {
        let parsed = parse_timestamp("2024-03-01T10:30:00Z");
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T10:30:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_corrupt_value_is_older_than_everything() {
        let parsed = parse_timestamp("not a timestamp");
        assert_eq!(parsed, DateTime::UNIX_EPOCH);
        assert!(parsed < Utc::now());
    }
}
