//! Typed payloads for the durable mutation queue.
//!
//! Each queue row stores `(table_name, operation, data)`. In memory the
//! payload is a tagged union per table keyed by operation kind, so an
//! unsupported (table, operation) pair cannot be enqueued in the first
//! place. JSON encoding/decoding happens only at the storage boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::grpo::{GrpoDocument, GrpoItem};
use super::picklist::{PickList, PickListItem};
use super::transfer::{InventoryTransfer, TransferItem};

/// Operation kinds a queue entry can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Submit,
    Approve,
    Reject,
    Reopen,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Submit => "SUBMIT",
            Operation::Approve => "APPROVE",
            Operation::Reject => "REJECT",
            Operation::Reopen => "REOPEN",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InsertData<D, L> {
    document: D,
    items: Vec<L>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UpdateData<D> {
    document: D,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QcData {
    qc_notes: Option<String>,
}

/// Pending mutation against a GRPO document.
#[derive(Debug, Clone)]
pub enum GrpoMutation {
    Insert {
        document: GrpoDocument,
        items: Vec<GrpoItem>,
    },
    Update {
        document: GrpoDocument,
    },
    Submit,
    Approve {
        qc_notes: Option<String>,
    },
    Reject {
        qc_notes: Option<String>,
    },
}

/// Pending mutation against an inventory transfer.
#[derive(Debug, Clone)]
pub enum TransferMutation {
    Insert {
        document: InventoryTransfer,
        items: Vec<TransferItem>,
    },
    Update {
        document: InventoryTransfer,
    },
    Submit,
    Approve {
        qc_notes: Option<String>,
    },
    Reject {
        qc_notes: Option<String>,
    },
    Reopen,
}

/// Pending mutation against a pick list.
#[derive(Debug, Clone)]
pub enum PickListMutation {
    Insert {
        document: PickList,
        items: Vec<PickListItem>,
    },
    Update {
        document: PickList,
    },
}

/// One pending local mutation, tagged by its target table.
#[derive(Debug, Clone)]
pub enum QueuePayload {
    Grpo(GrpoMutation),
    Transfer(TransferMutation),
    PickList(PickListMutation),
}

/// Why a stored queue row could not be turned back into a typed payload.
#[derive(Debug)]
pub enum PayloadError {
    UnknownTable(String),
    UnknownOperation(String),
    UnsupportedOperation {
        table: &'static str,
        operation: Operation,
    },
    MissingData {
        table: &'static str,
        operation: Operation,
    },
    Json(serde_json::Error),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::UnknownTable(table) => write!(f, "unknown queue table: {}", table),
            PayloadError::UnknownOperation(op) => write!(f, "unknown queue operation: {}", op),
            PayloadError::UnsupportedOperation { table, operation } => {
                write!(f, "{} does not support operation {}", table, operation)
            }
            PayloadError::MissingData { table, operation } => {
                write!(f, "{} {} entry is missing its payload", table, operation)
            }
            PayloadError::Json(e) => write!(f, "payload JSON error: {}", e),
        }
    }
}

impl std::error::Error for PayloadError {}

impl From<serde_json::Error> for PayloadError {
    fn from(e: serde_json::Error) -> Self {
        PayloadError::Json(e)
    }
}

pub const GRPO_TABLE: &str = "grpo_documents";
pub const TRANSFER_TABLE: &str = "inventory_transfers";
pub const PICK_LIST_TABLE: &str = "pick_lists";

impl QueuePayload {
    /// The local table this mutation targets.
    pub fn table_name(&self) -> &'static str {
        match self {
            QueuePayload::Grpo(_) => GRPO_TABLE,
            QueuePayload::Transfer(_) => TRANSFER_TABLE,
            QueuePayload::PickList(_) => PICK_LIST_TABLE,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            QueuePayload::Grpo(m) => match m {
                GrpoMutation::Insert { .. } => Operation::Insert,
                GrpoMutation::Update { .. } => Operation::Update,
                GrpoMutation::Submit => Operation::Submit,
                GrpoMutation::Approve { .. } => Operation::Approve,
                GrpoMutation::Reject { .. } => Operation::Reject,
            },
            QueuePayload::Transfer(m) => match m {
                TransferMutation::Insert { .. } => Operation::Insert,
                TransferMutation::Update { .. } => Operation::Update,
                TransferMutation::Submit => Operation::Submit,
                TransferMutation::Approve { .. } => Operation::Approve,
                TransferMutation::Reject { .. } => Operation::Reject,
                TransferMutation::Reopen => Operation::Reopen,
            },
            QueuePayload::PickList(m) => match m {
                PickListMutation::Insert { .. } => Operation::Insert,
                PickListMutation::Update { .. } => Operation::Update,
            },
        }
    }

    /// Encode the mutation body for the `data` column. State transitions
    /// without notes store no body.
    pub fn encode(&self) -> Result<Option<String>, PayloadError> {
        let json = match self {
            QueuePayload::Grpo(GrpoMutation::Insert { document, items }) => {
                Some(serde_json::to_string(&InsertData {
                    document,
                    items: items.iter().collect(),
                })?)
            }
            QueuePayload::Grpo(GrpoMutation::Update { document }) => {
                Some(serde_json::to_string(&UpdateData { document })?)
            }
            QueuePayload::Grpo(GrpoMutation::Submit) => None,
            QueuePayload::Grpo(GrpoMutation::Approve { qc_notes })
            | QueuePayload::Grpo(GrpoMutation::Reject { qc_notes }) => {
                Some(serde_json::to_string(&QcData {
                    qc_notes: qc_notes.clone(),
                })?)
            }
            QueuePayload::Transfer(TransferMutation::Insert { document, items }) => {
                Some(serde_json::to_string(&InsertData {
                    document,
                    items: items.iter().collect(),
                })?)
            }
            QueuePayload::Transfer(TransferMutation::Update { document }) => {
                Some(serde_json::to_string(&UpdateData { document })?)
            }
            QueuePayload::Transfer(TransferMutation::Submit)
            | QueuePayload::Transfer(TransferMutation::Reopen) => None,
            QueuePayload::Transfer(TransferMutation::Approve { qc_notes })
            | QueuePayload::Transfer(TransferMutation::Reject { qc_notes }) => {
                Some(serde_json::to_string(&QcData {
                    qc_notes: qc_notes.clone(),
                })?)
            }
            QueuePayload::PickList(PickListMutation::Insert { document, items }) => {
                Some(serde_json::to_string(&InsertData {
                    document,
                    items: items.iter().collect(),
                })?)
            }
            QueuePayload::PickList(PickListMutation::Update { document }) => {
                Some(serde_json::to_string(&UpdateData { document })?)
            }
        };
        Ok(json)
    }

    /// Decode a stored `(table_name, operation, data)` row.
    pub fn decode(
        table: &str,
        operation: &str,
        data: Option<&str>,
    ) -> Result<Self, PayloadError> {
        let op = match operation {
            "INSERT" => Operation::Insert,
            "UPDATE" => Operation::Update,
            "SUBMIT" => Operation::Submit,
            "APPROVE" => Operation::Approve,
            "REJECT" => Operation::Reject,
            "REOPEN" => Operation::Reopen,
            other => return Err(PayloadError::UnknownOperation(other.to_string())),
        };

        match table {
            GRPO_TABLE => {
                let mutation = match op {
                    Operation::Insert => {
                        let body: InsertData<GrpoDocument, GrpoItem> =
                            serde_json::from_str(require_data(GRPO_TABLE, op, data)?)?;
                        GrpoMutation::Insert {
                            document: body.document,
                            items: body.items,
                        }
                    }
                    Operation::Update => {
                        let body: UpdateData<GrpoDocument> =
                            serde_json::from_str(require_data(GRPO_TABLE, op, data)?)?;
                        GrpoMutation::Update {
                            document: body.document,
                        }
                    }
                    Operation::Submit => GrpoMutation::Submit,
                    Operation::Approve => GrpoMutation::Approve {
                        qc_notes: decode_qc_notes(data)?,
                    },
                    Operation::Reject => GrpoMutation::Reject {
                        qc_notes: decode_qc_notes(data)?,
                    },
                    Operation::Reopen => {
                        return Err(PayloadError::UnsupportedOperation {
                            table: GRPO_TABLE,
                            operation: op,
                        })
                    }
                };
                Ok(QueuePayload::Grpo(mutation))
            }
            TRANSFER_TABLE => {
                let mutation = match op {
                    Operation::Insert => {
                        let body: InsertData<InventoryTransfer, TransferItem> =
                            serde_json::from_str(require_data(TRANSFER_TABLE, op, data)?)?;
                        TransferMutation::Insert {
                            document: body.document,
                            items: body.items,
                        }
                    }
                    Operation::Update => {
                        let body: UpdateData<InventoryTransfer> =
                            serde_json::from_str(require_data(TRANSFER_TABLE, op, data)?)?;
                        TransferMutation::Update {
                            document: body.document,
                        }
                    }
                    Operation::Submit => TransferMutation::Submit,
                    Operation::Approve => TransferMutation::Approve {
                        qc_notes: decode_qc_notes(data)?,
                    },
                    Operation::Reject => TransferMutation::Reject {
                        qc_notes: decode_qc_notes(data)?,
                    },
                    Operation::Reopen => TransferMutation::Reopen,
                };
                Ok(QueuePayload::Transfer(mutation))
            }
            PICK_LIST_TABLE => {
                let mutation = match op {
                    Operation::Insert => {
                        let body: InsertData<PickList, PickListItem> =
                            serde_json::from_str(require_data(PICK_LIST_TABLE, op, data)?)?;
                        PickListMutation::Insert {
                            document: body.document,
                            items: body.items,
                        }
                    }
                    Operation::Update => {
                        let body: UpdateData<PickList> =
                            serde_json::from_str(require_data(PICK_LIST_TABLE, op, data)?)?;
                        PickListMutation::Update {
                            document: body.document,
                        }
                    }
                    _ => {
                        return Err(PayloadError::UnsupportedOperation {
                            table: PICK_LIST_TABLE,
                            operation: op,
                        })
                    }
                };
                Ok(QueuePayload::PickList(mutation))
            }
            other => Err(PayloadError::UnknownTable(other.to_string())),
        }
    }
}

fn require_data<'a>(
    table: &'static str,
    operation: Operation,
    data: Option<&'a str>,
) -> Result<&'a str, PayloadError> {
    data.ok_or(PayloadError::MissingData { table, operation })
}

fn decode_qc_notes(data: Option<&str>) -> Result<Option<String>, PayloadError> {
    match data {
        Some(raw) => {
            let body: QcData = serde_json::from_str(raw)?;
            Ok(body.qc_notes)
        }
        None => Ok(None),
    }
}
