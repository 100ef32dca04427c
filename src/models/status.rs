use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a warehouse document.
///
/// GRPO documents and transfers move draft → submitted → qc_approved/rejected
/// → posted; transfers can additionally be reopened after rejection. Pick
/// lists only use draft/posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Submitted,
    QcApproved,
    Rejected,
    Posted,
    Reopened,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Submitted => "submitted",
            DocumentStatus::QcApproved => "qc_approved",
            DocumentStatus::Rejected => "rejected",
            DocumentStatus::Posted => "posted",
            DocumentStatus::Reopened => "reopened",
        }
    }

    /// Parse a status column; unknown strings fall back to draft rather
    /// than failing the whole row.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "submitted" => DocumentStatus::Submitted,
            "qc_approved" => DocumentStatus::QcApproved,
            "rejected" => DocumentStatus::Rejected,
            "posted" => DocumentStatus::Posted,
            "reopened" => DocumentStatus::Reopened,
            _ => DocumentStatus::Draft,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for status in [
            DocumentStatus::Draft,
            DocumentStatus::Submitted,
            DocumentStatus::QcApproved,
            DocumentStatus::Rejected,
            DocumentStatus::Posted,
            DocumentStatus::Reopened,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_unknown_falls_back_to_draft() {
        assert_eq!(DocumentStatus::parse("bogus"), DocumentStatus::Draft);
    }
}
