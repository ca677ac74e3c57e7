use serde::{Deserialize, Serialize};

/// Lifecycle of a single purchase attempt.
///
/// One value per in-flight attempt; never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseState {
    #[default]
    NotStarted,
    InProgress,
    Complete,
    /// Awaiting external approval (e.g. parental "ask to buy").
    Pending,
    Cancelled,
    Failed,
    FailedVerification,
    Unknown,
}

impl PurchaseState {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, PurchaseState::InProgress)
    }

    /// Terminal states of an attempt (everything except not-started and in-progress).
    pub fn is_settled(&self) -> bool {
        !matches!(self, PurchaseState::NotStarted | PurchaseState::InProgress)
    }
}

impl core::fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PurchaseState::NotStarted => "not_started",
            PurchaseState::InProgress => "in_progress",
            PurchaseState::Complete => "complete",
            PurchaseState::Pending => "pending",
            PurchaseState::Cancelled => "cancelled",
            PurchaseState::Failed => "failed",
            PurchaseState::FailedVerification => "failed_verification",
            PurchaseState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_not_started() {
        assert_eq!(PurchaseState::default(), PurchaseState::NotStarted);
    }

    #[test]
    fn settled_excludes_idle_and_in_progress() {
        assert!(!PurchaseState::NotStarted.is_settled());
        assert!(!PurchaseState::InProgress.is_settled());
        assert!(PurchaseState::Complete.is_settled());
        assert!(PurchaseState::FailedVerification.is_settled());
    }

    #[test]
    fn display_matches_serde_name() {
        let json = serde_json::to_string(&PurchaseState::FailedVerification).unwrap();
        assert_eq!(json, format!("\"{}\"", PurchaseState::FailedVerification));
    }
}
