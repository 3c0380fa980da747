//! Per-message pipeline state machine.

use serde::{Deserialize, Serialize};

/// Where a message is in its trip through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Handed over by the transport, sender not yet resolved.
    Received,
    /// No template for the sender; stored as unclassified.
    SpamRecorded,
    /// Template found and the audit copy written.
    Audited,
    Extracting,
    /// A required field could not be read, or a pattern was unusable.
    ExtractFailed,
    PersistTransaction,
    Notify,
    Done,
}

impl PipelineState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, target),
            (Received, SpamRecorded)
                | (Received, Audited)
                | (Audited, Extracting)
                | (Extracting, ExtractFailed)
                | (Extracting, PersistTransaction)
                | (PersistTransaction, Notify)
                | (Notify, Done)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SpamRecorded | Self::ExtractFailed | Self::Done)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::SpamRecorded => "spam_recorded",
            Self::Audited => "audited",
            Self::Extracting => "extracting",
            Self::ExtractFailed => "extract_failed",
            Self::PersistTransaction => "persist_transaction",
            Self::Notify => "notify",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    const ALL: [PipelineState; 8] = [
        Received,
        SpamRecorded,
        Audited,
        Extracting,
        ExtractFailed,
        PersistTransaction,
        Notify,
        Done,
    ];

    #[test]
    fn happy_path_is_allowed() {
        let path = [Received, Audited, Extracting, PersistTransaction, Notify, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn extraction_cannot_be_skipped() {
        assert!(!Received.can_transition_to(Extracting));
        assert!(!Audited.can_transition_to(Notify));
        assert!(!Extracting.can_transition_to(Notify));
    }

    #[test]
    fn display_is_snake_case() {
        assert_eq!(SpamRecorded.to_string(), "spam_recorded");
        assert_eq!(PersistTransaction.to_string(), "persist_transaction");
    }
}
