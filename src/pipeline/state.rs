// src/pipeline/state.rs

//! Pipeline states and their progress weights

use strum_macros::{Display, EnumIter};

/// Install pipeline state
///
/// Non-terminal states are entered strictly in declaration order. The
/// uninstall pipeline reuses a subset of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum PipelineState {
    Idle,
    LocatingTarget,
    AcquiringSource,
    Decoding,
    Patching,
    SuspendingSystemFilter,
    RelocatingOverlayFolder,
    TerminatingTargetProcess,
    BackingUpPrevious,
    ReplacingContainer,
    PersistingVersionMetadata,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Overall progress when this state is entered
    pub fn percent(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::LocatingTarget => 5,
            Self::AcquiringSource => 10,
            Self::Decoding => 30,
            Self::Patching => 40,
            Self::SuspendingSystemFilter => 50,
            Self::RelocatingOverlayFolder => 55,
            Self::TerminatingTargetProcess => 60,
            Self::BackingUpPrevious => 70,
            Self::ReplacingContainer => 80,
            Self::PersistingVersionMetadata => 90,
            Self::Finalizing => 95,
            Self::Completed | Self::Failed | Self::Cancelled => 100,
        }
    }

    /// Human-readable step text used in progress reports
    pub fn describe(self) -> &'static str {
        match self {
            Self::Idle => "Preparing",
            Self::LocatingTarget => "Locating target installation",
            Self::AcquiringSource => "Acquiring release files",
            Self::Decoding => "Unpacking release files",
            Self::Patching => "Patching application package",
            Self::SuspendingSystemFilter => "Unloading filesystem filter driver",
            Self::RelocatingOverlayFolder => "Moving overlay folder",
            Self::TerminatingTargetProcess => "Starting process terminator",
            Self::BackingUpPrevious => "Backing up current installation",
            Self::ReplacingContainer => "Replacing application package",
            Self::PersistingVersionMetadata => "Recording installed version",
            Self::Finalizing => "Cleaning up",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_install_order_percent_is_monotonic() {
        let order: Vec<_> = PipelineState::iter()
            .filter(|s| !matches!(s, PipelineState::Failed | PipelineState::Cancelled))
            .collect();
        assert_eq!(order.first(), Some(&PipelineState::Idle));
        assert_eq!(order.last(), Some(&PipelineState::Completed));
        assert_eq!(order.len(), 13);
        for pair in order.windows(2) {
            assert!(pair[1] > pair[0]);
            assert!(pair[1].percent() >= pair[0].percent());
        }
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = PipelineState::iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![
                PipelineState::Completed,
                PipelineState::Failed,
                PipelineState::Cancelled
            ]
        );
    }
}
