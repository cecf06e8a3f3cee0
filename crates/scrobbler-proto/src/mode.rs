use serde::{Deserialize, Serialize};

/// What a tab controller is currently doing.
///
/// Every mode is either *active* (the tab is producing something worth
/// showing on the shared action icon) or *inactive* (idle, disabled,
/// unsupported or failed). The split is the only input to UI ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ControllerMode {
    /// Connector injected, nothing playing yet.
    #[default]
    Base,
    /// Connector switched off by the user.
    Disabled,
    /// Something went wrong while handling the current song.
    Err,
    /// The song is playing but will not be scrobbled.
    Ignored,
    /// Song info is being looked up.
    Loading,
    Playing,
    Scrobbled,
    /// The user skipped the current song.
    Skipped,
    /// Playing, but artist or track could not be recognized.
    Unknown,
    /// The connector cannot work with this page.
    Unsupported,
}

pub const INACTIVE_MODES: [ControllerMode; 4] = [
    ControllerMode::Base,
    ControllerMode::Disabled,
    ControllerMode::Err,
    ControllerMode::Unsupported,
];

pub const ACTIVE_MODES: [ControllerMode; 6] = [
    ControllerMode::Ignored,
    ControllerMode::Loading,
    ControllerMode::Playing,
    ControllerMode::Scrobbled,
    ControllerMode::Skipped,
    ControllerMode::Unknown,
];

impl ControllerMode {
    pub fn is_active(self) -> bool {
        !self.is_inactive()
    }

    pub fn is_inactive(self) -> bool {
        matches!(
            self,
            ControllerMode::Base
                | ControllerMode::Disabled
                | ControllerMode::Err
                | ControllerMode::Unsupported
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_is_total_and_disjoint() {
        for mode in ACTIVE_MODES {
            assert!(mode.is_active(), "{:?}", mode);
            assert!(!INACTIVE_MODES.contains(&mode));
        }
        for mode in INACTIVE_MODES {
            assert!(mode.is_inactive(), "{:?}", mode);
        }
        assert_eq!(ACTIVE_MODES.len() + INACTIVE_MODES.len(), 10);
    }

    #[test]
    fn test_default_is_inactive() {
        assert!(ControllerMode::default().is_inactive());
    }
}
