//! Who owns the shared action icon.
//!
//! Both functions are pure: they look at the modes of the live sessions and
//! the two tab pointers and return a decision. The orchestrator applies it.

use std::collections::BTreeMap;

use scrobbler_proto::mode::ControllerMode;
use scrobbler_proto::protocol::TabId;

use crate::controller::Controller;

/// Read-only view of the session registry.
pub trait SessionTable {
    fn mode_of(&self, tab_id: TabId) -> Option<ControllerMode>;

    /// Tab ids with their modes, in ascending tab id order.
    fn modes(&self) -> Box<dyn Iterator<Item = (TabId, ControllerMode)> + '_>;
}

impl SessionTable for BTreeMap<TabId, Controller> {
    fn mode_of(&self, tab_id: TabId) -> Option<ControllerMode> {
        self.get(&tab_id).map(Controller::mode)
    }

    fn modes(&self) -> Box<dyn Iterator<Item = (TabId, ControllerMode)> + '_> {
        Box::new(self.iter().map(|(tab, ctrl)| (*tab, ctrl.mode())))
    }
}

impl SessionTable for BTreeMap<TabId, ControllerMode> {
    fn mode_of(&self, tab_id: TabId) -> Option<ControllerMode> {
        self.get(&tab_id).copied()
    }

    fn modes(&self) -> Box<dyn Iterator<Item = (TabId, ControllerMode)> + '_> {
        Box::new(self.iter().map(|(tab, mode)| (*tab, *mode)))
    }
}

/// Should ownership of the shared UI move to `target`?
///
/// An owner in an active mode keeps the UI. An unfocused target whose
/// session is inactive never takes it. Everything else does.
pub fn should_take_ownership(
    sessions: &impl SessionTable,
    owner: Option<TabId>,
    focused: Option<TabId>,
    target: TabId,
) -> bool {
    let owner_active = owner
        .and_then(|tab| sessions.mode_of(tab))
        .map(ControllerMode::is_active)
        .unwrap_or(false);
    if owner_active {
        return false;
    }

    if let Some(mode) = sessions.mode_of(target) {
        if focused != Some(target) && mode.is_inactive() {
            return false;
        }
    }

    true
}

/// Pick a new owner from scratch.
///
/// Order: the focused tab if active, then the first active session by
/// ascending tab id, then the focused tab if it has any session, else none.
pub fn elect(sessions: &impl SessionTable, focused: Option<TabId>) -> Option<TabId> {
    let focused_mode = focused.and_then(|tab| sessions.mode_of(tab).map(|m| (tab, m)));

    if let Some((tab, mode)) = focused_mode {
        if mode.is_active() {
            return Some(tab);
        }
    }

    if let Some((tab, _)) = sessions.modes().find(|(_, mode)| mode.is_active()) {
        return Some(tab);
    }

    focused_mode.map(|(tab, _)| tab)
}
