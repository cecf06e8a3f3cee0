use scrobbler_proto::protocol::{MenuItem, TabId};

use crate::controller::Controller;

/// What clicking a menu item does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    /// Flip the connector on or off and persist the new state.
    ToggleConnector {
        tab_id: TabId,
        session_id: u64,
        enable: bool,
    },
    /// Disable the session in memory only.
    DisableUntilTabClosed { tab_id: TabId, session_id: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub item: MenuItem,
    pub action: MenuAction,
}

/// The menu as last built, remembered so clicks can be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuPlan {
    /// Tab the menu was built for.
    pub tab_id: Option<TabId>,
    pub entries: Vec<MenuEntry>,
}

impl MenuPlan {
    /// Build the menu for `tab_id`. `owner` is the UI owner's session, if any
    /// and if it is not `tab_id` itself.
    pub fn build(tab_id: TabId, target: Option<&Controller>, owner: Option<&Controller>) -> Self {
        let mut plan = MenuPlan {
            tab_id: Some(tab_id),
            entries: Vec::new(),
        };

        if let Some(ctrl) = target {
            plan.push_toggle(ctrl);
            if ctrl.is_enabled() {
                plan.push(
                    "Disable until tab closed".to_string(),
                    MenuAction::DisableUntilTabClosed {
                        tab_id: ctrl.tab_id(),
                        session_id: ctrl.session_id(),
                    },
                );
            }
        }

        if let Some(owner) = owner.filter(|o| o.tab_id() != tab_id) {
            let same_connector = target
                .map(|t| t.connector().id == owner.connector().id)
                .unwrap_or(false);
            if !same_connector {
                plan.push_toggle(owner);
            }
        }

        plan
    }

    pub fn action(&self, item_id: u32) -> Option<&MenuAction> {
        self.entries
            .iter()
            .find(|e| e.item.id == item_id)
            .map(|e| &e.action)
    }

    pub fn items(&self) -> impl Iterator<Item = &MenuItem> {
        self.entries.iter().map(|e| &e.item)
    }

    fn push_toggle(&mut self, ctrl: &Controller) {
        let label = &ctrl.connector().label;
        let title = if ctrl.is_enabled() {
            format!("Disable {}", label)
        } else {
            format!("Enable {}", label)
        };
        self.push(
            title,
            MenuAction::ToggleConnector {
                tab_id: ctrl.tab_id(),
                session_id: ctrl.session_id(),
                enable: !ctrl.is_enabled(),
            },
        );
    }

    fn push(&mut self, title: String, action: MenuAction) {
        let id = self.entries.len() as u32 + 1;
        self.entries.push(MenuEntry {
            item: MenuItem { id, title },
            action,
        });
    }
}
