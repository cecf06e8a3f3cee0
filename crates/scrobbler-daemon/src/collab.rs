//! Collaborators the orchestrator talks to but does not own.
//!
//! Anything that touches the browser (injecting scripts, drawing the action
//! icon, building the context menu) or leaves the process (persisted
//! settings, track broadcasts, the love service) sits behind one of these
//! traits. Async methods are the points where a handler may suspend.

use std::sync::Arc;

use async_trait::async_trait;
use scrobbler_proto::connector::{Connector, ConnectorCatalog};
use scrobbler_proto::protocol::{ActionView, InjectResult, MenuItem, TabId};
use scrobbler_proto::settings::ConnectorSettingsStore;
use scrobbler_proto::song::SongInfo;

use crate::events::ControllerEvent;

/// Resolves a page URL to the connector that should handle it.
pub trait ConnectorMatcher: Send + Sync {
    fn match_url(&self, url: &str) -> Option<Connector>;
}

#[async_trait]
pub trait InjectionGateway: Send + Sync {
    /// Try to load `connector` into the page shown in `tab_id`.
    async fn inject(&self, tab_id: TabId, connector: Option<&Connector>) -> InjectResult;
}

/// Persisted per-connector enabled flag.
#[async_trait]
pub trait ConnectorSettings: Send + Sync {
    async fn is_connector_enabled(&self, connector: &Connector) -> bool;
    async fn set_connector_enabled(&self, connector: &Connector, enabled: bool)
        -> anyhow::Result<()>;
}

/// Notifications for listeners outside the orchestrator. Delivery is best
/// effort; callers ignore errors.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn track_updated(&self, tab_id: TabId, song: &SongInfo) -> anyhow::Result<()>;
    /// Tell the injected page that the host side is ready.
    async fn ready(&self, tab_id: TabId) -> anyhow::Result<()>;
}

/// The single action icon shared by all tabs.
pub trait ActionUi: Send + Sync {
    fn render(&self, view: &ActionView);
    fn reset(&self);
    fn set_love_indicator(&self, is_loved: bool, song: Option<&SongInfo>);
}

/// The single context menu shared by all tabs.
pub trait ContextMenu: Send + Sync {
    fn remove_all(&self);
    fn add_item(&self, item: &MenuItem);
}

#[async_trait]
pub trait LoveService: Send + Sync {
    async fn toggle_love(&self, song: &SongInfo, is_loved: bool) -> anyhow::Result<()>;
}

/// Registration interface for the surrounding application.
pub trait OrchestratorListener: Send + Sync {
    /// Called once when the event loop starts.
    fn on_started(&self) {}

    fn on_controller_event(&self, tab_id: TabId, event: &ControllerEvent);
}

/// Bundle of everything the orchestrator needs from the outside.
#[derive(Clone)]
pub struct Collaborators {
    pub matcher: Arc<dyn ConnectorMatcher>,
    pub injector: Arc<dyn InjectionGateway>,
    pub settings: Arc<dyn ConnectorSettings>,
    pub notifier: Arc<dyn Notifier>,
    pub ui: Arc<dyn ActionUi>,
    pub menu: Arc<dyn ContextMenu>,
    pub love: Arc<dyn LoveService>,
}

impl ConnectorMatcher for ConnectorCatalog {
    fn match_url(&self, url: &str) -> Option<Connector> {
        self.find_by_url(url).cloned()
    }
}

#[async_trait]
impl ConnectorSettings for ConnectorSettingsStore {
    async fn is_connector_enabled(&self, connector: &Connector) -> bool {
        self.is_enabled(&connector.id).await
    }

    async fn set_connector_enabled(
        &self,
        connector: &Connector,
        enabled: bool,
    ) -> anyhow::Result<()> {
        self.set_enabled(&connector.id, enabled).await
    }
}
