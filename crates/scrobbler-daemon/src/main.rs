use std::sync::Arc;
use std::time::Duration;

use scrobbler_daemon::collab::{Collaborators, OrchestratorListener};
use scrobbler_daemon::events::ControllerEvent;
use scrobbler_daemon::host::{self, HostLink};
use scrobbler_daemon::orchestrator::Orchestrator;
use scrobbler_daemon::{http, logging};
use scrobbler_proto::config::Config;
use scrobbler_proto::connector::{load_catalog_from_toml, ConnectorCatalog};
use scrobbler_proto::protocol::TabId;
use scrobbler_proto::settings::ConnectorSettingsStore;
use tracing::{info, warn};

/// Writes controller events to the daemon log.
struct EventLog;

impl OrchestratorListener for EventLog {
    fn on_started(&self) {
        info!("Listening for controller events");
    }

    fn on_controller_event(&self, tab_id: TabId, event: &ControllerEvent) {
        match event {
            ControllerEvent::NowPlaying { song } => {
                info!("tab {}: now playing {:?} - {:?}", tab_id, song.artist, song.track)
            }
            ControllerEvent::SongUnrecognized { song } => {
                info!("tab {}: unrecognized song {:?}", tab_id, song.unique_id)
            }
            ControllerEvent::SongSkipped { song } => {
                info!("tab {}: skipped {:?} - {:?}", tab_id, song.artist, song.track)
            }
            ControllerEvent::LoveToggled { is_loved } => {
                info!("tab {}: loved = {}", tab_id, is_loved)
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // The link's broadcast channel doubles as the log sink for clients
    let link = HostLink::new(Duration::from_secs(config.host.call_timeout_secs));
    let log_path = scrobbler_proto::platform::data_dir().join("daemon.log");
    logging::init(&log_path, link.sender())?;

    info!("Log file: {:?}", log_path);
    info!("Config loaded from: {:?}", Config::config_path());

    let catalog = if config.connectors.connectors_toml.exists() {
        match load_catalog_from_toml(&config.connectors.connectors_toml) {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(
                    "Failed to load {:?}, using built-in connectors: {}",
                    config.connectors.connectors_toml, e
                );
                ConnectorCatalog::builtin()
            }
        }
    } else {
        ConnectorCatalog::builtin()
    };
    info!("{} connectors available", catalog.len());

    let settings = ConnectorSettingsStore::new(config.daemon.settings_file.clone());
    let link_arc = Arc::new(link.clone());

    let collab = Collaborators {
        matcher: Arc::new(catalog),
        injector: link_arc.clone(),
        settings: Arc::new(settings),
        notifier: link_arc.clone(),
        ui: link_arc.clone(),
        menu: link_arc.clone(),
        love: link_arc,
    };

    let (mut orchestrator, event_rx) = Orchestrator::new(collab);
    orchestrator.register_listener(Arc::new(EventLog));

    let _host_handle = host::start_server(
        config.host.bind_address.clone(),
        config.host.port,
        link,
        orchestrator.sender(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.host.bind_address.clone(),
            config.http.port,
            orchestrator.sender(),
        );
    }

    info!("Daemon initialised, running event loop");
    orchestrator.run(event_rx).await;

    Ok(())
}
