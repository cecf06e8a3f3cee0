//! Drives the daemon through its TCP socket the way the browser shim does.

use std::sync::Arc;
use std::time::Duration;

use scrobbler_daemon::collab::Collaborators;
use scrobbler_daemon::host::{self, HostLink};
use scrobbler_daemon::orchestrator::Orchestrator;
use scrobbler_proto::connector::ConnectorCatalog;
use scrobbler_proto::protocol::{
    CallReply, DaemonMessage, HostMessage, InjectResult, Message, Request, Response, TabEvent,
    TabId, PROTOCOL_VERSION,
};
use scrobbler_proto::settings::ConnectorSettingsStore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct ShimClient {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl ShimClient {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    async fn send(&mut self, msg: HostMessage) {
        let bytes = Message::Host(msg).encode().unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    /// Read messages until one satisfies `want`, skipping the rest.
    async fn expect<T>(&mut self, mut want: impl FnMut(&DaemonMessage) -> Option<T>) -> T {
        let read = async {
            let mut tmp = [0u8; 4096];
            loop {
                while let Some((decoded, consumed)) = Message::decode(&self.buf) {
                    self.buf.drain(..consumed);
                    if let Ok(Message::Daemon(msg)) = decoded {
                        if let Some(found) = want(&msg) {
                            return found;
                        }
                    }
                }
                let n = self.stream.read(&mut tmp).await.unwrap();
                assert!(n > 0, "daemon closed the connection");
                self.buf.extend_from_slice(&tmp[..n]);
            }
        };
        tokio::time::timeout(Duration::from_secs(5), read)
            .await
            .expect("timed out waiting for daemon message")
    }
}

async fn start_daemon(settings_file: std::path::PathBuf) -> std::net::SocketAddr {
    let link = HostLink::new(Duration::from_secs(2));
    let link_arc = Arc::new(link.clone());
    let collab = Collaborators {
        matcher: Arc::new(ConnectorCatalog::builtin()),
        injector: link_arc.clone(),
        settings: Arc::new(ConnectorSettingsStore::new(settings_file)),
        notifier: link_arc.clone(),
        ui: link_arc.clone(),
        menu: link_arc.clone(),
        love: link_arc,
    };
    let (orch, rx) = Orchestrator::new(collab);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(host::serve(listener, link, orch.sender()));
    tokio::spawn(orch.run(rx));
    addr
}

#[tokio::test]
async fn navigation_round_trip_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_daemon(dir.path().join("connectors.json")).await;
    let mut shim = ShimClient::connect(addr).await;

    let version = shim
        .expect(|m| match m {
            DaemonMessage::Hello { protocol_version } => Some(*protocol_version),
            _ => None,
        })
        .await;
    assert_eq!(version, PROTOCOL_VERSION);

    shim.send(HostMessage::Tab(TabEvent::Focused { tab_id: TabId(5) }))
        .await;
    shim.send(HostMessage::Tab(TabEvent::Navigated {
        tab_id: TabId(5),
        url: "https://www.youtube.com/watch?v=abc".to_string(),
    }))
    .await;

    let call_id = shim
        .expect(|m| match m {
            DaemonMessage::Inject {
                call_id,
                tab_id,
                connector: Some(c),
            } if *tab_id == TabId(5) && c.id == "youtube" => Some(*call_id),
            _ => None,
        })
        .await;
    shim.send(HostMessage::Reply {
        call_id,
        reply: CallReply::Injection {
            result: InjectResult::Matched,
        },
    })
    .await;

    let rendered = shim
        .expect(|m| match m {
            DaemonMessage::Render { view } => Some(view.clone()),
            _ => None,
        })
        .await;
    assert_eq!(rendered.tab_id, TabId(5));
    assert_eq!(rendered.label, "YouTube");

    let first_item = shim
        .expect(|m| match m {
            DaemonMessage::MenuAddItem { item } => Some(item.title.clone()),
            _ => None,
        })
        .await;
    assert_eq!(first_item, "Disable YouTube");

    shim.expect(|m| match m {
        DaemonMessage::Ready { tab_id } if *tab_id == TabId(5) => Some(()),
        _ => None,
    })
    .await;

    shim.send(HostMessage::Request {
        request_id: 42,
        tab_id: TabId(5),
        request: Request::GetConnectorLabel,
    })
    .await;
    let response = shim
        .expect(|m| match m {
            DaemonMessage::Response {
                request_id: 42,
                response,
            } => Some(response.clone()),
            _ => None,
        })
        .await;
    assert_eq!(
        response,
        Response::ConnectorLabel {
            label: "YouTube".to_string()
        }
    );
}

#[tokio::test]
async fn request_for_unknown_tab_is_answered_empty() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_daemon(dir.path().join("connectors.json")).await;
    let mut shim = ShimClient::connect(addr).await;

    shim.send(HostMessage::Request {
        request_id: 7,
        tab_id: TabId(99),
        request: Request::GetTrack,
    })
    .await;

    let response = shim
        .expect(|m| match m {
            DaemonMessage::Response {
                request_id: 7,
                response,
            } => Some(response.clone()),
            _ => None,
        })
        .await;
    assert_eq!(response, Response::Empty);
}
