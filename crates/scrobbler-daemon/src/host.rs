/// Socket link to the browser-side host shim.
///
/// The shim connects over TCP and speaks the length-prefixed JSON framing
/// from `scrobbler_proto::protocol`. Browser notifications, commands,
/// requests and menu clicks flow in; icon/menu updates, broadcasts and logs
/// flow out to every connected client.
///
/// ```text
///   HostLink ── broadcast::Sender<DaemonMessage> ──▶ every client writer
///      │
///      └── pending: call_id → oneshot  ◀── HostMessage::Reply from any client
/// ```
///
/// Injection and love calls need an answer from the browser; they are sent
/// with a `call_id` and resolved by the first matching `Reply`.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scrobbler_proto::connector::Connector;
use scrobbler_proto::protocol::{
    ActionView, CallReply, DaemonMessage, HostMessage, InjectResult, MenuItem, Message, TabId,
    PROTOCOL_VERSION,
};
use scrobbler_proto::song::SongInfo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::collab::{ActionUi, ContextMenu, InjectionGateway, LoveService, Notifier};
use crate::error::HostError;
use crate::events::{EventSender, OrchestratorEvent};

// ── HostLink ──────────────────────────────────────────────────────────────────

/// Cloneable handle to the connected shims. Implements every browser-facing
/// collaborator trait.
#[derive(Clone)]
pub struct HostLink {
    outbound: broadcast::Sender<DaemonMessage>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CallReply>>>>,
    next_call_id: Arc<AtomicU64>,
    call_timeout: Duration,
}

impl HostLink {
    pub fn new(call_timeout: Duration) -> Self {
        let (outbound, _) = broadcast::channel(256);
        Self {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_call_id: Arc::new(AtomicU64::new(1)),
            call_timeout,
        }
    }

    pub fn sender(&self) -> broadcast::Sender<DaemonMessage> {
        self.outbound.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonMessage> {
        self.outbound.subscribe()
    }

    /// Send to every connected client. Fails when nobody is connected.
    pub fn publish(&self, msg: DaemonMessage) -> Result<(), HostError> {
        self.outbound
            .send(msg)
            .map(|_| ())
            .map_err(|_| HostError::Disconnected)
    }

    /// Publish the message built for a fresh call id and wait for its reply.
    async fn call(
        &self,
        build: impl FnOnce(u64) -> DaemonMessage,
    ) -> Result<(u64, CallReply), HostError> {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(call_id, reply_tx);

        if let Err(e) = self.publish(build(call_id)) {
            self.pending.lock().await.remove(&call_id);
            return Err(e);
        }

        match tokio::time::timeout(self.call_timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok((call_id, reply)),
            Ok(Err(_)) => Err(HostError::Disconnected),
            Err(_) => {
                self.pending.lock().await.remove(&call_id);
                Err(HostError::Timeout(call_id))
            }
        }
    }

    /// Hand a shim reply to whoever is waiting on `call_id`.
    pub async fn resolve(&self, call_id: u64, reply: CallReply) {
        match self.pending.lock().await.remove(&call_id) {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => debug!("host: reply for unknown or finished call {}", call_id),
        }
    }

    fn publish_ui(&self, msg: DaemonMessage) {
        if self.publish(msg).is_err() {
            debug!("host: no client for UI update");
        }
    }
}

#[async_trait]
impl InjectionGateway for HostLink {
    async fn inject(&self, tab_id: TabId, connector: Option<&Connector>) -> InjectResult {
        let connector = connector.cloned();
        let reply = self
            .call(|call_id| DaemonMessage::Inject {
                call_id,
                tab_id,
                connector,
            })
            .await;
        match reply {
            Ok((_, CallReply::Injection { result })) => result,
            Ok((call_id, _)) => {
                warn!("host: {}", HostError::UnexpectedReply(call_id));
                InjectResult::NoMatch
            }
            Err(e) => {
                warn!("host: injection into tab {} failed: {}", tab_id, e);
                InjectResult::NoMatch
            }
        }
    }
}

#[async_trait]
impl LoveService for HostLink {
    async fn toggle_love(&self, song: &SongInfo, is_loved: bool) -> anyhow::Result<()> {
        let song = song.clone();
        let (call_id, reply) = self
            .call(|call_id| DaemonMessage::ToggleLove {
                call_id,
                song,
                is_loved,
            })
            .await?;
        match reply {
            CallReply::Love { ok: true, .. } => Ok(()),
            CallReply::Love { error, .. } => {
                anyhow::bail!(error.unwrap_or_else(|| "love request rejected".to_string()))
            }
            CallReply::Injection { .. } => Err(HostError::UnexpectedReply(call_id).into()),
        }
    }
}

#[async_trait]
impl Notifier for HostLink {
    async fn track_updated(&self, tab_id: TabId, song: &SongInfo) -> anyhow::Result<()> {
        self.publish(DaemonMessage::TrackUpdated {
            tab_id,
            song: song.clone(),
        })?;
        Ok(())
    }

    async fn ready(&self, tab_id: TabId) -> anyhow::Result<()> {
        self.publish(DaemonMessage::Ready { tab_id })?;
        Ok(())
    }
}

impl ActionUi for HostLink {
    fn render(&self, view: &ActionView) {
        self.publish_ui(DaemonMessage::Render { view: view.clone() });
    }

    fn reset(&self) {
        self.publish_ui(DaemonMessage::ResetUi);
    }

    fn set_love_indicator(&self, is_loved: bool, song: Option<&SongInfo>) {
        self.publish_ui(DaemonMessage::LoveIndicator {
            is_loved,
            song: song.cloned(),
        });
    }
}

impl ContextMenu for HostLink {
    fn remove_all(&self) {
        self.publish_ui(DaemonMessage::MenuRemoveAll);
    }

    fn add_item(&self, item: &MenuItem) {
        self.publish_ui(DaemonMessage::MenuAddItem { item: item.clone() });
    }
}

// ── socket server ─────────────────────────────────────────────────────────────

pub fn start_server(
    bind_address: String,
    port: u16,
    link: HostLink,
    event_tx: EventSender,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind host socket {}: {}", addr, e);
                return;
            }
        };

        info!("Host socket listening at {}", addr);
        serve(listener, link, event_tx).await;
    })
}

/// Accept shim connections on an already bound listener.
pub async fn serve(listener: TcpListener, link: HostLink, event_tx: EventSender) {
    let mut client_id = 0usize;
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                client_id += 1;
                let id = client_id;
                info!("Host client {} connected from {}", id, peer);

                let link = link.clone();
                let event_tx = event_tx.clone();
                tokio::spawn(async move {
                    handle_client(stream, link, id, event_tx).await;
                    info!("Host client {} disconnected", id);
                });
            }
            Err(e) => {
                error!("Failed to accept host connection: {}", e);
            }
        }
    }
}

async fn handle_client(stream: TcpStream, link: HostLink, client_id: usize, event_tx: EventSender) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut broadcast_rx = link.subscribe();
    // Replies addressed to this client only
    let (direct_tx, mut direct_rx) = mpsc::channel::<DaemonMessage>(64);
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    let hello = DaemonMessage::Hello {
        protocol_version: PROTOCOL_VERSION,
    };
    if write_message(&mut write_half, hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => break,
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);
                        while let Some((decoded, consumed)) = Message::decode(&read_buf) {
                            read_buf.drain(..consumed);
                            match decoded {
                                Ok(Message::Host(msg)) => {
                                    if !dispatch(msg, &link, &event_tx, &direct_tx).await {
                                        warn!("Orchestrator event channel closed");
                                        return;
                                    }
                                }
                                Ok(Message::Daemon(_)) => {
                                    warn!("Host client {} sent a daemon-side message", client_id);
                                }
                                Err(e) => {
                                    warn!("Host client {} sent a malformed frame: {}", client_id, e);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from host client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            Some(msg) = direct_rx.recv() => {
                if write_message(&mut write_half, msg).await.is_err() {
                    break;
                }
            }

            msg = broadcast_rx.recv() => {
                match msg {
                    Ok(msg) => {
                        if write_message(&mut write_half, msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Host client {} missed {} messages", client_id, n);
                    }
                    Err(_) => break,
                }
            }
        }
    }
}

/// Route one inbound message. Returns false once the orchestrator is gone.
async fn dispatch(
    msg: HostMessage,
    link: &HostLink,
    event_tx: &EventSender,
    direct_tx: &mpsc::Sender<DaemonMessage>,
) -> bool {
    let event = match msg {
        HostMessage::Tab(evt) => OrchestratorEvent::Tab(evt),
        HostMessage::Command { command } => OrchestratorEvent::Command(command),
        HostMessage::Request {
            request_id,
            tab_id,
            request,
        } => {
            let (reply_tx, reply_rx) = oneshot::channel();
            let direct_tx = direct_tx.clone();
            tokio::spawn(async move {
                if let Ok(response) = reply_rx.await {
                    let _ = direct_tx
                        .send(DaemonMessage::Response {
                            request_id,
                            response,
                        })
                        .await;
                }
            });
            OrchestratorEvent::Request {
                tab_id,
                request,
                reply: Some(reply_tx),
            }
        }
        HostMessage::Port { tab_id, event } => OrchestratorEvent::Port { tab_id, event },
        HostMessage::MenuClicked { item_id } => OrchestratorEvent::MenuClicked { item_id },
        HostMessage::Reply { call_id, reply } => {
            link.resolve(call_id, reply).await;
            return true;
        }
    };
    event_tx.send(event).is_ok()
}

async fn write_message(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    msg: DaemonMessage,
) -> anyhow::Result<()> {
    let encoded = Message::Daemon(msg).encode()?;
    write_half.write_all(&encoded).await?;
    Ok(())
}
