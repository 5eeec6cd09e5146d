//! Node event loop
//!
//! A single task owns the sync engine, the snapshot store and the
//! auto-save timer. Transport events, local commands and the timer are
//! handled one at a time, so the board needs no locking.

use std::time::Duration;

use retro_core::{
    BoardAction, BoardState, Error as CoreError, Participant, PersistenceSettings, Snapshot,
    Storage,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{LocalAction, Refresh, SyncEngine};
use crate::error::{Error, Result};
use crate::transport::{Connector, Listener, Transport, TransportEvent};

const COMMAND_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 256;

/// Everything a front end needs to draw the board
#[derive(Debug, Clone)]
pub struct BoardView {
    pub board: BoardState,
    pub me: Participant,
    pub is_host: bool,
    pub session_id: String,
    pub votes_remaining: u32,
    pub vote_budget: u32,
    pub open_channels: usize,
    pub settings: PersistenceSettings,
}

/// Notifications from the node loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Refresh(Refresh),
    ChannelOpened,
    ChannelClosed { open_channels: usize },
    AutoSaved(Uuid),
    StorageError(String),
}

enum NodeCommand {
    Apply(LocalAction, oneshot::Sender<Result<Refresh>>),
    Connect(String, oneshot::Sender<Result<()>>),
    View(oneshot::Sender<BoardView>),
    SaveSnapshot(oneshot::Sender<Result<Snapshot>>),
    ListSnapshots(oneshot::Sender<Result<Vec<Snapshot>>>),
    Restore(Uuid, oneshot::Sender<Result<Refresh>>),
    Export(oneshot::Sender<Result<String>>),
    Import(String, oneshot::Sender<Result<Refresh>>),
    UpdateSettings(PersistenceSettings, oneshot::Sender<Result<()>>),
    Shutdown,
}

/// Handle to a running node
pub struct NodeHandle {
    cmd_tx: mpsc::Sender<NodeCommand>,
    event_rx: mpsc::Receiver<NodeEvent>,
    task: JoinHandle<()>,
}

impl NodeHandle {
    /// Get the next node event
    pub async fn next_event(&mut self) -> Option<NodeEvent> {
        self.event_rx.recv().await
    }

    /// Get the next node event without waiting
    pub fn try_next_event(&mut self) -> Option<NodeEvent> {
        self.event_rx.try_recv().ok()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> NodeCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| Error::NodeStopped)?;
        rx.await.map_err(|_| Error::NodeStopped)
    }

    pub async fn apply(&self, action: LocalAction) -> Result<Refresh> {
        self.request(|tx| NodeCommand::Apply(action, tx)).await?
    }

    /// Open a channel to a peer address
    pub async fn connect(&self, addr: impl Into<String>) -> Result<()> {
        let addr = addr.into();
        self.request(|tx| NodeCommand::Connect(addr, tx)).await?
    }

    pub async fn view(&self) -> Result<BoardView> {
        self.request(NodeCommand::View).await
    }

    /// Persist a manual snapshot
    pub async fn save_snapshot(&self) -> Result<Snapshot> {
        self.request(NodeCommand::SaveSnapshot).await?
    }

    /// Stored snapshots, newest first
    pub async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        self.request(NodeCommand::ListSnapshots).await?
    }

    pub async fn restore(&self, id: Uuid) -> Result<Refresh> {
        self.request(|tx| NodeCommand::Restore(id, tx)).await?
    }

    /// Export file contents for the current board
    pub async fn export(&self) -> Result<String> {
        self.request(NodeCommand::Export).await?
    }

    pub async fn import(&self, contents: impl Into<String>) -> Result<Refresh> {
        let contents = contents.into();
        self.request(|tx| NodeCommand::Import(contents, tx)).await?
    }

    pub async fn update_settings(&self, settings: PersistenceSettings) -> Result<()> {
        self.request(|tx| NodeCommand::UpdateSettings(settings, tx))
            .await?
    }

    /// Stop the loop and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(NodeCommand::Shutdown).await;
        let _ = self.task.await;
    }
}

pub struct Node {
    engine: SyncEngine,
    connector: Connector,
    transport_rx: mpsc::Receiver<TransportEvent>,
    _listener: Option<Listener>,
    store: Box<dyn Storage + Send>,
    settings: PersistenceSettings,
    debounce: Duration,
    autosave_at: Option<Instant>,
    cmd_rx: mpsc::Receiver<NodeCommand>,
    event_tx: mpsc::Sender<NodeEvent>,
}

impl Node {
    /// Start the loop on the current tokio runtime
    ///
    /// A host passes the listener it bound before creating its engine.
    pub fn spawn(
        engine: SyncEngine,
        transport: Transport,
        listener: Option<Listener>,
        store: Box<dyn Storage + Send>,
        settings: PersistenceSettings,
        debounce: Duration,
    ) -> NodeHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let (connector, transport_rx) = transport.into_parts();

        let node = Node {
            engine,
            connector,
            transport_rx,
            _listener: listener,
            store,
            settings,
            debounce,
            autosave_at: None,
            cmd_rx,
            event_tx,
        };
        let task = tokio::spawn(node.run());

        NodeHandle {
            cmd_tx,
            event_rx,
            task,
        }
    }

    async fn run(mut self) {
        info!(session = %self.engine.session_id(), host = self.engine.is_host(), "Node started");
        loop {
            let deadline = self.autosave_at;
            tokio::select! {
                Some(event) = self.transport_rx.recv() => self.on_transport(event),
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(NodeCommand::Shutdown) | None => break,
                    Some(cmd) => self.on_command(cmd).await,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.auto_save();
                }
            }
        }
        info!("Node stopped");
    }

    fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened {
                channel,
                outbound,
                remote,
            } => {
                info!(%channel, %remote, "Channel opened");
                self.engine.register_channel(channel, outbound);
                self.engine.channel_opened(channel);
                self.emit(NodeEvent::ChannelOpened);
            }
            TransportEvent::Received { channel, message } => {
                if let Some(refresh) = self.engine.handle_message(channel, message) {
                    self.mutated(refresh);
                }
            }
            TransportEvent::Closed { channel, reason } => {
                if let Some(reason) = reason {
                    warn!(%channel, %reason, "Channel failed");
                }
                let open_channels = self.engine.channel_closed(channel);
                self.emit(NodeEvent::ChannelClosed { open_channels });
            }
        }
    }

    async fn on_command(&mut self, cmd: NodeCommand) {
        match cmd {
            NodeCommand::Apply(action, reply) => {
                let result = self.engine.apply(action);
                if let Ok(refresh) = &result {
                    self.mutated(*refresh);
                }
                let _ = reply.send(result);
            }
            NodeCommand::Connect(addr, reply) => {
                // Opening a channel reports through our own event queue
                let connector = self.connector.clone();
                tokio::spawn(async move {
                    let result = connector.connect(&addr).await.map(|_| ());
                    if let Err(e) = &result {
                        warn!(addr = %addr, error = %e, "Connect failed");
                    }
                    let _ = reply.send(result);
                });
            }
            NodeCommand::View(reply) => {
                let _ = reply.send(self.view());
            }
            NodeCommand::SaveSnapshot(reply) => {
                let _ = reply.send(self.save_manual());
            }
            NodeCommand::ListSnapshots(reply) => {
                let _ = reply.send(self.store.list_snapshots().map_err(Error::from));
            }
            NodeCommand::Restore(id, reply) => {
                let result = self.restore(id);
                let _ = reply.send(result);
            }
            NodeCommand::Export(reply) => {
                let _ = reply.send(self.engine.export_board());
            }
            NodeCommand::Import(contents, reply) => {
                let result = self.engine.import_board(&contents);
                if let Ok(refresh) = &result {
                    self.mutated(*refresh);
                }
                let _ = reply.send(result);
            }
            NodeCommand::UpdateSettings(settings, reply) => {
                let _ = reply.send(self.update_settings(settings));
            }
            NodeCommand::Shutdown => {}
        }
    }

    fn view(&self) -> BoardView {
        BoardView {
            board: self.engine.board().clone(),
            me: self.engine.me().clone(),
            is_host: self.engine.is_host(),
            session_id: self.engine.session_id().to_string(),
            votes_remaining: self.engine.votes_remaining(),
            vote_budget: self.engine.vote_budget(),
            open_channels: self.engine.open_channels(),
            settings: self.settings.clone(),
        }
    }

    /// Report a change and push the auto-save deadline back
    fn mutated(&mut self, refresh: Refresh) {
        self.emit(NodeEvent::Refresh(refresh));
        if self.settings.auto_snapshots_allowed() {
            self.autosave_at = Some(Instant::now() + self.debounce);
        }
    }

    fn auto_save(&mut self) {
        self.autosave_at = None;
        if !self.settings.auto_snapshots_allowed() {
            return;
        }
        let snapshot = self.engine.build_snapshot(true);
        match self.store.save_snapshot(&snapshot) {
            Ok(()) => {
                debug!(snapshot = %snapshot.id, "Automatic snapshot saved");
                match self.store.prune_snapshots(self.settings.retention_days) {
                    Ok(0) => {}
                    Ok(pruned) => info!(pruned, "Pruned expired snapshots"),
                    Err(e) => warn!(error = %e, "Snapshot pruning failed"),
                }
                self.emit(NodeEvent::AutoSaved(snapshot.id));
            }
            Err(e) => {
                warn!(error = %e, "Automatic snapshot failed");
                self.emit(NodeEvent::StorageError(e.to_string()));
            }
        }
    }

    fn save_manual(&mut self) -> Result<Snapshot> {
        self.engine.authorize(BoardAction::SaveSnapshot)?;
        let snapshot = self.engine.build_snapshot(false);
        self.store.save_snapshot(&snapshot)?;
        info!(snapshot = %snapshot.id, "Snapshot saved");
        Ok(snapshot)
    }

    fn restore(&mut self, id: Uuid) -> Result<Refresh> {
        self.engine.authorize(BoardAction::RestoreSnapshot)?;
        let snapshot = self
            .store
            .find_snapshot(id)?
            .ok_or_else(|| CoreError::NotFound(format!("snapshot {}", id)))?;
        let refresh = self.engine.restore_snapshot(snapshot)?;
        self.mutated(refresh);
        Ok(refresh)
    }

    fn update_settings(&mut self, settings: PersistenceSettings) -> Result<()> {
        self.store.save_settings(&settings)?;
        if !settings.auto_snapshots_allowed() {
            self.autosave_at = None;
        }
        info!(
            official = settings.official_enabled,
            consent = settings.consent.accepted,
            retention_days = settings.retention_days,
            "Persistence settings updated"
        );
        self.settings = settings;
        Ok(())
    }

    fn emit(&self, event: NodeEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            debug!(error = %e, "Dropping node event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_core::{Category, MemoryStore, PeerAddress, Role};
    use tokio::time::timeout;

    fn consenting() -> PersistenceSettings {
        let mut settings = PersistenceSettings {
            official_enabled: true,
            ..Default::default()
        };
        settings.grant_consent();
        settings
    }

    async fn wait_for(
        handle: &mut NodeHandle,
        mut pred: impl FnMut(&NodeEvent) -> bool,
    ) -> NodeEvent {
        timeout(Duration::from_secs(5), async {
            loop {
                let event = handle.next_event().await.expect("node stopped");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for node event")
    }

    /// Poll the view until `pred` holds
    async fn view_until(handle: &NodeHandle, pred: impl Fn(&BoardView) -> bool) -> BoardView {
        timeout(Duration::from_secs(5), async {
            loop {
                let view = handle.view().await.unwrap();
                if pred(&view) {
                    return view;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for view")
    }

    async fn host_node(settings: PersistenceSettings, debounce: Duration) -> (NodeHandle, String) {
        let transport = Transport::new();
        let listener = transport.listen(0).await.unwrap();
        let addr = format!("127.0.0.1:{}", listener.port());
        let engine = SyncEngine::host("alice", PeerAddress::new(addr.clone()), 3);
        let handle = Node::spawn(
            engine,
            transport,
            Some(listener),
            Box::new(MemoryStore::new()),
            settings,
            debounce,
        );
        (handle, addr)
    }

    fn join_node(session: &str, name: &str, role: Role) -> NodeHandle {
        let engine = SyncEngine::join(name, PeerAddress::generate(), role, session, 3);
        Node::spawn(
            engine,
            Transport::new(),
            None,
            Box::new(MemoryStore::new()),
            PersistenceSettings::default(),
            Duration::from_millis(50),
        )
    }

    fn add_card(text: &str) -> LocalAction {
        LocalAction::AddCard {
            text: text.into(),
            category: Category::Good,
        }
    }

    #[tokio::test]
    async fn test_join_over_tcp() {
        let (mut host, session) =
            host_node(PersistenceSettings::default(), Duration::from_millis(50)).await;
        let mut client = join_node(&session, "bob", Role::Participant);

        client.connect(session.clone()).await.unwrap();
        wait_for(&mut host, |e| *e == NodeEvent::ChannelOpened).await;

        let view = view_until(&client, |v| v.board.participants.len() == 2).await;
        assert_eq!(view.session_id, session);
        assert_eq!(view.me.role, Role::Participant);
        let host_view = view_until(&host, |v| v.board.participants.len() == 2).await;
        assert_eq!(host_view.open_channels, 1);

        host.apply(add_card("Great sprint")).await.unwrap();
        wait_for(&mut client, |e| *e == NodeEvent::Refresh(Refresh::Cards)).await;
        let view = client.view().await.unwrap();
        assert_eq!(view.board.cards[0].clear_text(), "Great sprint");

        host.shutdown().await;
        wait_for(&mut client, |e| {
            matches!(e, NodeEvent::ChannelClosed { open_channels: 0 })
        })
        .await;
        let view = client.view().await.unwrap();
        assert_eq!(view.board.participants.len(), 2);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces() {
        let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = unused.local_addr().unwrap().to_string();
        drop(unused);

        let client = join_node(&addr, "bob", Role::Participant);
        assert!(client.connect(addr).await.is_err());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_node_answers_while_connecting() {
        let (mut host, session) =
            host_node(PersistenceSettings::default(), Duration::from_millis(50)).await;
        let client = join_node(&session, "bob", Role::Participant);

        let (connected, view) = tokio::join!(client.connect(session.clone()), client.view());
        connected.unwrap();
        assert_eq!(view.unwrap().session_id, session);

        wait_for(&mut host, |e| *e == NodeEvent::ChannelOpened).await;
        view_until(&client, |v| v.board.participants.len() == 2).await;
        host.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_autosave_is_debounced() {
        let (mut host, _) = host_node(consenting(), Duration::from_millis(100)).await;

        for text in ["one", "two", "three"] {
            host.apply(add_card(text)).await.unwrap();
        }
        let saved = wait_for(&mut host, |e| matches!(e, NodeEvent::AutoSaved(_))).await;

        let snapshots = host.list_snapshots().await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].is_official);
        assert_eq!(snapshots[0].summary.cards_count, 3);
        assert_eq!(saved, NodeEvent::AutoSaved(snapshots[0].id));
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_autosave_without_consent() {
        let mut settings = consenting();
        settings.revoke_consent();
        let (host, _) = host_node(settings, Duration::from_millis(10)).await;

        host.apply(add_card("private")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(host.list_snapshots().await.unwrap().is_empty());
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_manual_save_and_restore() {
        let (host, _) = host_node(PersistenceSettings::default(), Duration::from_millis(50)).await;
        host.apply(add_card("keep")).await.unwrap();
        let saved = host.save_snapshot().await.unwrap();
        assert!(!saved.is_official);

        host.apply(LocalAction::NewSession).await.unwrap();
        assert!(host.view().await.unwrap().board.cards.is_empty());

        host.restore(saved.id).await.unwrap();
        let view = host.view().await.unwrap();
        assert_eq!(view.board.cards[0].clear_text(), "keep");

        let missing = host.restore(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(Error::Core(CoreError::NotFound(_)))));
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_quota_error_reported_not_retried() {
        let transport = Transport::new();
        let engine = SyncEngine::host("alice", PeerAddress::new("127.0.0.1:1"), 3);
        let mut host = Node::spawn(
            engine,
            transport,
            None,
            Box::new(MemoryStore::new().with_quota(Some(16))),
            consenting(),
            Duration::from_millis(20),
        );

        host.apply(add_card("too big")).await.unwrap();
        let event = wait_for(&mut host, |e| matches!(e, NodeEvent::StorageError(_))).await;
        match event {
            NodeEvent::StorageError(msg) => assert!(msg.contains("quota")),
            other => panic!("unexpected event: {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Some(event) = host.try_next_event() {
            assert!(!matches!(event, NodeEvent::StorageError(_)));
        }
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_settings_validates() {
        let (host, _) = host_node(PersistenceSettings::default(), Duration::from_millis(50)).await;
        let bad = PersistenceSettings {
            retention_days: 0,
            ..Default::default()
        };
        assert!(host.update_settings(bad).await.is_err());

        host.update_settings(consenting()).await.unwrap();
        assert!(host.view().await.unwrap().settings.auto_snapshots_allowed());
        host.shutdown().await;
    }
}
