//! # Engine
//!
//! The single entry point an application server talks to.
//!
//! ```text
//!   connect ──▶ ClientSession ◀── render_for
//!                    ▲
//!   record_saved ──▶ ChangeHub ──▶ (auto_push) ──▶ push_changes ──▶ Publisher
//! ```
//!
//! Sessions are locked individually: pushes for different clients run in
//! parallel, operations on one client are serialized.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{ChangeHub, ClientId, QueryExecutor, RecordChange, RecordRef, Schema};
use tessera_push::{
    AttachedView, ChannelPublisher, ClientSession, Envelope, Publisher, PushResult, PushStats, Pusher,
};
use tessera_security::{PolicyContext, PolicyRegistry};
use tessera_shared::{PushMessage, StatusKind};
use tessera_view::{FsSource, RenderRequest, TemplateSource, ViewContext, ViewRenderer};

type SharedSession = Arc<Mutex<ClientSession>>;

/// Assembles an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    schema: Arc<Schema>,
    source: Option<Box<dyn TemplateSource>>,
    executor: Option<Arc<dyn QueryExecutor>>,
    policies: Option<PolicyRegistry>,
    publisher: Option<Arc<dyn Publisher>>,
    hub: Option<Arc<ChangeHub>>,
}

impl EngineBuilder {
    /// Starts from `config`, an empty schema and templates on disk.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            schema: Arc::new(Schema::new()),
            source: None,
            executor: None,
            policies: None,
            publisher: None,
            hub: None,
        }
    }

    /// Record metamodel.
    #[must_use]
    pub fn schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = schema;
        self
    }

    /// Where templates are read from.
    #[must_use]
    pub fn templates(mut self, source: impl TemplateSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Query hook for tracked queries.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Enforces `registry` for every client.
    #[must_use]
    pub fn policies(mut self, registry: PolicyRegistry) -> Self {
        self.policies = Some(registry);
        self
    }

    /// Delivers pushes through `publisher` instead of the built-in outbox.
    #[must_use]
    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Shares an existing change hub, typically one a store reports to.
    #[must_use]
    pub fn hub(mut self, hub: Arc<ChangeHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Fails if the policy globals cannot be converted.
    pub fn build(self) -> EngineResult<Engine> {
        let config = self.config;
        let source = self.source.unwrap_or_else(|| Box::new(FsSource));
        let mut ctx = ViewContext::new(config.renderer.to_renderer_config(), self.schema, source);
        if let Some(executor) = self.executor {
            ctx = ctx.with_executor(executor);
        }
        let hub = self.hub.unwrap_or_default();

        let (publisher, outbox): (Arc<dyn Publisher>, _) = match self.publisher {
            Some(p) => (p, None),
            None => {
                let outbox = Arc::new(match config.pusher.buffer_capacity_hint {
                    0 => ChannelPublisher::unbounded(),
                    n => ChannelPublisher::bounded(n),
                });
                (Arc::clone(&outbox) as Arc<dyn Publisher>, Some(outbox))
            }
        };

        let mut pusher = Pusher::new(ViewRenderer::new(Arc::new(ctx)), Arc::clone(&hub), publisher)
            .empty_on_read_violation(config.renderer.empty_on_read_violation)
            .delimit_nodes(config.pusher.delimit_nodes);
        if let Some(registry) = self.policies {
            let policy = PolicyContext::new(registry, config.policy.to_policy_config()?);
            pusher = pusher.with_policy(Arc::new(policy));
        }

        tracing::info!(
            policies = pusher.policy().is_some(),
            auto_push = config.pusher.auto_push,
            "engine ready"
        );
        Ok(Engine {
            config,
            hub,
            pusher,
            outbox,
            sessions: RwLock::new(HashMap::new()),
        })
    }
}

/// Connected clients, their views and the update pipeline.
pub struct Engine {
    config: EngineConfig,
    hub: Arc<ChangeHub>,
    pusher: Pusher,
    outbox: Option<Arc<ChannelPublisher>>,
    sessions: RwLock<HashMap<ClientId, SharedSession>>,
}

impl Engine {
    /// Starts a builder.
    #[must_use]
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Change hub; persistence layers report to it.
    #[must_use]
    pub const fn hub(&self) -> &Arc<ChangeHub> {
        &self.hub
    }

    /// The update pipeline.
    #[must_use]
    pub const fn pusher(&self) -> &Pusher {
        &self.pusher
    }

    /// Receiving side of the built-in outbox; `None` with a custom
    /// publisher.
    #[must_use]
    pub fn outbox(&self) -> Option<Receiver<Envelope>> {
        self.outbox.as_ref().map(|o| o.receiver())
    }

    // =========================================================================
    // CLIENTS
    // =========================================================================

    /// Connects a client acting as `principal`.
    pub fn connect(&self, principal: RecordRef, auth_token: impl Into<String>) -> ClientId {
        let id = self.pusher.renderer().context().ids().next_client();
        let session = ClientSession::connect(&self.hub, id, principal, auth_token, &self.config.pusher.channel_prefix);
        self.sessions.write().insert(id, Arc::new(Mutex::new(session)));
        id
    }

    /// Disconnects a client and drops everything it rendered.
    ///
    /// # Errors
    ///
    /// Fails for unknown clients.
    pub fn disconnect(&self, client: ClientId) -> EngineResult<()> {
        let session = self
            .sessions
            .write()
            .remove(&client)
            .ok_or(EngineError::UnknownClient(client))?;
        session.lock().disconnect(&self.hub);
        Ok(())
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Push channel of a client.
    ///
    /// # Errors
    ///
    /// Fails for unknown clients.
    pub fn channel_of(&self, client: ClientId) -> EngineResult<String> {
        Ok(self.session(client)?.lock().channel().to_owned())
    }

    // =========================================================================
    // RENDERING
    // =========================================================================

    /// Renders `request` for a client and keeps the tree live.
    ///
    /// # Errors
    ///
    /// Unknown client, or any render failure including policy denials.
    pub fn render_for(&self, client: ClientId, request: RenderRequest) -> EngineResult<AttachedView> {
        let session = self.session(client)?;
        let mut session = session.lock();
        Ok(self.pusher.render(&mut session, request)?)
    }

    /// Clears rendering and policy caches.
    pub fn clear_caches(&self) {
        self.pusher.renderer().context().clear_caches();
        if let Some(policy) = self.pusher.policy() {
            policy.clear_all();
        }
    }

    // =========================================================================
    // NOTIFICATIONS
    // =========================================================================

    /// Reports a saved record. Returns the number of clients affected.
    ///
    /// # Errors
    ///
    /// With `auto_push`, failures of the resulting push cycles.
    pub fn record_saved(&self, record: RecordRef) -> EngineResult<usize> {
        self.notify(&RecordChange::saved(record))
    }

    /// Reports a destroyed record. Returns the number of clients affected.
    ///
    /// # Errors
    ///
    /// With `auto_push`, failures of the resulting push cycles.
    pub fn record_destroyed(&self, record: RecordRef) -> EngineResult<usize> {
        self.notify(&RecordChange::destroyed(record))
    }

    fn notify(&self, change: &RecordChange) -> EngineResult<usize> {
        let reached = self.hub.notify(change);
        if reached > 0 && self.config.pusher.auto_push {
            self.push_all()?;
        }
        Ok(reached)
    }

    // =========================================================================
    // PUSH
    // =========================================================================

    /// Runs an update cycle for one client.
    ///
    /// # Errors
    ///
    /// Unknown client, or a tree surgery failure.
    pub fn push_changes(&self, client: ClientId) -> EngineResult<PushStats> {
        let session = self.session(client)?;
        let mut session = session.lock();
        Ok(self.pusher.push(&mut session)?)
    }

    /// Runs an update cycle for every client with pending changes.
    ///
    /// A failing client does not stop the others.
    ///
    /// # Errors
    ///
    /// The first failure, after every client has been pushed.
    pub fn push_all(&self) -> EngineResult<PushStats> {
        let sessions: Vec<SharedSession> = self.sessions.read().values().cloned().collect();
        push_sessions(sessions, |session| self.pusher.push(session))
    }

    /// Sends an operation outcome to a client.
    ///
    /// # Errors
    ///
    /// Unknown client, or a delivery failure.
    pub fn publish_status(&self, client: ClientId, kind: StatusKind, msg: &str, status: u16) -> EngineResult<()> {
        let session = self.session(client)?;
        let session = session.lock();
        self.pusher.publish(&session, &PushMessage::status(kind, msg, status))?;
        Ok(())
    }

    fn session(&self, client: ClientId) -> EngineResult<SharedSession> {
        self.sessions
            .read()
            .get(&client)
            .cloned()
            .ok_or(EngineError::UnknownClient(client))
    }
}

fn push_sessions(
    sessions: Vec<SharedSession>,
    mut push: impl FnMut(&mut ClientSession) -> PushResult<PushStats>,
) -> EngineResult<PushStats> {
    let mut total = PushStats::default();
    let mut first_error = None;
    for session in sessions {
        let mut session = session.lock();
        if session.buffer().is_empty() {
            continue;
        }
        match push(&mut session) {
            Ok(stats) => total += stats,
            Err(e) => {
                tracing::warn!(client = %session.id(), "push cycle failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }
    first_error.map_or(Ok(total), |e| Err(e.into()))
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("clients", &self.client_count())
            .field("pusher", &self.pusher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_push::PushError;
    use tessera_core::record::memory::MemRecord;
    use tessera_view::MemorySource;

    fn engine() -> Engine {
        Engine::builder(EngineConfig::default())
            .templates(MemorySource::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_connect_and_disconnect() {
        let e = engine();
        let a = e.connect(MemRecord::new("Client", 1).shared(), "aaa");
        let b = e.connect(MemRecord::new("Client", 2).shared(), "bbb");
        assert_ne!(a, b);
        assert_eq!(e.client_count(), 2);
        assert_eq!(e.channel_of(b).unwrap(), "/data/update/bbb");

        e.disconnect(a).unwrap();
        assert_eq!(e.client_count(), 1);
        assert!(matches!(e.disconnect(a), Err(EngineError::UnknownClient(id)) if id == a));
    }

    #[test]
    fn test_status_message_goes_to_client_channel() {
        let e = engine();
        let outbox = e.outbox().unwrap();
        let client = e.connect(MemRecord::new("Client", 1).shared(), "tok");
        e.publish_status(client, StatusKind::Error, "name taken", 412).unwrap();

        let sent = outbox.try_recv().unwrap();
        assert_eq!(sent.channel, "/data/update/tok");
        assert_eq!(sent.message, PushMessage::status(StatusKind::Error, "name taken", 412));
    }

    #[test]
    fn test_unknown_client_render() {
        let e = engine();
        let err = e
            .render_for(ClientId::new(99), RenderRequest::inline("x"))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownClient(_)));
    }

    #[test]
    fn test_failing_client_does_not_stop_the_others() {
        let e = engine();
        let outbox = e.outbox().unwrap();
        let room = Arc::new(MemRecord::new("Room", 1).with("name", "g708"));
        let clients: Vec<ClientId> = (1..=3)
            .map(|i| e.connect(MemRecord::new("Client", i).shared(), format!("t{i}")))
            .collect();
        for &client in &clients {
            e.render_for(
                client,
                RenderRequest::inline("<%= room.name %>").with_local("room", Arc::clone(&room) as RecordRef),
            )
            .unwrap();
        }

        room.set("name", "g709");
        assert_eq!(e.hub().notify(&RecordChange::saved(Arc::clone(&room) as RecordRef)), 3);

        let failing = clients[0];
        let sessions: Vec<SharedSession> = e.sessions.read().values().cloned().collect();
        let result = push_sessions(sessions, |session| {
            if session.id() == failing {
                Err(PushError::UnknownClient(failing))
            } else {
                e.pusher().push(session)
            }
        });

        assert!(matches!(result, Err(EngineError::Push(PushError::UnknownClient(id))) if id == failing));
        assert_eq!(outbox.try_iter().count(), 2);
        for &client in &clients[1..] {
            assert!(e.session(client).unwrap().lock().buffer().is_empty());
        }
    }
}
