//! Synchronization engine

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::broadcast::{Broadcaster, EventPublisher};
use crate::estimate::Notifier;
use crate::recommend::{Oracle, RecommendQueue, RecommendationPipeline, TaskOutcome};
use crate::registry::{Registry, RegistryError, Role, RoomId, Topic};
use crate::render::Render;
use crate::session::liveness::{spawn_probe_sweep, spawn_read_loop, sweep_once, ReadExit};
use crate::session::{Connection, Transport};
use crate::stats::{EngineStats, EngineStatsSnapshot};
use crate::store::EstimateStore;

use super::config::EngineConfig;

/// A registered connection and its read loop
#[derive(Debug)]
pub struct Session {
    pub connection: Arc<Connection>,
    /// Finishes once the connection has been released
    pub reader: JoinHandle<ReadExit>,
}

/// Real-time synchronization engine
pub struct SyncEngine<S, R> {
    config: EngineConfig,
    registry: Arc<Registry>,
    broadcaster: Arc<Broadcaster>,
    store: Arc<S>,
    notifier: Notifier<S, R>,
    pipeline: Option<RecommendationPipeline>,
    sweep: JoinHandle<()>,
}

impl<S, R> SyncEngine<S, R>
where
    S: EstimateStore,
    R: Render,
{
    /// Start an engine without recommendations
    pub fn new(config: EngineConfig, store: Arc<S>, renderer: R) -> Self {
        Self::start(config, store, renderer, |_, _, _| None)
    }

    /// Start an engine whose new tickets are sent to `oracle`
    pub fn with_oracle<O: Oracle>(config: EngineConfig, store: Arc<S>, renderer: R, oracle: O) -> Self {
        let oracle = Arc::new(oracle);
        Self::start(config, store, renderer, move |config, store, publisher| {
            Some(RecommendationPipeline::spawn(
                config.pipeline(),
                store,
                oracle,
                publisher,
            ))
        })
    }

    fn start<F>(config: EngineConfig, store: Arc<S>, renderer: R, pipeline: F) -> Self
    where
        F: FnOnce(&EngineConfig, Arc<S>, Arc<EventPublisher<R>>) -> Option<RecommendationPipeline>,
    {
        let stats = Arc::new(EngineStats::new());
        let registry = Arc::new(Registry::with_stats(stats));
        let broadcaster = Arc::new(Broadcaster::spawn_with_timeout(
            Arc::clone(&registry),
            config.broadcast_workers,
            config.broadcast_capacity,
            config.write_timeout,
        ));
        let publisher = Arc::new(EventPublisher::new(
            Arc::new(renderer),
            Arc::clone(&broadcaster),
        ));

        let pipeline = pipeline(&config, Arc::clone(&store), Arc::clone(&publisher));
        let notifier = Notifier::new(
            Arc::clone(&store),
            publisher,
            pipeline.as_ref().map(RecommendationPipeline::queue),
        );
        let sweep = spawn_probe_sweep(
            Arc::clone(&registry),
            config.probe_interval,
            config.probe_timeout,
        );

        tracing::info!(
            broadcast_workers = broadcaster.worker_count(),
            recommendations = pipeline.is_some(),
            "Sync engine started"
        );

        Self {
            config,
            registry,
            broadcaster,
            store,
            notifier,
            pipeline,
            sweep,
        }
    }

    /// Bind a freshly upgraded transport to `room/<room_id>/<role>`
    ///
    /// Starts the connection's read loop; the connection is released when
    /// the loop ends.
    pub async fn register(
        &self,
        transport: Transport,
        room_id: RoomId,
        role: Role,
    ) -> Result<Arc<Connection>, RegistryError> {
        self.register_session(transport, room_id, role)
            .await
            .map(|session| session.connection)
    }

    /// Like [`register`](Self::register), also returning the read loop
    pub async fn register_session(
        &self,
        transport: Transport,
        room_id: RoomId,
        role: Role,
    ) -> Result<Session, RegistryError> {
        let (connection, stream) = transport.into_connection();
        let connection = Arc::new(connection);

        if let Err(e) = self
            .registry
            .register(Arc::clone(&connection), Topic::room(room_id, role))
            .await
        {
            connection.close().await;
            return Err(e);
        }

        let reader = spawn_read_loop(
            Arc::clone(&self.registry),
            Arc::clone(&connection),
            stream,
            self.config.idle_timeout,
        );
        Ok(Session { connection, reader })
    }

    /// Move a registered connection to another room or role
    pub async fn rebind(
        &self,
        connection: &Arc<Connection>,
        room_id: RoomId,
        role: Role,
    ) -> Result<Option<Topic>, RegistryError> {
        self.registry
            .register(Arc::clone(connection), Topic::room(room_id, role))
            .await
    }

    /// Send a pre-rendered payload to every connection matching `pattern`
    pub async fn publish(&self, pattern: &Topic, payload: Bytes) -> usize {
        self.broadcaster.publish(pattern, payload).await
    }

    /// Notification entry points for committed changes
    pub fn notifier(&self) -> &Notifier<S, R> {
        &self.notifier
    }

    /// Subscription registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Estimate store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Settings the engine was started with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current counters
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.registry.stats().snapshot()
    }

    /// Recommendation queue, when an oracle is configured
    pub fn recommendations(&self) -> Option<RecommendQueue> {
        self.pipeline.as_ref().map(RecommendationPipeline::queue)
    }

    /// Feed of recommendation outcomes, when an oracle is configured
    pub fn subscribe_outcomes(&self) -> Option<broadcast::Receiver<TaskOutcome>> {
        self.pipeline.as_ref().map(RecommendationPipeline::subscribe)
    }

    /// Run one probe sweep now; returns the number of connections released
    pub async fn sweep_now(&self) -> usize {
        sweep_once(&self.registry, self.config.probe_timeout).await
    }

    /// Stop background tasks
    ///
    /// Connections stay registered; their read loops end with them.
    pub fn shutdown(&self) {
        self.sweep.abort();
        self.broadcaster.shutdown();
        if let Some(pipeline) = &self.pipeline {
            pipeline.shutdown();
        }
        tracing::info!("Sync engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::hours_from_parts;
    use crate::recommend::{OracleError, RecommendedEstimate};
    use crate::render::JsonRenderer;
    use crate::session::test_support::{transport_pair, Peer};
    use crate::session::Frame;
    use crate::store::memory::{MemoryStore, NewTicket};
    use serde_json::Value;
    use std::time::Duration;

    struct FixedOracle(RecommendedEstimate);

    impl Oracle for FixedOracle {
        async fn estimate(
            &self,
            _external_key: &str,
            _description: &str,
            _timeout: Duration,
        ) -> Result<RecommendedEstimate, OracleError> {
            Ok(self.0)
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
            .broadcast(4, 16)
            .recommend(2, 8)
            .oracle_timeout(Duration::from_millis(200))
    }

    async fn store_with_room(room_id: RoomId) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create_room(room_id, true).await;
        for user in [1, 2, 3] {
            store.join_room(room_id, user).await.unwrap();
        }
        store
    }

    async fn connect<S: EstimateStore, R: Render>(
        engine: &SyncEngine<S, R>,
        role: Role,
    ) -> (Arc<Connection>, Peer) {
        let (transport, peer) = transport_pair();
        let conn = engine.register(transport, 5, role).await.unwrap();
        (conn, peer)
    }

    async fn next_type(peer: &mut Peer) -> Option<String> {
        match peer.recv().await? {
            Frame::Text(payload) => {
                let value: Value = serde_json::from_slice(&payload).ok()?;
                value["type"].as_str().map(str::to_string)
            }
            _ => None,
        }
    }

    async fn quiet(peer: &mut Peer) -> bool {
        tokio::time::sleep(Duration::from_millis(50)).await;
        peer.try_recv().is_none()
    }

    #[tokio::test]
    async fn test_room_scenario() {
        let store = store_with_room(5).await;
        let engine = SyncEngine::new(config(), Arc::clone(&store), JsonRenderer);

        let (_owner, mut owner) = connect(&engine, Role::Owner).await;
        let (_e1, mut est1) = connect(&engine, Role::Estimator).await;
        let (_e2, mut est2) = connect(&engine, Role::Estimator).await;
        assert_eq!(engine.registry().room_connection_count(5).await, 3);

        // New ticket goes to estimators only
        let ticket = store.create_ticket(5, NewTicket::named("Login")).await.unwrap();
        engine.notifier().ticket_created(&ticket).await;
        assert_eq!(next_type(&mut est1).await.as_deref(), Some("ticket_created"));
        assert_eq!(next_type(&mut est2).await.as_deref(), Some("ticket_created"));
        assert!(quiet(&mut owner).await);

        // An estimate reaches all three
        store
            .submit_estimate(ticket.id, 1, hours_from_parts(0, 3, 0).unwrap())
            .await
            .unwrap();
        engine.notifier().estimate_changed(5, ticket.id).await;
        for peer in [&mut owner, &mut est1, &mut est2] {
            assert_eq!(next_type(peer).await.as_deref(), Some("estimate_updated"));
        }

        assert_eq!(engine.stats().deliveries_written, 5);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_recommendation_flows_to_room() {
        let store = store_with_room(5).await;
        let estimate = RecommendedEstimate {
            week_estimate: 1,
            day_estimate: 0,
            hour_estimate: 0,
        };
        let engine = SyncEngine::with_oracle(
            config(),
            Arc::clone(&store),
            JsonRenderer,
            FixedOracle(estimate),
        );
        let mut outcomes = engine.subscribe_outcomes().unwrap();
        let (_owner, mut owner) = connect(&engine, Role::Owner).await;

        let ticket = store
            .create_ticket(
                5,
                NewTicket::named("Export").with_key("PROJ-1").with_description("CSV export"),
            )
            .await
            .unwrap();
        engine.notifier().ticket_created(&ticket).await;

        let outcome = tokio::time::timeout(Duration::from_secs(2), outcomes.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, TaskOutcome::Succeeded { .. }));
        assert_eq!(
            next_type(&mut owner).await.as_deref(),
            Some("recommendation_available")
        );
        assert_eq!(store.estimates(ticket.id).await.unwrap()[0].hours, 40);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_without_oracle_no_queue() {
        let store = store_with_room(5).await;
        let engine = SyncEngine::new(config(), store, JsonRenderer);

        assert!(engine.recommendations().is_none());
        assert!(engine.subscribe_outcomes().is_none());
    }

    #[tokio::test]
    async fn test_peer_close_unregisters() {
        let store = store_with_room(5).await;
        let engine = SyncEngine::new(config(), store, JsonRenderer);

        let (transport, peer) = transport_pair();
        let session = engine
            .register_session(transport, 5, Role::Estimator)
            .await
            .unwrap();
        assert!(engine.registry().contains(session.connection.id()).await);

        peer.send(Frame::Close);
        assert_eq!(session.reader.await.unwrap(), ReadExit::Closed);
        assert!(!engine.registry().contains(session.connection.id()).await);
        assert_eq!(engine.stats().active_connections(), 0);
    }

    #[tokio::test]
    async fn test_rebind_moves_connection() {
        let store = store_with_room(5).await;
        let engine = SyncEngine::new(config(), store, JsonRenderer);
        let (conn, _peer) = connect(&engine, Role::Owner).await;

        let previous = engine.rebind(&conn, 6, Role::Estimator).await.unwrap();
        assert_eq!(previous, Some(Topic::room(5, Role::Owner)));
        assert_eq!(engine.registry().room_connection_count(5).await, 0);
        assert_eq!(engine.registry().room_connection_count(6).await, 1);
    }

    #[tokio::test]
    async fn test_sweep_now_releases_dead_peer() {
        let store = store_with_room(5).await;
        let engine = SyncEngine::new(config(), store, JsonRenderer);
        let (_alive, _p1) = connect(&engine, Role::Owner).await;
        let (dead, p2) = connect(&engine, Role::Estimator).await;
        p2.fail_writes();

        assert_eq!(engine.sweep_now().await, 1);
        assert!(!engine.registry().contains(dead.id()).await);
        assert_eq!(engine.stats().probes_failed, 1);
    }
}
