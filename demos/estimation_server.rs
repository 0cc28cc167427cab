//! Estimation room server demo
//!
//! Run with: cargo run --example estimation_server [BIND_ADDR]
//!
//! Clients connect to `ws://HOST:PORT/rooms/<room-id>?role=<owner|estimator>`.
//! Room 1 exists on startup. Every 20 seconds the demo creates a ticket in
//! room 1, casts a few estimates for it and closes the previous one, so a
//! connected client sees every kind of update.
//!
//! With `OPENROUTER_API_KEY` set (and optionally `OPENROUTER_BASE_URL` and
//! `ORACLE_MODEL`), new tickets are also sent to the oracle.
//!
//! Try it with websocat:
//!   websocat "ws://localhost:8080/rooms/1?role=estimator"

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use estimation_sync::estimate::hours_from_parts;
use estimation_sync::store::memory::NewTicket;
use estimation_sync::{
    Admission, EngineConfig, HttpOracle, JsonRenderer, MemoryStore, OracleConfig, Role,
    ServerConfig, SyncEngine, SyncServer, UpgradeHandler, UpgradeRequest,
};

const DEMO_ROOM: u64 = 1;

/// Admits `/rooms/<id>?role=<role>` for rooms that exist
struct PathHandler {
    store: Arc<MemoryStore>,
}

impl UpgradeHandler for PathHandler {
    async fn admit(&self, request: &UpgradeRequest) -> Admission {
        let Some(room_id) = request
            .path
            .strip_prefix("/rooms/")
            .and_then(|id| id.trim_end_matches('/').parse().ok())
        else {
            return Admission::Reject("expected /rooms/<id>".to_string());
        };

        if self.store.room_hidden(room_id).await.is_err() {
            return Admission::Reject(format!("room {} does not exist", room_id));
        }

        match request.query_param("role").as_deref() {
            Some("owner") => Admission::Accept {
                room_id,
                role: Role::Owner,
            },
            Some("estimator") | None => Admission::Accept {
                room_id,
                role: Role::Estimator,
            },
            Some(other) => Admission::Reject(format!("unknown role {}", other)),
        }
    }

    async fn on_registered(&self, request: &UpgradeRequest, room_id: u64, role: Role) {
        println!("[{}] joined room {} as {}", request.peer_addr, room_id, role);
    }
}

/// Creates, estimates and closes tickets in the demo room
async fn simulate(engine: Arc<SyncEngine<MemoryStore, JsonRenderer>>) {
    let store = Arc::clone(engine.store());
    let mut ticker = tokio::time::interval(Duration::from_secs(20));
    let mut previous = None;
    let mut round = 1u64;

    loop {
        ticker.tick().await;

        let new = NewTicket::named(format!("Demo ticket {}", round))
            .with_key(format!("DEMO-{}", round))
            .with_description("Add a settings page with a dark mode toggle");
        let ticket = match store.create_ticket(DEMO_ROOM, new).await {
            Ok(ticket) => ticket,
            Err(e) => {
                eprintln!("Failed to create ticket: {}", e);
                continue;
            }
        };
        engine.notifier().ticket_created(&ticket).await;

        for (user, parts) in [(1, (0, 2, 0)), (2, (0, 3, 4)), (3, (1, 0, 0))] {
            let Some(hours) = hours_from_parts(parts.0, parts.1, parts.2) else {
                continue;
            };
            if store.submit_estimate(ticket.id, user, hours).await.is_ok() {
                engine.notifier().estimate_changed(DEMO_ROOM, ticket.id).await;
            }
        }

        if let Some(id) = previous.replace(ticket.id) {
            if let Ok(closed) = store.close_ticket(id).await {
                engine.notifier().ticket_closed(&closed).await;
            }
        }

        let stats = engine.stats();
        println!(
            "Round {}: connections={} written={} failed={}",
            round,
            stats.active_connections(),
            stats.deliveries_written,
            stats.deliveries_failed
        );
        round += 1;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr: SocketAddr = match std::env::args().nth(1) {
        Some(addr) => addr.parse()?,
        None => ServerConfig::default().bind_addr,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("estimation_sync=debug".parse()?)
                .add_directive("estimation_server=info".parse()?),
        )
        .init();

    let store = Arc::new(MemoryStore::new());
    store.create_room(DEMO_ROOM, true).await;
    for user in [1, 2, 3] {
        store.join_room(DEMO_ROOM, user).await?;
    }

    let oracle_config = OracleConfig::from_env();
    let engine = if oracle_config.is_configured() {
        println!("Oracle recommendations enabled ({})", oracle_config.model);
        let oracle = HttpOracle::new(oracle_config)?;
        SyncEngine::with_oracle(EngineConfig::default(), Arc::clone(&store), JsonRenderer, oracle)
    } else {
        println!("OPENROUTER_API_KEY not set, recommendations disabled");
        SyncEngine::new(EngineConfig::default(), Arc::clone(&store), JsonRenderer)
    };
    let engine = Arc::new(engine);

    let config = ServerConfig::with_addr(bind_addr);
    println!("Starting estimation server on {}", config.bind_addr);
    println!("Join: ws://{}/rooms/{}?role=estimator", config.bind_addr, DEMO_ROOM);

    let server = SyncServer::new(config, PathHandler { store }, Arc::clone(&engine));
    let simulation = tokio::spawn(simulate(Arc::clone(&engine)));

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    simulation.abort();
    engine.shutdown();
    Ok(())
}
