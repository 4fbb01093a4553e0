//! Development server: the full orchestrator backed by in-memory
//! collaborators, for pointing a local game client at.
//!
//! `ARENA_BIND` overrides the listen address, `RUST_LOG` the log filter.

use std::sync::Arc;

use arena::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Seed data
// ---------------------------------------------------------------------------

const FACTIONS: [&str; 3] = [
    "Red Mountain Offworld Mining Corporation",
    "Boston Cybernetics",
    "Zaibatsu Heavy Industries",
];
const MAPS: [(&str, u32); 2] = [("Archipelago", 9), ("Desert City", 9)];

fn factions() -> Vec<Faction> {
    FACTIONS
        .into_iter()
        .map(|label| Faction {
            id: FactionId::random(),
            label: label.to_string(),
        })
        .collect()
}

/// A store holding the maps, the factions and a few player machines per
/// faction.
fn seed_store(factions: &[Faction]) -> MemoryStore {
    let store = MAPS.into_iter().fold(MemoryStore::new(), |store, (name, max_spawns)| {
        store.with_map(GameMap {
            id: MapId::random(),
            name: name.to_string(),
            max_spawns,
        })
    });

    factions.iter().fold(store, |store, faction| {
        (1..=3).fold(store.with_faction(faction.clone()), |store, n| {
            let mut wm = WarMachine::new(
                WarMachineId::random(),
                format!("{} Player #{n}", faction.label),
                1500,
                1000,
            );
            wm.faction_id = Some(faction.id);
            store.with_war_machine(wm)
        })
    })
}

fn log_events(bus: &EventBus) {
    bus.subscribe(EventKind::BattleStarted, |data| {
        if let EventData::Battle(battle) = data {
            let map = battle.map.as_ref().map_or("unknown", |m| m.name.as_str());
            tracing::info!(battle_id = %battle.id, map, "battle started");
        }
    });
    bus.subscribe(EventKind::BattleEnded, |data| {
        if let EventData::BattleEnded { battle, rewards } = data {
            tracing::info!(
                battle_id = %battle.id,
                winning_faction = ?rewards.winner_faction_id,
                "battle ended"
            );
        }
    });
    bus.subscribe(EventKind::WarMachineDestroyed, |data| {
        if let EventData::Destroyed { participant_id, record, .. } = data {
            tracing::info!(participant_id, killed_by = %record.killed_by, "war machine destroyed");
        }
    });
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind = std::env::var("ARENA_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let factions = factions();
    let bus = Arc::new(EventBus::new());
    log_events(&bus);

    let server = ArenaServer::builder()
        .config(ServerConfig::default().bind(bind))
        .store(Arc::new(seed_store(&factions)))
        .roster(Arc::new(StaticRoster::new(factions)))
        .events(bus)
        .build()
        .await?;

    let shutdown = server.shutdown_scope();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    server.run().await?;
    Ok(())
}
