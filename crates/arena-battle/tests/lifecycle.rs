//! Integration tests for the battle lifecycle actor.
//!
//! Each fixture wires the actor to a [`MemoryStore`], real faction queues
//! backed by a [`StaticRoster`], an [`EventBus`], and a sink that records
//! what would have been sent to the game client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arena_battle::{
    spawn_lifecycle, AbilityRequest, AiSpawnedRequest, BattleError, BattleState, ClientSink,
    DamageEntry, DestroyedEvent, DestroyedRequest, EndRequest, FailPoint, LifecycleConfig,
    LifecycleHandle, MemoryStore, SpawnedAiEvent, StartRequest, StartWarMachine, StateEvent,
    StoreError, WinningWarMachine,
};
use arena_events::{EventBus, EventData, EventKind};
use arena_protocol::{
    AbilityEvent, Battle, BattleCommand, BattleId, Faction, FactionId, GameMap, GameMessage,
    MapId, PlayerId, Vector3, WarMachine, WarMachineId, WarMachineTick, WinCondition,
};
use arena_queue::{QueueConfig, QueueManager, StaticRoster};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<GameMessage>>,
    offline: AtomicBool,
}

impl RecordingSink {
    fn sent(&self) -> Vec<GameMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientSink for RecordingSink {
    async fn send(&self, message: GameMessage) -> Result<(), BattleError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BattleError::Client("offline".into()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

struct Fixture {
    store: MemoryStore,
    bus: Arc<EventBus>,
    sink: Arc<RecordingSink>,
    lifecycle: LifecycleHandle,
    queues: QueueManager,
    map: GameMap,
    factions: Vec<Faction>,
}

fn fixture_with(config: LifecycleConfig) -> Fixture {
    let factions: Vec<Faction> = ["Red Mountain", "Boston Cybernetics", "Zaibatsu"]
        .into_iter()
        .map(|label| Faction {
            id: FactionId::random(),
            label: label.into(),
        })
        .collect();
    let map = GameMap {
        id: MapId::random(),
        name: "Desert".into(),
        max_spawns: 9,
    };

    let store = factions
        .iter()
        .fold(MemoryStore::new().with_map(map.clone()), |store, f| {
            store.with_faction(f.clone())
        });
    let roster = Arc::new(StaticRoster::new(factions.clone()));
    let bus = Arc::new(EventBus::new());
    let queues =
        QueueManager::start(&factions, QueueConfig::default(), roster, bus.clone()).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let lifecycle = spawn_lifecycle(
        config,
        Arc::new(store.clone()),
        queues.clone(),
        bus.clone(),
        sink.clone(),
    );

    Fixture {
        store,
        bus,
        sink,
        lifecycle,
        queues,
        map,
        factions,
    }
}

fn fixture() -> Fixture {
    fixture_with(LifecycleConfig::default())
}

fn capture(bus: &EventBus, kind: EventKind) -> mpsc::UnboundedReceiver<EventData> {
    let (tx, rx) = mpsc::unbounded_channel();
    bus.subscribe(kind, move |data: &EventData| {
        let _ = tx.send(data.clone());
    });
    rx
}

fn start_request(battle: &Battle, map: &GameMap) -> StartRequest {
    StartRequest {
        battle_id: battle.id,
        map_id: map.id,
        war_machines: battle
            .war_machines
            .iter()
            .map(|wm| StartWarMachine {
                id: wm.id,
                participant_id: wm.participant_id,
                faction_id: None,
                position: None,
                rotation: None,
            })
            .collect(),
    }
}

/// Initializes and starts a battle, returning the started snapshot.
async fn started(fx: &Fixture) -> Battle {
    fx.lifecycle.initialize().await.unwrap();
    let battle = fx.lifecycle.snapshot().await.unwrap();
    fx.lifecycle
        .start(start_request(&battle, &fx.map))
        .await
        .unwrap();
    fx.lifecycle.snapshot().await.unwrap()
}

fn destroyed(battle_id: BattleId, slot: u8, killer: Option<u8>) -> DestroyedRequest {
    DestroyedRequest {
        battle_id,
        destroyed_war_machine_event: Some(DestroyedEvent {
            destroyed_participant_id: slot,
            killed_by_participant_id: killer,
            killed_by: "Rocket".into(),
            damage_history: vec![DamageEntry {
                amount: 1000,
                instigator_participant_id: killer,
                source_name: "Rocket".into(),
            }],
        }),
    }
}

fn ability(battle_id: BattleId, faction_id: FactionId, label: &str) -> AbilityRequest {
    AbilityRequest {
        battle_id,
        ability_event: Some(AbilityEvent {
            game_client_ability_id: 1,
            label: label.into(),
            faction_id: Some(faction_id),
            triggered_by: None,
            position: None,
            triggered_at: Utc::now(),
        }),
    }
}

// =========================================================================
// Initialize
// =========================================================================

#[tokio::test]
async fn test_initialize_sends_init_to_client() {
    let fx = fixture();
    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Uninitialized);

    let battle_id = fx.lifecycle.initialize().await.unwrap();

    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Initialized);
    let sent = fx.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].battle_command, BattleCommand::INIT);
    assert_eq!(sent[0].payload["battleID"], battle_id.to_string());
    assert_eq!(sent[0].payload["mapName"], "Desert");
    // Two per faction by default.
    assert_eq!(sent[0].payload["warMachines"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_initialize_assigns_distinct_slots_and_factions() {
    let fx = fixture();
    fx.lifecycle.initialize().await.unwrap();
    let battle = fx.lifecycle.snapshot().await.unwrap();

    let mut slots: Vec<u8> = battle.war_machines.iter().map(|wm| wm.participant_id).collect();
    slots.sort_unstable();
    assert_eq!(slots, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(battle.factions.len(), fx.factions.len());
    for faction in &fx.factions {
        let count = battle
            .war_machines
            .iter()
            .filter(|wm| wm.faction_id == Some(faction.id))
            .count();
        assert_eq!(count, 2, "faction {}", faction.label);
    }
}

#[tokio::test]
async fn test_initialize_publishes_battle_init() {
    let fx = fixture();
    let mut events = capture(&fx.bus, EventKind::BattleInit);

    let battle_id = fx.lifecycle.initialize().await.unwrap();

    match events.recv().await.unwrap() {
        EventData::Battle(battle) => assert_eq!(battle.id, battle_id),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_initialize_aborts_when_client_unreachable() {
    let fx = fixture();
    fx.sink.offline.store(true, Ordering::SeqCst);

    let err = fx.lifecycle.initialize().await.unwrap_err();

    assert!(matches!(err, BattleError::Client(_)));
    assert!(!err.is_domain());
    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Uninitialized);
    assert!(fx.lifecycle.snapshot().await.unwrap().id.is_nil());
}

#[tokio::test]
async fn test_unreachable_client_returns_admitted_machines_to_queue() {
    let fx = fixture();
    let faction = fx.factions[0].id;
    let mut queued = Vec::new();
    for name in ["Olympus Mons", "Hermes", "Tenshi"] {
        let mut wm = WarMachine::new(WarMachineId::random(), name, 1000, 1000);
        wm.faction_id = Some(faction);
        wm.owned_by = Some(PlayerId::random());
        fx.queues.join(wm.clone()).await.unwrap();
        queued.push(wm.id);
    }
    let before = fx.queues.lengths().await;
    fx.sink.offline.store(true, Ordering::SeqCst);

    fx.lifecycle.initialize().await.unwrap_err();

    assert_eq!(fx.queues.lengths().await, before);
    let order: Vec<WarMachineId> = fx
        .queues
        .handle(faction)
        .unwrap()
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.war_machine.id)
        .collect();
    assert_eq!(order, queued);

    // The next cycle admits the same head of the queue.
    fx.sink.offline.store(false, Ordering::SeqCst);
    fx.lifecycle.initialize().await.unwrap();
    let battle = fx.lifecycle.snapshot().await.unwrap();
    for id in &queued[..2] {
        assert!(battle.war_machines.iter().any(|wm| wm.id == *id));
    }
    assert_eq!(fx.queues.handle(faction).unwrap().len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_initialize_without_a_map_leaves_queues_alone() {
    let fx = fixture();
    let mut wm = WarMachine::new(WarMachineId::random(), "Olympus Mons", 1000, 1000);
    wm.faction_id = Some(fx.factions[1].id);
    fx.queues.join(wm).await.unwrap();
    fx.store.fail_at(FailPoint::RandomMap);

    fx.lifecycle.initialize().await.unwrap_err();

    assert_eq!(fx.queues.lengths().await[&fx.factions[1].id], 1);
}

#[tokio::test]
async fn test_initialize_aborts_without_a_map() {
    let fx = fixture();
    fx.store.fail_at(FailPoint::RandomMap);

    let err = fx.lifecycle.initialize().await.unwrap_err();

    assert!(matches!(err, BattleError::Store(StoreError::Backend(_))));
    assert!(fx.sink.sent().is_empty());
    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Uninitialized);
}

#[tokio::test]
async fn test_initialize_replaces_previous_battle() {
    let fx = fixture();
    let first = fx.lifecycle.initialize().await.unwrap();
    let second = fx.lifecycle.initialize().await.unwrap();

    assert_ne!(first, second);
    assert_eq!(fx.lifecycle.snapshot().await.unwrap().id, second);
    assert_eq!(fx.sink.sent().len(), 2);
}

// =========================================================================
// Start
// =========================================================================

#[tokio::test]
async fn test_start_before_initialize_is_rejected() {
    let fx = fixture();
    let request = StartRequest {
        battle_id: BattleId::random(),
        map_id: fx.map.id,
        war_machines: vec![StartWarMachine {
            id: WarMachineId::random(),
            participant_id: 1,
            faction_id: None,
            position: None,
            rotation: None,
        }],
    };

    let err = fx.lifecycle.start(request).await.unwrap_err();

    assert!(matches!(
        err,
        BattleError::InvalidTransition {
            from: BattleState::Uninitialized,
            to: BattleState::Started
        }
    ));
}

#[tokio::test]
async fn test_start_validates_request() {
    let fx = fixture();
    fx.lifecycle.initialize().await.unwrap();
    let battle = fx.lifecycle.snapshot().await.unwrap();
    let valid = start_request(&battle, &fx.map);

    let missing_id = StartRequest {
        battle_id: BattleId::nil(),
        ..valid.clone()
    };
    assert!(matches!(
        fx.lifecycle.start(missing_id).await,
        Err(BattleError::MissingBattleId)
    ));

    let missing_map = StartRequest {
        map_id: MapId::nil(),
        ..valid.clone()
    };
    assert!(matches!(
        fx.lifecycle.start(missing_map).await,
        Err(BattleError::MissingMapId)
    ));

    let empty = StartRequest {
        war_machines: vec![],
        ..valid.clone()
    };
    assert!(matches!(
        fx.lifecycle.start(empty).await,
        Err(BattleError::NoWarMachines)
    ));

    let wrong_id = StartRequest {
        battle_id: BattleId::random(),
        ..valid
    };
    match fx.lifecycle.start(wrong_id).await {
        Err(BattleError::BattleIdMismatch { expected, .. }) => assert_eq!(expected, battle.id),
        other => panic!("unexpected result: {other:?}"),
    }

    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Initialized);
    assert_eq!(fx.lifecycle.snapshot().await.unwrap(), battle);
    assert_eq!(fx.store.commits(), 0);
}

#[tokio::test]
async fn test_start_persists_and_publishes() {
    let fx = fixture();
    let mut events = capture(&fx.bus, EventKind::BattleStarted);

    let battle = started(&fx).await;

    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Started);
    assert!(battle.started_at.is_some());

    let stored = fx.store.battle(battle.id).unwrap();
    assert_eq!(stored.war_machines.len(), 6);
    assert_eq!(fx.store.state_events(), vec![(battle.id, StateEvent::BattleStart)]);
    assert_eq!(fx.store.commits(), 1);

    match events.recv().await.unwrap() {
        EventData::Battle(published) => assert_eq!(published.id, battle.id),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let fx = fixture();
    let battle = started(&fx).await;

    let err = fx
        .lifecycle
        .start(start_request(&battle, &fx.map))
        .await
        .unwrap_err();

    assert!(err.is_domain());
    assert!(matches!(
        err,
        BattleError::InvalidTransition {
            from: BattleState::Started,
            to: BattleState::Started
        }
    ));
    assert_eq!(fx.store.commits(), 1);
}

#[tokio::test]
async fn test_start_failure_leaves_battle_unchanged() {
    let fx = fixture();
    fx.lifecycle.initialize().await.unwrap();
    let before = fx.lifecycle.snapshot().await.unwrap();
    fx.store.fail_at(FailPoint::AssignWarMachines);

    let err = fx
        .lifecycle
        .start(start_request(&before, &fx.map))
        .await
        .unwrap_err();

    assert!(matches!(err, BattleError::Store(_)));
    assert!(!err.is_domain());
    assert_eq!(fx.lifecycle.snapshot().await.unwrap(), before);
    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Initialized);
    assert!(fx.store.battle(before.id).is_none());
    assert!(fx.store.state_events().is_empty());
    assert_eq!(fx.store.rollbacks(), 1);

    // The same request goes through once storage recovers.
    fx.store.clear_failures();
    fx.lifecycle
        .start(start_request(&before, &fx.map))
        .await
        .unwrap();
    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Started);
}

#[tokio::test]
async fn test_start_failure_at_commit_leaves_battle_unchanged() {
    let fx = fixture();
    fx.lifecycle.initialize().await.unwrap();
    let before = fx.lifecycle.snapshot().await.unwrap();
    fx.store.fail_at(FailPoint::Commit);

    assert!(fx.lifecycle.start(start_request(&before, &fx.map)).await.is_err());

    assert_eq!(fx.lifecycle.snapshot().await.unwrap(), before);
    assert!(fx.store.battle(before.id).is_none());
}

#[tokio::test]
async fn test_start_places_war_machines_provisionally() {
    let fx = fixture();
    let battle = started(&fx).await;

    for (index, wm) in battle.war_machines.iter().enumerate() {
        assert_eq!(wm.position, Some(Vector3::new(index as i32 * 1000, 0, 0)));
        assert_eq!(wm.rotation, Some(0));
        assert!(wm.faction_id.is_some());
    }
}

#[tokio::test]
async fn test_start_assigns_missing_factions_round_robin() {
    let fx = fixture();
    let strangers: Vec<WarMachine> = (0..4)
        .map(|i| WarMachine::new(WarMachineId::random(), format!("stranger-{i}"), 800, 200))
        .collect();
    let store = strangers
        .iter()
        .fold(fx.store.clone(), |store, wm| store.with_war_machine(wm.clone()));

    fx.lifecycle.initialize().await.unwrap();
    let battle = fx.lifecycle.snapshot().await.unwrap();
    let request = StartRequest {
        battle_id: battle.id,
        map_id: fx.map.id,
        war_machines: strangers
            .iter()
            .zip(20u8..)
            .map(|(wm, slot)| StartWarMachine {
                id: wm.id,
                participant_id: slot,
                faction_id: None,
                position: Some(Vector3::new(1, 2, 3)),
                rotation: Some(45),
            })
            .collect(),
    };
    fx.lifecycle.start(request).await.unwrap();

    let mut sorted: Vec<FactionId> = fx.factions.iter().map(|f| f.id).collect();
    sorted.sort();
    let started = fx.lifecycle.snapshot().await.unwrap();
    let assigned: Vec<Option<FactionId>> =
        started.war_machines.iter().map(|wm| wm.faction_id).collect();
    assert_eq!(
        assigned,
        vec![Some(sorted[0]), Some(sorted[1]), Some(sorted[2]), Some(sorted[0])]
    );
    // Client-supplied placement wins over the provisional one.
    assert!(started
        .war_machines
        .iter()
        .all(|wm| wm.position == Some(Vector3::new(1, 2, 3)) && wm.rotation == Some(45)));
    assert_eq!(store.battle(battle.id).unwrap().war_machines.len(), 4);
}

#[tokio::test]
async fn test_start_with_unknown_war_machine_fails() {
    let fx = fixture();
    fx.lifecycle.initialize().await.unwrap();
    let battle = fx.lifecycle.snapshot().await.unwrap();
    let mut request = start_request(&battle, &fx.map);
    request.war_machines[0].id = WarMachineId::random();

    let err = fx.lifecycle.start(request).await.unwrap_err();

    assert!(matches!(err, BattleError::Store(StoreError::NotFound { .. })));
    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Initialized);
}

#[tokio::test]
async fn test_start_rejects_duplicate_slots() {
    let fx = fixture();
    fx.lifecycle.initialize().await.unwrap();
    let battle = fx.lifecycle.snapshot().await.unwrap();
    let mut request = start_request(&battle, &fx.map);
    request.war_machines[1].participant_id = request.war_machines[0].participant_id;

    let err = fx.lifecycle.start(request).await.unwrap_err();

    assert!(matches!(err, BattleError::ParticipantTaken(_)));
}

// =========================================================================
// In-battle events
// =========================================================================

#[tokio::test]
async fn test_destroyed_with_wrong_battle_is_rejected() {
    let fx = fixture();
    let battle = started(&fx).await;
    let other = BattleId::random();

    let err = fx
        .lifecycle
        .war_machine_destroyed(destroyed(other, 1, Some(2)))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("mismatch battleID"));
    assert!(message.contains(&battle.id.to_string()));
    assert!(message.contains(&other.to_string()));
    assert!(fx.lifecycle.snapshot().await.unwrap().destroyed.is_empty());
    assert!(fx.store.destroyed_events().is_empty());
}

#[tokio::test]
async fn test_destroyed_is_recorded_once_per_slot() {
    let fx = fixture();
    let mut events = capture(&fx.bus, EventKind::WarMachineDestroyed);
    let battle = started(&fx).await;
    let victim = battle.participant(1).unwrap().id;
    let killer = battle.participant(2).unwrap().id;

    let id = fx
        .lifecycle
        .war_machine_destroyed(destroyed(battle.id, 1, Some(2)))
        .await
        .unwrap();
    assert_eq!(id, battle.id);

    let after = fx.lifecycle.snapshot().await.unwrap();
    let record = &after.destroyed[&1];
    assert_eq!(record.destroyed_war_machine, victim);
    assert_eq!(record.killed_by_war_machine, Some(killer));
    assert_eq!(record.damage_records[0].caused_by_war_machine, Some(killer));
    assert!(after.participant(1).unwrap().is_destroyed());
    assert_eq!(fx.store.destroyed_events().len(), 1);

    match events.recv().await.unwrap() {
        EventData::Destroyed { participant_id, .. } => assert_eq!(participant_id, 1),
        other => panic!("unexpected event: {other:?}"),
    }

    let err = fx
        .lifecycle
        .war_machine_destroyed(destroyed(battle.id, 1, Some(3)))
        .await
        .unwrap_err();
    assert!(matches!(err, BattleError::AlreadyDestroyed(1)));
    assert_eq!(fx.lifecycle.snapshot().await.unwrap().destroyed.len(), 1);
}

#[tokio::test]
async fn test_destroyed_validation() {
    let fx = fixture();
    let battle = started(&fx).await;

    assert!(matches!(
        fx.lifecycle
            .war_machine_destroyed(destroyed(battle.id, 99, None))
            .await,
        Err(BattleError::UnknownParticipant(99))
    ));
    assert!(matches!(
        fx.lifecycle
            .war_machine_destroyed(DestroyedRequest {
                battle_id: battle.id,
                destroyed_war_machine_event: None,
            })
            .await,
        Err(BattleError::MissingEvent(_))
    ));
    assert!(matches!(
        fx.lifecycle
            .war_machine_destroyed(destroyed(BattleId::nil(), 1, None))
            .await,
        Err(BattleError::MissingBattleId)
    ));
}

#[tokio::test]
async fn test_destroyed_before_any_battle_never_matches() {
    let fx = fixture();

    let err = fx
        .lifecycle
        .war_machine_destroyed(destroyed(BattleId::random(), 1, None))
        .await
        .unwrap_err();

    assert!(matches!(err, BattleError::BattleIdMismatch { .. }));
}

#[tokio::test]
async fn test_destroyed_persistence_failure_leaves_records_unchanged() {
    let fx = fixture();
    let battle = started(&fx).await;
    fx.store.fail_at(FailPoint::DestroyedEvent);

    assert!(fx
        .lifecycle
        .war_machine_destroyed(destroyed(battle.id, 1, None))
        .await
        .is_err());

    let after = fx.lifecycle.snapshot().await.unwrap();
    assert!(after.destroyed.is_empty());
    assert!(!after.participant(1).unwrap().is_destroyed());
}

#[tokio::test]
async fn test_ai_spawned_takes_a_free_slot() {
    let fx = fixture();
    let battle = started(&fx).await;
    let spawn = |slot: u8| AiSpawnedRequest {
        battle_id: battle.id,
        spawned_ai_event: Some(SpawnedAiEvent {
            participant_id: slot,
            name: "Reinforcement".into(),
            model: "XFVS".into(),
            skin: "BlueWhite".into(),
            faction_id: None,
            max_health: 1500,
            max_shield: 0,
            position: Some(Vector3::new(10, 20, 0)),
            rotation: Some(90),
        }),
    };

    assert!(matches!(
        fx.lifecycle.ai_spawned(spawn(1)).await,
        Err(BattleError::ParticipantTaken(1))
    ));
    fx.lifecycle.ai_spawned(spawn(50)).await.unwrap();

    let after = fx.lifecycle.snapshot().await.unwrap();
    assert_eq!(after.spawned_ai.len(), 1);
    let ai = after.participant(50).unwrap();
    assert!(ai.is_ai);
    assert_eq!(ai.health, 1500);
    assert_eq!(fx.store.spawned_ai().len(), 1);

    // Spawned units can be destroyed like any other participant.
    fx.lifecycle
        .war_machine_destroyed(destroyed(battle.id, 50, Some(1)))
        .await
        .unwrap();
    assert!(fx
        .lifecycle
        .snapshot()
        .await
        .unwrap()
        .participant(50)
        .unwrap()
        .is_destroyed());
}

#[tokio::test]
async fn test_ability_publishes_faction_actions() {
    let fx = fixture();
    let mut events = capture(&fx.bus, EventKind::AbilityTriggered);
    let battle = started(&fx).await;
    let red = fx.factions[0].id;
    let blue = fx.factions[1].id;

    fx.lifecycle.ability(ability(battle.id, red, "Airstrike")).await.unwrap();
    fx.lifecycle.ability(ability(battle.id, blue, "Repair")).await.unwrap();
    fx.lifecycle.ability(ability(battle.id, red, "Nuke")).await.unwrap();

    assert_eq!(fx.lifecycle.snapshot().await.unwrap().abilities.len(), 3);
    assert_eq!(fx.store.ability_events().len(), 3);

    let mut longest_red = 0;
    for _ in 0..3 {
        if let EventData::FactionActions {
            faction_id,
            actions,
            ..
        } = events.recv().await.unwrap()
        {
            assert!(actions.iter().all(|a| a.faction_id == faction_id));
            if faction_id == Some(red) {
                longest_red = longest_red.max(actions.len());
            }
        }
    }
    assert_eq!(longest_red, 2);
}

#[tokio::test]
async fn test_ticks_update_live_battle() {
    let fx = fixture();
    let battle = started(&fx).await;
    let z = battle.participant(1).unwrap().position.unwrap().z;

    fx.lifecycle
        .apply_ticks(vec![WarMachineTick {
            participant_id: 1,
            position: Some((5, 6)),
            rotation: Some(90),
            health: Some(300),
            shield: None,
        }])
        .await
        .unwrap();

    let after = fx.lifecycle.snapshot().await.unwrap();
    let wm = after.participant(1).unwrap();
    assert_eq!(wm.position, Some(Vector3::new(5, 6, z)));
    assert_eq!(wm.rotation, Some(90));
    assert_eq!(wm.health, 300);
    assert_eq!(wm.shield, battle.participant(1).unwrap().shield);
}

// =========================================================================
// End
// =========================================================================

#[tokio::test]
async fn test_end_before_start_is_rejected() {
    let fx = fixture();
    let battle_id = fx.lifecycle.initialize().await.unwrap();

    let err = fx
        .lifecycle
        .end(EndRequest {
            battle_id,
            ..EndRequest::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BattleError::InvalidTransition {
            from: BattleState::Initialized,
            to: BattleState::Ended
        }
    ));
}

#[tokio::test]
async fn test_end_persists_winners_and_rewards() {
    let fx = fixture();
    let mut events = capture(&fx.bus, EventKind::BattleEnded);
    let battle = started(&fx).await;
    let winner = battle.participant(1).unwrap().clone();

    fx.lifecycle
        .end(EndRequest {
            battle_id: battle.id,
            win_condition: Some(WinCondition::LastAlive),
            winning_war_machines: vec![WinningWarMachine {
                id: winner.id,
                health: 42,
            }],
        })
        .await
        .unwrap();

    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Ended);
    let after = fx.lifecycle.snapshot().await.unwrap();
    assert!(after.ended_at.is_some());
    assert_eq!(after.winning_war_machines, vec![winner.id]);
    assert_eq!(after.participant(1).unwrap().health, 42);

    let stored = fx.store.battle(battle.id).unwrap();
    assert_eq!(stored.win_condition, Some(WinCondition::LastAlive));
    assert_eq!(stored.winners, vec![winner.id]);
    assert!(stored.ended_at.is_some());
    assert_eq!(
        fx.store.state_events(),
        vec![
            (battle.id, StateEvent::BattleStart),
            (battle.id, StateEvent::BattleEnd)
        ]
    );

    match events.recv().await.unwrap() {
        EventData::BattleEnded { battle: ended, rewards } => {
            assert_eq!(ended.id, battle.id);
            assert_eq!(rewards.battle_id, battle.id);
            assert_eq!(rewards.winner_faction_id, winner.faction_id);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_end_failure_keeps_battle_running() {
    let fx = fixture();
    let battle = started(&fx).await;
    fx.store.fail_at(FailPoint::StateEvent);

    let err = fx
        .lifecycle
        .end(EndRequest {
            battle_id: battle.id,
            ..EndRequest::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BattleError::Store(_)));
    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Started);
    assert_eq!(fx.lifecycle.snapshot().await.unwrap(), battle);
    assert!(fx.store.battle(battle.id).unwrap().ended_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_end_reinitializes_after_grace_delay() {
    let fx = fixture_with(LifecycleConfig {
        grace_delay: Duration::from_secs(10),
        ..LifecycleConfig::default()
    });
    let battle = started(&fx).await;
    fx.lifecycle
        .end(EndRequest {
            battle_id: battle.id,
            ..EndRequest::default()
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Ended);
    assert_eq!(fx.sink.sent().len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(fx.lifecycle.state().await.unwrap(), BattleState::Initialized);
    let next = fx.lifecycle.snapshot().await.unwrap();
    assert_ne!(next.id, battle.id);
    assert!(next.destroyed.is_empty());
    assert_eq!(fx.sink.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_grace_timer_skips_when_client_already_reinitialized() {
    let fx = fixture();
    let battle = started(&fx).await;
    fx.lifecycle
        .end(EndRequest {
            battle_id: battle.id,
            ..EndRequest::default()
        })
        .await
        .unwrap();

    let fresh = fx.lifecycle.initialize().await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(fx.lifecycle.snapshot().await.unwrap().id, fresh);
    assert_eq!(fx.sink.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_grace_timer_does_not_outlive_shutdown() {
    let fx = fixture();
    let battle = started(&fx).await;
    fx.lifecycle
        .end(EndRequest {
            battle_id: battle.id,
            ..EndRequest::default()
        })
        .await
        .unwrap();

    fx.lifecycle.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert!(matches!(
        fx.lifecycle.state().await,
        Err(BattleError::Unavailable)
    ));
    assert_eq!(fx.sink.sent().len(), 1);
}
