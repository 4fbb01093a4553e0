//! End-to-end tests: a real WebSocket client plays the game client against
//! a server bound to an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arena::{ArenaServer, CancelScope, ServerConfig};
use arena_battle::{BattleState, LifecycleHandle, MemoryStore};
use arena_protocol::{
    encode_json_frame, encode_war_machine_ticks, BattleCommand, BattleId, Faction, FactionId,
    GameMap, JsonCodec, MapId, NetMessageType, Request, WarMachine, WarMachineId, WarMachineTick,
};
use arena_queue::{QueueConfig, StaticRoster};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =========================================================================
// Helpers
// =========================================================================

struct Harness {
    addr: SocketAddr,
    lifecycle: LifecycleHandle,
    store: MemoryStore,
    map: GameMap,
    /// Stored war machines that are not queued, slots 5 to 10.
    reserves: Vec<WarMachine>,
    shutdown: CancelScope,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn quiet_config() -> ServerConfig {
    ServerConfig::default()
        .bind("127.0.0.1:0")
        .without_keepalive()
        .init_delay(Duration::from_millis(20))
}

async fn harness(config: ServerConfig) -> Harness {
    let factions: Vec<Faction> = ["Red Mountain", "Boston Cybernetics"]
        .into_iter()
        .map(|label| Faction {
            id: FactionId::random(),
            label: label.into(),
        })
        .collect();
    let map = GameMap {
        id: MapId::random(),
        name: "Archipelago".into(),
        max_spawns: 12,
    };
    let reserves: Vec<WarMachine> = (0..6)
        .map(|n| WarMachine::new(WarMachineId::random(), format!("Reserve #{n}"), 1500, 500))
        .collect();

    let store = reserves.iter().fold(
        factions
            .iter()
            .fold(MemoryStore::new().with_map(map.clone()), |s, f| {
                s.with_faction(f.clone())
            }),
        |s, wm| s.with_war_machine(wm.clone()),
    );

    let server = ArenaServer::builder()
        .config(config)
        .queue_config(QueueConfig::with_battle_size(2))
        .store(Arc::new(store.clone()))
        .roster(Arc::new(StaticRoster::new(factions)))
        .build()
        .await
        .unwrap();

    let addr = server.local_addr().unwrap();
    let lifecycle = server.lifecycle();
    let shutdown = server.shutdown_scope();
    tokio::spawn(server.run());

    Harness {
        addr,
        lifecycle,
        store,
        map,
        reserves,
        shutdown,
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap();
    ws
}

/// Next JSON text message, skipping control frames.
async fn next_json(ws: &mut Client) -> Value {
    let read = async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str::<Value>(text.as_str()).unwrap();
                }
                Some(Ok(Message::Close(_))) | None => panic!("connection closed"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("read failed: {e}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("timed out waiting for a message")
}

/// Reads until a message for `command` arrives.
async fn next_for(ws: &mut Client, command: &str) -> Value {
    loop {
        let message = next_json(ws).await;
        if message["battleCommand"] == command {
            return message;
        }
    }
}

async fn send_text(ws: &mut Client, command: BattleCommand, payload: Value) {
    let text = json!({ "battleCommand": command.as_str(), "payload": payload }).to_string();
    ws.send(Message::text(text)).await.unwrap();
}

async fn send_tagged(ws: &mut Client, command: BattleCommand, payload: Value) {
    let frame = encode_json_frame(&JsonCodec, &Request::new(command, payload)).unwrap();
    ws.send(Message::binary(frame)).await.unwrap();
}

/// Waits for `BATTLE:INIT` and returns its battle ID and war machines.
async fn await_init(ws: &mut Client) -> (BattleId, Vec<Value>) {
    let init = next_for(ws, "BATTLE:INIT").await;
    let battle_id: BattleId = serde_json::from_value(init["payload"]["battleID"].clone()).unwrap();
    let machines = init["payload"]["warMachines"].as_array().unwrap().clone();
    (battle_id, machines)
}

/// Start payload with the initialized machines plus the six reserves.
fn start_payload(h: &Harness, battle_id: BattleId, initialized: &[Value]) -> Value {
    let mut machines: Vec<Value> = initialized
        .iter()
        .map(|wm| json!({ "id": wm["id"], "participantID": wm["participantID"] }))
        .collect();
    machines.extend(
        h.reserves
            .iter()
            .zip(5u8..)
            .map(|(wm, slot)| json!({ "id": wm.id, "participantID": slot })),
    );
    json!({ "battleID": battle_id, "mapID": h.map.id, "warMachines": machines })
}

fn destroyed_payload(battle_id: BattleId, slot: u8, killer: u8) -> Value {
    json!({
        "battleID": battle_id,
        "destroyedWarMachineEvent": {
            "destroyedParticipantID": slot,
            "killedByParticipantID": killer,
            "killedBy": "Rocket Pod",
            "damageHistory": [
                { "amount": 800, "instigatorParticipantID": killer, "sourceName": "Rocket Pod" }
            ]
        }
    })
}

// =========================================================================
// Battle flow
// =========================================================================

#[tokio::test]
async fn test_start_then_destroyed_with_battle_id_check() {
    let h = harness(quiet_config()).await;
    let mut ws = connect(h.addr).await;

    let (b1, initialized) = await_init(&mut ws).await;
    assert_eq!(initialized.len(), 4);

    send_text(&mut ws, BattleCommand::START, start_payload(&h, b1, &initialized)).await;
    let reply = next_for(&mut ws, "BATTLE:START").await;
    assert_eq!(reply["success"], true, "{reply}");
    assert_eq!(reply["payload"], json!(b1));

    let stored = h.store.battle(b1).expect("battle persisted");
    assert_eq!(stored.war_machines.len(), 10);
    assert_eq!(h.lifecycle.state().await.unwrap(), BattleState::Started);

    let b2 = BattleId::random();
    send_tagged(&mut ws, BattleCommand::WAR_MACHINE_DESTROYED, destroyed_payload(b2, 3, 7)).await;
    let rejected = next_for(&mut ws, "BATTLE:WAR_MACHINE_DESTROYED").await;
    assert_eq!(rejected["success"], false);
    assert!(rejected["payload"].as_str().unwrap().contains("mismatch battleID"));

    send_tagged(&mut ws, BattleCommand::WAR_MACHINE_DESTROYED, destroyed_payload(b1, 3, 7)).await;
    let accepted = next_for(&mut ws, "BATTLE:WAR_MACHINE_DESTROYED").await;
    assert_eq!(accepted["success"], true, "{accepted}");

    let battle = h.lifecycle.snapshot().await.unwrap();
    let record = battle.destroyed.get(&3).expect("destruction recorded");
    assert_eq!(record.killed_by_war_machine, Some(h.reserves[2].id));
    assert_eq!(battle.destroyed.len(), 1);
}

#[tokio::test]
async fn test_end_records_winners_and_rejects_repeat() {
    let h = harness(quiet_config()).await;
    let mut ws = connect(h.addr).await;

    let (b1, initialized) = await_init(&mut ws).await;
    send_text(&mut ws, BattleCommand::START, start_payload(&h, b1, &initialized)).await;
    assert_eq!(next_for(&mut ws, "BATTLE:START").await["success"], true);

    let winner = h.reserves[0].id;
    send_text(
        &mut ws,
        BattleCommand::END,
        json!({
            "battleID": b1,
            "winCondition": "LAST_ALIVE",
            "winningWarMachines": [{ "id": winner, "health": 300 }]
        }),
    )
    .await;
    let reply = next_for(&mut ws, "BATTLE:END").await;
    assert_eq!(reply["success"], true, "{reply}");

    assert_eq!(h.lifecycle.state().await.unwrap(), BattleState::Ended);
    assert_eq!(h.store.battle(b1).unwrap().winners, vec![winner]);

    // Ending twice is a domain error, not a crash.
    send_text(&mut ws, BattleCommand::END, json!({ "battleID": b1 })).await;
    assert_eq!(next_for(&mut ws, "BATTLE:END").await["success"], false);
}

#[tokio::test]
async fn test_ready_initializes_a_fresh_battle() {
    let h = harness(quiet_config()).await;
    let mut ws = connect(h.addr).await;
    let (first, _) = await_init(&mut ws).await;

    send_text(&mut ws, BattleCommand::READY, Value::Null).await;
    let (second, _) = await_init(&mut ws).await;
    let reply = next_for(&mut ws, "BATTLE:READY").await;

    assert_ne!(first, second);
    assert_eq!(reply["success"], true);
    assert_eq!(reply["payload"], json!(second));
}

#[tokio::test]
async fn test_ticks_update_the_live_battle() {
    let h = harness(quiet_config()).await;
    let mut ws = connect(h.addr).await;
    let (b1, initialized) = await_init(&mut ws).await;
    send_text(&mut ws, BattleCommand::START, start_payload(&h, b1, &initialized)).await;
    assert_eq!(next_for(&mut ws, "BATTLE:START").await["success"], true);

    let tick = WarMachineTick {
        participant_id: 6,
        position: Some((-1200, 3400)),
        rotation: Some(90),
        health: Some(1100),
        shield: None,
    };
    let mut frame = vec![NetMessageType::WarMachineTick.tag()];
    frame.extend(encode_war_machine_ticks(&[tick]));
    ws.send(Message::binary(frame)).await.unwrap();

    // Frames are handled in order, so once this reply arrives the ticks
    // have reached the lifecycle.
    send_text(&mut ws, BattleCommand::new("BATTLE:PING"), Value::Null).await;
    next_for(&mut ws, "BATTLE:PING").await;

    let battle = h.lifecycle.snapshot().await.unwrap();
    let wm = battle.participant(6).unwrap();
    let position = wm.position.unwrap();
    assert_eq!((position.x, position.y), (-1200, 3400));
    assert_eq!(wm.rotation, Some(90));
    assert_eq!(wm.health, 1100);
}

// =========================================================================
// Protocol errors
// =========================================================================

#[tokio::test]
async fn test_unknown_command_gets_failure_reply() {
    let h = harness(quiet_config()).await;
    let mut ws = connect(h.addr).await;
    await_init(&mut ws).await;

    send_text(&mut ws, BattleCommand::new("BATTLE:DANCE"), Value::Null).await;
    let reply = next_for(&mut ws, "BATTLE:DANCE").await;
    assert_eq!(reply["success"], false);
    assert_eq!(reply["payload"], "unknown battle command BATTLE:DANCE");
}

#[tokio::test]
async fn test_malformed_frames_keep_the_connection_open() {
    let h = harness(quiet_config()).await;
    let mut ws = connect(h.addr).await;
    let (b1, _) = await_init(&mut ws).await;

    ws.send(Message::text("{not json")).await.unwrap();
    ws.send(Message::binary(vec![0u8, b'{'])).await.unwrap();
    ws.send(Message::binary(vec![200u8, 1, 2, 3])).await.unwrap();
    ws.send(Message::binary(Vec::new())).await.unwrap();
    ws.send(Message::binary(vec![NetMessageType::WarMachineTick.tag(), 3, 1]))
        .await
        .unwrap();

    // A well-formed envelope without a command is answered, not dropped.
    ws.send(Message::text(r#"{"payload":{}}"#)).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["battleCommand"], "");
    assert_eq!(reply["success"], false);

    // Bad payload for a known command is a failure reply.
    send_text(&mut ws, BattleCommand::START, json!({ "battleID": 12 })).await;
    let reply = next_for(&mut ws, "BATTLE:START").await;
    assert_eq!(reply["success"], false);
    assert!(reply["payload"].as_str().unwrap().starts_with("invalid payload"));

    // Still connected and still in the same battle.
    send_text(&mut ws, BattleCommand::START, json!({ "battleID": b1 })).await;
    let reply = next_for(&mut ws, "BATTLE:START").await;
    assert_eq!(reply["payload"], "missing map id");
}

// =========================================================================
// Connection management
// =========================================================================

#[tokio::test]
async fn test_second_client_is_refused() {
    let h = harness(quiet_config()).await;
    let mut first = connect(h.addr).await;
    await_init(&mut first).await;

    let mut second = connect(h.addr).await;
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match second.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "second client was not closed");

    // The first client is unaffected.
    send_text(&mut first, BattleCommand::READY, Value::Null).await;
    assert_eq!(next_for(&mut first, "BATTLE:READY").await["success"], true);
}

#[tokio::test]
async fn test_silent_tcp_peer_does_not_block_the_game_client() {
    let h = harness(quiet_config()).await;
    let _silent = TcpStream::connect(h.addr).await.unwrap();

    let mut client = tokio::time::timeout(Duration::from_secs(3), connect(h.addr))
        .await
        .expect("game client should connect past a silent peer");
    await_init(&mut client).await;
}

#[tokio::test]
async fn test_client_can_reconnect_after_disconnect() {
    let h = harness(quiet_config()).await;
    let mut first = connect(h.addr).await;
    await_init(&mut first).await;
    first.close(None).await.unwrap();
    drop(first);

    let mut second = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut ws = connect(h.addr).await;
        send_text(&mut ws, BattleCommand::READY, Value::Null).await;
        let answered = tokio::time::timeout(Duration::from_millis(500), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) if text.as_str().contains("\"success\"") => {
                        return true;
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return false,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        if matches!(answered, Ok(true)) {
            second = Some(ws);
            break;
        }
    }
    assert!(second.is_some(), "reconnecting client was never served");
}

#[tokio::test]
async fn test_silent_client_is_dropped_by_keepalive() {
    let config = quiet_config().keepalive(Duration::from_millis(50), Duration::from_millis(150));
    let h = harness(config).await;

    // Never reads, so never answers a ping.
    let silent = connect(h.addr).await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    let mut next = connect(h.addr).await;
    let (battle_id, _) = await_init(&mut next).await;
    assert!(!battle_id.is_nil());
    drop(silent);
}
