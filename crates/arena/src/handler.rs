//! Per-connection handler: receive loop, send pump and keepalive.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Claim the single game client slot, or refuse the connection
//!   2. Start the send pump, which owns the write half and the keepalive ping
//!   3. Schedule the first battle initialization
//!   4. Loop: receive frames, dispatch commands, apply telemetry
//!
//! Everything the connection starts runs under one child scope of the
//! server's root scope, so tearing down the connection cancels all of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arena_protocol::{decode_binary, decode_text, BattleCommand, CommandReply, Frame, ProtocolError};
use arena_transport::{
    Incoming, TransportError, WebSocketConnection, WebSocketReader, WebSocketWriter,
};
use tokio::time::{Instant, MissedTickBehavior};

use crate::server::ServerState;
use crate::{ArenaError, CancelScope, CommandContext, Outbound, OutboundBody};

/// Tracks whether a game client is connected. Only one may be.
#[derive(Debug, Default)]
pub(crate) struct ConnectionSlot {
    taken: AtomicBool,
}

impl ConnectionSlot {
    /// Returns `true` if the slot was free and is now taken.
    fn try_claim(&self) -> bool {
        self.taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.taken.store(false, Ordering::Release);
    }
}

/// Drop guard that frees the client slot when the handler exits.
///
/// This ensures cleanup happens even if the handler panics.
struct SlotGuard {
    state: Arc<ServerState>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.state.slot.release();
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), ArenaError> {
    let conn_id = conn.id();
    let peer = conn.peer_addr();
    let (mut reader, mut writer) = conn.split();

    if !state.slot.try_claim() {
        tracing::warn!(%conn_id, %peer, "game client already connected, refusing connection");
        let _ = writer.close().await;
        return Ok(());
    }
    let _guard = SlotGuard {
        state: Arc::clone(&state),
    };
    tracing::info!(%conn_id, %peer, "game client connected");

    let scope = state.root.child();
    let pump = tokio::spawn(send_pump(writer, Arc::clone(&state), scope.clone()));
    spawn_initial_battle(Arc::clone(&state), scope.clone());

    let result = receive_loop(&mut reader, &state, &scope).await;

    // Stops the pump, the keepalive and the pending initialization.
    scope.cancel();
    let _ = pump.await;
    tracing::info!(%conn_id, "game client disconnected");

    // _guard drops here and frees the slot.
    Ok(result?)
}

// ---------------------------------------------------------------------------
// Receive side
// ---------------------------------------------------------------------------

async fn receive_loop(
    reader: &mut WebSocketReader,
    state: &Arc<ServerState>,
    scope: &CancelScope,
) -> Result<(), TransportError> {
    let conn_id = reader.id();
    let config = &state.config;
    let ctx = CommandContext {
        lifecycle: state.lifecycle.clone(),
        connection: conn_id,
        scope: scope.clone(),
    };
    let mut pong_deadline = Instant::now() + config.pong_wait;

    loop {
        let deadline = config.keepalive.then_some(pong_deadline);
        let received = tokio::select! {
            _ = scope.cancelled() => return Ok(()),
            received = recv_before(reader, deadline) => received,
        };

        let incoming = match received {
            Ok(Some(incoming)) => incoming,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                return Ok(());
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(%conn_id, error = %e, "no pong from game client, closing connection");
                return Err(e);
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Err(e);
            }
        };

        match incoming {
            Incoming::Pong(_) => {
                pong_deadline = Instant::now() + config.pong_wait;
                tracing::trace!(%conn_id, "pong");
            }
            Incoming::Binary(data) => {
                handle_frame(state, &ctx, decode_binary(&state.codec, &data)).await;
            }
            Incoming::Text(text) => {
                handle_frame(state, &ctx, decode_text(&state.codec, &text)).await;
            }
        }
    }
}

async fn recv_before(
    reader: &mut WebSocketReader,
    deadline: Option<Instant>,
) -> Result<Option<Incoming>, TransportError> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, reader.recv())
            .await
            .unwrap_or(Err(TransportError::TimedOut("keepalive"))),
        None => reader.recv().await,
    }
}

/// Routes one decoded frame. Never tears down the connection.
async fn handle_frame(
    state: &ServerState,
    ctx: &CommandContext,
    frame: Result<Frame, ProtocolError>,
) {
    let conn_id = ctx.connection;
    match frame {
        Ok(Frame::Command(request)) => {
            let reply = state.commands.dispatch(ctx.clone(), request).await;
            send_reply(state, ctx, reply).await;
        }
        Ok(Frame::WarMachineTicks(ticks)) => {
            tracing::trace!(%conn_id, count = ticks.len(), "war machine ticks");
            if let Err(e) = state.lifecycle.apply_ticks(ticks).await {
                tracing::error!(%conn_id, error = %e, "ticks not applied");
            }
        }
        Ok(Frame::Reserved(kind)) => {
            tracing::trace!(%conn_id, %kind, "ignoring reserved frame");
        }
        Err(ProtocolError::InvalidMessage(reason)) => {
            tracing::warn!(%conn_id, %reason, "invalid command envelope");
            let reply = CommandReply::failure(BattleCommand::from_static(""), reason);
            send_reply(state, ctx, reply).await;
        }
        Err(e) => {
            tracing::warn!(%conn_id, error = %e, "dropping malformed frame");
        }
    }
}

async fn send_reply(state: &ServerState, ctx: &CommandContext, reply: CommandReply) {
    let command = reply.battle_command.clone();
    if let Err(e) = state.outbox.push(OutboundBody::Reply(reply), &ctx.scope).await {
        tracing::warn!(conn_id = %ctx.connection, %command, error = %e, "reply dropped");
    }
}

// ---------------------------------------------------------------------------
// Send side
// ---------------------------------------------------------------------------

/// Drains the outbox onto the socket and pings the client.
///
/// The only task that writes to the connection. A failed or timed out
/// write cancels the connection scope.
async fn send_pump(mut writer: WebSocketWriter, state: Arc<ServerState>, scope: CancelScope) {
    let conn_id = writer.id();
    let config = &state.config;

    let mut rx = tokio::select! {
        _ = scope.cancelled() => return,
        rx = state.outbox.receiver() => rx,
    };

    let mut ping = tokio::time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let written = tokio::select! {
            _ = scope.cancelled() => break,
            _ = ping.tick(), if config.keepalive => {
                tracing::trace!(%conn_id, "ping");
                tokio::time::timeout(config.write_wait, writer.ping(Vec::new()))
                    .await
                    .unwrap_or(Err(TransportError::TimedOut("ping")))
            }
            outbound = rx.recv() => match outbound {
                Some(outbound) => write_outbound(&mut writer, &state, outbound).await,
                None => break,
            },
        };

        if let Err(e) = written {
            tracing::warn!(%conn_id, error = %e, "write failed, closing connection");
            scope.cancel();
            break;
        }
    }

    drop(rx);
    let _ = writer.close().await;
    tracing::debug!(%conn_id, "send pump stopped");
}

async fn write_outbound(
    writer: &mut WebSocketWriter,
    state: &ServerState,
    outbound: Outbound,
) -> Result<(), TransportError> {
    let conn_id = writer.id();
    let command = outbound.body.command();
    if outbound.scope.is_cancelled() {
        tracing::debug!(%conn_id, command, "dropping message from a cancelled scope");
        return Ok(());
    }

    let text = match outbound.body.encode(&state.codec) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(%conn_id, command, error = %e, "outbound message not encodable");
            return Ok(());
        }
    };

    tokio::time::timeout(state.config.write_wait, writer.send_text(text))
        .await
        .unwrap_or(Err(TransportError::TimedOut("write")))?;
    tracing::trace!(%conn_id, command, "sent");
    Ok(())
}

/// Initializes a battle for the new client once `init_delay` has passed,
/// unless the connection is gone by then.
fn spawn_initial_battle(state: Arc<ServerState>, scope: CancelScope) {
    tokio::spawn(async move {
        tokio::select! {
            _ = scope.cancelled() => {}
            _ = tokio::time::sleep(state.config.init_delay) => {
                match state.lifecycle.initialize().await {
                    Ok(battle_id) => tracing::info!(%battle_id, "battle initialized for game client"),
                    Err(e) if e.is_domain() => tracing::warn!(error = %e, "initial battle rejected"),
                    Err(e) => tracing::error!(error = %e, "initial battle failed"),
                }
            }
        }
    });
}
