//! Handlers for the battle commands the game client sends.
//!
//! Each handler decodes its payload and forwards to the lifecycle actor.
//! Successful commands reply with the battle ID they applied to.

use arena_battle::{AbilityRequest, AiSpawnedRequest, DestroyedRequest, EndRequest, StartRequest};
use arena_protocol::BattleCommand;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{ArenaError, CommandContext, CommandError, CommandRegistry};

/// Builds a registry with every battle command registered.
///
/// # Errors
/// [`ArenaError::DuplicateCommand`] if two handlers claim the same key.
pub fn battle_commands() -> Result<CommandRegistry, ArenaError> {
    let mut registry = CommandRegistry::new();
    registry.register(BattleCommand::READY, initialize)?;
    registry.register(BattleCommand::INIT, initialize)?;
    registry.register(BattleCommand::START, start)?;
    registry.register(BattleCommand::END, end)?;
    registry.register(BattleCommand::WAR_MACHINE_DESTROYED, war_machine_destroyed)?;
    registry.register(BattleCommand::AI_SPAWNED, ai_spawned)?;
    registry.register(BattleCommand::ABILITY, ability)?;
    Ok(registry)
}

fn decode<T: DeserializeOwned + Default>(payload: Value) -> Result<T, CommandError> {
    // The client sends `null` for commands with nothing to say.
    if payload.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(payload)?)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn initialize(ctx: CommandContext, _payload: Value) -> Result<Value, CommandError> {
    let battle_id = ctx.lifecycle.initialize().await?;
    Ok(serde_json::to_value(battle_id)?)
}

async fn start(ctx: CommandContext, payload: Value) -> Result<Value, CommandError> {
    let request: StartRequest = decode(payload)?;
    let battle_id = ctx.lifecycle.start(request).await?;
    Ok(serde_json::to_value(battle_id)?)
}

async fn end(ctx: CommandContext, payload: Value) -> Result<Value, CommandError> {
    let request: EndRequest = decode(payload)?;
    let battle_id = ctx.lifecycle.end(request).await?;
    Ok(serde_json::to_value(battle_id)?)
}

async fn war_machine_destroyed(ctx: CommandContext, payload: Value) -> Result<Value, CommandError> {
    let request: DestroyedRequest = decode(payload)?;
    let battle_id = ctx.lifecycle.war_machine_destroyed(request).await?;
    Ok(serde_json::to_value(battle_id)?)
}

async fn ai_spawned(ctx: CommandContext, payload: Value) -> Result<Value, CommandError> {
    let request: AiSpawnedRequest = decode(payload)?;
    let battle_id = ctx.lifecycle.ai_spawned(request).await?;
    Ok(serde_json::to_value(battle_id)?)
}

async fn ability(ctx: CommandContext, payload: Value) -> Result<Value, CommandError> {
    let request: AbilityRequest = decode(payload)?;
    let battle_id = ctx.lifecycle.ability(request).await?;
    Ok(serde_json::to_value(battle_id)?)
}
