//! Command dispatcher: routes inbound requests to registered handlers.
//!
//! Handlers are registered once at startup. A handler gets the
//! [`CommandContext`] and the raw JSON payload and returns the reply
//! payload; the dispatcher turns the result into a [`CommandReply`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use arena_battle::LifecycleHandle;
use arena_protocol::{BattleCommand, CommandReply, Request};
use arena_transport::ConnectionId;
use serde_json::Value;

use crate::{ArenaError, CancelScope, CommandError};

/// What a handler sees besides its payload.
#[derive(Clone)]
pub struct CommandContext {
    pub lifecycle: LifecycleHandle,
    /// The connection the command arrived on.
    pub connection: ConnectionId,
    /// Cancelled when that connection goes away.
    pub scope: CancelScope,
}

/// Boxed future returned by a registered handler.
pub type CommandFuture = Pin<Box<dyn Future<Output = Result<Value, CommandError>> + Send>>;

type BoxedHandler = Box<dyn Fn(CommandContext, Value) -> CommandFuture + Send + Sync>;

/// Write-once map from command key to handler.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<BattleCommand, BoxedHandler>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `command`.
    ///
    /// # Errors
    /// [`ArenaError::DuplicateCommand`] if `command` already has a handler.
    /// Treat this as fatal at startup.
    pub fn register<F, Fut>(&mut self, command: BattleCommand, handler: F) -> Result<(), ArenaError>
    where
        F: Fn(CommandContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CommandError>> + Send + 'static,
    {
        if self.handlers.contains_key(&command) {
            return Err(ArenaError::DuplicateCommand(command));
        }
        tracing::debug!(%command, "command registered");
        self.handlers.insert(
            command,
            Box::new(move |ctx, payload| Box::pin(handler(ctx, payload))),
        );
        Ok(())
    }

    pub fn contains(&self, command: &BattleCommand) -> bool {
        self.handlers.contains_key(command)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler for `request` and builds the reply.
    ///
    /// Never fails: unknown commands and handler errors become failure
    /// replies. Domain errors are logged at warn, everything else at error.
    pub async fn dispatch(&self, ctx: CommandContext, request: Request) -> CommandReply {
        let Request {
            battle_command: command,
            payload,
        } = request;
        let connection = ctx.connection;

        let Some(handler) = self.handlers.get(&command) else {
            tracing::warn!(%connection, %command, "unknown battle command");
            return CommandReply::failure(
                command.clone(),
                format!("unknown battle command {command}"),
            );
        };

        tracing::debug!(%connection, %command, "dispatching");
        match handler(ctx, payload).await {
            Ok(value) => CommandReply::success(command, value),
            Err(e) => {
                if e.is_domain() {
                    tracing::warn!(%connection, %command, error = %e, "command rejected");
                } else {
                    tracing::error!(%connection, %command, error = ?e, "command failed");
                }
                CommandReply::failure(command, e)
            }
        }
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut commands: Vec<&str> = self.handlers.keys().map(BattleCommand::as_str).collect();
        commands.sort_unstable();
        f.debug_struct("CommandRegistry")
            .field("commands", &commands)
            .finish()
    }
}
