//! Command dispatch: bridges CLI args -> engine calls -> output formatting.

pub mod commission;
pub mod config_cmd;
pub mod probe;
pub mod raw;
pub mod registry;
pub mod resolve;
pub mod states;
pub mod util;

use hublink_core::{ConnectionDescriptor, HubEngine, TransportMode};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// What a hub-bound command runs against.
pub struct Ctx {
    pub engine: HubEngine,
    /// Transport in use after any failover.
    pub mode: TransportMode,
    /// Transport the user or profile asked for.
    pub preferred: TransportMode,
}

impl Ctx {
    pub async fn descriptor(&self) -> Result<ConnectionDescriptor, CliError> {
        Ok(self.engine.resolve_connection(self.mode).await?)
    }
}

/// Dispatch a hub-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Ctx, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Probe => probe::handle(ctx, global).await,
        Command::Resolve => resolve::handle(ctx, global).await,
        Command::States(args) => states::handle(ctx, args, global).await,
        Command::Rest(args) => raw::handle_rest(ctx, args, global).await,
        Command::Ws(args) => raw::handle_ws(ctx, args, global).await,
        Command::Registry(args) => registry::handle(ctx, args, global).await,
        Command::Commission(args) => commission::handle(ctx, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions run without a hub connection".into(),
        )),
    }
}
