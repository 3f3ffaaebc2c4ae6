//! MPlayer slave-mode module - spawns and drives an external MPlayer over stdio.
//!
//! Architecture:
//! - `process.rs` - MPlayer binary detection, spawning and command list discovery
//! - `catalog.rs` - Command names and argument signatures
//! - `protocol.rs` - Call encoding and output line classification
//! - `state.rs` - Playback state machine and its shared snapshot
//! - `ledger.rs` - Outstanding calls matched to answers in LIFO order
//! - `supervisor.rs` - Event loop owning the process pipes
//! - `client.rs` - Caller-facing handle with start/stop/restart and `call`

mod catalog;
mod client;
mod ledger;
mod process;
mod protocol;
mod state;
mod supervisor;

pub use catalog::{ArgSlot, ArgType, CatalogError, CommandCatalog, CommandSpec};
pub use client::{MPlayer, MPlayerError};
pub use process::{find_mplayer, ProcessError};
pub use protocol::{encode, Call, CallDefaults, CallOptions, EncodeError, OutputLine, Value};
pub use state::{PlaybackState, SharedState};
pub use supervisor::{Supervisor, SupervisorError, EVENT_CAPACITY};
