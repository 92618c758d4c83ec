//! Parade Engine - isolation boundary to the audit engine
//!
//! Each runner talks to one engine instance through a tagged JSON-lines
//! envelope. Instances are child processes in production ([`ProcessSpawner`])
//! or tasks in-process ([`LocalSpawner`]); both are reached only by message
//! passing.

pub mod connection;
pub mod lighthouse;
pub mod local;
pub mod process;
pub mod protocol;
pub mod shutdown;
pub mod worker;

pub use connection::{EngineConnection, EngineEvent, EngineSpawner};
pub use lighthouse::{engine_version, AuditBackend, LighthouseCli};
pub use local::LocalSpawner;
pub use process::ProcessSpawner;
pub use protocol::{EngineRequest, EngineResponse};
pub use shutdown::{EngineContext, ShutdownController};
pub use worker::run_worker;
