//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound Host header / SNI name
//!     → host.rs (canonicalize: case, port, www. prefix)
//!     → switchboard.rs (hostname → backend port)
//!     → Return: backend port or NotFound
//!
//! Table Compilation (at startup and on reload):
//!     [switchboard] config table
//!     → canonicalize + validate keys
//!     → Freeze as immutable Switchboard
//!     → publish via SharedSwitchboard (atomic swap)
//! ```
//!
//! # Design Decisions
//! - Table compiled at startup, immutable at runtime
//! - Deterministic: same input always resolves to the same port
//! - Explicit NotFound rather than a silent default backend

pub mod host;
pub mod switchboard;

pub use host::canonicalize;
pub use switchboard::{SharedSwitchboard, Switchboard, SwitchboardEntry, SwitchboardError};
