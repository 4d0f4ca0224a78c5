//! # portsync - free-port allocation for concurrent tests
//!
//! Hands out network ports on a single host with a uniqueness guarantee:
//! no two callers receive the same port at the same time, whether they are
//! threads sharing one [`PortManager`] or independent processes pointed at
//! the same sync directory.
//!
//! ## Core Principle
//!
//! **Probe, then claim**: a candidate port must survive a real wildcard
//! bind before the manager records it, and the recorded claim (in-memory,
//! plus a per-port lock file when a sync directory is configured) is what
//! keeps other callers away until release.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  <sync_dir>/<port>  (one flock per claim)│
//! └──────────────────────────────────────────┘
//!          ▲                     ▲
//!          │                     │
//!   ┌──────┴───────┐      ┌──────┴───────┐
//!   │  process A   │      │  process B   │
//!   │  PortManager │      │  PortManager │
//!   └──────────────┘      └──────────────┘
//! ```
//!
//! The valid port space is `[1025, 65535]` minus the platform's ephemeral
//! range, so nothing the manager hands out can collide with ports the OS
//! assigns to outgoing connections.

pub mod errors;
pub mod lock;
pub mod port;
pub mod range;

pub use errors::{PortSyncError, Result};
pub use lock::FileLock;
pub use port::{PortManager, PortManagerConfig, NO_RANDOM_PORTS_ENV, PORT_SYNC_PATH_ENV};
pub use range::{
    compute_valid_range, ephemeral_port_range, PortRange, ValidRange, FIRST_VALID_PORT,
    LAST_VALID_PORT,
};
