/**
 * port module
 * Free-port probing and claiming for concurrent test processes
 */

pub mod manager;

pub use manager::{PortManager, PortManagerConfig, NO_RANDOM_PORTS_ENV, PORT_SYNC_PATH_ENV};
