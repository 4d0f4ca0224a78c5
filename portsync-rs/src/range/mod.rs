/**
 * range module
 * Valid port range computation: ephemeral range detection plus the pure
 * calculator that carves the usable universe around it.
 */

pub mod calculator;
pub mod ephemeral;

pub use calculator::{compute_valid_range, PortRange, ValidRange, FIRST_VALID_PORT, LAST_VALID_PORT};
pub use ephemeral::{ephemeral_port_range, IANA_EPHEMERAL_END, IANA_EPHEMERAL_START};
