/**
 * lock module
 * Advisory cross-process file locking for port claims
 */

pub mod filelock;

pub use filelock::FileLock;
