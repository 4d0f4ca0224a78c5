// Sync Directory Contract Tests
//
// These tests verify INVARIANTS that MUST NEVER BREAK regardless of implementation.
// They defend against regression by documenting WHY decisions were made.
//
// **Problem**: the cross-process layer gets weakened because "the in-memory
// registry already checks", forgetting that other processes share the
// directory but not the registry
// **Solution**: contract tests exercising two managers like two processes

use std::fs;

use portsync::{FileLock, PortManager, PortManagerConfig};
use tempfile::TempDir;

/// Config pinning two managers to the same small window and sync dir, the
/// worst case for cross-process contention
fn shared_config(dir: &TempDir, window: u16) -> PortManagerConfig {
    PortManagerConfig {
        sync_dir: Some(dir.path().to_path_buf()),
        no_random_ports: false,
        ephemeral_range: Some((1025, u16::MAX - window)),
    }
}

/// WHY: Managers sharing a sync dir never return equal ports
/// REASON: The in-memory registry is per-instance; only the lock files
/// coordinate across instances (and across real processes)
/// BREAKS: Parallel test binaries collide despite "unique" allocation
/// SACRIFICES: If this fails, the file lock is not consulted on claim
#[test]
fn shared_dir_managers_get_disjoint_ports() {
    let dir = TempDir::new().unwrap();
    let a = PortManager::with_config(shared_config(&dir, 16)).unwrap();
    let b = PortManager::with_config(shared_config(&dir, 16)).unwrap();

    let mut ports = Vec::new();
    for _ in 0..4 {
        if let Ok(p) = a.get_tcp_port(0) {
            ports.push(p);
        }
        if let Ok(p) = b.get_tcp_port(0) {
            ports.push(p);
        }
    }

    let granted = ports.len();
    assert!(granted >= 2, "window too contended to test anything");
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(
        ports.len(),
        granted,
        "two managers received the same port from one sync dir"
    );

    // If this test fails:
    // - Every multi-process test run on one host is racy
    // - The sync directory is decoration, not coordination
}

/// WHY: Each claim is visible on disk as <sync_dir>/<port>
/// REASON: The file IS the cross-process protocol; external processes
/// decide contention by flocking exactly that path
/// BREAKS: Lock files in the wrong place coordinate nothing
/// SACRIFICES: If this fails, the on-disk naming contract is broken
#[test]
fn claims_materialize_as_port_named_lock_files() {
    let dir = TempDir::new().unwrap();
    let manager = PortManager::with_sync_dir(dir.path()).unwrap();

    let port = manager.get_tcp_port(0).unwrap();
    let lock_path = dir.path().join(port.to_string());
    assert!(
        lock_path.is_file(),
        "expected lock file at {}",
        lock_path.display()
    );

    // And a competing "process" must fail its non-blocking acquire
    let mut competitor = FileLock::new(&lock_path);
    assert!(
        !competitor.acquire(false).unwrap(),
        "competitor acquired a lock the manager should hold"
    );
}

/// WHY: Release removes the lock file, and only for owned ports
/// REASON: A stale file would not block others (flock is what blocks), but
/// it turns the directory into garbage nobody can interpret
/// BREAKS: Observability of claims on disk
/// SACRIFICES: If this fails, released and claimed ports look identical
#[test]
fn release_removes_lock_files() {
    let dir = TempDir::new().unwrap();
    let manager = PortManager::with_sync_dir(dir.path()).unwrap();

    let first = manager.get_tcp_port(0).unwrap();
    let second = manager.get_tcp_port(0).unwrap();

    manager.release_port(first);
    assert!(!dir.path().join(first.to_string()).exists());
    assert!(dir.path().join(second.to_string()).exists());

    manager.release();
    assert!(!dir.path().join(second.to_string()).exists());
}

/// WHY: A released port becomes claimable by the other manager
/// REASON: Reservation is scoped to the claim's lifetime, not the process's
/// BREAKS: Port space shrinks monotonically across a shared run
/// SACRIFICES: If this fails, release leaves the flock held
#[test]
fn released_port_claimable_by_peer() {
    let dir = TempDir::new().unwrap();
    let a = PortManager::with_config(shared_config(&dir, 1)).unwrap();
    let b = PortManager::with_config(shared_config(&dir, 1)).unwrap();

    // One-port window: whoever claims it starves the peer until release
    let port = a.get_tcp_port(0).unwrap();
    assert!(b.get_tcp_port(0).is_err());

    a.release_port(port);
    assert_eq!(b.get_tcp_port(0).unwrap(), port);
}

/// WHY: Externally deleted lock files never break release
/// REASON: Cleanup tools and tmpwatch race the manager; release is the one
/// path that must always finish
/// BREAKS: One missing file aborts cleanup of every other claim
/// SACRIFICES: If this fails, Drop can leave claims behind
#[test]
fn release_survives_externally_deleted_lock_file() {
    let dir = TempDir::new().unwrap();
    let manager = PortManager::with_sync_dir(dir.path()).unwrap();

    let mut ports = Vec::new();
    for _ in 0..3 {
        ports.push(manager.get_tcp_port(0).unwrap());
    }
    fs::remove_file(dir.path().join(ports[0].to_string())).unwrap();

    manager.release();
    assert_eq!(manager.claimed_count(), 0);
    for port in ports {
        assert!(!dir.path().join(port.to_string()).exists());
    }
}

/// WHY: Dropping a manager releases its claims and lock files
/// REASON: Scoped acquisition is the API contract; early returns and panics
/// in tests must not leak ports
/// BREAKS: Aborted test runs permanently consume the shared window
/// SACRIFICES: If this fails, only well-behaved callers clean up
#[test]
fn drop_releases_claims_for_peers() {
    let dir = TempDir::new().unwrap();
    let b = PortManager::with_config(shared_config(&dir, 1)).unwrap();

    let port = {
        let a = PortManager::with_config(shared_config(&dir, 1)).unwrap();
        let port = a.get_tcp_port(0).unwrap();
        assert!(b.get_tcp_port(0).is_err());
        port
    };

    assert_eq!(b.get_tcp_port(0).unwrap(), port);
}
