/**
 * manager.rs
 * Free-port allocation for concurrent test processes
 *
 * Each PortManager instance:
 * - Computes the valid (non-ephemeral) port ranges once at construction
 * - Probes candidates in a salted, full-permutation order
 * - Claims ports in an in-memory registry, and through per-port lock
 *   files when a sync directory is shared with other processes
 *
 * Allocation strategy:
 * - A random salt roots the probe sequence so repeated runs don't pile
 *   onto the same low ports
 * - A real wildcard bind (then immediate close) filters out ports the OS
 *   already handed to someone else
 * - The claim step re-checks exclusivity under the registry mutex; a
 *   cross-process flock is the authority between processes
 *
 * Example:
 * - ephemeral range 32768-60999 → valid [(1025, 32767), (61000, 65535)]
 * - two test binaries pointed at PORT_SYNC_PATH=/tmp/ports never receive
 *   the same port, each claim visible as /tmp/ports/<port>
 */

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, UdpSocket};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::{env, fs, io};

use rand::Rng;
use tracing::{debug, warn};

use crate::errors::{PortSyncError, Result};
use crate::lock::FileLock;
use crate::range::{compute_valid_range, ephemeral_port_range, ValidRange};

/// Environment variable naming the shared coordination directory
pub const PORT_SYNC_PATH_ENV: &str = "PORT_SYNC_PATH";

/// Environment variable disabling randomized allocation: when set (to any
/// non-empty value), port requests with a non-zero hint return the hint
/// verbatim, unprobed and unclaimed
pub const NO_RANDOM_PORTS_ENV: &str = "NO_RANDOM_PORTS";

/// Attempts for the combined TCP+UDP request before giving up
const TCP_UDP_RETRIES: u32 = 20;

/// Configuration for a PortManager, resolved once at the boundary.
///
/// Core logic never reads the environment; runners that want different
/// behavior construct this by hand and pass it to `with_config`.
#[derive(Debug, Clone, Default)]
pub struct PortManagerConfig {
    /// Directory shared by cooperating processes; claims materialize as
    /// one lock file per port. None disables cross-process coordination.
    pub sync_dir: Option<PathBuf>,
    /// Escape hatch for environments that pre-assign ports externally
    pub no_random_ports: bool,
    /// Override the detected ephemeral range (hosts that pre-know it,
    /// and tests that need a small deterministic port window)
    pub ephemeral_range: Option<(u16, u16)>,
}

impl PortManagerConfig {
    /// Resolve configuration from the environment
    pub fn from_env() -> Self {
        Self {
            sync_dir: env::var_os(PORT_SYNC_PATH_ENV).map(PathBuf::from),
            no_random_ports: env::var_os(NO_RANDOM_PORTS_ENV).is_some_and(|v| !v.is_empty()),
            ephemeral_range: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SockType {
    Tcp,
    Udp,
}

/// Port Manager - hands out host-unique free ports to concurrent tests.
///
/// Uniqueness is guaranteed across threads sharing one instance, and
/// across processes sharing a sync directory. Without a sync directory
/// the registry alone guarantees uniqueness within the instance only.
///
/// Every claimed port is released when the manager is dropped, so a
/// manager held for a test's scope cannot leak claims.
pub struct PortManager {
    sync_dir: Option<PathBuf>,
    no_random_ports: bool,
    valid_range: ValidRange,
    valid_port_count: u32,
    claims: Mutex<HashMap<u16, Option<FileLock>>>,
}

impl PortManager {
    /// Create a PortManager configured from the environment
    ///
    /// # Example
    /// ```no_run
    /// use portsync::PortManager;
    ///
    /// let manager = PortManager::new().unwrap();
    /// let port = manager.get_tcp_port(0).unwrap();
    /// ```
    pub fn new() -> Result<Self> {
        Self::with_config(PortManagerConfig::from_env())
    }

    /// Create a PortManager coordinating through `sync_dir`, overriding
    /// any environment-provided directory
    pub fn with_sync_dir<P: Into<PathBuf>>(sync_dir: P) -> Result<Self> {
        let mut config = PortManagerConfig::from_env();
        config.sync_dir = Some(sync_dir.into());
        Self::with_config(config)
    }

    /// Create a PortManager from an explicit configuration
    ///
    /// # Errors
    /// Returns an error if:
    /// - The sync directory cannot be created
    /// - The ephemeral range covers the whole usable port space
    pub fn with_config(config: PortManagerConfig) -> Result<Self> {
        if let Some(dir) = &config.sync_dir {
            // create_dir_all is idempotent; an existing directory is fine
            fs::create_dir_all(dir).map_err(|e| {
                PortSyncError::SyncDir(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }

        let (first_eph, last_eph) = config.ephemeral_range.unwrap_or_else(ephemeral_port_range);
        let valid_range = compute_valid_range(first_eph, last_eph);
        let valid_port_count = valid_range.port_count();
        if valid_port_count == 0 {
            return Err(PortSyncError::NoValidPorts(format!(
                "ephemeral range ({}, {}) covers the entire usable space [1025, 65535]",
                first_eph, last_eph
            )));
        }

        debug!(
            ?valid_range,
            valid_port_count,
            sync_dir = ?config.sync_dir,
            "port manager ready"
        );

        Ok(Self {
            sync_dir: config.sync_dir,
            no_random_ports: config.no_random_ports,
            valid_range,
            valid_port_count,
            claims: Mutex::new(HashMap::new()),
        })
    }

    /// The intervals this manager allocates from
    pub fn valid_range(&self) -> &ValidRange {
        &self.valid_range
    }

    /// Total number of allocatable ports
    pub fn valid_port_count(&self) -> u32 {
        self.valid_port_count
    }

    /// Ports currently claimed by this manager, ascending
    pub fn claimed_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.lock_claims().keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Number of outstanding claims
    pub fn claimed_count(&self) -> usize {
        self.lock_claims().len()
    }

    /// Get a free TCP port (alias for `get_tcp_port`)
    pub fn get_port(&self, hint: u16) -> Result<u16> {
        self.get_tcp_port(hint)
    }

    /// Get a free TCP port.
    ///
    /// A non-zero `hint` is returned verbatim when randomized allocation
    /// is disabled; otherwise it is ignored and a probed port is returned.
    pub fn get_tcp_port(&self, hint: u16) -> Result<u16> {
        self.get_free_port(hint, SockType::Tcp)
    }

    /// Get a free UDP port
    pub fn get_udp_port(&self, hint: u16) -> Result<u16> {
        self.get_free_port(hint, SockType::Udp)
    }

    /// Get one port simultaneously free for both TCP and UDP.
    ///
    /// The TCP claim already guarantees exclusivity against every other
    /// cooperating caller, so the UDP side is a bare bind check.
    pub fn get_tcp_and_udp_port(&self, hint: u16) -> Result<u16> {
        if hint != 0 && self.no_random_ports {
            return Ok(hint);
        }

        for _ in 0..TCP_UDP_RETRIES {
            let port = self.get_tcp_port(0)?;
            if probe_bind(SockType::Udp, port) {
                return Ok(port);
            }
            // UDP side is taken; give the TCP claim back and try elsewhere
            self.release_port(port);
        }

        Err(PortSyncError::Exhausted(format!(
            "no port free for both TCP and UDP after {} attempts (range: {:?}, claimed: {:?})",
            TCP_UDP_RETRIES,
            self.valid_range.ranges(),
            self.claimed_ports()
        )))
    }

    /// Release a single claimed port.
    ///
    /// Removes the registry entry and deletes the backing lock file, if
    /// any. Releasing a port this manager does not hold is a no-op.
    pub fn release_port(&self, port: u16) {
        let mut claims = self.lock_claims();
        if let Some(lock) = claims.remove(&port) {
            release_claim(port, lock);
        }
    }

    /// Release every claimed port. Idempotent.
    pub fn release(&self) {
        let mut claims = self.lock_claims();
        for (port, lock) in claims.drain() {
            release_claim(port, lock);
        }
    }

    /// Randomized probe over the valid ranges, shared by TCP and UDP
    fn get_free_port(&self, hint: u16, sock_type: SockType) -> Result<u16> {
        if hint != 0 && self.no_random_ports {
            debug!(port = hint, "returning externally assigned port unchecked");
            return Ok(hint);
        }

        {
            let claims = self.lock_claims();
            if claims.len() as u32 >= self.valid_port_count {
                return Err(self.exhausted(&claims));
            }
        }

        let salt: u32 = rand::thread_rng().gen_range(0..=u32::from(u16::MAX));
        for attempt in 0..self.valid_port_count {
            let offset = (salt + attempt) % self.valid_port_count;
            let candidate = match self.valid_range.port_at(offset) {
                Some(port) => port,
                None => continue,
            };

            if !probe_bind(sock_type, candidate) {
                continue;
            }
            if self.claim(candidate)? {
                return Ok(candidate);
            }
        }

        let claims = self.lock_claims();
        Err(self.exhausted(&claims))
    }

    /// Claim exclusivity for a port that just survived a probe bind.
    ///
    /// Ok(false) means the port is held elsewhere (this registry, or a
    /// competing process via the lock file) and the probe loop should
    /// move on to the next candidate.
    fn claim(&self, port: u16) -> Result<bool> {
        let mut claims = self.lock_claims();

        if claims.contains_key(&port) {
            return Ok(false);
        }

        if let Some(dir) = &self.sync_dir {
            let mut lock = FileLock::new(dir.join(port.to_string()));
            if !lock.acquire(false)? {
                debug!(port, "cross-process lock held elsewhere");
                return Ok(false);
            }
            claims.insert(port, Some(lock));
        } else {
            // No sync directory: remember the port in-memory only
            claims.insert(port, None);
        }

        debug!(port, "claimed");
        Ok(true)
    }

    fn exhausted(&self, claims: &HashMap<u16, Option<FileLock>>) -> PortSyncError {
        let mut claimed: Vec<u16> = claims.keys().copied().collect();
        claimed.sort_unstable();
        PortSyncError::Exhausted(format!(
            "failed to find a free port (range: {:?}, {} claimed: {:?})",
            self.valid_range.ranges(),
            claimed.len(),
            claimed
        ))
    }

    fn lock_claims(&self) -> MutexGuard<'_, HashMap<u16, Option<FileLock>>> {
        // Release must still run if a thread panicked mid-claim, so a
        // poisoned registry is taken over rather than propagated.
        match self.claims.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for PortManager {
    fn drop(&mut self) {
        self.release();
    }
}

/// Remove the lock file (if any) and drop the lock itself
fn release_claim(port: u16, lock: Option<FileLock>) {
    if let Some(mut lock) = lock {
        if let Err(e) = fs::remove_file(lock.path()) {
            // Already-gone files are fine; anything else is logged and
            // release continues for the remaining claims
            if e.kind() != io::ErrorKind::NotFound {
                warn!(port, path = %lock.path().display(), "failed to remove lock file: {}", e);
            }
        }
        lock.release();
    }
    debug!(port, "released");
}

/// Bind-and-close availability check on the wildcard address.
///
/// Probes the IPv6 wildcard first (dual-stack on hosts that have it) and
/// falls back to IPv4 when the address family itself is unavailable. Only
/// a successful bind marks the port available.
fn probe_bind(sock_type: SockType, port: u16) -> bool {
    match bind_wildcard(sock_type, SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => false,
        Err(_) => bind_wildcard(sock_type, SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).is_ok(),
    }
}

fn bind_wildcard(sock_type: SockType, addr: SocketAddr) -> io::Result<()> {
    // The socket is dropped immediately; the probe only needs the bind
    // verdict, not the listener
    match sock_type {
        SockType::Tcp => TcpListener::bind(addr).map(drop),
        SockType::Udp => UdpSocket::bind(addr).map(drop),
    }
}
