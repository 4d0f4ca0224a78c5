/**
 * ephemeral.rs
 * Platform ephemeral port range detection
 *
 * The OS hands ports from this range to outgoing connections, so the
 * allocator must never offer them to tests. Detection is per-platform:
 * - Linux: /proc/sys/net/ipv4/ip_local_port_range
 * - macOS: sysctl net.inet.ip.portrange.first / .last
 * - anything else, or a read failure: IANA dynamic/private suggestion
 */

use once_cell::sync::OnceCell;

/// IANA dynamic/private range start, used when detection fails
pub const IANA_EPHEMERAL_START: u16 = 49152;

/// IANA dynamic/private range end
pub const IANA_EPHEMERAL_END: u16 = u16::MAX;

static EPHEMERAL_RANGE: OnceCell<(u16, u16)> = OnceCell::new();

/// The platform's ephemeral port range `(first, last)`, inclusive.
///
/// Detected once per process and cached; the kernel setting is not expected
/// to change while tests run.
pub fn ephemeral_port_range() -> (u16, u16) {
    *EPHEMERAL_RANGE
        .get_or_init(|| platform::detect().unwrap_or((IANA_EPHEMERAL_START, IANA_EPHEMERAL_END)))
}

/// Parse the two whitespace-separated integers of the Linux proc line.
///
/// Returns None for anything malformed so the caller falls back to the
/// IANA suggestion instead of excluding a bogus range.
#[cfg(any(target_os = "linux", test))]
fn parse_port_range(contents: &str) -> Option<(u16, u16)> {
    let mut parts = contents.split_whitespace();
    let first: u16 = parts.next()?.parse().ok()?;
    let last: u16 = parts.next()?.parse().ok()?;
    if first == 0 || first > last {
        return None;
    }
    Some((first, last))
}

#[cfg(target_os = "linux")]
mod platform {
    const IP_LOCAL_PORT_RANGE: &str = "/proc/sys/net/ipv4/ip_local_port_range";

    pub fn detect() -> Option<(u16, u16)> {
        let contents = std::fs::read_to_string(IP_LOCAL_PORT_RANGE).ok()?;
        super::parse_port_range(&contents)
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use std::ffi::CString;

    pub fn detect() -> Option<(u16, u16)> {
        let first = sysctl_u32("net.inet.ip.portrange.first")?;
        let last = sysctl_u32("net.inet.ip.portrange.last")?;
        if first == 0 || last == 0 {
            return None;
        }
        Some((u16::try_from(first).ok()?, u16::try_from(last).ok()?))
    }

    fn sysctl_u32(name: &str) -> Option<u32> {
        let name = CString::new(name).ok()?;
        let mut value: u32 = 0;
        let mut size = std::mem::size_of::<u32>() as libc::size_t;

        let rc = unsafe {
            libc::sysctlbyname(
                name.as_ptr(),
                &mut value as *mut u32 as *mut libc::c_void,
                &mut size,
                std::ptr::null_mut(),
                0,
            )
        };
        if rc != 0 {
            return None;
        }
        Some(value)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod platform {
    pub fn detect() -> Option<(u16, u16)> {
        None
    }
}
