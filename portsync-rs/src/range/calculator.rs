/**
 * calculator.rs
 * Pure valid-range computation
 *
 * The usable universe is [1025, 65535]. The platform's ephemeral range is
 * carved out of it, leaving up to two disjoint intervals that are safe to
 * hand to tests: the OS will never auto-assign an outgoing connection a
 * port from them.
 *
 * Example (Linux default ephemeral range 32768-60999):
 * - valid ranges: [(1025, 32767), (61000, 65535)]
 * - valid port count: 31743 + 4536 = 36279
 */

/// First port the allocator will ever hand out (everything below is
/// privileged or reserved).
pub const FIRST_VALID_PORT: u16 = 1025;

/// Last usable port number.
pub const LAST_VALID_PORT: u16 = u16::MAX;

/// An inclusive port interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Check if port is within this range
    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Number of ports in this range (inclusive on both ends)
    pub fn len(&self) -> u32 {
        u32::from(self.end - self.start) + 1
    }
}

/// The ordered set of disjoint intervals a manager may allocate from.
///
/// Computed once at construction and immutable afterwards. Intervals are
/// sorted ascending and never overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRange {
    ranges: Vec<PortRange>,
}

impl ValidRange {
    pub fn new(ranges: Vec<PortRange>) -> Self {
        Self { ranges }
    }

    /// The intervals, ascending
    pub fn ranges(&self) -> &[PortRange] {
        &self.ranges
    }

    /// Total number of allocatable ports across all intervals
    pub fn port_count(&self) -> u32 {
        self.ranges.iter().map(PortRange::len).sum()
    }

    /// Check if port falls inside any interval
    pub fn contains(&self, port: u16) -> bool {
        self.ranges.iter().any(|r| r.contains(port))
    }

    /// Map a zero-based offset into a concrete port number.
    ///
    /// Walks the intervals in order, consuming each interval's size until
    /// the offset lands inside one. Offsets `0..port_count()` enumerate
    /// every valid port exactly once.
    pub fn port_at(&self, mut offset: u32) -> Option<u16> {
        for range in &self.ranges {
            if offset >= range.len() {
                offset -= range.len();
            } else {
                return Some(range.start + offset as u16);
            }
        }
        None
    }
}

/// Compute the allocatable intervals given the platform's ephemeral range.
///
/// Intersects `(first_eph, last_eph)` with the usable universe and returns
/// what remains on either side. An ephemeral range that misses the universe
/// entirely leaves the whole universe valid; one that covers it leaves
/// nothing (the caller must treat that as a configuration error).
pub fn compute_valid_range(first_eph: u16, last_eph: u16) -> ValidRange {
    let first_invalid = first_eph.max(FIRST_VALID_PORT);
    let last_invalid = last_eph.min(LAST_VALID_PORT);

    if first_invalid > last_invalid {
        return ValidRange::new(vec![PortRange {
            start: FIRST_VALID_PORT,
            end: LAST_VALID_PORT,
        }]);
    }

    let mut ranges = Vec::new();
    if first_invalid > FIRST_VALID_PORT {
        ranges.push(PortRange {
            start: FIRST_VALID_PORT,
            end: first_invalid - 1,
        });
    }
    if last_invalid < LAST_VALID_PORT {
        ranges.push(PortRange {
            start: last_invalid + 1,
            end: LAST_VALID_PORT,
        });
    }
    ValidRange::new(ranges)
}
