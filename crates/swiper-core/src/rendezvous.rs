//! Rendezvous scheduling.
//!
//! Wall-clock time is cut into fixed windows aligned to the Unix epoch. For
//! each window, participants that share a resource id and a seed derive the
//! same channel id without talking to each other:
//!
//!   key        = BLAKE3-derive_key(CONTEXT, seed)
//!   channel_id = BLAKE3-keyed(key, start_secs || start_nanos || len(resource) || resource)
//!
//! Everything here is pure. Window boundaries are `[start, start + interval)`.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Domain separation for the seed-derived key.
const KEY_CONTEXT: &str = "swiper 2024-01-01 rendezvous point seed key";

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Longest window the scheduler runs. Longer intervals are treated as this.
pub const MAX_INTERVAL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

// ── Channel id ────────────────────────────────────────────────────────────────

/// A per-window rendezvous point. Transports key channels by it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub [u8; 32]);

impl ChannelId {
    /// First 8 bytes as hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.short())
    }
}

// ── Scheduling ────────────────────────────────────────────────────────────────

/// Floor `now` to the start of the window that contains it.
///
/// Instants before the epoch clamp to the epoch. A zero interval has no
/// windows; `now` is returned unchanged.
pub fn round_time_period(now: SystemTime, interval: Duration) -> SystemTime {
    let step = interval.min(MAX_INTERVAL).as_nanos();
    if step == 0 {
        return now;
    }
    let since = now.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    let nanos = since.as_nanos();
    UNIX_EPOCH + duration_from_nanos(nanos - nanos % step)
}

/// Start of the window following the one starting at `start`.
///
/// Saturates at `start` if the platform cannot represent the next boundary.
pub fn next_time_period(start: SystemTime, interval: Duration) -> SystemTime {
    start
        .checked_add(interval.min(MAX_INTERVAL))
        .unwrap_or(start)
}

/// Derive the rendezvous point for a resource during one window.
pub fn generate_rendezvous_point_for_period(
    resource: &[u8],
    seed: &[u8],
    start: SystemTime,
) -> ChannelId {
    let key = blake3::derive_key(KEY_CONTEXT, seed);
    let since = start.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);

    let mut hasher = blake3::Hasher::new_keyed(&key);
    hasher.update(&since.as_secs().to_be_bytes());
    hasher.update(&since.subsec_nanos().to_be_bytes());
    hasher.update(&(resource.len() as u64).to_be_bytes());
    hasher.update(resource);
    ChannelId(*hasher.finalize().as_bytes())
}

fn duration_from_nanos(nanos: u128) -> Duration {
    let secs = (nanos / NANOS_PER_SEC) as u64;
    let subsec = (nanos % NANOS_PER_SEC) as u32;
    Duration::new(secs, subsec)
}

// ── Window ────────────────────────────────────────────────────────────────────

/// One epoch-aligned window, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: SystemTime,
    pub end: SystemTime,
}

impl Window {
    /// The window containing `now`.
    pub fn containing(now: SystemTime, interval: Duration) -> Self {
        let start = round_time_period(now, interval);
        Self {
            start,
            end: next_time_period(start, interval),
        }
    }

    /// The window right after this one.
    pub fn next(&self) -> Self {
        let interval = self.interval();
        Self {
            start: self.end,
            end: next_time_period(self.end, interval),
        }
    }

    pub fn interval(&self) -> Duration {
        self.end.duration_since(self.start).unwrap_or(Duration::ZERO)
    }

    /// Rendezvous point for `resource` during this window.
    pub fn rendezvous_point(&self, resource: &[u8], seed: &[u8]) -> ChannelId {
        generate_rendezvous_point_for_period(resource, seed, self.start)
    }
}
