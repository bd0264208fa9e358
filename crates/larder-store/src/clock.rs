//! HLC (Hybrid Logical Clock) for cell stamps.
//!
//! Stamps form a total order across replicas: wall time first, then the
//! logical counter, then the replica id as the final tie-breaker.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Source of wall time in milliseconds since the Unix epoch.
pub type TimeSource = Arc<dyn Fn() -> u64 + Send + Sync>;

/// A logical timestamp attached to every cell write.
///
/// Field order matters: the derived `Ord` compares `wall_ms`, then
/// `counter`, then `replica`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub wall_ms: u64,
    pub counter: u32,
    pub replica: String,
}

impl Stamp {
    pub fn new(wall_ms: u64, counter: u32, replica: impl Into<String>) -> Self {
        Self {
            wall_ms,
            counter,
            replica: replica.into(),
        }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{}", self.wall_ms, self.counter, self.replica)
    }
}

/// Hybrid Logical Clock owned by one replica.
///
/// Monotonic even when the wall clock stalls or jumps backward, and always
/// ahead of every remote stamp it has observed.
pub struct Clock {
    replica: String,
    wall_ms: u64,
    counter: u32,
    now: TimeSource,
}

impl Clock {
    /// Clock driven by the system wall clock.
    pub fn new(replica: impl Into<String>) -> Self {
        Self::with_time_source(replica, Arc::new(system_now_ms))
    }

    /// Clock driven by an arbitrary time source (used by tests to pin time).
    pub fn with_time_source(replica: impl Into<String>, now: TimeSource) -> Self {
        Self {
            replica: replica.into(),
            wall_ms: 0,
            counter: 0,
            now,
        }
    }

    pub fn replica(&self) -> &str {
        &self.replica
    }

    /// Generate a stamp strictly greater than any previously issued or
    /// received one.
    pub fn tick(&mut self) -> Stamp {
        let now = (self.now)();

        if now > self.wall_ms {
            self.wall_ms = now;
            self.counter = 0;
        } else if let Some(counter) = self.counter.checked_add(1) {
            self.counter = counter;
        } else {
            // Counter exhausted: borrow the next millisecond.
            self.wall_ms = self.wall_ms.saturating_add(1);
            self.counter = 0;
        }

        Stamp::new(self.wall_ms, self.counter, self.replica.clone())
    }

    /// Fold a remote stamp into the clock so the next `tick` exceeds it.
    pub fn receive(&mut self, remote: &Stamp) {
        if remote.wall_ms > self.wall_ms {
            self.wall_ms = remote.wall_ms;
            self.counter = remote.counter;
        } else if remote.wall_ms == self.wall_ms && remote.counter > self.counter {
            self.counter = remote.counter;
        }
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("replica", &self.replica)
            .field("wall_ms", &self.wall_ms)
            .field("counter", &self.counter)
            .finish()
    }
}

fn system_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
