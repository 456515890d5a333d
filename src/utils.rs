//! Utility functions and helpers
//!
//! Little-endian reads over blobs and hashes, target/difficulty math and the
//! backoff curve used by the reconnect policy.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::time::Duration;

/// Read a little-endian u32 at `offset`, if the slice is long enough
pub fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset.checked_add(4)?)?;
    Cursor::new(slice).read_u32::<LittleEndian>().ok()
}

/// Read a little-endian u64 at `offset`, if the slice is long enough
pub fn read_u64_le(bytes: &[u8], offset: usize) -> Option<u64> {
    let slice = bytes.get(offset..offset.checked_add(8)?)?;
    Cursor::new(slice).read_u64::<LittleEndian>().ok()
}

/// Difficulty represented by a 64-bit target
pub fn target_to_difficulty(target: u64) -> u64 {
    if target == 0 {
        return 0;
    }

    u64::MAX / target
}

/// Exponential backoff curve
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
        }
    }

    /// Delay before retry number `attempt` (zero-based), capped at the maximum
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        if !millis.is_finite() || millis >= self.max_delay.as_millis() as f64 {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }
}
