//! BIP68 relative timelocks.
//!
//! The same encoded value is pushed into the redeem script in front of
//! `OP_CHECKSEQUENCEVERIFY` and set as the `nSequence` of the refund input.

use crate::error::InputError;
use bitcoin::Sequence;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

const DISABLE_FLAG: u32 = 1 << 31;
const TYPE_FLAG: u32 = 1 << 22;
const VALUE_MASK: u32 = 0x0000_FFFF;
const GRANULARITY: u32 = 9;

/// Largest number of seconds expressible, `0xFFFF * 512`.
pub const MAX_SECONDS: u32 = VALUE_MASK << GRANULARITY;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelativeTimelock {
    Blocks(u16),
    /// Always a multiple of 512.
    Seconds(u32),
}

impl RelativeTimelock {
    pub fn blocks(blocks: u32) -> Result<Self, InputError> {
        if blocks > VALUE_MASK {
            return Err(InputError::TimelockOverflow {
                value: blocks,
                unit: "blocks",
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        Ok(RelativeTimelock::Blocks(blocks as u16))
    }

    pub fn seconds(seconds: u32) -> Result<Self, InputError> {
        if seconds > MAX_SECONDS {
            return Err(InputError::TimelockOverflow {
                value: seconds,
                unit: "seconds",
            });
        }
        if seconds % (1 << GRANULARITY) != 0 {
            return Err(InputError::TimelockGranularity { seconds });
        }

        Ok(RelativeTimelock::Seconds(seconds))
    }

    /// The consensus encoding, identical for script and `nSequence`.
    pub fn to_consensus_u32(self) -> u32 {
        match self {
            RelativeTimelock::Blocks(blocks) => u32::from(blocks),
            RelativeTimelock::Seconds(seconds) => TYPE_FLAG | (seconds >> GRANULARITY),
        }
    }

    pub fn to_sequence(self) -> Sequence {
        Sequence::from_consensus(self.to_consensus_u32())
    }

    /// Decodes an `nSequence`, `None` if relative locking is disabled.
    pub fn from_consensus_u32(sequence: u32) -> Option<Self> {
        if sequence & DISABLE_FLAG != 0 {
            return None;
        }

        #[allow(clippy::cast_possible_truncation)]
        let value = (sequence & VALUE_MASK) as u16;
        if sequence & TYPE_FLAG != 0 {
            Some(RelativeTimelock::Seconds(u32::from(value) << GRANULARITY))
        } else {
            Some(RelativeTimelock::Blocks(value))
        }
    }

    /// Expected wall-clock time until the lock matures, counted from the
    /// block that confirmed the locked output.
    pub fn duration(self, block_interval: Duration) -> Duration {
        match self {
            RelativeTimelock::Blocks(blocks) => block_interval * u32::from(blocks),
            RelativeTimelock::Seconds(seconds) => Duration::from_secs(u64::from(seconds)),
        }
    }
}

impl fmt::Display for RelativeTimelock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelativeTimelock::Blocks(blocks) => write!(f, "{} blocks", blocks),
            RelativeTimelock::Seconds(seconds) => write!(f, "{} seconds", seconds),
        }
    }
}
