use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};

/// Difference between the Unix epoch and the Ripple epoch
/// (2000-01-01T00:00:00Z) in seconds.
pub const RIPPLE_EPOCH_OFFSET: u32 = 946_684_800;

/// An exact time and date in seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Timestamp(u32);

impl Timestamp {
    // This will work until 2106
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        let seconds = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or_default();

        Timestamp(seconds as u32)
    }

    pub fn plus(self, seconds: u32) -> Self {
        Self(self.0.saturating_add(seconds))
    }

    pub fn minus(self, seconds: u32) -> Self {
        Self(self.0.saturating_sub(seconds))
    }

    /// Seconds from `self` until `later`, zero if `later` is not after `self`.
    pub fn seconds_until(self, later: Timestamp) -> u32 {
        later.0.saturating_sub(self.0)
    }
}

/// The u32 input is the number of seconds since epoch
impl From<u32> for Timestamp {
    fn from(item: u32) -> Self {
        Self(item)
    }
}

/// The u32 returned is the number of seconds since epoch
impl From<Timestamp> for u32 {
    fn from(item: Timestamp) -> Self {
        item.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Seconds since the Ripple epoch, the unit of every XRPL time field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RippleTime(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unix time {0} lies before the ripple epoch")]
pub struct BeforeRippleEpoch(pub u32);

impl RippleTime {
    pub const fn from_seconds(seconds: u32) -> Self {
        Self(seconds)
    }

    pub fn now() -> Self {
        Self(u32::from(Timestamp::now()).saturating_sub(RIPPLE_EPOCH_OFFSET))
    }

    pub fn from_unix(timestamp: Timestamp) -> Result<Self, BeforeRippleEpoch> {
        u32::from(timestamp)
            .checked_sub(RIPPLE_EPOCH_OFFSET)
            .map(Self)
            .ok_or(BeforeRippleEpoch(timestamp.into()))
    }

    pub fn to_unix(self) -> Timestamp {
        Timestamp(self.0.saturating_add(RIPPLE_EPOCH_OFFSET))
    }

    pub fn plus(self, seconds: u32) -> Self {
        Self(self.0.saturating_add(seconds))
    }

    pub fn seconds(self) -> u32 {
        self.0
    }

    /// Seconds from `self` until `later`, zero if `later` is not after `self`.
    pub fn seconds_until(self, later: RippleTime) -> u32 {
        later.0.saturating_sub(self.0)
    }
}

impl fmt::Display for RippleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;

    #[test]
    fn converts_unix_time_to_ripple_time() {
        // 2020-10-01T00:00:00Z
        let unix = Timestamp::from(1_601_510_400);

        let ripple = RippleTime::from_unix(unix).unwrap();

        assert_that!(ripple.seconds()).is_equal_to(654_825_600);
        assert_that!(ripple.to_unix()).is_equal_to(unix);
    }

    #[test]
    fn rejects_time_before_ripple_epoch() {
        let result = RippleTime::from_unix(Timestamp::from(946_684_799));

        assert_that!(result).is_err_containing(BeforeRippleEpoch(946_684_799));
    }

    #[test]
    fn seconds_until_saturates() {
        let earlier = RippleTime::from_seconds(100);
        let later = earlier.plus(120);

        assert_that!(earlier.seconds_until(later)).is_equal_to(120);
        assert_that!(later.seconds_until(earlier)).is_equal_to(0);
    }
}
