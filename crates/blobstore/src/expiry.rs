//! Item lifetimes and the lazy expiry check run on every access.
//!
//! There is no sweeper here: an expired item is removed the first time something
//! touches it. Offline cleanup lives in [`crate::maintenance::purge`].

use std::fmt;
use std::str::FromStr;

use crate::clock::Clock;
use crate::meta::FOREVER;
use crate::record::Record;
use crate::store::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
    Forever,
}

impl LifeUnit {
    /// Length of one unit in seconds; `None` for [`LifeUnit::Forever`].
    pub fn seconds(&self) -> Option<i64> {
        match self {
            LifeUnit::Minutes => Some(60),
            LifeUnit::Hours => Some(60 * 60),
            LifeUnit::Days => Some(60 * 60 * 24),
            LifeUnit::Weeks => Some(60 * 60 * 24 * 7),
            LifeUnit::Months => Some(60 * 60 * 24 * 30),
            LifeUnit::Years => Some(60 * 60 * 24 * 365),
            LifeUnit::Forever => None,
        }
    }
}

impl FromStr for LifeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MINUTES" => Ok(LifeUnit::Minutes),
            "HOURS" => Ok(LifeUnit::Hours),
            "DAYS" => Ok(LifeUnit::Days),
            "WEEKS" => Ok(LifeUnit::Weeks),
            "MONTHS" => Ok(LifeUnit::Months),
            "YEARS" => Ok(LifeUnit::Years),
            "FOREVER" => Ok(LifeUnit::Forever),
            other => Err(format!("unknown lifetime unit {other:?}")),
        }
    }
}

impl fmt::Display for LifeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifeUnit::Minutes => "MINUTES",
            LifeUnit::Hours => "HOURS",
            LifeUnit::Days => "DAYS",
            LifeUnit::Weeks => "WEEKS",
            LifeUnit::Months => "MONTHS",
            LifeUnit::Years => "YEARS",
            LifeUnit::Forever => "FOREVER",
        };
        f.write_str(s)
    }
}

/// How long an uploaded item is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetime {
    pub value: i64,
    pub unit: LifeUnit,
}

impl Default for Lifetime {
    /// One month.
    fn default() -> Self {
        Self {
            value: 1,
            unit: LifeUnit::Months,
        }
    }
}

impl Lifetime {
    pub fn new(value: i64, unit: LifeUnit) -> Self {
        Self { value, unit }
    }

    pub fn forever() -> Self {
        Self::new(1, LifeUnit::Forever)
    }

    /// Build from the optional `maxlife-value` / `maxlife-unit` request fields.
    pub fn from_parts(value: Option<&str>, unit: Option<&str>) -> Result<Self, String> {
        let default = Self::default();
        let unit = match unit {
            Some(u) => u.trim().parse()?,
            None => default.unit,
        };
        let value = match value {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| format!("lifetime value must be an integer, got {v:?}"))?,
            None => default.value,
        };
        Ok(Self { value, unit })
    }

    /// Lifetime in seconds, or [`FOREVER`].
    pub fn seconds(&self) -> i64 {
        match self.unit.seconds() {
            Some(secs) => secs.saturating_mul(self.value),
            None => FOREVER,
        }
    }

    /// Absolute `timestamp-max-life` for an item uploaded at `now`.
    pub fn max_life_stamp(&self, now: i64) -> i64 {
        let secs = self.seconds();
        if secs > 0 {
            now.saturating_add(secs)
        } else {
            FOREVER
        }
    }
}

/// Applies `timestamp-max-life` when an item is touched.
pub struct ExpiryPolicy<'a> {
    storage: &'a dyn Storage,
    clock: &'a dyn Clock,
}

impl<'a> ExpiryPolicy<'a> {
    pub fn new(storage: &'a dyn Storage, clock: &'a dyn Clock) -> Self {
        Self { storage, clock }
    }

    /// Remove the item if its lifetime is over. Returns true if it is expired.
    ///
    /// A concurrent removal is not an error. Other removal failures are logged and the
    /// item is still reported as expired.
    pub fn delete_if_lifetime_over(&self, record: &Record) -> bool {
        let max_life = record.meta().timestamp_max_life;
        let now = self.clock.now();
        if !(0 < max_life && max_life < now) {
            return false;
        }

        let name = record.name();
        match self.storage.remove(name) {
            Ok(()) => {
                tracing::info!(item.name = %name, item.max_life = max_life, "Expired item removed");
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(item.name = %name, "Expired item already gone");
            }
            Err(e) => {
                tracing::error!(item.name = %name, error = %e, "Failed to remove expired item");
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::name::ItemName;
    use crate::store::FileStore;
    use tempfile::TempDir;

    #[test]
    fn test_unit_seconds() {
        assert_eq!(Lifetime::new(2, LifeUnit::Minutes).seconds(), 120);
        assert_eq!(Lifetime::new(1, LifeUnit::Weeks).seconds(), 604_800);
        assert_eq!(Lifetime::new(1, LifeUnit::Months).seconds(), 2_592_000);
        assert_eq!(Lifetime::new(1, LifeUnit::Years).seconds(), 31_536_000);
        assert_eq!(Lifetime::new(5, LifeUnit::Forever).seconds(), FOREVER);
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(Lifetime::from_parts(None, None).unwrap(), Lifetime::default());
        assert_eq!(
            Lifetime::from_parts(Some("3"), Some("days")).unwrap(),
            Lifetime::new(3, LifeUnit::Days)
        );
        assert!(Lifetime::from_parts(Some("three"), Some("DAYS")).is_err());
        assert!(Lifetime::from_parts(Some("1"), Some("FORTNIGHTS")).is_err());
    }

    #[test]
    fn test_max_life_stamp() {
        assert_eq!(Lifetime::new(1, LifeUnit::Hours).max_life_stamp(1000), 4600);
        assert_eq!(Lifetime::forever().max_life_stamp(1000), FOREVER);
    }

    #[test]
    fn test_delete_if_lifetime_over() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileStore::at_path(temp_dir.path())?;
        let clock = ManualClock::at(1000);
        let name = ItemName::parse("abcdefgh")?;

        let mut record = store.create(&name, 0)?;
        record.meta_mut()?.timestamp_max_life = 2000;
        record.close()?;

        let policy = ExpiryPolicy::new(&store, &clock);
        let record = store.open(&name)?;
        assert!(!policy.delete_if_lifetime_over(&record));

        clock.set(2000);
        assert!(!policy.delete_if_lifetime_over(&record));

        clock.set(2001);
        assert!(policy.delete_if_lifetime_over(&record));
        assert!(!store.contains("abcdefgh"));

        // Second touch through a stale handle: already gone, still expired.
        assert!(policy.delete_if_lifetime_over(&record));
        Ok(())
    }

    #[test]
    fn test_forever_never_expires() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileStore::at_path(temp_dir.path())?;
        let clock = ManualClock::at(i64::MAX);
        let name = ItemName::parse("abcdefgh")?;
        store.create(&name, 0)?.close()?;

        let record = store.open(&name)?;
        assert!(!ExpiryPolicy::new(&store, &clock).delete_if_lifetime_over(&record));
        assert!(store.contains("abcdefgh"));
        Ok(())
    }
}
