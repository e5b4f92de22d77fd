//! Per-day credential cache

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::network::ArchiveServiceCredential;

const SECONDS_PER_DAY: i64 = 86_400;

/// Start of the UTC day containing `now_ms`, in seconds
pub fn day_start_secs(now_ms: i64) -> i64 {
    (now_ms / 1000).div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
}

/// Credentials keyed by the day they redeem on
///
/// Entries are never modified once added; the whole cache is cleared on
/// authorization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialCache {
    credentials: BTreeMap<i64, ArchiveServiceCredential>,
}

impl CredentialCache {
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// The credential for the day containing `now_ms`
    pub fn for_day(&self, now_ms: i64) -> Option<&ArchiveServiceCredential> {
        self.credentials.get(&day_start_secs(now_ms))
    }

    /// Add credentials; a day that already has one keeps it
    pub fn add(&mut self, credentials: impl IntoIterator<Item = ArchiveServiceCredential>) {
        for credential in credentials {
            self.credentials
                .entry(credential.redemption_time_secs)
                .or_insert(credential);
        }
    }

    /// Drop credentials for days before the one containing `now_ms`
    pub fn prune(&mut self, now_ms: i64) -> usize {
        let today = day_start_secs(now_ms);
        let before = self.credentials.len();
        self.credentials.retain(|day, _| *day >= today);
        before - self.credentials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = SECONDS_PER_DAY * 1000;

    fn credential(day: i64, tag: &str) -> ArchiveServiceCredential {
        ArchiveServiceCredential {
            redemption_time_secs: day * SECONDS_PER_DAY,
            credential: tag.to_string(),
        }
    }

    #[test]
    fn test_lookup_by_day() {
        let mut cache = CredentialCache::default();
        cache.add(vec![credential(10, "a"), credential(11, "b")]);

        let noon_day_10 = 10 * DAY_MS + DAY_MS / 2;
        assert_eq!(cache.for_day(noon_day_10).unwrap().credential, "a");
        assert_eq!(cache.for_day(11 * DAY_MS).unwrap().credential, "b");
        assert!(cache.for_day(12 * DAY_MS).is_none());
    }

    #[test]
    fn test_entries_are_immutable_once_added() {
        let mut cache = CredentialCache::default();
        cache.add(vec![credential(10, "first")]);
        cache.add(vec![credential(10, "second")]);
        assert_eq!(cache.for_day(10 * DAY_MS).unwrap().credential, "first");
    }

    #[test]
    fn test_prune_drops_past_days() {
        let mut cache = CredentialCache::default();
        cache.add(vec![credential(8, "a"), credential(9, "b"), credential(10, "c")]);
        assert_eq!(cache.prune(10 * DAY_MS + 5), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_round_trips_through_json() {
        let mut cache = CredentialCache::default();
        cache.add(vec![credential(3, "x")]);
        let json = serde_json::to_string(&cache).unwrap();
        let restored: CredentialCache = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, cache);
    }
}
