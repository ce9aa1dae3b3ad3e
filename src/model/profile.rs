//! Developer profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-developer metadata stored at `developers/<id>/profile.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub developer_id: String,
    pub created_at: DateTime<Utc>,
    /// Last sync cycle that published this namespace. Never moves backwards.
    pub last_synced: Option<DateTime<Utc>>,
    /// Set once by `migrate`.
    #[serde(default)]
    pub migrated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    #[must_use]
    pub fn new(developer_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            developer_id: developer_id.to_string(),
            created_at: now,
            last_synced: None,
            migrated_at: None,
            updated_at: now,
        }
    }

    /// Record a sync at `at`, keeping `last_synced` monotonic.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        let next = self.last_synced.map_or(at, |prev| prev.max(at));
        self.last_synced = Some(next);
        self.updated_at = self.updated_at.max(at);
    }

    /// Whether the profile has not synced within `max_age`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.last_synced.is_none_or(|at| now - at > max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_last_synced_never_decreases() {
        let now = Utc::now();
        let mut profile = Profile::new("ana", now);
        profile.mark_synced(now);
        profile.mark_synced(now - Duration::hours(3));
        assert_eq!(profile.last_synced, Some(now));
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let mut profile = Profile::new("ana", now);
        assert!(profile.is_stale(now, Duration::hours(24)));

        profile.mark_synced(now - Duration::hours(2));
        assert!(!profile.is_stale(now, Duration::hours(24)));
        assert!(profile.is_stale(now, Duration::hours(1)));
    }
}
