use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::PublicKey;

/// Aggregate identity-tracking facts for one public key.
///
/// Never stored: always recomputed from the content currently associated with
/// the key. `exists` is true iff `content_count > 0`, and when it is, both
/// timestamps are present with `first_seen <= last_seen`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTrackingInfo {
    pub exists: bool,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub content_count: u64,
    pub public_key_base64: String,
}

impl UserTrackingInfo {
    /// Tracking info for a key with no associated content.
    pub fn unseen(public_key: &PublicKey) -> Self {
        Self {
            exists: false,
            first_seen: None,
            last_seen: None,
            content_count: 0,
            public_key_base64: public_key.to_base64(),
        }
    }

    /// Reduce the creation timestamps of a key's content items.
    ///
    /// Count is the number of items, first/last seen are the minimum and
    /// maximum timestamps. The order of `created_at` is irrelevant.
    pub fn from_timestamps<I>(public_key: &PublicKey, created_at: I) -> Self
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        created_at
            .into_iter()
            .fold(Self::unseen(public_key), |mut info, ts| {
                info.content_count += 1;
                info.exists = true;
                info.first_seen = Some(info.first_seen.map_or(ts, |f| f.min(ts)));
                info.last_seen = Some(info.last_seen.map_or(ts, |l| l.max(ts)));
                info
            })
    }

    /// A key with no prior content is a new user.
    pub fn is_new_user(&self) -> bool {
        !self.exists
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> PublicKey {
        PublicKey::from_bytes([3u8; 32])
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn unseen_key_does_not_exist() {
        let info = UserTrackingInfo::unseen(&key());
        assert!(!info.exists);
        assert_eq!(info.content_count, 0);
        assert!(info.first_seen.is_none());
        assert!(info.last_seen.is_none());
        assert!(info.is_new_user());
        assert_eq!(info.public_key_base64, key().to_base64());
    }

    #[test]
    fn empty_iterator_matches_unseen() {
        let info = UserTrackingInfo::from_timestamps(&key(), Vec::new());
        assert_eq!(info, UserTrackingInfo::unseen(&key()));
    }

    #[test]
    fn reduction_takes_min_and_max() {
        let info = UserTrackingInfo::from_timestamps(&key(), vec![at(50), at(10), at(90), at(30)]);
        assert!(info.exists);
        assert_eq!(info.content_count, 4);
        assert_eq!(info.first_seen, Some(at(10)));
        assert_eq!(info.last_seen, Some(at(90)));
        assert!(!info.is_new_user());
    }

    #[test]
    fn single_item_has_equal_bounds() {
        let info = UserTrackingInfo::from_timestamps(&key(), [at(42)]);
        assert_eq!(info.first_seen, info.last_seen);
        assert_eq!(info.content_count, 1);
    }
}
