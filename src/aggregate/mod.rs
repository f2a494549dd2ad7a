//! Aggregate module
//!
//! The economy is persisted as one versioned document. Entity types live in
//! their own submodules and each contributes the `Economy` operations that
//! act on it.

pub mod auction;
pub mod badges;
pub mod economy;
pub mod exchange;
pub mod ledger;
pub mod user;

pub use auction::{Auction, AuctionStatus, AuctionTransition, Bid, Bidder, NewAuction};
pub use badges::{AwardOutcome, BadgeSet, BadgeTrigger};
pub use economy::{Announcement, ConfigUpdate, Economy, SystemConfig};
pub use exchange::{ExchangeRequest, ExchangeStatus, ReviewDecision, ReviewOutcome};
pub use ledger::{PointsSummary, RecomputeReport};
pub use user::{AssignmentKind, AssignmentRecord, User, UserStatus};

use std::ops::{Deref, DerefMut};

use serde::de::DeserializeOwned;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A record stored in one of the document's collections.
pub trait Record: DeserializeOwned {
    /// Collection name used in logs
    const KIND: &'static str;

    /// Check invariants that serde cannot express
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A document collection decoded leniently.
///
/// Elements that are corrupt are left out of the working list but kept as
/// raw JSON at their original position, and serialized back unchanged, so a
/// save never erases stored data it could not read.
#[derive(Debug, Clone)]
pub struct RecordList<T> {
    records: Vec<T>,
    quarantined: Vec<(usize, serde_json::Value)>,
}

impl<T> RecordList<T> {
    /// Number of stored elements that could not be decoded
    pub fn quarantined(&self) -> usize {
        self.quarantined.len()
    }
}

impl<T> Default for RecordList<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            quarantined: Vec::new(),
        }
    }
}

impl<T> Deref for RecordList<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.records
    }
}

impl<T> DerefMut for RecordList<T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.records
    }
}

impl<'a, T> IntoIterator for &'a RecordList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl<T: Serialize> Serialize for RecordList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.records.len() + self.quarantined.len()))?;
        let mut records = self.records.iter();
        let mut raw = self.quarantined.iter().peekable();
        let mut position = 0;

        loop {
            if let Some((_, value)) = raw.next_if(|(at, _)| *at <= position) {
                seq.serialize_element(value)?;
            } else if let Some(record) = records.next() {
                seq.serialize_element(record)?;
            } else if let Some((_, value)) = raw.next() {
                seq.serialize_element(value)?;
            } else {
                break;
            }
            position += 1;
        }

        seq.end()
    }
}

impl<'de, T: Record> Deserialize<'de> for RecordList<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
        let mut list = RecordList {
            records: Vec::with_capacity(raw.len()),
            quarantined: Vec::new(),
        };

        for (position, value) in raw.into_iter().enumerate() {
            let id = value.get("id").map(|v| v.to_string()).unwrap_or_default();
            let rejected = match T::deserialize(&value) {
                Ok(record) => match record.check() {
                    Ok(()) => {
                        list.records.push(record);
                        None
                    }
                    Err(reason) => Some(reason),
                },
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = rejected {
                tracing::warn!(
                    kind = T::KIND,
                    id = %id,
                    reason = %reason,
                    "Quarantined corrupt record"
                );
                list.quarantined.push((position, value));
            }
        }

        if !list.quarantined.is_empty() {
            tracing::warn!(
                kind = T::KIND,
                kept = list.records.len(),
                quarantined = list.quarantined.len(),
                "Corrupt records kept aside while loading"
            );
        }

        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn announcement(message: &str) -> serde_json::Value {
        json!({
            "id": uuid::Uuid::new_v4(),
            "message": message,
            "author": "admin",
            "date": "2026-09-01T10:00:00Z"
        })
    }

    #[test]
    fn test_corrupt_elements_keep_their_position() {
        let stored = json!([announcement("first"), { "message": 12 }, announcement("third")]);
        let list: RecordList<Announcement> = serde_json::from_value(stored.clone()).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.quarantined(), 1);
        assert_eq!(serde_json::to_value(&list).unwrap(), stored);
    }

    #[test]
    fn test_new_records_follow_quarantined_ones() {
        let stored = json!([announcement("first"), { "broken": true }]);
        let mut list: RecordList<Announcement> = serde_json::from_value(stored).unwrap();
        list.push(Announcement {
            id: uuid::Uuid::new_v4(),
            message: "second".into(),
            author: "admin".into(),
            date: Utc::now(),
        });

        let written = serde_json::to_value(&list).unwrap();
        assert_eq!(written[0]["message"], "first");
        assert_eq!(written[1], json!({ "broken": true }));
        assert_eq!(written[2]["message"], "second");
    }
}
