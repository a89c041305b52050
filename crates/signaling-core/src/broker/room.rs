use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::types::UserId;

/// Produces `call-<caller>-to-<callee>-<millis>` room names.
///
/// The timestamp component is forced to increase strictly within the
/// process, so two calls never share a room even inside one millisecond.
pub struct RoomNameGenerator {
    last_stamp: AtomicI64,
}

impl RoomNameGenerator {
    pub fn new() -> Self {
        Self {
            last_stamp: AtomicI64::new(0),
        }
    }

    pub fn next(&self, caller_id: &UserId, callee_id: &UserId) -> String {
        let stamp = self.next_stamp(Utc::now().timestamp_millis());
        format!("call-{}-to-{}-{}", caller_id, callee_id, stamp)
    }

    fn next_stamp(&self, now_millis: i64) -> i64 {
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now_millis.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now_millis.max(previous + 1)
    }
}

impl Default for RoomNameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_room_name_format() {
        let rooms = RoomNameGenerator::new();
        let name = rooms.next(&UserId::from("A"), &UserId::from("B"));
        assert!(name.starts_with("call-A-to-B-"));
        assert!(name["call-A-to-B-".len()..].parse::<i64>().is_ok());
    }

    #[test]
    fn test_stamps_strictly_increase_within_same_millisecond() {
        let rooms = RoomNameGenerator::new();
        assert_eq!(rooms.next_stamp(1_000), 1_000);
        assert_eq!(rooms.next_stamp(1_000), 1_001);
        assert_eq!(rooms.next_stamp(999), 1_002);
        assert_eq!(rooms.next_stamp(5_000), 5_000);
    }

    #[test]
    fn test_room_names_never_repeat() {
        let rooms = RoomNameGenerator::new();
        let (a, b) = (UserId::from("A"), UserId::from("B"));
        let names: HashSet<String> = (0..1_000).map(|_| rooms.next(&a, &b)).collect();
        assert_eq!(names.len(), 1_000);
    }
}
