//! Match-scoped connection groups.
//!
//! The hub delegates "who is in this match" to a [`RoomAdapter`]. The
//! default [`InMemoryRoomAdapter`] keeps everything in this process; a
//! clustered strategy can be injected without touching the handler.

use dashmap::{DashMap, DashSet};
use std::fmt;
use tracing::{debug, trace};

/// Maximum match id length.
pub const MAX_MATCH_ID_LENGTH: usize = 256;

/// Validate a match identifier.
///
/// # Errors
///
/// Returns an error message if the identifier is invalid.
pub fn validate_match_id(match_id: &str) -> Result<(), &'static str> {
    if match_id.is_empty() {
        return Err("Match id cannot be empty");
    }
    if match_id.len() > MAX_MATCH_ID_LENGTH {
        return Err("Match id too long");
    }
    if !match_id.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Match id contains invalid characters");
    }
    Ok(())
}

/// Strategy for distributing connections into match groups.
pub trait RoomAdapter: Send + Sync + fmt::Debug {
    /// Strategy name, for logs and configuration.
    fn name(&self) -> &'static str;

    /// Put a connection into a group.
    fn join(&self, connection_id: &str, group: &str);

    /// Take a connection out of a group.
    ///
    /// Returns `true` if the connection was a member.
    fn leave(&self, connection_id: &str, group: &str) -> bool;

    /// Take a connection out of every group it is in.
    ///
    /// Returns the groups it left.
    fn leave_all(&self, connection_id: &str) -> Vec<String>;

    /// Members of a group.
    fn members(&self, group: &str) -> Vec<String>;

    /// Groups a connection belongs to.
    fn groups_of(&self, connection_id: &str) -> Vec<String>;

    /// Number of non-empty groups.
    fn group_count(&self) -> usize;
}

/// In-process group membership.
#[derive(Debug, Default)]
pub struct InMemoryRoomAdapter {
    /// Group → members.
    groups: DashMap<String, DashSet<String>>,
    /// Connection → groups.
    memberships: DashMap<String, DashSet<String>>,
}

impl InMemoryRoomAdapter {
    /// Create an empty adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_member(&self, connection_id: &str, group: &str) -> bool {
        let Some(members) = self.groups.get(group) else {
            return false;
        };
        let removed = members.remove(connection_id).is_some();
        let empty = members.is_empty();
        drop(members);

        if empty {
            self.groups.remove_if(group, |_, members| members.is_empty());
            debug!(group = %group, "Deleted empty group");
        }
        removed
    }
}

impl RoomAdapter for InMemoryRoomAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn join(&self, connection_id: &str, group: &str) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(connection_id.to_string());
        self.memberships
            .entry(connection_id.to_string())
            .or_default()
            .insert(group.to_string());
        trace!(group = %group, connection = %connection_id, "Joined group");
    }

    fn leave(&self, connection_id: &str, group: &str) -> bool {
        if let Some(groups) = self.memberships.get(connection_id) {
            groups.remove(group);
        }
        self.memberships
            .remove_if(connection_id, |_, groups| groups.is_empty());
        self.remove_member(connection_id, group)
    }

    fn leave_all(&self, connection_id: &str) -> Vec<String> {
        let Some((_, groups)) = self.memberships.remove(connection_id) else {
            return Vec::new();
        };
        let groups: Vec<String> = groups.into_iter().collect();
        for group in &groups {
            self.remove_member(connection_id, group);
        }
        trace!(connection = %connection_id, left = groups.len(), "Left all groups");
        groups
    }

    fn members(&self, group: &str) -> Vec<String> {
        self.groups
            .get(group)
            .map(|members| members.iter().map(|m| m.clone()).collect())
            .unwrap_or_default()
    }

    fn groups_of(&self, connection_id: &str) -> Vec<String> {
        self.memberships
            .get(connection_id)
            .map(|groups| groups.iter().map(|g| g.clone()).collect())
            .unwrap_or_default()
    }

    fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_id_validation() {
        assert!(validate_match_id("matchID").is_ok());
        assert!(validate_match_id("").is_err());
        assert!(validate_match_id("bad\nid").is_err());
        assert!(validate_match_id(&"a".repeat(MAX_MATCH_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_join_leave() {
        let adapter = InMemoryRoomAdapter::new();
        adapter.join("conn-1", "m");
        adapter.join("conn-2", "m");

        let mut members = adapter.members("m");
        members.sort();
        assert_eq!(members, vec!["conn-1", "conn-2"]);

        assert!(adapter.leave("conn-1", "m"));
        assert!(!adapter.leave("conn-1", "m"));
        assert_eq!(adapter.members("m"), vec!["conn-2"]);
        assert!(adapter.groups_of("conn-1").is_empty());
    }

    #[test]
    fn test_empty_groups_are_deleted() {
        let adapter = InMemoryRoomAdapter::new();
        adapter.join("conn-1", "a");
        adapter.join("conn-1", "b");
        assert_eq!(adapter.group_count(), 2);

        let mut left = adapter.leave_all("conn-1");
        left.sort();
        assert_eq!(left, vec!["a", "b"]);
        assert_eq!(adapter.group_count(), 0);
        assert!(adapter.leave_all("conn-1").is_empty());
    }
}
