//! Room registry.
//!
//! Maps room names to broker topics. The mapping is a closed set fixed at
//! construction and passed into the program explicitly - there is no
//! runtime registration and no ambient global table. Every valid room maps
//! to exactly one topic.

use std::collections::BTreeMap;

use thiserror::Error;

/// Lookup failure for a room name outside the registry.
///
/// Fatal at startup: the program must exit without attempting a connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown room '{room}' (known rooms: {})", known.join(", "))]
pub struct UnknownRoom {
    /// The room name that was requested.
    pub room: String,
    /// Room names the registry does know, sorted.
    pub known: Vec<String>,
}

/// Read-only mapping from room name to broker topic.
///
/// Backed by a `BTreeMap` so iteration order (and therefore error output)
/// is deterministic.
#[derive(Debug, Clone)]
pub struct RoomRegistry {
    rooms: BTreeMap<String, String>,
}

impl RoomRegistry {
    /// Build a registry from `(room, topic)` pairs.
    pub fn new<R, T>(rooms: impl IntoIterator<Item = (R, T)>) -> Self
    where
        R: Into<String>,
        T: Into<String>,
    {
        Self {
            rooms: rooms.into_iter().map(|(room, topic)| (room.into(), topic.into())).collect(),
        }
    }

    /// Resolve a room name to its topic.
    pub fn lookup(&self, room: &str) -> Result<&str, UnknownRoom> {
        self.rooms.get(room).map(String::as_str).ok_or_else(|| UnknownRoom {
            room: room.to_owned(),
            known: self.room_names().map(str::to_owned).collect(),
        })
    }

    /// All known room names, sorted.
    pub fn room_names(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(String::as_str)
    }
}

impl Default for RoomRegistry {
    /// The built-in room set.
    fn default() -> Self {
        Self::new([("python", "movantchat/python")])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_maps_python_room() {
        let registry = RoomRegistry::default();
        assert_eq!(registry.lookup("python").unwrap(), "movantchat/python");
    }

    #[test]
    fn unknown_room_is_an_error() {
        let registry = RoomRegistry::default();

        let err = registry.lookup("rust").unwrap_err();
        assert_eq!(err.room, "rust");
        assert_eq!(err.known, vec!["python".to_owned()]);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let registry = RoomRegistry::default();
        assert!(registry.lookup("Python").is_err());
    }

    #[test]
    fn room_names_are_sorted() {
        let registry =
            RoomRegistry::new([("zig", "t/zig"), ("ada", "t/ada"), ("ml", "t/ml")]);

        let names: Vec<&str> = registry.room_names().collect();
        assert_eq!(names, vec!["ada", "ml", "zig"]);
    }

    #[test]
    fn error_message_lists_known_rooms() {
        let registry = RoomRegistry::default();

        let err = registry.lookup("go").unwrap_err();
        assert_eq!(err.to_string(), "unknown room 'go' (known rooms: python)");
    }
}
