//! Room name normalization
//!
//! Speech-to-text output often truncates or pads room names ("living roo",
//! "the lounge"). Lookup is exact first, then the first alias in table
//! order where either string is a prefix of the other, then the default
//! room. Table order therefore decides ties and must not be shuffled.

use crate::state::Room;

/// Alias table, scanned top to bottom
const ALIASES: &[(&str, Room)] = &[
    ("living room", Room::LivingRoom),
    ("living-room", Room::LivingRoom),
    ("livingroom", Room::LivingRoom),
    ("living", Room::LivingRoom),
    ("lounge", Room::LivingRoom),
    ("family room", Room::LivingRoom),
    ("front room", Room::LivingRoom),
    ("master bedroom", Room::Bedroom),
    ("bedroom", Room::Bedroom),
    ("bed room", Room::Bedroom),
    ("master", Room::Bedroom),
    ("guest room", Room::Bedroom),
    ("kitchen", Room::Kitchen),
    ("kitchenette", Room::Kitchen),
];

#[derive(Debug, Clone)]
pub struct RoomNormalizer {
    default_room: Room,
}

impl RoomNormalizer {
    pub fn new(default_room: Room) -> Self {
        Self { default_room }
    }

    pub fn default_room(&self) -> Room {
        self.default_room
    }

    /// Map a raw room phrase to a canonical room. Never fails.
    pub fn normalize(&self, raw: &str) -> Room {
        let lowered = raw.trim().to_lowercase();
        let name = match lowered.strip_prefix("the") {
            Some(rest) if rest.is_empty() || rest.starts_with(' ') => rest.trim(),
            _ => lowered.as_str(),
        };
        if name.is_empty() {
            return self.default_room;
        }

        if let Some((_, room)) = ALIASES.iter().find(|(alias, _)| *alias == name) {
            return *room;
        }

        ALIASES
            .iter()
            .find(|(alias, _)| name.starts_with(alias) || alias.starts_with(name))
            .map(|(_, room)| *room)
            .unwrap_or(self.default_room)
    }
}

impl Default for RoomNormalizer {
    fn default() -> Self {
        Self::new(Room::LivingRoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_alias_is_exact() {
        let normalizer = RoomNormalizer::default();
        for (alias, room) in ALIASES {
            assert_eq!(normalizer.normalize(alias), *room, "alias {alias}");
        }
    }

    #[test]
    fn test_truncated_aliases_resolve() {
        let normalizer = RoomNormalizer::new(Room::Kitchen);
        assert_eq!(normalizer.normalize("living roo"), Room::LivingRoom);
        assert_eq!(normalizer.normalize("bedr"), Room::Bedroom);
        assert_eq!(normalizer.normalize("kitch"), Room::Kitchen);
        assert_eq!(normalizer.normalize("loun"), Room::LivingRoom);
    }

    #[test]
    fn test_every_alias_prefix_resolves_to_first_matching_entry() {
        let normalizer = RoomNormalizer::new(Room::Kitchen);
        for (alias, _) in ALIASES {
            for end in 1..alias.len() {
                let truncated = &alias[..end];
                if truncated.trim().is_empty() || truncated.ends_with(' ') {
                    continue;
                }
                let expected = ALIASES
                    .iter()
                    .find(|(a, _)| *a == truncated)
                    .or_else(|| {
                        ALIASES
                            .iter()
                            .find(|(a, _)| truncated.starts_with(a) || a.starts_with(truncated))
                    })
                    .map(|(_, room)| *room)
                    .unwrap();
                assert_eq!(normalizer.normalize(truncated), expected, "prefix {truncated:?}");
            }
        }
    }

    #[test]
    fn test_longer_input_matches_alias_prefix() {
        let normalizer = RoomNormalizer::default();
        assert_eq!(normalizer.normalize("kitchen area"), Room::Kitchen);
        assert_eq!(normalizer.normalize("master suite"), Room::Bedroom);
    }

    #[test]
    fn test_case_whitespace_and_article() {
        let normalizer = RoomNormalizer::default();
        assert_eq!(normalizer.normalize("  BEDROOM "), Room::Bedroom);
        assert_eq!(normalizer.normalize("the kitchen"), Room::Kitchen);
        assert_eq!(normalizer.normalize("the"), Room::LivingRoom);
    }

    #[test]
    fn test_unknown_resolves_to_default() {
        let normalizer = RoomNormalizer::new(Room::Bedroom);
        assert_eq!(normalizer.normalize("garage"), Room::Bedroom);
        assert_eq!(normalizer.normalize(""), Room::Bedroom);
        assert_eq!(normalizer.normalize("   "), Room::Bedroom);
    }
}
