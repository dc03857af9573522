use serde::{Deserialize, Serialize};

/// A playable character extracted from the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    #[serde(rename = "character_name")]
    pub name: String,
    #[serde(rename = "character_abilities", alias = "character_abilites")]
    pub abilities: String,
    #[serde(rename = "character_weaknesses")]
    pub weaknesses: String,
}

impl Character {
    /// Case-insensitive exact name lookup; surrounding whitespace is ignored on both sides.
    pub fn find<'a>(characters: &'a [Character], name: &str) -> Option<&'a Character> {
        let wanted = name.trim().to_lowercase();
        characters
            .iter()
            .find(|c| c.name.trim().to_lowercase() == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<Character> {
        vec![
            Character {
                name: "Alice".to_string(),
                abilities: "lockpicking".to_string(),
                weaknesses: "impatience".to_string(),
            },
            Character {
                name: "Old Tom".to_string(),
                abilities: "lore".to_string(),
                weaknesses: "bad knees".to_string(),
            },
        ]
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let roster = roster();
        assert_eq!(Character::find(&roster, "alice").map(|c| c.name.as_str()), Some("Alice"));
        assert_eq!(Character::find(&roster, "OLD TOM").map(|c| c.name.as_str()), Some("Old Tom"));
        assert_eq!(Character::find(&roster, "  Alice ").map(|c| c.name.as_str()), Some("Alice"));
    }

    #[test]
    fn test_find_ignores_padding_on_stored_names() {
        let mut roster = roster();
        roster[0].name = " Alice ".to_string();
        let found = Character::find(&roster, "alice").map(|c| c.name.as_str());
        assert_eq!(found, Some(" Alice "));
    }

    #[test]
    fn test_find_requires_whole_name() {
        let roster = roster();
        assert!(Character::find(&roster, "Ali").is_none());
        assert!(Character::find(&roster, "Tom").is_none());
        assert!(Character::find(&roster, "").is_none());
    }

    #[test]
    fn test_deserializes_misspelt_abilities_key() {
        let json = r#"{"character_name": "Bob", "character_abilites": "archery", "character_weaknesses": "vertigo"}"#;
        let c: Character = serde_json::from_str(json).expect("alias should be accepted");
        assert_eq!(c.abilities, "archery");
    }
}
