mod msg;
mod new;
mod room;

use thiserror::Error;

use crate::cache::DbCache;

/// Characters the backend cannot use in a tree key.
pub const FORBIDDEN_NAME_CHARS: &[char] = &['.', '$', '#', '[', ']', '/'];
pub const MAX_NAME_LEN: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomNameError {
    #[error("ルーム名に次の文字は使えません: . $ # [ ] /")]
    ForbiddenCharacter,
    #[error("1文字以上20文字以内で入力してください")]
    Length,
    #[error("同じ名前のルームがすでに存在します")]
    Duplicate,
}

/// First failing check wins. A duplicate name returns here, so no write
/// ever reaches the gateway for it.
pub fn validate_room_name(name: &str, cache: &DbCache) -> Result<(), RoomNameError> {
    if name.contains(FORBIDDEN_NAME_CHARS) {
        return Err(RoomNameError::ForbiddenCharacter);
    }
    let len = name.chars().count();
    if len < 1 || len > MAX_NAME_LEN {
        return Err(RoomNameError::Length);
    }
    if cache.has_room(name) {
        return Err(RoomNameError::Duplicate);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Snapshot;
    use serde_json::json;

    fn cache_with(names: &[&str]) -> DbCache {
        let mut cache = DbCache::default();
        cache
            .replace_rooms(&Snapshot {
                children: names
                    .iter()
                    .map(|n| (n.to_string(), json!({"createdByUID": "u1"})))
                    .collect(),
            })
            .unwrap();
        cache
    }

    #[test]
    fn every_forbidden_character_is_rejected() {
        let cache = cache_with(&["default"]);
        for c in FORBIDDEN_NAME_CHARS {
            let name = format!("room{c}name");
            assert_eq!(
                validate_room_name(&name, &cache),
                Err(RoomNameError::ForbiddenCharacter),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn length_bounds_are_one_to_twenty() {
        let cache = cache_with(&["default"]);
        assert_eq!(validate_room_name("", &cache), Err(RoomNameError::Length));
        assert_eq!(
            validate_room_name(&"あ".repeat(21), &cache),
            Err(RoomNameError::Length)
        );
        assert_eq!(validate_room_name(&"あ".repeat(20), &cache), Ok(()));
        assert_eq!(validate_room_name("a", &cache), Ok(()));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let cache = cache_with(&["default", "general"]);
        assert_eq!(
            validate_room_name("general", &cache),
            Err(RoomNameError::Duplicate)
        );
    }

    #[test]
    fn charset_outranks_length_and_duplicates() {
        let cache = cache_with(&["a/b"]);
        // 22 chars AND a forbidden char: the charset message wins
        assert_eq!(
            validate_room_name(&format!("{}$", "x".repeat(21)), &cache),
            Err(RoomNameError::ForbiddenCharacter)
        );
    }
}
