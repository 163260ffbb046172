use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::AppResult;
use crate::gateway::Snapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub nickname: String,
    #[serde(rename = "profileImageLocation", default, skip_serializing_if = "Option::is_none")]
    pub profile_image_location: Option<String>,
    /// Resolved download URL, derived locally and never written back.
    #[serde(skip)]
    pub profile_image_url: Option<String>,
    #[serde(rename = "createdAt", default)]
    pub created_at: i64,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "createdAt", default)]
    pub created_at: i64,
    #[serde(rename = "createdByUID", default)]
    pub created_by_uid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub uid: String,
    pub text: String,
    /// Client-supplied epoch millis at send time.
    pub time: i64,
}

/// Mirrors of the two subscribed subtrees. Each mirror is overwritten
/// wholesale on every value notification, never diffed.
#[derive(Debug, Default)]
pub struct DbCache {
    pub users: HashMap<String, User>,
    pub rooms: HashMap<String, Room>,
    /// Room names in listing order (sort priority first, then key order).
    pub room_order: Vec<String>,
    users_loaded: bool,
    rooms_loaded: bool,
}

impl DbCache {
    pub fn replace_users(&mut self, snapshot: &Snapshot) -> AppResult<()> {
        let mut users = HashMap::with_capacity(snapshot.children.len());
        for (uid, value) in &snapshot.children {
            let user: User = serde_json::from_value(value.clone())?;
            users.insert(uid.clone(), user);
        }
        self.users = users;
        self.users_loaded = true;
        Ok(())
    }

    pub fn replace_rooms(&mut self, snapshot: &Snapshot) -> AppResult<()> {
        let mut rooms = HashMap::with_capacity(snapshot.children.len());
        let mut order = Vec::with_capacity(snapshot.children.len());
        for (name, value) in &snapshot.children {
            let room: Room = serde_json::from_value(value.clone())?;
            rooms.insert(name.clone(), room);
            order.push(name.clone());
        }
        self.rooms = rooms;
        self.room_order = order;
        self.rooms_loaded = true;
        Ok(())
    }

    pub fn users_loaded(&self) -> bool {
        self.users_loaded
    }

    pub fn rooms_loaded(&self) -> bool {
        self.rooms_loaded
    }

    pub fn has_room(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }
}
