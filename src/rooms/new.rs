use serde_json::json;

use super::validate_room_name;
use crate::app::ChatApp;
use crate::gateway::server_timestamp;
use crate::{AppResult, ChatError, DEFAULT_ROOM_NAME};

impl ChatApp {
    /// Creates a room from the modal form. Validation failures surface as
    /// inline help and skip the remote write; on success the new room is
    /// shown by navigating to it. Returns whether the room was created.
    pub async fn create_room(&mut self, name: &str) -> AppResult<bool> {
        let name = name.trim();
        self.view.reset_create_room_modal();
        if let Err(e) = validate_room_name(name, &self.cache) {
            self.view.show_create_room_error(e.to_string());
            return Ok(false);
        }
        let uid = self
            .session
            .current_uid
            .clone()
            .ok_or(ChatError::NotSignedIn)?;
        let record = json!({
            "createdAt": server_timestamp(),
            "createdByUID": uid,
        });
        if let Err(e) = self.gateway.set(&format!("rooms/{name}"), record).await {
            log::error!("ルーム作成に失敗: {e}");
            return Ok(false);
        }
        self.change_location_hash(name);
        Ok(true)
    }

    /// Removes a room and its message subtree. The default room refuses;
    /// the resulting rooms notification moves everyone still in the room
    /// back to the default room.
    pub async fn delete_room(&mut self, name: &str) -> AppResult<()> {
        if name == DEFAULT_ROOM_NAME {
            return Err(ChatError::UndeletableRoom(name.to_owned()).into());
        }
        if let Err(e) = self.gateway.remove(&format!("rooms/{name}")).await {
            log::error!("ルーム削除に失敗: {e}");
            return Ok(());
        }
        if let Err(e) = self.gateway.remove(&format!("messages/{name}")).await {
            log::error!("メッセージ削除に失敗: {e}");
        }
        Ok(())
    }
}
