use serde_json::{Value, json};

use crate::app::ChatApp;
use crate::cache::Message;
use crate::gateway::{SubHandle, SubId, now_millis};
use crate::view;
use crate::{AppResult, ChatError, include_res};

impl ChatApp {
    /// Composer submit: empty text is dropped quietly, anything else is
    /// pushed under the current room with the client clock as send time.
    pub async fn submit_message(&mut self, text: &str) -> AppResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let Some(room) = self.session.current_room.clone() else {
            return Ok(());
        };
        let uid = self
            .session
            .current_uid
            .clone()
            .ok_or(ChatError::NotSignedIn)?;
        let body = json!({
            "uid": uid,
            "text": text,
            "time": now_millis(),
        });
        if let Err(e) = self.gateway.push(&format!("messages/{room}"), body).await {
            log::error!("メッセージの送信に失敗: {e}");
        }
        Ok(())
    }

    pub(crate) fn on_message_added(
        &mut self,
        sub: SubId,
        path: &str,
        key: String,
        value: Value,
    ) -> AppResult<()> {
        if self.messages_sub.as_ref().map(SubHandle::id) != Some(sub) {
            // stale subscription, already detached
            return Ok(());
        }
        let Some(room) = path.strip_prefix("messages/") else {
            return Ok(());
        };
        if self.session.current_room.as_deref() != Some(room) {
            // delivery raced a room switch
            return Ok(());
        }
        let message: Message = serde_json::from_value(value)?;
        let html = self.render_message(&key, &message);
        self.message_rows.push((key, message));
        self.view.push_message(html);
        Ok(())
    }

    pub(crate) fn render_message(&self, key: &str, message: &Message) -> String {
        let own = self.session.current_uid.as_deref() == Some(message.uid.as_str());
        let template = if own {
            include_res!(str, "/pages/message_sent.html")
        } else {
            include_res!(str, "/pages/message_received.html")
        };
        let user = self.cache.users.get(&message.uid);
        let nickname = user.map(|u| u.nickname.as_str()).unwrap_or("");
        let image_url = user
            .and_then(|u| u.profile_image_url.as_deref())
            .unwrap_or(view::DEFAULT_PROFILE_IMAGE_URL);
        template
            .replace("{message_id}", &view::escape_html(key))
            .replace("{uid}", &view::escape_html(&message.uid))
            .replace("{nickname}", &view::escape_html(nickname))
            .replace("{image_url}", &view::escape_html(image_url))
            .replace("{text}", &view::escape_html(&message.text))
            .replace("{time}", &view::format_date(message.time))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::mpsc::unbounded_channel;

    use crate::ChatApp;
    use crate::gateway::memory::MemoryGateway;
    use crate::gateway::{Gateway, SubKind};

    fn message_body() -> serde_json::Value {
        json!({"uid": "u1", "text": "x", "time": 0})
    }

    #[tokio::test]
    async fn deliveries_from_a_detached_subscription_are_dropped() {
        let gw = Arc::new(MemoryGateway::new());
        let mut app = ChatApp::new(gw.clone());
        app.session.current_uid = Some("u1".to_owned());
        app.session.current_room = Some("general".to_owned());

        let (tx, _rx) = unbounded_channel();
        let old = gw.subscribe("messages/general", SubKind::ChildAdded, tx);
        let old_id = old.id();
        app.messages_sub =
            Some(gw.subscribe("messages/general", SubKind::ChildAdded, app.events_tx.clone()));

        app.on_message_added(old_id, "messages/general", "k1".to_owned(), message_body())
            .unwrap();
        assert!(app.view.messages.is_empty());
    }

    #[tokio::test]
    async fn deliveries_for_an_abandoned_room_are_dropped() {
        let gw = Arc::new(MemoryGateway::new());
        let mut app = ChatApp::new(gw.clone());
        app.session.current_uid = Some("u1".to_owned());
        let sub = gw.subscribe("messages/old", SubKind::ChildAdded, app.events_tx.clone());
        let id = sub.id();
        app.messages_sub = Some(sub);
        // the user has moved on while this delivery was in flight
        app.session.current_room = Some("new".to_owned());

        app.on_message_added(id, "messages/old", "k1".to_owned(), message_body())
            .unwrap();
        assert!(app.view.messages.is_empty());
        assert!(app.message_rows.is_empty());
    }
}
