use crate::app::ChatApp;
use crate::gateway::SubKind;
use crate::view;
use crate::{AppResult, DEFAULT_ROOM_NAME};

impl ChatApp {
    /// Puts a room on screen: swaps the message stream, relabels the
    /// navbar and re-highlights the room list. Unknown names are logged
    /// and ignored.
    pub(crate) fn show_room(&mut self, name: &str) {
        if !self.cache.has_room(name) {
            log::error!("該当するルームがありません: {name}");
            return;
        }
        self.session.current_room = Some(name.to_owned());
        self.message_rows.clear();
        self.view.clear_messages();
        // detach the old stream before attaching the new one
        self.messages_sub = None;
        self.messages_sub = Some(self.gateway.subscribe(
            &format!("messages/{name}"),
            SubKind::ChildAdded,
            self.events_tx.clone(),
        ));
        self.view.navbar_room_label = format!("ルーム: {name}");
        self.view.delete_room_enabled = name != DEFAULT_ROOM_NAME;
        self.view.room_list = view::render_room_list(&self.cache.room_order, Some(name));
    }

    /// Reconciles the fragment, the cache and the room on screen. Runs
    /// once both mirrors have data. Redirects go through the fragment so
    /// this path and the hash-change path never both call `show_room`.
    pub(crate) fn show_current_room(&mut self) -> AppResult<()> {
        if let Some(current) = self.session.current_room.clone() {
            if !self.cache.has_room(&current) {
                // the room we were in is gone
                self.change_location_hash(DEFAULT_ROOM_NAME);
            }
        } else if !self.location_hash.is_empty() {
            let name = urlencoding::decode(&self.location_hash)?.into_owned();
            if self.cache.has_room(&name) {
                self.show_room(&name);
            } else {
                self.change_location_hash(DEFAULT_ROOM_NAME);
            }
        } else {
            self.change_location_hash(DEFAULT_ROOM_NAME);
        }
        Ok(())
    }
}
