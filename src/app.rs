use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::cache::{DbCache, Message, Room, User};
use crate::gateway::{
    Gateway, GatewayEvent, Snapshot, SubHandle, SubId, SubKind, server_timestamp,
};
use crate::view::{self, TopView, ViewState};
use crate::{AppResult, DEFAULT_ROOM_NAME};

/// Who is signed in and which room is on screen. Constructed empty, torn
/// down on logout.
#[derive(Debug, Default)]
pub struct SessionState {
    pub current_uid: Option<String>,
    pub current_room: Option<String>,
}

/// The client: owns the event queue, the cache mirrors, the view state and
/// every live subscription handle. All work happens inside `pump`, one
/// event at a time.
pub struct ChatApp {
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) events_tx: UnboundedSender<GatewayEvent>,
    events: UnboundedReceiver<GatewayEvent>,
    hash_events: VecDeque<String>,
    pub(crate) location_hash: String,
    pub(crate) session: SessionState,
    pub(crate) cache: DbCache,
    pub(crate) view: ViewState,
    pub(crate) users_sub: Option<SubHandle>,
    pub(crate) rooms_sub: Option<SubHandle>,
    pub(crate) messages_sub: Option<SubHandle>,
    /// Raw message data behind the rendered fragments, arrival order.
    pub(crate) message_rows: Vec<(String, Message)>,
    _auth_watch: SubHandle,
}

impl ChatApp {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let auth_watch = gateway.watch_auth(events_tx.clone());
        Self {
            gateway,
            events_tx,
            events,
            hash_events: VecDeque::new(),
            location_hash: String::new(),
            session: SessionState::default(),
            cache: DbCache::default(),
            view: ViewState::default(),
            users_sub: None,
            rooms_sub: None,
            messages_sub: None,
            message_rows: Vec::new(),
            _auth_watch: auth_watch,
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn location_hash(&self) -> &str {
        &self.location_hash
    }

    /// The address bar: records the (percent-encoded) fragment and queues
    /// the change notification. Setting the same value again is a no-op,
    /// which is what keeps redirects from looping.
    pub fn set_location_hash(&mut self, hash: &str) {
        if self.location_hash == hash {
            return;
        }
        self.location_hash = hash.to_owned();
        self.hash_events.push_back(hash.to_owned());
    }

    pub(crate) fn change_location_hash(&mut self, room: &str) {
        let encoded = urlencoding::encode(room).into_owned();
        self.set_location_hash(&encoded);
    }

    /// Drains every queued notification. Handlers may enqueue further
    /// events (fragment redirects, provisioning echoes); those are drained
    /// in the same call.
    pub async fn pump(&mut self) -> AppResult<()> {
        loop {
            // gateway callbacks land before the (async) fragment-change
            // notification, like they would in a browser
            if let Ok(event) = self.events.try_recv() {
                self.handle_event(event).await?;
                continue;
            }
            match self.hash_events.pop_front() {
                Some(hash) => self.on_hash_changed(hash)?,
                None => break,
            }
        }
        Ok(())
    }

    fn on_hash_changed(&mut self, hash: String) -> AppResult<()> {
        if !hash.is_empty() {
            let name = urlencoding::decode(&hash)?.into_owned();
            self.show_room(&name);
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: GatewayEvent) -> AppResult<()> {
        match event {
            GatewayEvent::AuthState(Some(account)) => {
                self.session.current_uid = Some(account.uid);
                self.on_login();
            }
            GatewayEvent::AuthState(None) => {
                self.session.current_uid = None;
                self.on_logout();
            }
            GatewayEvent::Value {
                sub,
                path,
                snapshot,
            } => {
                if path == "users" && sub_is_live(&self.users_sub, sub) {
                    self.on_users_value(snapshot).await?;
                } else if path == "rooms" && sub_is_live(&self.rooms_sub, sub) {
                    self.on_rooms_value(snapshot).await?;
                }
            }
            GatewayEvent::ChildAdded {
                sub,
                path,
                key,
                value,
            } => {
                self.on_message_added(sub, &path, key, value)?;
            }
        }
        Ok(())
    }

    fn on_login(&mut self) {
        log::info!("ログイン完了");
        self.show_view(TopView::Chat);
    }

    fn on_logout(&mut self) {
        self.users_sub = None;
        self.rooms_sub = None;
        self.messages_sub = None;
        self.session.current_room = None;
        self.cache = DbCache::default();
        self.message_rows.clear();
        self.view.reset_login_form();
        self.view.reset_chat_view();
        self.view.reset_settings_modal();
        self.view.current = TopView::Login;
    }

    fn show_view(&mut self, top: TopView) {
        self.view.current = top;
        if top == TopView::Chat {
            self.load_chat_view();
        }
    }

    fn load_chat_view(&mut self) {
        self.view.reset_chat_view();
        self.cache = DbCache::default();
        self.message_rows.clear();
        // drop leftover listeners from a previous visit before attaching
        // fresh ones, otherwise callbacks double up across login cycles
        self.users_sub = None;
        self.rooms_sub = None;
        self.users_sub = Some(
            self.gateway
                .subscribe("users", SubKind::Value, self.events_tx.clone()),
        );
        self.rooms_sub = Some(
            self.gateway
                .subscribe("rooms", SubKind::Value, self.events_tx.clone()),
        );
    }

    async fn on_users_value(&mut self, snapshot: Snapshot) -> AppResult<()> {
        self.cache.replace_users(&snapshot)?;
        if let Some(uid) = self.session.current_uid.clone() {
            if !self.cache.users.contains_key(&uid) {
                if let Some(account) = self.gateway.current_account() {
                    self.provision_user(&uid, &account.email).await;
                }
            }
        }
        let uids: Vec<String> = self.cache.users.keys().cloned().collect();
        for uid in uids {
            self.resolve_profile_image(&uid).await;
        }
        self.refresh_user_displays();
        if self.session.current_room.is_none() && self.cache.rooms_loaded() {
            self.show_current_room()?;
        }
        Ok(())
    }

    async fn provision_user(&mut self, uid: &str, email: &str) {
        log::info!("ユーザデータを作成します");
        let record = json!({
            "nickname": email,
            "createdAt": server_timestamp(),
            "updatedAt": server_timestamp(),
        });
        if let Err(e) = self.gateway.set(&format!("users/{uid}"), record).await {
            log::error!("ユーザ作成に失敗: {e}");
            return;
        }
        // fold the record into the mirror so this pass can finish; the
        // echoed notification re-runs the handler idempotently
        self.cache.users.insert(
            uid.to_owned(),
            User {
                nickname: email.to_owned(),
                profile_image_location: None,
                profile_image_url: None,
                created_at: 0,
                updated_at: 0,
            },
        );
    }

    async fn on_rooms_value(&mut self, snapshot: Snapshot) -> AppResult<()> {
        self.cache.replace_rooms(&snapshot)?;
        if !self.cache.has_room(DEFAULT_ROOM_NAME) {
            self.provision_default_room().await;
        }
        self.view.room_list =
            view::render_room_list(&self.cache.room_order, self.session.current_room.as_deref());
        if !self.cache.users_loaded() {
            return Ok(());
        }
        self.show_current_room()
    }

    async fn provision_default_room(&mut self) {
        log::info!("{DEFAULT_ROOM_NAME}ルームを作成します");
        let uid = self.session.current_uid.clone().unwrap_or_default();
        let record = json!({
            "createdAt": server_timestamp(),
            "createdByUID": uid,
        });
        if let Err(e) = self
            .gateway
            .set_with_priority(&format!("rooms/{DEFAULT_ROOM_NAME}"), record, 1.0)
            .await
        {
            log::error!("{DEFAULT_ROOM_NAME}ルームの作成に失敗: {e}");
            return;
        }
        self.cache.rooms.insert(
            DEFAULT_ROOM_NAME.to_owned(),
            Room {
                created_at: 0,
                created_by_uid: uid,
            },
        );
        self.cache.room_order.insert(0, DEFAULT_ROOM_NAME.to_owned());
    }

    fn refresh_user_displays(&mut self) {
        if let Some(uid) = &self.session.current_uid {
            if let Some(user) = self.cache.users.get(uid) {
                self.view.profile_name = user.nickname.clone();
                self.view.profile_image_url = user
                    .profile_image_url
                    .clone()
                    .unwrap_or_else(|| view::DEFAULT_PROFILE_IMAGE_URL.to_owned());
            }
        }
        self.rerender_messages();
    }

    /// Nickname and avatar changes touch every bubble on screen, so the
    /// fragments are rebuilt from the cached rows. Does not scroll.
    pub(crate) fn rerender_messages(&mut self) {
        let rendered: Vec<String> = self
            .message_rows
            .iter()
            .map(|(key, message)| self.render_message(key, message))
            .collect();
        self.view.messages = rendered;
    }
}

fn sub_is_live(handle: &Option<SubHandle>, sub: SubId) -> bool {
    handle.as_ref().map(SubHandle::id) == Some(sub)
}
