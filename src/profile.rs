use serde_json::json;

use crate::app::ChatApp;
use crate::gateway::server_timestamp;
use crate::view::DEFAULT_PROFILE_IMAGE_URL;
use crate::{AppResult, ChatError};

impl ChatApp {
    /// Resolves one user's avatar into the cache. No stored location means
    /// the default image, with no gateway round-trip; a failed resolution
    /// falls back to the default image and is cached so renders don't
    /// retry it.
    pub(crate) async fn resolve_profile_image(&mut self, uid: &str) {
        let Some(user) = self.cache.users.get(uid) else {
            return;
        };
        let url = match user.profile_image_location.clone() {
            None => DEFAULT_PROFILE_IMAGE_URL.to_owned(),
            Some(location) => match self.gateway.download_url(&location).await {
                Ok(url) => url,
                Err(e) => {
                    log::error!("写真のダウンロードに失敗: {e}");
                    DEFAULT_PROFILE_IMAGE_URL.to_owned()
                }
            },
        };
        if let Some(user) = self.cache.users.get_mut(uid) {
            user.profile_image_url = Some(url);
        }
    }

    /// Settings change: empty nicknames are ignored, anything else is
    /// written through with a fresh updatedAt.
    pub async fn save_nickname(&mut self, nickname: &str) -> AppResult<()> {
        if nickname.is_empty() {
            return Ok(());
        }
        let uid = self
            .session
            .current_uid
            .clone()
            .ok_or(ChatError::NotSignedIn)?;
        let fields = json!({
            "nickname": nickname,
            "updatedAt": server_timestamp(),
        });
        if let Err(e) = self.gateway.update(&format!("users/{uid}"), fields).await {
            log::error!("ニックネームの保存に失敗: {e}");
        }
        Ok(())
    }

    /// Uploads the picked file to blob storage, shows the resolved URL in
    /// the preview and records the location on the user record.
    pub async fn upload_profile_image(
        &mut self,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> AppResult<()> {
        let uid = self
            .session
            .current_uid
            .clone()
            .ok_or(ChatError::NotSignedIn)?;
        self.view.settings.file_label = file_name.to_owned();
        let location = format!("profile-images/{uid}");
        if let Err(e) = self.gateway.upload(&location, bytes, content_type).await {
            log::error!("プロフィール画像のアップロードに失敗: {e}");
            return Ok(());
        }
        match self.gateway.download_url(&location).await {
            Ok(url) => self.view.settings.preview_image_url = url,
            Err(e) => log::error!("写真のダウンロードに失敗: {e}"),
        }
        let fields = json!({
            "profileImageLocation": location,
            "updatedAt": server_timestamp(),
        });
        if let Err(e) = self.gateway.update(&format!("users/{uid}"), fields).await {
            log::error!("プロフィール画像の保存に失敗: {e}");
        }
        Ok(())
    }

    /// Populates the settings modal. Returns false while user data hasn't
    /// arrived yet, in which case the modal stays closed.
    pub async fn open_settings(&mut self) -> AppResult<bool> {
        if !self.cache.users_loaded() {
            return Ok(false);
        }
        let Some(uid) = self.session.current_uid.clone() else {
            return Ok(false);
        };
        let Some(user) = self.cache.users.get(&uid).cloned() else {
            return Ok(false);
        };
        self.view.settings.nickname = user.nickname;
        if let Some(url) = user.profile_image_url {
            self.view.settings.preview_image_url = url;
        } else if let Some(location) = user.profile_image_location {
            if let Ok(url) = self.gateway.download_url(&location).await {
                self.view.settings.preview_image_url = url;
            }
        }
        Ok(true)
    }
}
