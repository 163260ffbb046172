use time::OffsetDateTime;
use time::macros::format_description;

use crate::include_res;

pub const DEFAULT_PROFILE_IMAGE_URL: &str = "img/default-profile-image.png";
pub const FILE_LABEL_PLACEHOLDER: &str = "ファイルを選択";
const NAVBAR_ROOM_PLACEHOLDER: &str = "ルーム";
const LOGIN_BUTTON_LABEL: &str = "ログイン";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopView {
    Login,
    Chat,
}

#[derive(Debug)]
pub struct LoginForm {
    pub help: Option<String>,
    pub email_error: bool,
    pub password_error: bool,
    pub submit_enabled: bool,
    pub submit_label: String,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self {
            help: None,
            email_error: false,
            password_error: false,
            submit_enabled: true,
            submit_label: LOGIN_BUTTON_LABEL.to_owned(),
        }
    }
}

#[derive(Debug, Default)]
pub struct CreateRoomForm {
    pub help: Option<String>,
    pub name_error: bool,
}

#[derive(Debug)]
pub struct SettingsForm {
    pub nickname: String,
    pub preview_image_url: String,
    pub file_label: String,
}

impl Default for SettingsForm {
    fn default() -> Self {
        Self {
            nickname: String::new(),
            preview_image_url: DEFAULT_PROFILE_IMAGE_URL.to_owned(),
            file_label: FILE_LABEL_PLACEHOLDER.to_owned(),
        }
    }
}

/// The rendered surface: HTML fragments plus control state, standing in
/// for the DOM the browser client mutates in place.
#[derive(Debug)]
pub struct ViewState {
    pub current: TopView,
    pub navbar_room_label: String,
    pub profile_name: String,
    pub profile_image_url: String,
    /// Rendered room links, listing order, active room highlighted.
    pub room_list: Vec<String>,
    /// Rendered message bubbles, arrival order.
    pub messages: Vec<String>,
    pub delete_room_enabled: bool,
    pub scroll_to_bottom: bool,
    pub login: LoginForm,
    pub create_room: CreateRoomForm,
    pub settings: SettingsForm,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            current: TopView::Login,
            navbar_room_label: NAVBAR_ROOM_PLACEHOLDER.to_owned(),
            profile_name: String::new(),
            profile_image_url: DEFAULT_PROFILE_IMAGE_URL.to_owned(),
            room_list: Vec::new(),
            messages: Vec::new(),
            delete_room_enabled: false,
            scroll_to_bottom: false,
            login: LoginForm::default(),
            create_room: CreateRoomForm::default(),
            settings: SettingsForm::default(),
        }
    }
}

impl ViewState {
    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.scroll_to_bottom = false;
    }

    pub fn push_message(&mut self, html: String) {
        self.messages.push(html);
        self.scroll_to_bottom = true;
    }

    pub fn clear_navbar(&mut self) {
        self.navbar_room_label = NAVBAR_ROOM_PLACEHOLDER.to_owned();
        self.profile_name.clear();
        self.profile_image_url = DEFAULT_PROFILE_IMAGE_URL.to_owned();
        self.room_list.clear();
    }

    pub fn reset_chat_view(&mut self) {
        self.clear_messages();
        self.clear_navbar();
        self.delete_room_enabled = false;
        self.settings.preview_image_url = DEFAULT_PROFILE_IMAGE_URL.to_owned();
    }

    pub fn reset_login_form(&mut self) {
        self.login = LoginForm::default();
    }

    pub fn reset_settings_modal(&mut self) {
        self.settings = SettingsForm::default();
    }

    pub fn reset_create_room_modal(&mut self) {
        self.create_room = CreateRoomForm::default();
    }

    pub fn show_create_room_error(&mut self, message: String) {
        self.create_room.help = Some(message);
        self.create_room.name_error = true;
    }
}

pub fn render_room_list(order: &[String], active: Option<&str>) -> Vec<String> {
    order
        .iter()
        .map(|name| {
            let active_class = if active == Some(name.as_str()) {
                " active"
            } else {
                ""
            };
            include_res!(str, "/pages/room_item.html")
                .replace("{href}", &urlencoding::encode(name))
                .replace("{active}", active_class)
                .replace("{name}", &escape_html(name))
        })
        .collect()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn format_date(millis: i64) -> String {
    let date = format_description!("[year]/[month]/[day]");
    let time = format_description!("[hour]:[minute]:[second]");
    let dt = OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    format!(
        "{}&nbsp;&nbsp;{}",
        dt.format(date).unwrap_or_default(),
        dt.format(time).unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_date_matches_display_shape() {
        // 2024-01-02 03:04:05 UTC
        assert_eq!(
            format_date(1_704_164_645_000),
            "2024/01/02&nbsp;&nbsp;03:04:05"
        );
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html(r#"<b>&"'</b>"#),
            "&lt;b&gt;&amp;&quot;&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn room_list_highlights_the_active_entry() {
        let rendered = render_room_list(
            &["default".to_owned(), "general".to_owned()],
            Some("general"),
        );
        assert!(!rendered[0].contains("active"));
        assert!(rendered[1].contains("room-list__link room-list-dynamic active"));
        assert!(rendered[1].contains("href=\"#general\""));
    }

    #[test]
    fn reset_login_form_restores_the_submit_button() {
        let mut view = ViewState::default();
        view.login.submit_enabled = false;
        view.login.submit_label = "送信中…".to_owned();
        view.login.help = Some("x".to_owned());
        view.reset_login_form();
        assert!(view.login.submit_enabled);
        assert_eq!(view.login.submit_label, "ログイン");
        assert!(view.login.help.is_none());
    }
}
