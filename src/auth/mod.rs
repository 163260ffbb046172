use crate::AppResult;
use crate::app::ChatApp;
use crate::gateway::{AuthCode, AuthError};

const MSG_WEAK_PASSWORD: &str = "6文字以上のパスワードを入力してください";
const MSG_WRONG_PASSWORD: &str = "正しいパスワードを入力してください";
const MSG_TOO_MANY_REQUESTS: &str = "試行回数が多すぎます。後ほどお試しください。";
const MSG_INVALID_EMAIL: &str = "メールアドレスを正しく入力してください";
const MSG_LOGIN_FAILED: &str = "ログインに失敗しました";

impl ChatApp {
    /// Login form submit: tries to sign in and falls back to creating the
    /// account when it does not exist yet. Success arrives later as an
    /// auth-state event; failures are classified into exactly one inline
    /// message.
    pub async fn login(&mut self, email: &str, password: &str) -> AppResult<()> {
        self.view.reset_login_form();
        self.view.login.submit_enabled = false;
        self.view.login.submit_label = "送信中…".to_owned();
        match self.gateway.sign_in(email, password).await {
            Ok(_) => {}
            Err(e) if e.code == AuthCode::UserNotFound => {
                if let Err(e) = self.gateway.create_account(email, password).await {
                    self.on_create_account_error(&e);
                }
            }
            Err(e) => self.on_sign_in_error(&e),
        }
        Ok(())
    }

    pub async fn logout(&mut self) -> AppResult<()> {
        match self.gateway.sign_out().await {
            Ok(()) => self.set_location_hash(""),
            Err(e) => log::error!("ログアウトに失敗: {e}"),
        }
        Ok(())
    }

    fn on_sign_in_error(&mut self, error: &AuthError) {
        match error.code {
            AuthCode::WrongPassword => self.on_wrong_password(),
            AuthCode::TooManyRequests => self.on_too_many_requests(),
            AuthCode::InvalidEmail => self.on_invalid_email(),
            _ => self.on_other_login_error(),
        }
    }

    fn on_create_account_error(&mut self, error: &AuthError) {
        log::error!("ユーザ作成に失敗: {error}");
        match error.code {
            AuthCode::WeakPassword => self.on_weak_password(),
            _ => self.on_other_login_error(),
        }
    }

    fn on_weak_password(&mut self) {
        self.view.reset_login_form();
        self.view.login.password_error = true;
        self.view.login.help = Some(MSG_WEAK_PASSWORD.to_owned());
    }

    fn on_wrong_password(&mut self) {
        self.view.reset_login_form();
        self.view.login.password_error = true;
        self.view.login.help = Some(MSG_WRONG_PASSWORD.to_owned());
    }

    fn on_too_many_requests(&mut self) {
        self.view.reset_login_form();
        self.view.login.submit_enabled = false;
        self.view.login.help = Some(MSG_TOO_MANY_REQUESTS.to_owned());
    }

    fn on_invalid_email(&mut self) {
        self.view.reset_login_form();
        self.view.login.email_error = true;
        self.view.login.help = Some(MSG_INVALID_EMAIL.to_owned());
    }

    fn on_other_login_error(&mut self) {
        self.view.reset_login_form();
        self.view.login.help = Some(MSG_LOGIN_FAILED.to_owned());
    }
}
