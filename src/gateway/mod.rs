pub mod memory;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

pub type SubId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubKind {
    /// Full snapshot of the path, delivered on subscribe and after every
    /// change under the path.
    Value,
    /// One event per child: existing children are replayed on subscribe,
    /// then each newly added child fires once.
    ChildAdded,
}

/// An ordered snapshot of a subtree. Children carrying an explicit sort
/// priority come first (ascending), the rest follow in key order.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub children: Vec<(String, Value)>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.children.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub uid: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCode {
    WeakPassword,
    WrongPassword,
    TooManyRequests,
    InvalidEmail,
    UserNotFound,
    EmailInUse,
    Other,
}

#[derive(Debug, Clone, Error)]
#[error("auth failed: {code:?}")]
pub struct AuthError {
    pub code: AuthCode,
}

impl AuthError {
    pub fn new(code: AuthCode) -> Self {
        Self { code }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no data at {0}")]
    NotFound(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Everything the backend pushes at us, in delivery order.
#[derive(Debug)]
pub enum GatewayEvent {
    AuthState(Option<Account>),
    Value {
        sub: SubId,
        path: String,
        snapshot: Snapshot,
    },
    ChildAdded {
        sub: SubId,
        path: String,
        key: String,
        value: Value,
    },
}

/// Standing subscription. Dropping the handle detaches the listener, so a
/// subscription can never outlive its owner.
pub struct SubHandle {
    id: SubId,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl SubHandle {
    pub fn new(id: SubId, detach: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            id,
            detach: Some(detach),
        }
    }

    pub fn id(&self) -> SubId {
        self.id
    }

    pub fn detach(self) {}
}

impl Drop for SubHandle {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for SubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubHandle").field("id", &self.id).finish()
    }
}

/// Sentinel resolved to epoch millis by the backend at write time.
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// The remote backend: auth provider, realtime tree database and blob
/// storage behind one seam.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Account, AuthError>;
    async fn create_account(&self, email: &str, password: &str) -> Result<Account, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    fn current_account(&self) -> Option<Account>;
    /// Registers an auth-state watcher. Fires immediately with the current
    /// state, then on every sign-in/sign-out.
    fn watch_auth(&self, tx: UnboundedSender<GatewayEvent>) -> SubHandle;

    async fn set(&self, path: &str, value: Value) -> Result<(), GatewayError>;
    async fn set_with_priority(
        &self,
        path: &str,
        value: Value,
        priority: f64,
    ) -> Result<(), GatewayError>;
    async fn update(&self, path: &str, value: Value) -> Result<(), GatewayError>;
    /// Writes under a fresh server-generated key that sorts after all keys
    /// generated earlier. Returns the key.
    async fn push(&self, path: &str, value: Value) -> Result<String, GatewayError>;
    async fn remove(&self, path: &str) -> Result<(), GatewayError>;
    fn subscribe(&self, path: &str, kind: SubKind, tx: UnboundedSender<GatewayEvent>)
    -> SubHandle;

    async fn upload(
        &self,
        location: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), GatewayError>;
    async fn download_url(&self, location: &str) -> Result<String, GatewayError>;
}
