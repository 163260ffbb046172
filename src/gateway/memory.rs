use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rand::Rng;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use super::{
    Account, AuthCode, AuthError, Gateway, GatewayError, GatewayEvent, Snapshot, SubHandle, SubId,
    SubKind, now_millis,
};

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const MAX_SIGN_IN_ATTEMPTS: u32 = 5;

struct StoredAccount {
    uid: String,
    password: String,
}

struct SubEntry {
    id: SubId,
    path: String,
    kind: SubKind,
    tx: UnboundedSender<GatewayEvent>,
    delivered: Vec<String>,
}

#[derive(Default)]
struct Inner {
    tree: Value,
    priorities: HashMap<String, f64>,
    accounts: HashMap<String, StoredAccount>,
    failed_attempts: HashMap<String, u32>,
    current: Option<Account>,
    blobs: HashMap<String, (Vec<u8>, String)>,
    subs: Vec<SubEntry>,
    auth_watchers: Vec<(SubId, UnboundedSender<GatewayEvent>)>,
    next_sub: SubId,
    last_push_time: i64,
    last_push_rand: [u8; 12],
}

/// Backend stand-in: a JSON tree with per-node sort priorities, an account
/// table and a blob map, fanning changes out to subscribers synchronously.
pub struct MemoryGateway {
    inner: Arc<Mutex<Inner>>,
    writes: AtomicU64,
    url_lookups: AtomicU64,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        let inner = Inner {
            tree: json!({}),
            ..Inner::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            writes: AtomicU64::new(0),
            url_lookups: AtomicU64::new(0),
        }
    }

    /// Registers an account without signing it in.
    pub fn add_account(&self, email: &str, password: &str) -> String {
        let uid = Uuid::now_v7().simple().to_string();
        let mut inner = self.inner.lock().expect("gateway lock");
        inner.accounts.insert(
            email.to_owned(),
            StoredAccount {
                uid: uid.clone(),
                password: password.to_owned(),
            },
        );
        uid
    }

    pub fn value_at(&self, path: &str) -> Option<Value> {
        let inner = self.inner.lock().expect("gateway lock");
        node_at(&inner.tree, path).cloned()
    }

    /// Remote writes issued so far, all operations counted.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Blob download-URL resolutions issued so far.
    pub fn url_lookup_count(&self) -> u64 {
        self.url_lookups.load(Ordering::SeqCst)
    }

    fn write(&self, path: &str, value: Option<Value>, priority: Option<f64>) -> Result<(), GatewayError> {
        let segs = split_path(path)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let now = now_millis();
        let mut inner = self.inner.lock().expect("gateway lock");
        match value {
            Some(mut value) => {
                resolve_timestamps(&mut value, now);
                write_node(&mut inner.tree, &segs, value);
                if let Some(priority) = priority {
                    inner.priorities.insert(path.to_owned(), priority);
                }
            }
            None => {
                remove_node(&mut inner.tree, &segs);
                let prefix = format!("{path}/");
                inner
                    .priorities
                    .retain(|p, _| p != path && !p.starts_with(&prefix));
            }
        }
        fire(&mut inner, path);
        Ok(())
    }

    fn notify_auth(inner: &mut Inner) {
        let state = inner.current.clone();
        inner
            .auth_watchers
            .retain(|(_, tx)| tx.send(GatewayEvent::AuthState(state.clone())).is_ok());
    }
}

#[async_trait::async_trait]
impl Gateway for MemoryGateway {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Account, AuthError> {
        let mut inner = self.inner.lock().expect("gateway lock");
        if !email.contains('@') {
            return Err(AuthError::new(AuthCode::InvalidEmail));
        }
        let Some(stored) = inner.accounts.get(email) else {
            return Err(AuthError::new(AuthCode::UserNotFound));
        };
        if inner.failed_attempts.get(email).copied().unwrap_or(0) >= MAX_SIGN_IN_ATTEMPTS {
            return Err(AuthError::new(AuthCode::TooManyRequests));
        }
        if stored.password != password {
            *inner.failed_attempts.entry(email.to_owned()).or_insert(0) += 1;
            return Err(AuthError::new(AuthCode::WrongPassword));
        }
        let account = Account {
            uid: stored.uid.clone(),
            email: email.to_owned(),
        };
        inner.failed_attempts.remove(email);
        inner.current = Some(account.clone());
        Self::notify_auth(&mut inner);
        Ok(account)
    }

    async fn create_account(&self, email: &str, password: &str) -> Result<Account, AuthError> {
        let mut inner = self.inner.lock().expect("gateway lock");
        if !email.contains('@') {
            return Err(AuthError::new(AuthCode::InvalidEmail));
        }
        if password.chars().count() < 6 {
            return Err(AuthError::new(AuthCode::WeakPassword));
        }
        if inner.accounts.contains_key(email) {
            return Err(AuthError::new(AuthCode::EmailInUse));
        }
        let uid = Uuid::now_v7().simple().to_string();
        inner.accounts.insert(
            email.to_owned(),
            StoredAccount {
                uid: uid.clone(),
                password: password.to_owned(),
            },
        );
        let account = Account {
            uid,
            email: email.to_owned(),
        };
        inner.current = Some(account.clone());
        Self::notify_auth(&mut inner);
        Ok(account)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("gateway lock");
        inner.current = None;
        Self::notify_auth(&mut inner);
        Ok(())
    }

    fn current_account(&self) -> Option<Account> {
        self.inner.lock().expect("gateway lock").current.clone()
    }

    fn watch_auth(&self, tx: UnboundedSender<GatewayEvent>) -> SubHandle {
        let mut inner = self.inner.lock().expect("gateway lock");
        let id = inner.next_sub;
        inner.next_sub += 1;
        let _ = tx.send(GatewayEvent::AuthState(inner.current.clone()));
        inner.auth_watchers.push((id, tx));
        let weak = Arc::downgrade(&self.inner);
        SubHandle::new(
            id,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut inner = inner.lock().expect("gateway lock");
                    inner.auth_watchers.retain(|(i, _)| *i != id);
                }
            }),
        )
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), GatewayError> {
        self.write(path, Some(value), None)
    }

    async fn set_with_priority(
        &self,
        path: &str,
        value: Value,
        priority: f64,
    ) -> Result<(), GatewayError> {
        self.write(path, Some(value), Some(priority))
    }

    async fn update(&self, path: &str, value: Value) -> Result<(), GatewayError> {
        let Some(fields) = value.as_object() else {
            return Err(GatewayError::InvalidPath(path.to_owned()));
        };
        let segs = split_path(path)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let now = now_millis();
        let mut inner = self.inner.lock().expect("gateway lock");
        for (key, field) in fields {
            let mut field = field.clone();
            resolve_timestamps(&mut field, now);
            let mut segs = segs.clone();
            segs.push(key.clone());
            write_node(&mut inner.tree, &segs, field);
        }
        fire(&mut inner, path);
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, GatewayError> {
        let key = {
            let mut inner = self.inner.lock().expect("gateway lock");
            push_id(&mut inner, now_millis())
        };
        self.write(&format!("{path}/{key}"), Some(value), None)?;
        Ok(key)
    }

    async fn remove(&self, path: &str) -> Result<(), GatewayError> {
        self.write(path, None, None)
    }

    fn subscribe(
        &self,
        path: &str,
        kind: SubKind,
        tx: UnboundedSender<GatewayEvent>,
    ) -> SubHandle {
        let mut inner = self.inner.lock().expect("gateway lock");
        let id = inner.next_sub;
        inner.next_sub += 1;
        let snapshot = snapshot_at(&inner, path);
        let mut delivered = Vec::new();
        match kind {
            SubKind::Value => {
                let _ = tx.send(GatewayEvent::Value {
                    sub: id,
                    path: path.to_owned(),
                    snapshot,
                });
            }
            SubKind::ChildAdded => {
                for (key, value) in snapshot.children {
                    delivered.push(key.clone());
                    let _ = tx.send(GatewayEvent::ChildAdded {
                        sub: id,
                        path: path.to_owned(),
                        key,
                        value,
                    });
                }
            }
        }
        inner.subs.push(SubEntry {
            id,
            path: path.to_owned(),
            kind,
            tx,
            delivered,
        });
        let weak = Arc::downgrade(&self.inner);
        SubHandle::new(
            id,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut inner = inner.lock().expect("gateway lock");
                    inner.subs.retain(|s| s.id != id);
                }
            }),
        )
    }

    async fn upload(
        &self,
        location: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().expect("gateway lock");
        inner
            .blobs
            .insert(location.to_owned(), (bytes, content_type.to_owned()));
        Ok(())
    }

    async fn download_url(&self, location: &str) -> Result<String, GatewayError> {
        self.url_lookups.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock().expect("gateway lock");
        if inner.blobs.contains_key(location) {
            Ok(format!("https://blobs.chatto.example/{location}?alt=media"))
        } else {
            Err(GatewayError::NotFound(location.to_owned()))
        }
    }
}

fn split_path(path: &str) -> Result<Vec<String>, GatewayError> {
    if path.is_empty() || path.split('/').any(str::is_empty) {
        return Err(GatewayError::InvalidPath(path.to_owned()));
    }
    Ok(path.split('/').map(str::to_owned).collect())
}

fn node_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for seg in path.split('/') {
        cur = cur.get(seg)?;
    }
    Some(cur)
}

fn write_node(root: &mut Value, segs: &[String], value: Value) {
    let mut cur = root;
    let (last, parents) = segs.split_last().expect("path validated as non-empty");
    for seg in parents {
        if !cur.is_object() {
            *cur = json!({});
        }
        cur = cur
            .as_object_mut()
            .expect("just ensured object")
            .entry(seg.clone())
            .or_insert_with(|| json!({}));
    }
    if !cur.is_object() {
        *cur = json!({});
    }
    cur.as_object_mut()
        .expect("just ensured object")
        .insert(last.clone(), value);
}

fn remove_node(root: &mut Value, segs: &[String]) {
    let (last, parents) = match segs.split_last() {
        Some(x) => x,
        None => return,
    };
    let mut cur = root;
    for seg in parents {
        match cur.get_mut(seg.as_str()) {
            Some(next) => cur = next,
            None => return,
        }
    }
    if let Some(obj) = cur.as_object_mut() {
        obj.remove(last);
    }
}

/// Replaces the `{".sv": "timestamp"}` sentinel with the write-time clock,
/// anywhere in the value.
fn resolve_timestamps(value: &mut Value, now: i64) {
    let is_sentinel = value
        .as_object()
        .is_some_and(|o| o.len() == 1 && o.get(".sv").and_then(Value::as_str) == Some("timestamp"));
    if is_sentinel {
        *value = json!(now);
        return;
    }
    if let Some(obj) = value.as_object_mut() {
        for (_, v) in obj.iter_mut() {
            resolve_timestamps(v, now);
        }
    }
}

fn snapshot_at(inner: &Inner, path: &str) -> Snapshot {
    let Some(obj) = node_at(&inner.tree, path).and_then(Value::as_object) else {
        return Snapshot::default();
    };
    let mut prioritized: Vec<(f64, String, Value)> = Vec::new();
    let mut rest: Vec<(String, Value)> = Vec::new();
    for (key, value) in obj {
        match inner.priorities.get(&format!("{path}/{key}")) {
            Some(p) => prioritized.push((*p, key.clone(), value.clone())),
            None => rest.push((key.clone(), value.clone())),
        }
    }
    prioritized.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });
    let mut children: Vec<(String, Value)> =
        prioritized.into_iter().map(|(_, k, v)| (k, v)).collect();
    children.extend(rest);
    Snapshot { children }
}

fn fire(inner: &mut Inner, changed: &str) {
    // first pass borrows the tree, second pass mutates the sub entries
    let mut pending: Vec<(usize, Option<String>, GatewayEvent)> = Vec::new();
    for (i, entry) in inner.subs.iter().enumerate() {
        match entry.kind {
            SubKind::Value => {
                if overlaps(&entry.path, changed) {
                    pending.push((
                        i,
                        None,
                        GatewayEvent::Value {
                            sub: entry.id,
                            path: entry.path.clone(),
                            snapshot: snapshot_at(inner, &entry.path),
                        },
                    ));
                }
            }
            SubKind::ChildAdded => {
                let Some(rest) = changed.strip_prefix(&format!("{}/", entry.path)) else {
                    continue;
                };
                let Some(key) = rest.split('/').next() else {
                    continue;
                };
                if entry.delivered.iter().any(|k| k == key) {
                    continue;
                }
                let child_path = format!("{}/{}", entry.path, key);
                if let Some(value) = node_at(&inner.tree, &child_path) {
                    pending.push((
                        i,
                        Some(key.to_owned()),
                        GatewayEvent::ChildAdded {
                            sub: entry.id,
                            path: entry.path.clone(),
                            key: key.to_owned(),
                            value: value.clone(),
                        },
                    ));
                }
            }
        }
    }
    for (i, seen, event) in pending {
        if let Some(key) = seen {
            inner.subs[i].delivered.push(key);
        }
        let _ = inner.subs[i].tx.send(event);
    }
}

fn overlaps(sub_path: &str, changed: &str) -> bool {
    sub_path == changed
        || changed.starts_with(&format!("{sub_path}/"))
        || sub_path.starts_with(&format!("{changed}/"))
}

/// Firebase-style push key: 8 chars of timestamp followed by 12 random
/// chars, incremented instead of re-drawn within the same millisecond so
/// later keys always sort after earlier ones.
fn push_id(inner: &mut Inner, now: i64) -> String {
    let duplicate_time = now == inner.last_push_time;
    inner.last_push_time = now;

    let mut head = [0u8; 8];
    let mut t = now;
    for slot in head.iter_mut().rev() {
        *slot = PUSH_CHARS[(t % 64) as usize];
        t /= 64;
    }

    if duplicate_time {
        for slot in inner.last_push_rand.iter_mut().rev() {
            if *slot == 63 {
                *slot = 0;
            } else {
                *slot += 1;
                break;
            }
        }
    } else {
        let mut rng = rand::rng();
        for slot in &mut inner.last_push_rand {
            *slot = rng.random_range(0..64);
        }
    }

    let mut id = String::with_capacity(20);
    id.extend(head.iter().map(|&b| b as char));
    id.extend(
        inner
            .last_push_rand
            .iter()
            .map(|&i| PUSH_CHARS[i as usize] as char),
    );
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<GatewayEvent>) -> Vec<GatewayEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn value_subscription_fires_immediately_and_on_change() {
        let gw = MemoryGateway::new();
        let (tx, mut rx) = unbounded_channel();
        let _sub = gw.subscribe("rooms", SubKind::Value, tx);

        let initial = drain(&mut rx);
        assert_eq!(initial.len(), 1);
        match &initial[0] {
            GatewayEvent::Value { snapshot, .. } => assert!(snapshot.is_empty()),
            other => panic!("expected value event, got {other:?}"),
        }

        gw.set("rooms/general", json!({"createdByUID": "u1"}))
            .await
            .unwrap();
        let after = drain(&mut rx);
        assert_eq!(after.len(), 1);
        match &after[0] {
            GatewayEvent::Value { snapshot, .. } => {
                assert!(snapshot.get("general").is_some());
            }
            other => panic!("expected value event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_handle_stops_delivery() {
        let gw = MemoryGateway::new();
        let (tx, mut rx) = unbounded_channel();
        let sub = gw.subscribe("users", SubKind::Value, tx.clone());
        drop(sub);
        let resub = gw.subscribe("users", SubKind::Value, tx);
        drain(&mut rx);

        gw.set("users/u1", json!({"nickname": "a"})).await.unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1, "exactly one callback per change");
        match &events[0] {
            GatewayEvent::Value { sub, .. } => assert_eq!(*sub, resub.id()),
            other => panic!("expected value event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn child_added_replays_then_streams() {
        let gw = MemoryGateway::new();
        gw.push("messages/general", json!({"text": "one"}))
            .await
            .unwrap();
        gw.push("messages/general", json!({"text": "two"}))
            .await
            .unwrap();

        let (tx, mut rx) = unbounded_channel();
        let _sub = gw.subscribe("messages/general", SubKind::ChildAdded, tx);
        let replay = drain(&mut rx);
        assert_eq!(replay.len(), 2);

        gw.push("messages/general", json!({"text": "three"}))
            .await
            .unwrap();
        let streamed = drain(&mut rx);
        assert_eq!(streamed.len(), 1);
        match &streamed[0] {
            GatewayEvent::ChildAdded { value, .. } => {
                assert_eq!(value["text"], json!("three"));
            }
            other => panic!("expected child event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn priority_sorts_before_keyed_children() {
        let gw = MemoryGateway::new();
        gw.set("rooms/aaa", json!({"createdByUID": "u1"}))
            .await
            .unwrap();
        gw.set_with_priority("rooms/zzz", json!({"createdByUID": "u1"}), 1.0)
            .await
            .unwrap();

        let (tx, mut rx) = unbounded_channel();
        let _sub = gw.subscribe("rooms", SubKind::Value, tx);
        match &drain(&mut rx)[0] {
            GatewayEvent::Value { snapshot, .. } => {
                let keys: Vec<&str> =
                    snapshot.children.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["zzz", "aaa"]);
            }
            other => panic!("expected value event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn push_keys_sort_in_generation_order() {
        let gw = MemoryGateway::new();
        let mut keys = Vec::new();
        for i in 0..50 {
            keys.push(gw.push("messages/x", json!({"n": i})).await.unwrap());
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn repeated_wrong_passwords_get_blocked() {
        let gw = MemoryGateway::new();
        gw.add_account("a@example.com", "correct horse");
        for _ in 0..MAX_SIGN_IN_ATTEMPTS {
            let err = gw.sign_in("a@example.com", "nope").await.unwrap_err();
            assert_eq!(err.code, AuthCode::WrongPassword);
        }
        let err = gw.sign_in("a@example.com", "nope").await.unwrap_err();
        assert_eq!(err.code, AuthCode::TooManyRequests);
        // even the right password is blocked now
        let err = gw
            .sign_in("a@example.com", "correct horse")
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthCode::TooManyRequests);
    }

    #[tokio::test]
    async fn server_timestamps_resolve_on_write() {
        let gw = MemoryGateway::new();
        gw.set(
            "users/u1",
            json!({"nickname": "a", "createdAt": super::super::server_timestamp()}),
        )
        .await
        .unwrap();
        let user = gw.value_at("users/u1").unwrap();
        assert!(user["createdAt"].is_i64());
    }

    #[tokio::test]
    async fn remove_deletes_the_subtree() {
        let gw = MemoryGateway::new();
        gw.set("messages/general/m1", json!({"text": "hi"}))
            .await
            .unwrap();
        gw.remove("messages/general").await.unwrap();
        assert!(gw.value_at("messages/general").is_none());
    }
}
