// Observable state store
// Single source of truth for UI state; listeners are notified after every mutation

use super::app_state::{AppState, ChatMessage, MessageId, StatePatch};
use serde_json::{Map, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Notification rounds allowed per mutation before giving up on listeners
/// that keep mutating the store
const MAX_NOTIFY_ROUNDS: usize = 32;

type Listener = Arc<dyn Fn(&AppState) + Send + Sync>;

/// Errors raised by path-based updates
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Path does not name a field of the state
    #[error("unknown state path: {0}")]
    UnknownPath(String),

    /// Value does not fit the field at the path
    #[error("invalid value for {path}: {reason}")]
    InvalidValue {
        /// Dotted path
        path: String,
        /// Decode error
        reason: String,
    },
}

#[derive(Default)]
struct ListenerRegistry {
    next_key: u64,
    entries: Vec<(u64, Listener)>,
}

#[derive(Default)]
struct NotifyState {
    running: bool,
    dirty: bool,
}

struct StoreInner {
    state: Mutex<Arc<AppState>>,
    listeners: Mutex<ListenerRegistry>,
    notify: Mutex<NotifyState>,
    next_id: AtomicU64,
    max_history: usize,
}

/// Shared handle to the application state
///
/// Cloning is cheap; all clones observe the same state. Snapshots returned
/// by [`Store::get`] are immutable and never change after the fact.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("max_history", &self.inner.max_history)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle returned by [`Store::subscribe`]
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    store: Weak<StoreInner>,
    key: u64,
}

impl Subscription {
    /// Stop receiving notifications; a no-op once the store is gone
    pub fn unsubscribe(self) {
        if let Some(inner) = self.store.upgrade() {
            lock(&inner.listeners)
                .entries
                .retain(|(key, _)| *key != self.key);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Store {
    /// Create a store whose chat history keeps at most `max_history` messages
    pub fn new(max_history: usize) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(Arc::new(AppState::default())),
                listeners: Mutex::new(ListenerRegistry::default()),
                notify: Mutex::new(NotifyState::default()),
                next_id: AtomicU64::new(1),
                max_history: max_history.max(1),
            }),
        }
    }

    /// Current snapshot
    pub fn get(&self) -> Arc<AppState> {
        Arc::clone(&lock(&self.inner.state))
    }

    /// Mutate the state in place and notify listeners
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut AppState),
    {
        {
            let mut guard = lock(&self.inner.state);
            let state = Arc::make_mut(&mut guard);
            f(state);
            state.enforce_history(self.inner.max_history);
        }
        self.notify();
    }

    /// Shallow-merge a patch
    pub fn merge(&self, patch: StatePatch) {
        self.update(|state| patch.apply(state));
    }

    /// Replace the field at a dotted path (`user.session_id`,
    /// `messages.0.content`) with a JSON value
    pub fn set_path(&self, path: &str, value: Value) -> Result<(), StoreError> {
        {
            let mut guard = lock(&self.inner.state);
            let mut tree =
                serde_json::to_value(&**guard).map_err(|e| StoreError::InvalidValue {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
            *walk_path(&mut tree, path)? = value;

            let mut next: AppState =
                serde_json::from_value(tree).map_err(|e| StoreError::InvalidValue {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
            next.enforce_history(self.inner.max_history);
            *guard = Arc::new(next);
        }
        debug!(path = path, "State path updated");
        self.notify();
        Ok(())
    }

    /// Register a listener called with the new snapshot after each mutation
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AppState) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.inner.listeners);
        registry.next_key += 1;
        let key = registry.next_key;
        registry.entries.push((key, Arc::new(listener)));
        Subscription {
            store: Arc::downgrade(&self.inner),
            key,
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).entries.len()
    }

    /// Append a chat message, evicting the oldest past the history limit
    pub fn add_message(&self, message: ChatMessage) {
        self.update(|state| state.messages.push(message));
    }

    /// Drop the whole chat history
    pub fn clear_messages(&self) {
        self.update(|state| state.messages.clear());
    }

    /// Back to the initial state; message ids keep increasing
    pub fn reset(&self) {
        self.update(|state| *state = AppState::default());
    }

    /// Reserve a fresh message id
    pub fn next_message_id(&self) -> MessageId {
        MessageId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn notify(&self) {
        {
            let mut notify = lock(&self.inner.notify);
            if notify.running {
                notify.dirty = true;
                return;
            }
            notify.running = true;
            notify.dirty = false;
        }

        let mut round = 0;
        loop {
            round += 1;
            let snapshot = self.get();
            let listeners: Vec<Listener> = lock(&self.inner.listeners)
                .entries
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();

            for listener in listeners {
                if catch_unwind(AssertUnwindSafe(|| listener(&snapshot))).is_err() {
                    error!("State listener panicked");
                }
            }

            let mut notify = lock(&self.inner.notify);
            if !notify.dirty {
                notify.running = false;
                break;
            }
            if round >= MAX_NOTIFY_ROUNDS {
                warn!(
                    rounds = round,
                    "Listeners kept mutating the store, dropping further notifications"
                );
                notify.running = false;
                notify.dirty = false;
                break;
            }
            notify.dirty = false;
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(50)
    }
}

fn walk_path<'a>(tree: &'a mut Value, path: &str) -> Result<&'a mut Value, StoreError> {
    let unknown = || StoreError::UnknownPath(path.to_string());
    let mut cursor = tree;
    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(unknown());
        }
        // Unset optional objects (`user` before login) are created on the way down
        let fresh = cursor.is_null();
        if fresh {
            *cursor = Value::Object(Map::new());
        }
        cursor = match cursor {
            Value::Object(map) => {
                if fresh {
                    map.entry(segment.to_string()).or_insert(Value::Null)
                } else {
                    map.get_mut(segment).ok_or_else(unknown)?
                }
            }
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(move |index| items.get_mut(index))
                .ok_or_else(unknown)?,
            _ => return Err(unknown()),
        };
    }
    Ok(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::app_state::{UserSession, View};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let store = Store::new(10);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.merge(StatePatch {
            is_typing: Some(true),
            ..StatePatch::default()
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        store.merge(StatePatch {
            is_typing: Some(false),
            ..StatePatch::default()
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let store = Store::new(10);
        let before = store.get();
        store.update(|state| state.is_uploading = true);
        assert!(!before.is_uploading);
        assert!(store.get().is_uploading);
    }

    #[test]
    fn test_history_window() {
        let store = Store::new(3);
        for i in 0..5 {
            let id = store.next_message_id();
            store.add_message(ChatMessage::user_text(id, format!("m{}", i)));
        }
        let state = store.get();
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[0].content, "m2");
        assert_eq!(state.messages[2].content, "m4");
    }

    #[test]
    fn test_message_ids_increase_across_reset() {
        let store = Store::new(10);
        let first = store.next_message_id();
        store.reset();
        let second = store.next_message_id();
        assert!(second > first);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let store = Store::new(10);
        let reached = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reached);
        store.subscribe(|_| panic!("listener bug"));
        store.subscribe(move |_| flag.store(true, Ordering::SeqCst));

        store.update(|state| state.is_playing = true);
        assert!(reached.load(Ordering::SeqCst));
        assert!(store.get().is_playing);
    }

    #[test]
    fn test_reentrant_merge_is_not_recursive() {
        let store = Store::new(10);
        let inside = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handle = store.clone();
        let guard = Arc::clone(&inside);
        let log = Arc::clone(&seen);
        store.subscribe(move |state| {
            assert!(!guard.swap(true, Ordering::SeqCst), "listener re-entered");
            log.lock().unwrap().push(state.upload_progress);
            if state.upload_progress == 10 {
                handle.merge(StatePatch {
                    upload_progress: Some(20),
                    ..StatePatch::default()
                });
            }
            guard.store(false, Ordering::SeqCst);
        });

        store.merge(StatePatch {
            upload_progress: Some(10),
            ..StatePatch::default()
        });

        assert_eq!(store.get().upload_progress, 20);
        assert_eq!(*seen.lock().unwrap(), vec![10, 20]);
    }

    #[test]
    fn test_runaway_listener_is_capped() {
        let store = Store::new(10);
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = store.clone();
        let counter = Arc::clone(&calls);
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            handle.update(|state| state.reconnect_attempts += 1);
        });

        store.update(|state| state.reconnect_attempts = 0);
        assert_eq!(calls.load(Ordering::SeqCst), MAX_NOTIFY_ROUNDS);
    }

    #[test]
    fn test_set_path_updates_one_leaf() {
        let store = Store::new(10);
        store.merge(StatePatch {
            user: Some(Some(UserSession {
                id: "u1".to_string(),
                session_id: "s1".to_string(),
                token: Some("t".to_string()),
            })),
            ..StatePatch::default()
        });

        store.set_path("user.session_id", json!("s2")).unwrap();

        let user = store.get().user.clone().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.session_id, "s2");
        assert_eq!(user.token.as_deref(), Some("t"));
    }

    #[test]
    fn test_set_path_whole_object_and_enum() {
        let store = Store::new(10);
        store
            .set_path("user", json!({"id": "u9", "session_id": "session_1"}))
            .unwrap();
        store.set_path("current_view", json!("chat")).unwrap();

        let state = store.get();
        assert_eq!(state.user.as_ref().map(|u| u.id.as_str()), Some("u9"));
        assert_eq!(state.current_view, View::Chat);
    }

    #[test]
    fn test_walk_path_creates_missing_parents() {
        let mut tree = json!({ "user": null, "is_typing": false });

        *walk_path(&mut tree, "user.id").unwrap() = json!("u3");
        assert_eq!(tree["user"]["id"], "u3");

        *walk_path(&mut tree, "is_typing").unwrap() = json!(true);
        assert_eq!(tree["is_typing"], true);
        assert_eq!(
            walk_path(&mut tree, "missing.leaf").unwrap_err(),
            StoreError::UnknownPath("missing.leaf".to_string())
        );
    }

    #[test]
    fn test_set_path_rejects_unknown_and_ill_typed() {
        let store = Store::new(10);
        assert_eq!(
            store.set_path("nope", json!(1)),
            Err(StoreError::UnknownPath("nope".to_string()))
        );
        assert!(matches!(
            store.set_path("is_typing", json!("yes")),
            Err(StoreError::InvalidValue { .. })
        ));
        assert!(matches!(
            store.set_path("messages.3.content", json!("x")),
            Err(StoreError::UnknownPath(_))
        ));
        assert!(!store.get().is_typing);
    }

    #[test]
    fn test_concurrent_updates_from_threads() {
        let store = Store::new(10);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.update(|state| state.reconnect_attempts += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get().reconnect_attempts, 400);
    }
}
