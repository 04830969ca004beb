//! Coordination of the embedded player API script.
//!
//! The external script may be requested by many sessions but must be loaded
//! once, and its single global "API ready" callback has to reach every
//! session that asked for it. [`EmbedApiLoader`] owns that process-wide
//! state: an idempotent `ensure_loaded` entry point plus an ordered queue of
//! subscribers, so a later session never replaces an earlier one's callback.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::MediaError;
use crate::media::EMBED_API_SCRIPT_URL;

/// Inserts a script tag into the hosting page.
pub trait ScriptInjector: Send + Sync {
    fn inject(&self, script_url: &str);
}

/// Load status of the external API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiStatus {
    NotLoaded,
    Loading,
    Ready,
    Failed(String),
}

/// Handle returned by [`EmbedApiLoader::subscribe`], used to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback run once the API is ready or has failed to load.
pub type ReadyCallback = Box<dyn FnOnce(Result<(), MediaError>) + Send>;

struct LoaderState {
    status: ApiStatus,
    next_id: u64,
    subscribers: VecDeque<(SubscriptionId, ReadyCallback)>,
}

static SHARED: Lazy<EmbedApiLoader> = Lazy::new(EmbedApiLoader::new);

/// Shared loader for the embedded player API. Clones share state.
#[derive(Clone)]
pub struct EmbedApiLoader {
    script_url: Arc<str>,
    inner: Arc<Mutex<LoaderState>>,
}

impl Default for EmbedApiLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbedApiLoader {
    pub fn new() -> Self {
        Self::with_script_url(EMBED_API_SCRIPT_URL)
    }

    pub fn with_script_url(script_url: &str) -> Self {
        Self {
            script_url: Arc::from(script_url),
            inner: Arc::new(Mutex::new(LoaderState {
                status: ApiStatus::NotLoaded,
                next_id: 0,
                subscribers: VecDeque::new(),
            })),
        }
    }

    /// The loader every host in this process should share.
    pub fn shared() -> Self {
        SHARED.clone()
    }

    pub fn status(&self) -> ApiStatus {
        self.inner.lock().status.clone()
    }

    /// Number of subscribers waiting for the ready notification.
    pub fn pending(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Inject the API script unless it is already loading or loaded.
    ///
    /// The injector runs without the lock held, so it may report readiness
    /// synchronously (the API global already exists on the page).
    pub fn ensure_loaded(&self, injector: &dyn ScriptInjector) -> ApiStatus {
        {
            let mut state = self.inner.lock();
            if state.status != ApiStatus::NotLoaded {
                return state.status.clone();
            }
            state.status = ApiStatus::Loading;
        }
        info!("Loading embedded player API from {}", self.script_url);
        injector.inject(&self.script_url);
        self.status()
    }

    /// Register `callback` for the ready notification.
    ///
    /// Subscribers run in registration order. When the outcome is already
    /// known the callback runs immediately and no id is returned.
    pub fn subscribe(&self, callback: ReadyCallback) -> Option<SubscriptionId> {
        let outcome = {
            let mut state = self.inner.lock();
            match &state.status {
                ApiStatus::Ready => Ok(()),
                ApiStatus::Failed(reason) => Err(MediaError::unavailable(reason.clone())),
                ApiStatus::NotLoaded | ApiStatus::Loading => {
                    let id = SubscriptionId(state.next_id);
                    state.next_id += 1;
                    state.subscribers.push_back((id, callback));
                    debug!("Queued embedded API subscriber {:?}", id);
                    return Some(id);
                }
            }
        };
        callback(outcome);
        None
    }

    /// Drop a subscriber that no longer wants the notification.
    pub fn cancel(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(queued, _)| *queued != id);
        before != state.subscribers.len()
    }

    /// The global "API ready" notification fired. Runs every queued
    /// subscriber in order and returns how many were notified.
    ///
    /// Repeated notifications are ignored.
    pub fn notify_ready(&self) -> usize {
        let subscribers = {
            let mut state = self.inner.lock();
            if state.status == ApiStatus::Ready {
                debug!("Ignoring repeated embedded API ready notification");
                return 0;
            }
            state.status = ApiStatus::Ready;
            std::mem::take(&mut state.subscribers)
        };
        info!(
            "Embedded player API ready, notifying {} subscriber(s)",
            subscribers.len()
        );
        let count = subscribers.len();
        // The lock is released: callbacks may subscribe or cancel.
        for (_, callback) in subscribers {
            callback(Ok(()));
        }
        count
    }

    /// The script failed to load. Every queued subscriber is told the
    /// backend is unavailable; the failure is not retried.
    pub fn notify_failed(&self, reason: impl Into<String>) -> usize {
        let reason = reason.into();
        let subscribers = {
            let mut state = self.inner.lock();
            if state.status == ApiStatus::Ready {
                warn!("Embedded API failure reported after readiness: {}", reason);
                return 0;
            }
            state.status = ApiStatus::Failed(reason.clone());
            std::mem::take(&mut state.subscribers)
        };
        warn!("Embedded player API unavailable: {}", reason);
        let count = subscribers.len();
        for (_, callback) in subscribers {
            callback(Err(MediaError::unavailable(reason.clone())));
        }
        count
    }
}
