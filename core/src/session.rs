//! The media facade: one control surface over every backend.
//!
//! A [`MediaFacade`] creates [`Session`]s, one per attachment of the host
//! widget. Hosts drive a session with user commands (`toggle_playback`,
//! `seek`, `set_volume`, ...) and forward backend notifications through
//! [`Session::handle_event`]. Every asynchronous continuation (embedded API
//! readiness, play resolution, progress polling) goes through a liveness
//! check, so nothing mutates a session after [`Session::dispose`].

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc::UnboundedReceiver, watch};

use crate::config::HostConfig;
use crate::error::{MediaError, Result};
use crate::events::{EventBus, FacadeEvent};
use crate::loader::{EmbedApiLoader, ScriptInjector, SubscriptionId};
use crate::media::{
    Backend, BackendEvent, BackendFactory, DeferredCommand, Dispatch, EmbedPlayerState,
    EmbeddedBackend, MediaBackend, MediaKind, NativeBackend, Progress, extract_video_id,
    player_error_reason,
};
use crate::poll::ProgressPoller;
use crate::{DEFAULT_POLL_INTERVAL, DEFAULT_VOLUME};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a session.
///
/// `Ready` means the backend accepts commands but has not reported its
/// duration yet; the first duration report moves it to `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Uninitialized,
    Ready,
    Playing,
    Paused,
    Ended,
    Failed,
    Disposed,
}

impl PlaybackState {
    /// Failed and disposed sessions refuse every command.
    pub fn accepts_commands(&self) -> bool {
        !matches!(self, PlaybackState::Failed | PlaybackState::Disposed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Uninitialized => "uninitialized",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Ended => "ended",
            PlaybackState::Failed => "failed",
            PlaybackState::Disposed => "disposed",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable readiness, for callers that want to apply a timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    Failed(String),
    Disposed,
}

/// Per-session behaviour taken from the host configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Start playback as soon as the backend is ready.
    pub autoplay: bool,
    /// Initial volume, 0-100.
    pub volume: u8,
    /// Progress polling cadence for the embedded backend.
    pub poll_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            autoplay: false,
            volume: DEFAULT_VOLUME,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: u64,
    pub kind: MediaKind,
    pub state: PlaybackState,
    pub position: f64,
    pub duration: Option<f64>,
    pub volume: u8,
    pub deferred: usize,
}

/// Creates sessions over injected collaborators.
pub struct MediaFacade {
    factory: Arc<dyn BackendFactory>,
    injector: Arc<dyn ScriptInjector>,
    loader: EmbedApiLoader,
    events: EventBus,
}

impl MediaFacade {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        injector: Arc<dyn ScriptInjector>,
        loader: EmbedApiLoader,
    ) -> Self {
        Self {
            factory,
            injector,
            loader,
            events: EventBus::new(),
        }
    }

    pub fn loader(&self) -> &EmbedApiLoader {
        &self.loader
    }

    /// Receive notifications from every session this facade creates.
    pub fn subscribe(&self) -> UnboundedReceiver<FacadeEvent> {
        self.events.subscribe()
    }

    /// Create a session with default options.
    ///
    /// Returns `None` when `source` is blank: absence of media is a valid
    /// configuration, not an error.
    pub fn initialize(&self, kind: MediaKind, source: &str) -> Option<Session> {
        self.initialize_with_options(kind, source, SessionOptions::default())
    }

    /// Create a session as described by a host configuration.
    pub fn initialize_with(&self, config: &HostConfig) -> Option<Session> {
        match config.source() {
            Ok(source) => {
                self.initialize_with_options(config.kind, &source, config.session_options())
            }
            Err(e) => {
                debug!("{}; nothing to initialize", e);
                None
            }
        }
    }

    pub fn initialize_with_options(
        &self,
        kind: MediaKind,
        source: &str,
        options: SessionOptions,
    ) -> Option<Session> {
        let source = source.trim();
        if source.is_empty() {
            debug!("{}; nothing to initialize", MediaError::SourceMissing);
            return None;
        }
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        info!("Session {}: initializing {} backend for {}", id, kind, source);

        match kind {
            MediaKind::Audio | MediaKind::Video => {
                let element = self.factory.create_native(kind, source);
                let native = NativeBackend::new(element, source);
                let backend = if kind == MediaKind::Audio {
                    Backend::Audio(native)
                } else {
                    Backend::Video(native)
                };
                let session = self.build(id, backend, options);
                {
                    let mut inner = session.inner.lock();
                    inner.become_ready();
                    let volume = inner.volume;
                    inner.backend.set_volume(volume);
                    if inner.autoplay {
                        debug!("Session {}: autoplay requested", id);
                        inner.play();
                    }
                }
                Some(session)
            }
            MediaKind::Embedded => {
                let video_id = extract_video_id(source);
                let backend = Backend::Embedded(EmbeddedBackend::new(video_id));
                let session = self.build(id, backend, options);

                self.loader.ensure_loaded(self.injector.as_ref());
                let weak = session.downgrade();
                let factory = Arc::clone(&self.factory);
                // The session lock is not held here: an already loaded API
                // runs the callback immediately.
                let subscription = self
                    .loader
                    .subscribe(Box::new(move |outcome| weak.on_api_outcome(factory, outcome)));
                if let Some(subscription) = subscription {
                    session.inner.lock().ready_subscription = Some(subscription);
                }
                Some(session)
            }
        }
    }

    fn build(&self, id: u64, backend: Backend, options: SessionOptions) -> Session {
        let (readiness, _) = watch::channel(Readiness::Pending);
        let inner = Arc::new_cyclic(|weak| {
            Mutex::new(SessionInner {
                id,
                kind: backend.kind(),
                backend,
                state: PlaybackState::Uninitialized,
                position: 0.0,
                duration: None,
                pending_seek: None,
                volume: options.volume.min(100),
                autoplay: options.autoplay,
                poll_interval: options.poll_interval,
                ready_subscription: None,
                poller: None,
                loader: self.loader.clone(),
                events: self.events.clone(),
                readiness,
                weak: WeakSession(weak.clone()),
            })
        });
        Session { inner }
    }
}

/// Live binding of one backend. Clones are handles to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

/// Handle held by asynchronous continuations.
#[derive(Clone)]
pub struct WeakSession(Weak<Mutex<SessionInner>>);

impl WeakSession {
    pub fn upgrade(&self) -> Option<Session> {
        self.0.upgrade().map(|inner| Session { inner })
    }

    /// One progress-poll tick. Returns false once the session is gone,
    /// disposed or failed, telling the poller to stop.
    pub fn poll_progress(&self) -> bool {
        let Some(inner) = self.0.upgrade() else {
            return false;
        };
        let mut inner = inner.lock();
        inner.poll_progress()
    }

    fn on_api_outcome(&self, factory: Arc<dyn BackendFactory>, outcome: Result<()>) {
        let Some(inner) = self.0.upgrade() else {
            debug!("Embedded API outcome for a dropped session");
            return;
        };
        let mut inner = inner.lock();
        inner.ready_subscription = None;
        if !inner.state.accepts_commands() {
            debug!("Session {}: ignoring API outcome, session is {}", inner.id, inner.state);
            return;
        }
        match outcome {
            Ok(()) => {
                let id = inner.id;
                let Some(embedded) = inner.backend.as_embedded_mut() else {
                    return;
                };
                let player = factory.create_embedded(embedded.video_id());
                if embedded.attach_player(player) {
                    debug!("Session {}: embedded player constructed, awaiting its ready event", id);
                }
            }
            Err(e) => inner.fail(e.to_string()),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("id", &inner.id)
            .field("backend", &inner.backend)
            .field("state", &inner.state)
            .finish()
    }
}

impl Session {
    pub fn downgrade(&self) -> WeakSession {
        WeakSession(Arc::downgrade(&self.inner))
    }

    pub fn id(&self) -> u64 {
        self.inner.lock().id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.lock().kind
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn volume(&self) -> u8 {
        self.inner.lock().volume
    }

    /// Cached duration, `None` until the backend reports it.
    pub fn duration(&self) -> Option<f64> {
        self.inner.lock().duration
    }

    /// Last known playback position in seconds.
    pub fn position(&self) -> f64 {
        self.inner.lock().position
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().snapshot()
    }

    /// Watch readiness transitions.
    pub fn readiness(&self) -> watch::Receiver<Readiness> {
        self.inner.lock().readiness.subscribe()
    }

    /// Wait until the backend is ready.
    ///
    /// A backend that is still not ready after `timeout` is declared
    /// unavailable and the session moves to `Failed`.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let mut readiness = self.readiness();
        let settled = tokio::time::timeout(
            timeout,
            readiness.wait_for(|state| *state != Readiness::Pending),
        )
        .await;
        let outcome = match settled {
            Err(_) => {
                let reason = format!("backend not ready after {:?}", timeout);
                self.inner.lock().fail(reason.clone());
                return Err(MediaError::BackendUnavailable(reason));
            }
            Ok(Err(_)) => return Err(MediaError::InvalidCommand("wait_ready")),
            Ok(Ok(state)) => state.clone(),
        };
        match outcome {
            Readiness::Ready => Ok(()),
            Readiness::Failed(reason) => Err(MediaError::BackendUnavailable(reason)),
            Readiness::Pending | Readiness::Disposed => Err(MediaError::InvalidCommand("wait_ready")),
        }
    }

    pub fn play(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_accepting("play")?;
        inner.play();
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_accepting("pause")?;
        inner.pause();
        Ok(())
    }

    /// Pause when the backend is playing, play otherwise.
    ///
    /// A refused play request is not returned here: the session reverts to
    /// `Paused` and emits [`FacadeEvent::PlaybackFailed`] when the host
    /// forwards [`BackendEvent::PlayRejected`].
    pub fn toggle_playback(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_accepting("toggle_playback")?;
        if inner.backend.is_playing() {
            inner.pause();
        } else {
            inner.play();
        }
        Ok(())
    }

    /// Seek to `fraction` of the duration.
    ///
    /// A no-op while the duration is unknown.
    pub fn seek(&self, fraction: f64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_accepting("seek")?;
        inner.seek(fraction);
        Ok(())
    }

    /// Set the volume on the 0-100 scale. Out-of-range levels are clamped.
    pub fn set_volume(&self, level: i32) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_accepting("set_volume")?;
        inner.set_volume(level.clamp(0, 100) as u8);
        Ok(())
    }

    /// Current position and duration, read from the backend when it can be
    /// queried and from the cache otherwise.
    pub fn progress(&self) -> Progress {
        self.inner.lock().refresh_progress()
    }

    /// Point a native session at a new URL. Embedded sessions keep their
    /// video and return `Ok(false)`.
    pub fn set_source(&self, url: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        inner.ensure_accepting("set_source")?;
        inner.rebind(url)
    }

    /// Same as a poll tick from the background poller, for hosts that drive
    /// their own timer.
    pub fn poll_progress(&self) -> bool {
        self.inner.lock().poll_progress()
    }

    /// Forward a backend notification.
    pub fn handle_event(&self, event: BackendEvent) {
        self.inner.lock().handle_event(event);
    }

    /// Tear the session down. Idempotent.
    pub fn dispose(&self) {
        self.inner.lock().dispose();
    }
}

struct SessionInner {
    id: u64,
    kind: MediaKind,
    backend: Backend,
    state: PlaybackState,
    position: f64,
    duration: Option<f64>,
    /// Deferred seek that reached a player still without a duration.
    pending_seek: Option<f64>,
    volume: u8,
    autoplay: bool,
    poll_interval: Duration,
    ready_subscription: Option<SubscriptionId>,
    poller: Option<ProgressPoller>,
    loader: EmbedApiLoader,
    events: EventBus,
    readiness: watch::Sender<Readiness>,
    weak: WeakSession,
}

impl SessionInner {
    fn snapshot(&self) -> SessionSnapshot {
        let deferred = match &self.backend {
            Backend::Embedded(embedded) => embedded.deferred_len(),
            _ => 0,
        };
        SessionSnapshot {
            id: self.id,
            kind: self.kind,
            state: self.state,
            position: self.position,
            duration: self.duration,
            volume: self.volume,
            deferred,
        }
    }

    fn ensure_accepting(&self, op: &'static str) -> Result<()> {
        if self.state.accepts_commands() {
            Ok(())
        } else {
            debug!("Session {}: '{}' ignored, session is {}", self.id, op, self.state);
            Err(MediaError::InvalidCommand(op))
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        debug!("Session {}: {} -> {}", self.id, self.state, state);
        self.state = state;
        self.events.broadcast(FacadeEvent::StateChanged(state));
    }

    fn become_ready(&mut self) {
        self.set_state(PlaybackState::Ready);
        self.readiness.send_replace(Readiness::Ready);
        self.events.broadcast(FacadeEvent::Ready);
    }

    fn emit_progress(&self) {
        self.events.broadcast(FacadeEvent::ProgressChanged {
            position: self.position,
            duration: self.duration.unwrap_or(0.0),
        });
    }

    fn note_duration(&mut self, duration: f64) {
        if duration <= 0.0 || !duration.is_finite() {
            return;
        }
        self.duration = Some(duration);
        if self.state == PlaybackState::Ready {
            self.set_state(PlaybackState::Paused);
        }
    }

    fn refresh_progress(&mut self) -> Progress {
        if let Some(progress) = self.backend.progress() {
            self.position = progress.position;
            self.note_duration(progress.duration);
        }
        if self.duration.is_some() {
            self.apply_pending_seek();
        }
        Progress {
            position: self.position,
            duration: self.duration.unwrap_or(0.0),
        }
    }

    fn play(&mut self) {
        match self.backend.play() {
            Dispatch::Issued => debug!("Session {}: play requested", self.id),
            Dispatch::Deferred => debug!("Session {}: play deferred", self.id),
            _ => {}
        }
    }

    fn pause(&mut self) {
        let dispatch = self.backend.pause();
        // Native pause takes effect immediately; embedded state arrives later.
        if dispatch == Dispatch::Issued
            && self.kind.is_native()
            && self.state == PlaybackState::Playing
        {
            self.set_state(PlaybackState::Paused);
        }
    }

    fn seek(&mut self, fraction: f64) {
        if !fraction.is_finite() {
            debug!("Session {}: ignoring non-finite seek {}", self.id, fraction);
            return;
        }
        if self.pending_seek.take().is_some() {
            debug!("Session {}: deferred seek replaced", self.id);
        }
        match self.backend.seek(fraction.clamp(0.0, 1.0)) {
            Dispatch::Issued => {
                self.refresh_progress();
                self.emit_progress();
            }
            Dispatch::NoDuration => {
                debug!("Session {}: seek ignored, duration unknown", self.id)
            }
            Dispatch::Deferred | Dispatch::Ignored => {}
        }
    }

    fn apply_pending_seek(&mut self) {
        let Some(fraction) = self.pending_seek.take() else {
            return;
        };
        if self.backend.seek(fraction) != Dispatch::Issued {
            self.pending_seek = Some(fraction);
            return;
        }
        debug!("Session {}: applied deferred seek to {}", self.id, fraction);
        if let Some(progress) = self.backend.progress() {
            self.position = progress.position;
        }
    }

    fn set_volume(&mut self, level: u8) {
        self.volume = level;
        self.backend.set_volume(level);
        self.events.broadcast(FacadeEvent::VolumeChanged(level));
    }

    fn rebind(&mut self, url: &str) -> Result<bool> {
        let url = url.trim();
        if url.is_empty() {
            return Err(MediaError::SourceMissing);
        }
        let Some(native) = self.backend.as_native_mut() else {
            debug!("Session {}: embedded sessions keep their video", self.id);
            return Ok(false);
        };
        if !native.rebind(url) {
            return Ok(false);
        }
        info!("Session {}: source changed to {}", self.id, url);
        self.position = 0.0;
        self.duration = None;
        self.set_state(PlaybackState::Ready);
        self.emit_progress();
        Ok(true)
    }

    fn handle_event(&mut self, event: BackendEvent) {
        if !self.state.accepts_commands() {
            debug!("Session {}: dropping {:?}, session is {}", self.id, event, self.state);
            return;
        }
        match event {
            BackendEvent::MetadataLoaded | BackendEvent::TimeUpdate => {
                if self.kind.is_native() {
                    self.refresh_progress();
                    self.emit_progress();
                }
            }
            BackendEvent::PlayResolved => {
                let Some(native) = self.backend.as_native_mut() else {
                    return;
                };
                if native.settle_play() {
                    self.set_state(PlaybackState::Playing);
                } else {
                    debug!("Session {}: stale play resolution ignored", self.id);
                }
            }
            BackendEvent::PlayRejected(reason) => {
                let Some(native) = self.backend.as_native_mut() else {
                    return;
                };
                if !native.settle_play() {
                    debug!("Session {}: stale play rejection ignored", self.id);
                    return;
                }
                warn!("Session {}: {}", self.id, MediaError::rejected(reason.clone()));
                self.set_state(PlaybackState::Paused);
                self.events.broadcast(FacadeEvent::PlaybackFailed(reason));
            }
            BackendEvent::Ended => self.end(),
            BackendEvent::LoadFailed(reason) => self.fail(reason),
            BackendEvent::PlayerReady => self.on_player_ready(),
            BackendEvent::StateChange(state) => self.on_embed_state(state),
            BackendEvent::PlayerError(code) => self.fail(player_error_reason(code)),
        }
    }

    fn on_player_ready(&mut self) {
        let Some(embedded) = self.backend.as_embedded_mut() else {
            return;
        };
        let Some(deferred) = embedded.mark_ready() else {
            debug!("Session {}: player ready ignored, nothing awaiting it", self.id);
            return;
        };
        info!(
            "Session {}: embedded player ready, flushing {} deferred command(s)",
            self.id,
            deferred.len()
        );
        self.become_ready();

        if !deferred.sets_volume() {
            self.backend.set_volume(self.volume);
        }
        let mut transport_requested = false;
        for command in deferred {
            let dispatch = match command {
                DeferredCommand::Play => {
                    transport_requested = true;
                    self.backend.play()
                }
                DeferredCommand::Pause => {
                    transport_requested = true;
                    self.backend.pause()
                }
                DeferredCommand::Seek(fraction) => {
                    let dispatch = self.backend.seek(fraction);
                    // Applied once the player reports a duration.
                    if dispatch == Dispatch::NoDuration {
                        self.pending_seek = Some(fraction);
                    }
                    dispatch
                }
                DeferredCommand::SetVolume(level) => self.backend.set_volume(level),
            };
            if dispatch != Dispatch::Issued {
                debug!("Session {}: deferred {:?} -> {:?}", self.id, command, dispatch);
            }
        }
        if self.autoplay && !transport_requested {
            debug!("Session {}: autoplay requested", self.id);
            self.backend.play();
        }
        self.refresh_progress();
        self.emit_progress();
    }

    fn on_embed_state(&mut self, state: EmbedPlayerState) {
        if self.kind != MediaKind::Embedded {
            return;
        }
        match state {
            EmbedPlayerState::Playing => {
                self.set_state(PlaybackState::Playing);
                self.start_polling();
            }
            EmbedPlayerState::Paused => {
                self.stop_polling();
                self.set_state(PlaybackState::Paused);
            }
            EmbedPlayerState::Ended => {
                self.end();
                return;
            }
            EmbedPlayerState::Buffering | EmbedPlayerState::Cued | EmbedPlayerState::Unstarted => {
                debug!("Session {}: embedded player {:?}", self.id, state);
            }
        }
        self.refresh_progress();
        self.emit_progress();
    }

    fn end(&mut self) {
        self.stop_polling();
        self.refresh_progress();
        self.set_state(PlaybackState::Ended);
        self.emit_progress();
        self.events.broadcast(FacadeEvent::PlaybackEnded);
    }

    fn fail(&mut self, reason: String) {
        if !self.state.accepts_commands() {
            return;
        }
        error!("Session {}: backend failed: {}", self.id, reason);
        self.stop_polling();
        self.cancel_subscription();
        self.set_state(PlaybackState::Failed);
        self.readiness.send_replace(Readiness::Failed(reason.clone()));
        self.events.broadcast(FacadeEvent::PlaybackFailed(reason));
    }

    fn start_polling(&mut self) {
        if self.kind != MediaKind::Embedded || self.poller.is_some() {
            return;
        }
        self.poller = ProgressPoller::spawn(self.weak.clone(), self.poll_interval);
    }

    fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.cancel();
        }
    }

    fn poll_progress(&mut self) -> bool {
        if !self.state.accepts_commands() {
            return false;
        }
        if self.state == PlaybackState::Playing {
            self.refresh_progress();
            self.emit_progress();
        }
        true
    }

    fn cancel_subscription(&mut self) {
        if let Some(subscription) = self.ready_subscription.take() {
            self.loader.cancel(subscription);
        }
    }

    fn dispose(&mut self) {
        if self.state == PlaybackState::Disposed {
            return;
        }
        info!("Session {}: disposing {} backend", self.id, self.kind);
        self.stop_polling();
        self.cancel_subscription();
        self.backend.dispose();
        self.set_state(PlaybackState::Disposed);
        self.readiness.send_replace(Readiness::Disposed);
    }
}
