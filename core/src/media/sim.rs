//! In-process stand-ins for the platform players.
//!
//! [`SimulatedPage`] plays the role of the page hosting the widget: it
//! creates native elements and embedded players, records every command they
//! receive, and turns its simulated clock into the [`BackendEvent`]s a real
//! platform would fire.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    BackendEvent, BackendFactory, EmbedPlayerState, EmbeddedPlayer, MediaKind, NativeElement,
    embed_url,
};
use crate::loader::ScriptInjector;

/// Duration every simulated source reports once its metadata loads.
pub const DEFAULT_SIM_DURATION: f64 = 180.0;

/// A command observed by the simulated page.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    InjectScript(String),
    Load(String),
    Play,
    Pause,
    SetCurrentTime(f64),
    SetVolume(f64),
    Release,
    CreateEmbed(String),
    PlayVideo,
    PauseVideo,
    SeekTo(f64),
    EmbedVolume(u8),
    Destroy,
    /// A command reached a player that was already destroyed or released.
    AfterTeardown(&'static str),
}

/// How the page answers native play requests.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PlayPolicy {
    #[default]
    Allow,
    /// Refuse every request, e.g. autoplay blocked without a user gesture.
    Reject(String),
}

struct ElementState {
    url: String,
    paused: bool,
    play_requested: bool,
    metadata_pending: bool,
    current_time: f64,
    duration: f64,
    volume: f64,
    released: bool,
}

struct EmbedState {
    video_id: String,
    state: EmbedPlayerState,
    requested: Option<EmbedPlayerState>,
    ready_reported: bool,
    /// The video metadata (and with it the duration) has arrived.
    metadata_loaded: bool,
    current_time: f64,
    duration: f64,
    volume: u8,
    destroyed: bool,
}

struct PageState {
    calls: Vec<SimCall>,
    media_duration: f64,
    embed_metadata_on_play: bool,
    play_policy: PlayPolicy,
    load_failure: Option<String>,
    elements: Vec<Arc<Mutex<ElementState>>>,
    embeds: Vec<Arc<Mutex<EmbedState>>>,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            media_duration: DEFAULT_SIM_DURATION,
            embed_metadata_on_play: false,
            play_policy: PlayPolicy::Allow,
            load_failure: None,
            elements: Vec::new(),
            embeds: Vec::new(),
        }
    }
}

/// Simulated hosting page. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct SimulatedPage {
    inner: Arc<Mutex<PageState>>,
}

impl SimulatedPage {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: SimCall) {
        self.inner.lock().calls.push(call);
    }

    /// Every command recorded so far, in order.
    pub fn calls(&self) -> Vec<SimCall> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    pub fn count_calls(&self, predicate: impl Fn(&SimCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn set_media_duration(&self, seconds: f64) {
        self.inner.lock().media_duration = seconds;
    }

    /// Embedded players created from now on report a zero duration until
    /// they first start playing.
    pub fn delay_embed_metadata(&self) {
        self.inner.lock().embed_metadata_on_play = true;
    }

    pub fn set_play_policy(&self, policy: PlayPolicy) {
        self.inner.lock().play_policy = policy;
    }

    /// Make every source loaded from now on fail with `reason`.
    pub fn fail_loads(&self, reason: impl Into<String>) {
        self.inner.lock().load_failure = Some(reason.into());
    }

    /// Current volume of the most recently created native element.
    pub fn element_volume(&self) -> Option<f64> {
        let element = self.inner.lock().elements.last().cloned()?;
        let volume = element.lock().volume;
        Some(volume)
    }

    /// Current volume of the most recently created embedded player.
    pub fn embed_volume(&self) -> Option<u8> {
        let embed = self.inner.lock().embeds.last().cloned()?;
        let volume = embed.lock().volume;
        Some(volume)
    }

    /// Answer everything the platform would answer asynchronously: metadata
    /// loads, pending play requests, and embedded player readiness and state
    /// changes.
    pub fn settle(&self) -> Vec<BackendEvent> {
        let (elements, embeds, policy, failure) = {
            let page = self.inner.lock();
            (
                page.elements.clone(),
                page.embeds.clone(),
                page.play_policy.clone(),
                page.load_failure.clone(),
            )
        };
        let mut events = Vec::new();
        for element in elements {
            let mut element = element.lock();
            if element.released {
                continue;
            }
            if element.metadata_pending {
                element.metadata_pending = false;
                if let Some(reason) = &failure {
                    events.push(BackendEvent::LoadFailed(format!("{}: {}", element.url, reason)));
                    element.play_requested = false;
                    continue;
                }
                events.push(BackendEvent::MetadataLoaded);
            }
            if element.play_requested {
                element.play_requested = false;
                match &policy {
                    PlayPolicy::Allow => {
                        element.paused = false;
                        events.push(BackendEvent::PlayResolved);
                    }
                    PlayPolicy::Reject(reason) => {
                        events.push(BackendEvent::PlayRejected(reason.clone()));
                    }
                }
            }
        }
        for embed in embeds {
            let mut embed = embed.lock();
            if embed.destroyed {
                continue;
            }
            if !embed.ready_reported {
                embed.ready_reported = true;
                events.push(BackendEvent::PlayerReady);
            }
            if let Some(requested) = embed.requested.take() {
                if requested != embed.state {
                    embed.state = requested;
                    if requested == EmbedPlayerState::Playing {
                        embed.metadata_loaded = true;
                    }
                    events.push(BackendEvent::StateChange(requested));
                }
            }
        }
        events
    }

    /// Advance the clock of every playing player by `seconds`.
    pub fn advance(&self, seconds: f64) -> Vec<BackendEvent> {
        let (elements, embeds) = {
            let page = self.inner.lock();
            (page.elements.clone(), page.embeds.clone())
        };
        let mut events = Vec::new();
        for element in elements {
            let mut element = element.lock();
            if element.released || element.paused {
                continue;
            }
            element.current_time = (element.current_time + seconds).min(element.duration);
            events.push(BackendEvent::TimeUpdate);
            if element.current_time >= element.duration {
                element.paused = true;
                events.push(BackendEvent::Ended);
            }
        }
        for embed in embeds {
            let mut embed = embed.lock();
            if embed.destroyed || embed.state != EmbedPlayerState::Playing {
                continue;
            }
            embed.current_time = (embed.current_time + seconds).min(embed.duration);
            if embed.current_time >= embed.duration {
                embed.state = EmbedPlayerState::Ended;
                events.push(BackendEvent::StateChange(EmbedPlayerState::Ended));
            }
        }
        events
    }
}

impl ScriptInjector for SimulatedPage {
    fn inject(&self, script_url: &str) {
        self.record(SimCall::InjectScript(script_url.to_string()));
    }
}

impl BackendFactory for SimulatedPage {
    fn create_native(&self, _kind: MediaKind, _url: &str) -> Box<dyn NativeElement> {
        let state = Arc::new(Mutex::new(ElementState {
            url: String::new(),
            paused: true,
            play_requested: false,
            metadata_pending: false,
            current_time: 0.0,
            duration: f64::NAN,
            volume: 1.0,
            released: false,
        }));
        self.inner.lock().elements.push(Arc::clone(&state));
        Box::new(SimElement {
            page: self.clone(),
            state,
        })
    }

    fn create_embedded(&self, video_id: &str) -> Box<dyn EmbeddedPlayer> {
        self.record(SimCall::CreateEmbed(embed_url(video_id)));
        let (duration, metadata_on_play) = {
            let page = self.inner.lock();
            (page.media_duration, page.embed_metadata_on_play)
        };
        let state = Arc::new(Mutex::new(EmbedState {
            video_id: video_id.to_string(),
            state: EmbedPlayerState::Unstarted,
            requested: None,
            ready_reported: false,
            metadata_loaded: !metadata_on_play,
            current_time: 0.0,
            duration,
            volume: 100,
            destroyed: false,
        }));
        self.inner.lock().embeds.push(Arc::clone(&state));
        Box::new(SimEmbed {
            page: self.clone(),
            state,
        })
    }
}

struct SimElement {
    page: SimulatedPage,
    state: Arc<Mutex<ElementState>>,
}

impl SimElement {
    /// Record `call`, or flag it when the element is already released.
    fn command(&self, call: SimCall, name: &'static str) -> bool {
        let released = self.state.lock().released;
        if released {
            self.page.record(SimCall::AfterTeardown(name));
        } else {
            self.page.record(call);
        }
        !released
    }
}

impl NativeElement for SimElement {
    fn load(&mut self, url: &str) {
        if !self.command(SimCall::Load(url.to_string()), "load") {
            return;
        }
        let duration = self.page.inner.lock().media_duration;
        let mut state = self.state.lock();
        state.url = url.to_string();
        state.paused = true;
        state.play_requested = false;
        // Hidden behind NaN until settle() delivers the metadata.
        state.metadata_pending = true;
        state.current_time = 0.0;
        state.duration = duration;
    }

    fn play(&mut self) {
        if self.command(SimCall::Play, "play") {
            self.state.lock().play_requested = true;
        }
    }

    fn pause(&mut self) {
        if self.command(SimCall::Pause, "pause") {
            let mut state = self.state.lock();
            state.paused = true;
            state.play_requested = false;
        }
    }

    fn paused(&self) -> bool {
        self.state.lock().paused
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&mut self, seconds: f64) {
        if self.command(SimCall::SetCurrentTime(seconds), "set_current_time") {
            let mut state = self.state.lock();
            state.current_time = if state.duration.is_nan() {
                seconds
            } else {
                seconds.clamp(0.0, state.duration)
            };
        }
    }

    fn duration(&self) -> f64 {
        let state = self.state.lock();
        if state.metadata_pending {
            f64::NAN
        } else {
            state.duration
        }
    }

    fn set_volume(&mut self, volume: f64) {
        if self.command(SimCall::SetVolume(volume), "set_volume") {
            self.state.lock().volume = volume;
        }
    }

    fn release(&mut self) {
        if self.command(SimCall::Release, "release") {
            let mut state = self.state.lock();
            state.released = true;
            state.paused = true;
        }
    }
}

struct SimEmbed {
    page: SimulatedPage,
    state: Arc<Mutex<EmbedState>>,
}

impl SimEmbed {
    fn command(&self, call: SimCall, name: &'static str) -> bool {
        let destroyed = self.state.lock().destroyed;
        if destroyed {
            self.page.record(SimCall::AfterTeardown(name));
        } else {
            self.page.record(call);
        }
        !destroyed
    }
}

impl EmbeddedPlayer for SimEmbed {
    fn play_video(&mut self) {
        if self.command(SimCall::PlayVideo, "play_video") {
            self.state.lock().requested = Some(EmbedPlayerState::Playing);
        }
    }

    fn pause_video(&mut self) {
        if self.command(SimCall::PauseVideo, "pause_video") {
            self.state.lock().requested = Some(EmbedPlayerState::Paused);
        }
    }

    fn seek_to(&mut self, seconds: f64, _allow_seek_ahead: bool) {
        if self.command(SimCall::SeekTo(seconds), "seek_to") {
            let mut state = self.state.lock();
            state.current_time = seconds.clamp(0.0, state.duration);
        }
    }

    fn set_volume(&mut self, level: u8) {
        if self.command(SimCall::EmbedVolume(level), "set_volume") {
            self.state.lock().volume = level;
        }
    }

    fn get_current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn get_duration(&self) -> f64 {
        let state = self.state.lock();
        if state.ready_reported && state.metadata_loaded {
            state.duration
        } else {
            0.0
        }
    }

    fn get_player_state(&self) -> EmbedPlayerState {
        self.state.lock().state
    }

    fn destroy(&mut self) {
        let video_id = self.state.lock().video_id.clone();
        if self.command(SimCall::Destroy, "destroy") {
            log::debug!("Simulated embed {} destroyed", video_id);
            self.state.lock().destroyed = true;
        }
    }
}
