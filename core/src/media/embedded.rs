use std::collections::VecDeque;

use log::{debug, warn};

use super::{Dispatch, MediaBackend, Progress};
use crate::time::known_duration;

/// Script that installs the embedded player API.
pub const EMBED_API_SCRIPT_URL: &str = "https://www.youtube.com/iframe_api";

const ID_PREFIXES: [&str; 3] = ["youtube.com/watch?v=", "youtu.be/", "youtube.com/embed/"];

/// Iframe URL for `video_id` with the JS API enabled.
pub fn embed_url(video_id: &str) -> String {
    format!("https://www.youtube.com/embed/{}?enablejsapi=1", video_id)
}

/// Check if a string is a YouTube watch, short or embed URL
pub fn is_embed_url(url: &str) -> bool {
    ID_PREFIXES.iter().any(|prefix| url.contains(prefix))
}

/// Reduce a YouTube URL to its video id. Anything else is taken as an id.
pub fn extract_video_id(source: &str) -> String {
    let source = source.trim();
    for prefix in ID_PREFIXES {
        if let Some(pos) = source.find(prefix) {
            let rest = &source[pos + prefix.len()..];
            let end = rest.find(['&', '#', '?', '/']).unwrap_or(rest.len());
            return rest[..end].to_string();
        }
    }
    source.to_string()
}

/// Human readable reason for an `onError` code of the embedded player.
pub fn player_error_reason(code: i32) -> String {
    match code {
        2 => "invalid video id".to_string(),
        5 => "video cannot be played in the HTML5 player".to_string(),
        100 => "video not found or private".to_string(),
        101 | 150 => "video owner does not allow embedding".to_string(),
        other => format!("embedded player error {}", other),
    }
}

/// Player states as polled from the embedded player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedPlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

/// Remote player object created through the embedded player API.
///
/// Commands are fire-and-forget; actual state arrives later through
/// `onStateChange`, and time progress is only available by polling.
pub trait EmbeddedPlayer: Send {
    fn play_video(&mut self);
    fn pause_video(&mut self);
    fn seek_to(&mut self, seconds: f64, allow_seek_ahead: bool);
    /// Volume on the 0-100 scale.
    fn set_volume(&mut self, level: u8);
    fn get_current_time(&self) -> f64;
    /// Zero until the video metadata is loaded.
    fn get_duration(&self) -> f64;
    fn get_player_state(&self) -> EmbedPlayerState;
    /// Tear down the player and its iframe context.
    fn destroy(&mut self);
}

/// Command issued before the embedded player was safe to call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DeferredCommand {
    Play,
    Pause,
    Seek(f64),
    SetVolume(u8),
}

/// Ordered buffer of deferred commands.
#[derive(Debug, Default)]
pub(crate) struct CommandBuffer {
    commands: VecDeque<DeferredCommand>,
}

impl CommandBuffer {
    fn push(&mut self, command: DeferredCommand) {
        debug!("Deferring {:?} until the embedded player is ready", command);
        self.commands.push_back(command);
    }

    /// Playback intent expressed by the latest deferred play/pause.
    fn wants_playback(&self) -> bool {
        self.commands
            .iter()
            .rev()
            .find_map(|command| match command {
                DeferredCommand::Play => Some(true),
                DeferredCommand::Pause => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub(crate) fn sets_volume(&self) -> bool {
        self.commands
            .iter()
            .any(|command| matches!(command, DeferredCommand::SetVolume(_)))
    }

    pub(crate) fn len(&self) -> usize {
        self.commands.len()
    }
}

impl IntoIterator for CommandBuffer {
    type Item = DeferredCommand;
    type IntoIter = std::collections::vec_deque::IntoIter<DeferredCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

enum Stage {
    /// Waiting for the external API script.
    AwaitingApi(CommandBuffer),
    /// Player constructed, waiting for its `onReady`.
    Constructed(Box<dyn EmbeddedPlayer>, CommandBuffer),
    Live(Box<dyn EmbeddedPlayer>),
    Destroyed,
}

/// Embedded third-party player backend.
pub struct EmbeddedBackend {
    video_id: String,
    stage: Stage,
}

impl EmbeddedBackend {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            stage: Stage::AwaitingApi(CommandBuffer::default()),
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Number of commands waiting for readiness.
    pub fn deferred_len(&self) -> usize {
        match &self.stage {
            Stage::AwaitingApi(buffer) | Stage::Constructed(_, buffer) => buffer.len(),
            _ => 0,
        }
    }

    /// Install the player constructed once the API became available.
    ///
    /// Returns false (and destroys `player`) unless the backend was still
    /// waiting for the API.
    pub fn attach_player(&mut self, mut player: Box<dyn EmbeddedPlayer>) -> bool {
        match std::mem::replace(&mut self.stage, Stage::Destroyed) {
            Stage::AwaitingApi(buffer) => {
                self.stage = Stage::Constructed(player, buffer);
                true
            }
            other => {
                warn!("Discarding duplicate embedded player for {}", self.video_id);
                player.destroy();
                self.stage = other;
                false
            }
        }
    }

    /// Move to the live stage and hand back the deferred commands.
    ///
    /// Yields the buffer exactly once; later calls return `None`.
    pub(crate) fn mark_ready(&mut self) -> Option<CommandBuffer> {
        match std::mem::replace(&mut self.stage, Stage::Destroyed) {
            Stage::Constructed(player, buffer) => {
                self.stage = Stage::Live(player);
                Some(buffer)
            }
            other => {
                self.stage = other;
                None
            }
        }
    }

    fn live(&mut self) -> Option<&mut dyn EmbeddedPlayer> {
        match &mut self.stage {
            Stage::Live(player) => Some(player.as_mut()),
            _ => None,
        }
    }

    fn buffer(&mut self) -> Option<&mut CommandBuffer> {
        match &mut self.stage {
            Stage::AwaitingApi(buffer) | Stage::Constructed(_, buffer) => Some(buffer),
            _ => None,
        }
    }

    fn dispatch(&mut self, command: DeferredCommand) -> Dispatch {
        if let Some(buffer) = self.buffer() {
            buffer.push(command);
            return Dispatch::Deferred;
        }
        let Some(player) = self.live() else {
            return Dispatch::Ignored;
        };
        match command {
            DeferredCommand::Play => player.play_video(),
            DeferredCommand::Pause => player.pause_video(),
            DeferredCommand::SetVolume(level) => player.set_volume(level),
            DeferredCommand::Seek(fraction) => {
                let Some(duration) = known_duration(player.get_duration()) else {
                    return Dispatch::NoDuration;
                };
                player.seek_to(fraction * duration, true);
            }
        }
        Dispatch::Issued
    }
}

impl MediaBackend for EmbeddedBackend {
    fn is_ready(&self) -> bool {
        matches!(self.stage, Stage::Live(_))
    }

    fn is_playing(&self) -> bool {
        match &self.stage {
            Stage::AwaitingApi(buffer) | Stage::Constructed(_, buffer) => buffer.wants_playback(),
            Stage::Live(player) => matches!(
                player.get_player_state(),
                EmbedPlayerState::Playing | EmbedPlayerState::Buffering
            ),
            Stage::Destroyed => false,
        }
    }

    fn play(&mut self) -> Dispatch {
        self.dispatch(DeferredCommand::Play)
    }

    fn pause(&mut self) -> Dispatch {
        self.dispatch(DeferredCommand::Pause)
    }

    fn seek(&mut self, fraction: f64) -> Dispatch {
        self.dispatch(DeferredCommand::Seek(fraction))
    }

    fn set_volume(&mut self, level: u8) -> Dispatch {
        self.dispatch(DeferredCommand::SetVolume(level))
    }

    fn progress(&self) -> Option<Progress> {
        match &self.stage {
            Stage::Live(player) => Some(Progress {
                position: player.get_current_time(),
                duration: known_duration(player.get_duration()).unwrap_or(0.0),
            }),
            _ => None,
        }
    }

    fn dispose(&mut self) {
        match std::mem::replace(&mut self.stage, Stage::Destroyed) {
            Stage::Constructed(mut player, _) | Stage::Live(mut player) => {
                debug!("Destroying embedded player for {}", self.video_id);
                player.destroy();
            }
            Stage::AwaitingApi(buffer) => {
                if buffer.len() > 0 {
                    debug!(
                        "Dropping {} deferred command(s) for {}",
                        buffer.len(),
                        self.video_id
                    );
                }
            }
            Stage::Destroyed => {}
        }
    }
}
