mod embedded;
mod native;
pub mod sim;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MediaError;

pub use embedded::{
    EMBED_API_SCRIPT_URL, EmbedPlayerState, EmbeddedBackend, EmbeddedPlayer, embed_url,
    extract_video_id, is_embed_url, player_error_reason,
};
pub(crate) use embedded::DeferredCommand;
pub use native::{NativeBackend, NativeElement};

/// Which playback engine a session drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Native audio element
    #[default]
    Audio,
    /// Native video element
    Video,
    /// Third-party embedded player (YouTube iframe API)
    #[serde(rename = "youtube", alias = "embedded")]
    #[cfg_attr(feature = "cli", value(name = "youtube", alias = "embedded"))]
    Embedded,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Embedded => "youtube",
        }
    }

    pub fn is_native(&self) -> bool {
        !matches!(self, MediaKind::Embedded)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = MediaError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            "youtube" | "embedded" => Ok(MediaKind::Embedded),
            other => Err(MediaError::UnknownKind(other.to_string())),
        }
    }
}

/// Position and duration in seconds. A duration of `0.0` means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Progress {
    pub position: f64,
    pub duration: f64,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        crate::time::progress_fraction(self.position, self.duration)
    }

    /// `m:ss / m:ss` label for the time display.
    pub fn label(&self) -> String {
        crate::time::format_progress(self.position, self.duration)
    }
}

/// Notifications a backend pushes to its session.
///
/// Hosts forward these from the platform (DOM events, iframe API callbacks)
/// into [`crate::Session::handle_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Native element learned its duration (`loadedmetadata`, `durationchange`).
    MetadataLoaded,
    /// Native element moved its playhead (`timeupdate`).
    TimeUpdate,
    /// A pending native play request started playback.
    PlayResolved,
    /// A pending native play request was refused.
    PlayRejected(String),
    /// Playback reached the end of the media.
    Ended,
    /// The source could not be loaded.
    LoadFailed(String),
    /// Embedded player finished its own initialization (`onReady`).
    PlayerReady,
    /// Embedded player changed state (`onStateChange`).
    StateChange(EmbedPlayerState),
    /// Embedded player reported an error code (`onError`).
    PlayerError(i32),
}

/// What a backend did with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Sent to the underlying player.
    Issued,
    /// Queued until the backend becomes ready.
    Deferred,
    /// Seek skipped because the duration is not known.
    NoDuration,
    /// Dropped: nothing to do or nothing left to talk to.
    Ignored,
}

/// Capability set every backend exposes to the facade.
pub trait MediaBackend {
    /// Safe to command directly.
    fn is_ready(&self) -> bool;

    /// Whether the backend is playing or has been asked to play.
    fn is_playing(&self) -> bool;

    fn play(&mut self) -> Dispatch;

    fn pause(&mut self) -> Dispatch;

    /// Seek to `fraction` of the duration. `fraction` must be within `[0, 1]`.
    fn seek(&mut self, fraction: f64) -> Dispatch;

    /// Set volume on the 0-100 scale.
    fn set_volume(&mut self, level: u8) -> Dispatch;

    /// Current progress, `None` until the backend can be queried.
    fn progress(&self) -> Option<Progress>;

    /// Release the underlying player. Further commands are ignored.
    fn dispose(&mut self);
}

/// Tagged union over the three concrete backends.
pub enum Backend {
    Audio(NativeBackend),
    Video(NativeBackend),
    Embedded(EmbeddedBackend),
}

impl Backend {
    pub fn kind(&self) -> MediaKind {
        match self {
            Backend::Audio(_) => MediaKind::Audio,
            Backend::Video(_) => MediaKind::Video,
            Backend::Embedded(_) => MediaKind::Embedded,
        }
    }

    pub fn as_native_mut(&mut self) -> Option<&mut NativeBackend> {
        match self {
            Backend::Audio(n) | Backend::Video(n) => Some(n),
            Backend::Embedded(_) => None,
        }
    }

    pub fn as_embedded_mut(&mut self) -> Option<&mut EmbeddedBackend> {
        match self {
            Backend::Embedded(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Audio(n) | Backend::Video(n) => f
                .debug_struct("Backend")
                .field("kind", &self.kind())
                .field("source", &n.source())
                .finish(),
            Backend::Embedded(e) => f
                .debug_struct("Backend")
                .field("kind", &self.kind())
                .field("video_id", &e.video_id())
                .finish(),
        }
    }
}

impl MediaBackend for Backend {
    fn is_ready(&self) -> bool {
        match self {
            Backend::Audio(n) | Backend::Video(n) => n.is_ready(),
            Backend::Embedded(e) => e.is_ready(),
        }
    }

    fn is_playing(&self) -> bool {
        match self {
            Backend::Audio(n) | Backend::Video(n) => n.is_playing(),
            Backend::Embedded(e) => e.is_playing(),
        }
    }

    fn play(&mut self) -> Dispatch {
        match self {
            Backend::Audio(n) | Backend::Video(n) => n.play(),
            Backend::Embedded(e) => e.play(),
        }
    }

    fn pause(&mut self) -> Dispatch {
        match self {
            Backend::Audio(n) | Backend::Video(n) => n.pause(),
            Backend::Embedded(e) => e.pause(),
        }
    }

    fn seek(&mut self, fraction: f64) -> Dispatch {
        match self {
            Backend::Audio(n) | Backend::Video(n) => n.seek(fraction),
            Backend::Embedded(e) => e.seek(fraction),
        }
    }

    fn set_volume(&mut self, level: u8) -> Dispatch {
        match self {
            Backend::Audio(n) | Backend::Video(n) => n.set_volume(level),
            Backend::Embedded(e) => e.set_volume(level),
        }
    }

    fn progress(&self) -> Option<Progress> {
        match self {
            Backend::Audio(n) | Backend::Video(n) => n.progress(),
            Backend::Embedded(e) => e.progress(),
        }
    }

    fn dispose(&mut self) {
        match self {
            Backend::Audio(n) | Backend::Video(n) => n.dispose(),
            Backend::Embedded(e) => e.dispose(),
        }
    }
}

/// Creates concrete players for a session.
///
/// Implemented by the host platform; [`sim::SimulatedPage`] is the in-process
/// implementation used by tests and the command-line harness.
pub trait BackendFactory: Send + Sync {
    /// Create a native `<audio>` or `<video>` element bound to `url`.
    fn create_native(&self, kind: MediaKind, url: &str) -> Box<dyn NativeElement>;

    /// Construct the embedded player for `video_id`. Only called once the
    /// external API has signalled readiness.
    fn create_embedded(&self, video_id: &str) -> Box<dyn EmbeddedPlayer>;
}
