pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod loader;
pub mod media;
pub mod poll;
pub mod session;
pub mod time;

use std::time::Duration;

// Re-exports
pub use config::HostConfig;
pub use error::{MediaError, Result};
pub use events::{EventBus, FacadeEvent};
pub use host::PlayerHost;
pub use loader::{ApiStatus, EmbedApiLoader, ScriptInjector};
pub use media::{BackendEvent, BackendFactory, MediaKind, Progress};
pub use session::{MediaFacade, PlaybackState, Readiness, Session, SessionOptions, SessionSnapshot};
pub use time::{TIME_PLACEHOLDER, format_progress, format_time};

/// Volume a session starts with, on the 0-100 scale.
pub const DEFAULT_VOLUME: u8 = 70;

/// Cadence of embedded progress polling while playing.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
