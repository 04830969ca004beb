use log::debug;

use super::{Dispatch, MediaBackend, Progress};
use crate::time::known_duration;

/// Platform `<audio>` / `<video>` element.
///
/// `play` only requests playback: the platform answers later, and the host
/// forwards that answer as [`super::BackendEvent::PlayResolved`] or
/// [`super::BackendEvent::PlayRejected`].
pub trait NativeElement: Send {
    fn load(&mut self, url: &str);
    fn play(&mut self);
    fn pause(&mut self);
    fn paused(&self) -> bool;
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);
    /// NaN until the media metadata is known.
    fn duration(&self) -> f64;
    /// Volume on the platform's `0.0..=1.0` scale.
    fn set_volume(&mut self, volume: f64);
    /// Detach the element from the page and drop its source.
    fn release(&mut self);
}

/// Native audio/video backend.
///
/// The element queues commands safely before its metadata arrives, so this
/// backend is ready as soon as it is created.
pub struct NativeBackend {
    element: Option<Box<dyn NativeElement>>,
    source: String,
    play_pending: bool,
}

impl NativeBackend {
    /// Wrap `element` and bind it to `url`.
    pub fn new(mut element: Box<dyn NativeElement>, url: &str) -> Self {
        element.load(url);
        Self {
            element: Some(element),
            source: url.to_string(),
            play_pending: false,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// A play request is waiting for the platform's answer.
    pub fn play_pending(&self) -> bool {
        self.play_pending
    }

    /// Point the element at a new URL. Any pending play request is dropped.
    pub fn rebind(&mut self, url: &str) -> bool {
        let Some(element) = self.element.as_mut() else {
            return false;
        };
        element.load(url);
        self.source = url.to_string();
        self.play_pending = false;
        true
    }

    /// Consume the pending play request. Returns false for stale answers.
    pub fn settle_play(&mut self) -> bool {
        std::mem::replace(&mut self.play_pending, false)
    }

    /// Latest duration from the element, if known.
    pub fn duration(&self) -> Option<f64> {
        self.element
            .as_ref()
            .and_then(|element| known_duration(element.duration()))
    }
}

impl MediaBackend for NativeBackend {
    fn is_ready(&self) -> bool {
        self.element.is_some()
    }

    fn is_playing(&self) -> bool {
        match &self.element {
            Some(element) => self.play_pending || !element.paused(),
            None => false,
        }
    }

    fn play(&mut self) -> Dispatch {
        let Some(element) = self.element.as_mut() else {
            return Dispatch::Ignored;
        };
        if self.play_pending {
            debug!("Play already requested for {}", self.source);
            return Dispatch::Ignored;
        }
        self.play_pending = true;
        element.play();
        Dispatch::Issued
    }

    fn pause(&mut self) -> Dispatch {
        let Some(element) = self.element.as_mut() else {
            return Dispatch::Ignored;
        };
        // Pausing aborts a play request that has not been answered yet.
        self.play_pending = false;
        element.pause();
        Dispatch::Issued
    }

    fn seek(&mut self, fraction: f64) -> Dispatch {
        let Some(duration) = self.duration() else {
            return if self.element.is_some() {
                Dispatch::NoDuration
            } else {
                Dispatch::Ignored
            };
        };
        if let Some(element) = self.element.as_mut() {
            element.set_current_time(fraction * duration);
        }
        Dispatch::Issued
    }

    fn set_volume(&mut self, level: u8) -> Dispatch {
        match self.element.as_mut() {
            Some(element) => {
                element.set_volume(f64::from(level) / 100.0);
                Dispatch::Issued
            }
            None => Dispatch::Ignored,
        }
    }

    fn progress(&self) -> Option<Progress> {
        let element = self.element.as_ref()?;
        Some(Progress {
            position: element.current_time(),
            duration: known_duration(element.duration()).unwrap_or(0.0),
        })
    }

    fn dispose(&mut self) {
        if let Some(mut element) = self.element.take() {
            debug!("Releasing native element for {}", self.source);
            element.release();
        }
        self.play_pending = false;
    }
}
