use std::sync::Arc;

use anyhow::{Context, Result};
use harmony_core::media::sim::SimulatedPage;
use harmony_core::{
    EmbedApiLoader, FacadeEvent, HostConfig, MediaFacade, MediaKind, PlayerHost, Session,
    format_progress,
};
use log::{debug, info};
use tokio::sync::mpsc::UnboundedReceiver;

/// Upper bound on settle rounds per pump; each round may trigger the next
/// (player ready, then the state change it causes).
const MAX_SETTLE_ROUNDS: usize = 8;

/// Command-line harness around one player host and its simulated page.
pub struct App {
    host: PlayerHost,
    page: SimulatedPage,
    events: UnboundedReceiver<FacadeEvent>,
    pub should_quit: bool,
    json: bool,
    last_progress: String,
}

impl App {
    /// Harness over the process-wide embedded API loader.
    pub fn new(config: HostConfig, json: bool) -> Self {
        Self::with_loader(config, EmbedApiLoader::shared(), json)
    }

    pub fn with_loader(config: HostConfig, loader: EmbedApiLoader, json: bool) -> Self {
        let page = SimulatedPage::new();
        let facade = MediaFacade::new(Arc::new(page.clone()), Arc::new(page.clone()), loader);
        let events = facade.subscribe();
        Self {
            host: PlayerHost::new(facade, config),
            page,
            events,
            should_quit: false,
            json,
            last_progress: String::new(),
        }
    }

    #[cfg(test)]
    pub fn page(&self) -> &SimulatedPage {
        &self.page
    }

    pub fn is_embedded(&self) -> bool {
        self.host.config().kind == MediaKind::Embedded
    }

    /// The attached session, or an error naming the command that needed it.
    pub fn session(&self, op: &'static str) -> Result<Session> {
        let session = self.host.require_session(op)?;
        Ok(session.clone())
    }

    pub fn attach(&mut self) -> Result<()> {
        if self.host.attach() {
            self.pump();
        } else {
            self.set_status("Nothing to play: no source configured");
        }
        Ok(())
    }

    pub fn detach(&mut self) {
        self.host.detach();
        self.last_progress.clear();
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        let changed = self
            .host
            .set_attribute(name, value)
            .with_context(|| format!("Failed to set {}", name))?;
        if changed {
            self.set_status(format!("{} = {}", name, value));
        }
        Ok(())
    }

    /// The simulated page finished loading the embedded player API.
    pub fn api_ready(&mut self) {
        let notified = self.host.facade().loader().notify_ready();
        debug!("API ready reached {} subscriber(s)", notified);
        self.pump();
    }

    pub fn api_fail(&mut self, reason: &str) {
        self.host.facade().loader().notify_failed(reason);
    }

    /// Deliver every pending platform answer to the session.
    pub fn pump(&mut self) {
        let Some(session) = self.host.session().cloned() else {
            return;
        };
        for _ in 0..MAX_SETTLE_ROUNDS {
            let events = self.page.settle();
            if events.is_empty() {
                return;
            }
            for event in events {
                session.handle_event(event);
            }
        }
        debug!("Page still busy after {} settle rounds", MAX_SETTLE_ROUNDS);
    }

    /// Advance the simulated clock. Background polling picks up embedded
    /// progress on its own.
    pub fn advance_clock(&mut self, seconds: f64) {
        let events = self.page.advance(seconds);
        if let Some(session) = self.host.session().cloned() {
            for event in events {
                session.handle_event(event);
            }
        }
        self.pump();
    }

    /// Advance the clock and read progress immediately, for scripted runs.
    pub fn tick(&mut self, seconds: f64) {
        self.advance_clock(seconds);
        if let Some(session) = self.host.session() {
            session.poll_progress();
        }
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        println!("{} {}", timestamp(), message);
    }

    pub fn status_line(&self) -> String {
        let Some(session) = self.host.session() else {
            return "detached".to_string();
        };
        if self.json {
            return serde_json::to_string(&session.snapshot())
                .unwrap_or_else(|e| format!("snapshot unavailable: {}", e));
        }
        format!(
            "{} {} {} vol {}",
            session.kind(),
            session.state(),
            session.progress().label(),
            session.volume()
        )
    }

    pub fn show_status(&mut self) {
        let line = self.status_line();
        println!("{} {}", timestamp(), line);
    }

    pub fn show_help(&self) {
        println!("Commands:");
        for (usage, about) in HELP {
            println!("  {:<22} {}", usage, about);
        }
    }

    /// Print facade notifications received since the last call. Progress is
    /// only printed when the displayed time changes.
    pub fn print_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            let line = match event {
                FacadeEvent::ProgressChanged { position, duration } => {
                    let label = format_progress(position, duration);
                    if label == self.last_progress {
                        continue;
                    }
                    self.last_progress = label.clone();
                    label
                }
                FacadeEvent::StateChanged(state) => format!("state: {}", state),
                FacadeEvent::VolumeChanged(level) => format!("volume: {}", level),
                FacadeEvent::PlaybackFailed(reason) => format!("playback failed: {}", reason),
                FacadeEvent::PlaybackEnded => "playback ended".to_string(),
                FacadeEvent::Ready => "ready".to_string(),
            };
            println!("{} {}", timestamp(), line);
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.detach();
    }
}

const HELP: [(&str, &str); 14] = [
    ("toggle | t", "Play or pause"),
    ("play | p", "Start playback"),
    ("pause", "Pause playback"),
    ("seek | s <f|n%>", "Seek to a fraction of the duration"),
    ("volume | v <0-100>", "Set the volume"),
    ("restart", "Seek to the start and play"),
    ("tick <seconds>", "Advance the simulated clock"),
    ("src <url>", "Change the source attribute"),
    ("set <name> <value>", "Change any attribute"),
    ("api [ready|fail <why>]", "Resolve the embedded API load"),
    ("attach | detach", "Create or tear down the session"),
    ("status", "Show the session status"),
    ("help | h | ?", "Show this help"),
    ("quit | exit", "Leave the player"),
];

fn timestamp() -> String {
    chrono::Local::now().format("[%H:%M:%S%.3f]").to_string()
}
