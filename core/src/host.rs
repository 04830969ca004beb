use log::{debug, info};

use crate::config::HostConfig;
use crate::error::{MediaError, Result};
use crate::session::{MediaFacade, Session};

/// Widget lifecycle around a facade: one session per attachment.
pub struct PlayerHost {
    facade: MediaFacade,
    config: HostConfig,
    session: Option<Session>,
}

impl PlayerHost {
    pub fn new(facade: MediaFacade, config: HostConfig) -> Self {
        Self {
            facade,
            config,
            session: None,
        }
    }

    pub fn facade(&self) -> &MediaFacade {
        &self.facade
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    /// Create a fresh session from the current configuration, disposing any
    /// previous one. Returns false when no source is configured.
    pub fn attach(&mut self) -> bool {
        self.detach();
        self.session = self.facade.initialize_with(&self.config);
        if let Some(session) = &self.session {
            info!("Attached {} session {}", session.kind(), session.id());
        }
        self.session.is_some()
    }

    pub fn detach(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Detaching session {}", session.id());
            session.dispose();
        }
    }

    /// Update one attribute. A changed `src` rebinds an attached native
    /// session in place; other changes apply on the next attach.
    pub fn set_attribute(&mut self, name: &str, value: &str) -> Result<bool> {
        let changed = self.config.set_attribute(name, value)?;
        if !changed || name != "src" {
            return Ok(changed);
        }
        match &self.session {
            Some(session) => match self.config.source() {
                Ok(source) => session.set_source(&source),
                Err(MediaError::SourceMissing) => {
                    debug!("src cleared, keeping the current source until detach");
                    Ok(false)
                }
                Err(e) => Err(e),
            },
            None => Ok(changed),
        }
    }

    /// The attached session, or `InvalidCommand` when detached.
    pub fn require_session(&self, op: &'static str) -> Result<&Session> {
        self.session.as_ref().ok_or(MediaError::InvalidCommand(op))
    }
}

impl Drop for PlayerHost {
    fn drop(&mut self) {
        self.detach();
    }
}
