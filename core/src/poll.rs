use std::time::Duration;

use log::debug;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::session::WeakSession;

/// Background task reading progress from a backend that only exposes it by
/// polling.
///
/// The task holds a weak handle: it stops on its own once the session is
/// dropped, disposed or failed, and [`ProgressPoller::cancel`] stops it
/// immediately.
pub struct ProgressPoller {
    task: JoinHandle<()>,
}

impl ProgressPoller {
    /// Start polling every `every`. Returns `None` outside a tokio runtime;
    /// such hosts call [`crate::Session::poll_progress`] from their own timer.
    pub(crate) fn spawn(session: WeakSession, every: Duration) -> Option<Self> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!("No async runtime, progress polling left to the host");
                return None;
            }
        };
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !session.poll_progress() {
                    debug!("Progress poller stopping");
                    break;
                }
            }
        });
        Some(Self { task })
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}
