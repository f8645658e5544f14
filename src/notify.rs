//! Init-system liveness notification
//!
//! When started by systemd with `Type=notify`, `NOTIFY_SOCKET` names a datagram
//! socket that expects `READY=1` once the service is usable and `STOPPING=1`
//! when it begins shutting down (path or Linux abstract `@name`, handled by
//! `sd-notify`). Without that variable a no-op notifier is used and behavior is
//! otherwise identical.

use sd_notify::NotifyState;
use tracing::{debug, info, warn};

pub trait Notifier: Send + Sync {
    fn ready(&self);
    fn stopping(&self);
}

/// Used when the environment has no notification socket
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn ready(&self) {}
    fn stopping(&self) {}
}

/// Sends sd_notify datagrams to `$NOTIFY_SOCKET`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemdNotifier;

impl SystemdNotifier {
    fn notify(&self, state: NotifyState<'_>, label: &str) {
        match sd_notify::notify(false, &[state]) {
            Ok(()) => debug!("Sent {} notification", label),
            Err(e) => warn!("Failed to notify init system ({}): {}", label, e),
        }
    }
}

impl Notifier for SystemdNotifier {
    fn ready(&self) {
        info!("Signaling readiness");
        self.notify(NotifyState::Ready, "READY=1");
    }

    fn stopping(&self) {
        self.notify(NotifyState::Stopping, "STOPPING=1");
    }
}

/// Picks the notifier supported by the surrounding environment.
pub fn from_env() -> Box<dyn Notifier> {
    match std::env::var("NOTIFY_SOCKET") {
        Ok(socket) if !socket.is_empty() => {
            info!("Init system notification socket detected");
            Box::new(SystemdNotifier)
        }
        _ => {
            debug!("Not using init system notification");
            Box::new(NoopNotifier)
        }
    }
}
