//! Online/offline signal shared by the remote store and the sync engine.
//!
//! The platform layer feeds browser/system connectivity events into
//! `set_online`; consumers either poll `is_online` or watch transitions
//! through `subscribe`.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    /// Defaults to online; the platform flips it on transition events.
    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn set_online(&self, online: bool) {
        // send_if_modified avoids waking watchers on repeated same-state events.
        self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transitions_are_observable() {
        let connectivity = Connectivity::online();
        let mut rx = connectivity.subscribe();
        assert!(connectivity.is_online());

        connectivity.set_online(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
        assert!(!connectivity.is_online());
    }

    #[tokio::test]
    async fn repeated_same_state_does_not_wake_watchers() {
        let connectivity = Connectivity::online();
        let mut rx = connectivity.subscribe();
        connectivity.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }
}
