//! Broadcast primitives the pipeline publishes through.
//!
//! - `Signal<T>`: always has a current value; subscribers see the latest.
//! - `Relay<T>`: publish-only events; subscribers see what is sent after
//!   they subscribe.
//! - `ReplayRelay<T>`: like `Relay`, but a late subscriber first receives the
//!   most recent event (replay of one).
//!
//! All three are cheap to clone; clones publish into the same channel.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

const RELAY_CAPACITY: usize = 64;

/// A value cell with change notification.
#[derive(Debug)]
pub struct Signal<T> {
    sender: Arc<watch::Sender<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Clone> Signal<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Replace the value and notify subscribers, even if it is unchanged.
    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Replace the value only when it differs; returns whether it did.
    pub fn set_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

/// Publish-only event channel.
#[derive(Debug)]
pub struct Relay<T> {
    sender: broadcast::Sender<T>,
}

impl<T> Clone for Relay<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Clone> Relay<T> {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(RELAY_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Events sent with no subscribers are dropped.
    pub fn send(&self, value: T) {
        let _ = self.sender.send(value);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T: Clone> Default for Relay<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Event channel that replays the latest event to new subscribers.
#[derive(Debug)]
pub struct ReplayRelay<T> {
    sender: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for ReplayRelay<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Clone> ReplayRelay<T> {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, value: T) {
        self.sender.send_replace(Some(value));
    }

    pub fn latest(&self) -> Option<T> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> ReplaySubscriber<T> {
        let mut receiver = self.sender.subscribe();
        if receiver.borrow().is_some() {
            receiver.mark_changed();
        }
        ReplaySubscriber { receiver }
    }
}

impl<T: Clone> Default for ReplayRelay<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a `ReplayRelay`.
///
/// A slow subscriber only ever sees the newest event it has not yet seen;
/// intermediate events may be skipped.
#[derive(Debug)]
pub struct ReplaySubscriber<T> {
    receiver: watch::Receiver<Option<T>>,
}

impl<T: Clone> ReplaySubscriber<T> {
    /// Wait for the next unseen event. `None` once every relay handle is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            self.receiver.changed().await.ok()?;
            if let Some(value) = self.receiver.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }

    /// The next unseen event, if one is already available.
    pub fn try_recv(&mut self) -> Option<T> {
        if !self.receiver.has_changed().unwrap_or(false) {
            return None;
        }
        self.receiver.borrow_and_update().clone()
    }
}
