//! Renderer callbacks.

use crate::error::SyncError;
use crossbeam_channel::Sender;

use super::types::Notification;

/// Receives positional updates for a mirrored list.
///
/// Every method defaults to a no-op so renderers implement only what they
/// draw.
pub trait ListObserver {
    fn on_item_inserted(&mut self, _index: usize) {}

    fn on_item_changed(&mut self, _index: usize) {}

    fn on_item_moved(&mut self, _from: usize, _to: usize) {}

    fn on_item_removed(&mut self, _index: usize) {}

    /// The list was cleared; redraw from scratch.
    fn on_data_set_changed(&mut self) {}

    /// Called once after every applied batch with the new item count.
    fn on_data_changed(&mut self, _count: usize) {}

    fn on_error(&mut self, _error: &SyncError) {}
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl ListObserver for NoopObserver {}

/// Forwards every callback as a [`Notification`] over a channel.
///
/// Sends are best effort: a dropped receiver is ignored.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    sender: Sender<Notification>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<Notification>) -> Self {
        Self { sender }
    }

    fn send(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }
}

impl ListObserver for ChannelObserver {
    fn on_item_inserted(&mut self, index: usize) {
        self.send(Notification::Inserted { index });
    }

    fn on_item_changed(&mut self, index: usize) {
        self.send(Notification::Changed { index });
    }

    fn on_item_moved(&mut self, from: usize, to: usize) {
        self.send(Notification::Moved { from, to });
    }

    fn on_item_removed(&mut self, index: usize) {
        self.send(Notification::Removed { index });
    }

    fn on_data_set_changed(&mut self) {
        self.send(Notification::Reset);
    }

    fn on_data_changed(&mut self, count: usize) {
        self.send(Notification::DataChanged { count });
    }

    fn on_error(&mut self, error: &SyncError) {
        self.send(Notification::from(error));
    }
}

/// Collects notifications in memory, in order.
impl ListObserver for Vec<Notification> {
    fn on_item_inserted(&mut self, index: usize) {
        self.push(Notification::Inserted { index });
    }

    fn on_item_changed(&mut self, index: usize) {
        self.push(Notification::Changed { index });
    }

    fn on_item_moved(&mut self, from: usize, to: usize) {
        self.push(Notification::Moved { from, to });
    }

    fn on_item_removed(&mut self, index: usize) {
        self.push(Notification::Removed { index });
    }

    fn on_data_set_changed(&mut self) {
        self.push(Notification::Reset);
    }

    fn on_data_changed(&mut self, count: usize) {
        self.push(Notification::DataChanged { count });
    }

    fn on_error(&mut self, error: &SyncError) {
        self.push(Notification::from(error));
    }
}
