use crossbeam_channel::{Receiver, Sender};

use crate::domain::ports::TaskBroker;

/// In-process stand-in for spec §6's durable task broker: an unbounded
/// `crossbeam_channel` carrying DNA candidates from the coordinator to
/// whichever `WorkerRuntime` thread pops next. `next()` blocks exactly
/// like a broker consumer waiting on a durable queue (spec §5
/// "Workers suspend on the task queue"), and `dispatch` never blocks the
/// coordinator since the channel is unbounded.
pub struct ChannelBroker<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> ChannelBroker<T> {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// A cloneable handle that can dispatch tasks without needing a
    /// reference to the broker itself.
    pub fn sender(&self) -> Sender<T> {
        self.sender.clone()
    }

    pub fn receiver(&self) -> Receiver<T> {
        self.receiver.clone()
    }

    /// Closes the broker: queued `next()` calls drain remaining tasks
    /// then return `None` once every sender handle (including the one
    /// owned by this broker) has been dropped.
    pub fn close(self) {
        drop(self.sender);
    }
}

impl<T> Default for ChannelBroker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> TaskBroker<T> for ChannelBroker<T> {
    fn dispatch(&self, task: T) {
        // Unbounded: only fails if every receiver has already been
        // dropped, which only happens after the coordinator has shut
        // every worker down — nothing to deliver to at that point.
        let _ = self.sender.send(task);
    }

    fn next(&self) -> Option<T> {
        self.receiver.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatched_tasks_are_received_in_fifo_order() {
        let broker: ChannelBroker<u32> = ChannelBroker::new();
        broker.dispatch(1);
        broker.dispatch(2);
        assert_eq!(broker.next(), Some(1));
        assert_eq!(broker.next(), Some(2));
    }

    #[test]
    fn next_returns_none_once_every_sender_is_dropped() {
        let broker: ChannelBroker<u32> = ChannelBroker::new();
        let receiver = broker.receiver();
        broker.close();
        assert_eq!(receiver.recv(), Err(crossbeam_channel::RecvError));
    }
}
