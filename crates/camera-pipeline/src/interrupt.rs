//! Process-wide wakeup channel for media calls blocked inside the library.
//!
//! One token per stop request is pushed into an always-drainable channel
//! that every pipeline's interrupt hook polls without blocking. Whichever
//! worker drains a token aborts its current media call and re-checks its own
//! stop flag; workers that were not the target simply reconnect, which is
//! the cost of keeping the primitive shared and signal-free.

use crossbeam_channel::{unbounded, Receiver, Sender};

#[derive(Clone)]
pub(crate) struct InterruptChannel {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl InterruptChannel {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Wake any pipeline currently blocked inside the media library.
    pub(crate) fn notify(&self) {
        let _ = self.tx.send(());
    }

    /// Non-blocking poll used by interrupt hooks; consumes one pending
    /// token when present.
    pub(crate) fn consume_pending(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Discard notifications left over from earlier stops so a new pipeline
    /// does not abort its first read on stale tokens.
    pub(crate) fn drain(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_consumed_one_by_one() {
        let channel = InterruptChannel::new();
        assert!(!channel.consume_pending());

        channel.notify();
        channel.notify();
        assert!(channel.consume_pending());
        assert!(channel.consume_pending());
        assert!(!channel.consume_pending());
    }

    #[test]
    fn drain_clears_everything() {
        let channel = InterruptChannel::new();
        for _ in 0..5 {
            channel.notify();
        }
        channel.drain();
        assert!(!channel.consume_pending());
    }

    #[test]
    fn clones_share_the_same_stream() {
        let channel = InterruptChannel::new();
        let other = channel.clone();
        channel.notify();
        assert!(other.consume_pending());
        assert!(!channel.consume_pending());
    }
}
