//! Per-call event queue with a terminal gate and an exclusive consumer slot.

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use callwire_core::CallEvent;

/// Unbounded FIFO of events for one call.
///
/// Events are buffered until a consumer attaches, so a stream opened after
/// the call finished still observes every event. At most one consumer holds
/// the receiver at a time; it is taken through [`EventQueue::take_receiver`]
/// and handed back when the relay closes.
///
/// A terminal gate enforces the ordering contract: once a terminal event is
/// accepted the queue closes, and every later push is dropped. A terminal
/// event is therefore always the last event delivered, even when a provider
/// token and a cancellation race.
#[derive(Debug)]
pub struct EventQueue {
    sender: Mutex<SenderState>,
    receiver: Mutex<Option<UnboundedReceiver<CallEvent>>>,
}

#[derive(Debug)]
struct SenderState {
    tx: UnboundedSender<CallEvent>,
    closed: bool,
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(SenderState { tx, closed: false }),
            receiver: Mutex::new(Some(rx)),
        }
    }

    /// Pushes one incremental text fragment.
    ///
    /// Returns `false` without enqueuing if a terminal event was already
    /// accepted (a token can still be in flight when cancellation lands).
    pub fn push_partial(&self, text: impl Into<String>) -> bool {
        let guard = self.sender.lock();
        if guard.closed {
            return false;
        }
        guard.tx.send(CallEvent::Partial { text: text.into() }).is_ok()
    }

    /// Pushes the terminal event and closes the gate.
    ///
    /// Returns `false` if another terminal event already closed the queue;
    /// in that case the event is dropped. The gate check and the send happen
    /// under one lock so no partial can slip in after the terminal event.
    pub fn push_terminal(&self, event: CallEvent) -> bool {
        debug_assert!(event.is_terminal(), "partial pushed through terminal path");
        let mut guard = self.sender.lock();
        if guard.closed {
            return false;
        }
        guard.closed = true;
        guard.tx.send(event).is_ok()
    }

    /// Whether a terminal event has been accepted.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.lock().closed
    }

    /// Takes the receiver end, making the caller the queue's sole consumer.
    ///
    /// Returns `None` while another consumer holds it. The consumer must
    /// hand the receiver back via [`EventQueue::restore_receiver`] when done
    /// so a later stream attach can resume delivery.
    pub fn take_receiver(&self) -> Option<UnboundedReceiver<CallEvent>> {
        self.receiver.lock().take()
    }

    /// Returns a previously taken receiver to the slot.
    pub fn restore_receiver(&self, rx: UnboundedReceiver<CallEvent>) {
        *self.receiver.lock() = Some(rx);
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_partials_then_terminal_in_order() {
        let queue = EventQueue::new();
        assert!(queue.push_partial("Hel"));
        assert!(queue.push_partial("lo"));
        assert!(queue.push_terminal(CallEvent::Final { text: "Hello".into() }));

        let mut rx = queue.take_receiver().expect("receiver available");
        assert_eq!(rx.recv().await, Some(CallEvent::Partial { text: "Hel".into() }));
        assert_eq!(rx.recv().await, Some(CallEvent::Partial { text: "lo".into() }));
        assert_eq!(rx.recv().await, Some(CallEvent::Final { text: "Hello".into() }));
    }

    #[tokio::test]
    async fn partial_after_terminal_is_dropped() {
        let queue = EventQueue::new();
        assert!(queue.push_terminal(CallEvent::Cancelled {
            message: "cancelled".into(),
        }));
        assert!(!queue.push_partial("late token"));

        let mut rx = queue.take_receiver().expect("receiver available");
        assert_eq!(
            rx.recv().await,
            Some(CallEvent::Cancelled { message: "cancelled".into() })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn second_terminal_is_rejected() {
        let queue = EventQueue::new();
        assert!(queue.push_terminal(CallEvent::Final { text: "done".into() }));
        assert!(!queue.push_terminal(CallEvent::Error { message: "late".into() }));
        assert!(queue.is_closed());
    }

    #[test]
    fn receiver_slot_is_exclusive() {
        let queue = EventQueue::new();
        let rx = queue.take_receiver().expect("first take succeeds");
        assert!(queue.take_receiver().is_none());

        queue.restore_receiver(rx);
        assert!(queue.take_receiver().is_some());
    }

    #[tokio::test]
    async fn events_buffer_while_unattached() {
        // A consumer attaching after completion still sees every event
        let queue = EventQueue::new();
        assert!(queue.push_partial("a"));
        assert!(queue.push_terminal(CallEvent::Final { text: "a".into() }));

        let mut rx = queue.take_receiver().expect("receiver available");
        assert_eq!(rx.recv().await, Some(CallEvent::Partial { text: "a".into() }));
        assert_eq!(rx.recv().await, Some(CallEvent::Final { text: "a".into() }));
    }

    #[test]
    fn fresh_queue_is_open() {
        let queue = EventQueue::new();
        assert!(!queue.is_closed());
    }
}
