//! Relay of host lifecycle events into the script runtime.
//!
//! Host threads post container open/close events through a [`RelaySender`].
//! The script runtime takes the matching [`RelayInbox`], binds it to its own
//! thread as an [`EventRelay`], and delivers events to listeners and streams
//! there, one at a time.
//!
//! ## Ordering
//!
//! Ordering is per producer. Events posted from one thread are delivered in
//! the order that thread posted them. Posts from different threads share one
//! queue, so events from other producers may be delivered between two posts
//! of a single thread; an `opened`/`closed` pair is not delivered as a unit.
//! Listeners that care about one object filter by `object_id`.
//!
//! ## Payloads
//!
//! String payloads are copied into owned buffers on the producer side. Each
//! buffer is released exactly once, when it is decoded or when it is dropped
//! undelivered, and the shared [`PayloadLedger`] counts both ends.

use crate::error::{BridgeError, BridgeResult};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// A container screen was opened for a host object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerOpened {
    pub object_id: i32,
    pub slot_count: i32,
    pub type_id: String,
    pub title: String,
}

/// A container screen was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerClosed {
    pub object_id: i32,
}

// ============================================================================
// Payload ownership
// ============================================================================

/// Counts payload buffers allocated by producers and released by the consumer.
#[derive(Debug, Default)]
pub struct PayloadLedger {
    allocated: AtomicU64,
    released: AtomicU64,
}

impl PayloadLedger {
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Buffers allocated but not yet released.
    pub fn outstanding(&self) -> u64 {
        self.allocated().saturating_sub(self.released())
    }
}

/// Owned copy of a string payload in flight between threads.
pub(crate) struct PayloadBuffer {
    bytes: Vec<u8>,
    ledger: Arc<PayloadLedger>,
}

impl PayloadBuffer {
    fn copy_from(bytes: &[u8], ledger: &Arc<PayloadLedger>) -> Self {
        ledger.allocated.fetch_add(1, Ordering::SeqCst);
        Self {
            bytes: bytes.to_vec(),
            ledger: Arc::clone(ledger),
        }
    }

    /// Decode as UTF-8, consuming and releasing the buffer.
    fn into_string(mut self) -> BridgeResult<String> {
        let bytes = std::mem::take(&mut self.bytes);
        String::from_utf8(bytes)
            .map_err(|e| BridgeError::ProtocolDecode(format!("payload is not UTF-8: {e}")))
    }
}

impl Drop for PayloadBuffer {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for PayloadBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadBuffer")
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug)]
enum RelayMessage {
    Opened {
        object_id: i32,
        slot_count: i32,
        type_id: Option<PayloadBuffer>,
        title: Option<PayloadBuffer>,
    },
    Closed {
        object_id: i32,
    },
}

fn decode_opened(
    object_id: i32,
    slot_count: i32,
    type_id: Option<PayloadBuffer>,
    title: Option<PayloadBuffer>,
) -> BridgeResult<ContainerOpened> {
    if slot_count < 0 {
        return Err(BridgeError::ProtocolDecode(format!(
            "negative slot count {slot_count} for object {object_id}"
        )));
    }

    let type_id = match type_id {
        Some(buffer) => buffer.into_string()?,
        None => {
            return Err(BridgeError::ProtocolDecode(format!(
                "missing type id for object {object_id}"
            )))
        }
    };
    if type_id.is_empty() {
        return Err(BridgeError::ProtocolDecode(format!(
            "empty type id for object {object_id}"
        )));
    }

    // A missing title is shown as an untitled screen.
    let title = match title {
        Some(buffer) => buffer.into_string()?,
        None => String::new(),
    };

    Ok(ContainerOpened {
        object_id,
        slot_count,
        type_id,
        title,
    })
}

// ============================================================================
// Producer side
// ============================================================================

/// Create a connected sender/inbox pair.
pub fn channel() -> (RelaySender, RelayInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ledger = Arc::new(PayloadLedger::default());

    let sender = RelaySender {
        tx,
        ledger: Arc::clone(&ledger),
    };
    (sender, RelayInbox { rx, ledger })
}

/// Host-side handle for posting events. Cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct RelaySender {
    tx: mpsc::UnboundedSender<RelayMessage>,
    ledger: Arc<PayloadLedger>,
}

impl RelaySender {
    /// Post a container-opened event. Returns `false` if the relay is gone.
    pub fn post_opened(&self, object_id: i32, slot_count: i32, type_id: &str, title: &str) -> bool {
        self.post_opened_raw(
            object_id,
            slot_count,
            Some(type_id.as_bytes()),
            Some(title.as_bytes()),
        )
    }

    /// Post a container-opened event with payloads as they arrive from the
    /// host. `None` stands for a payload the host could not provide.
    pub fn post_opened_raw(
        &self,
        object_id: i32,
        slot_count: i32,
        type_id: Option<&[u8]>,
        title: Option<&[u8]>,
    ) -> bool {
        let message = RelayMessage::Opened {
            object_id,
            slot_count,
            type_id: type_id.map(|bytes| PayloadBuffer::copy_from(bytes, &self.ledger)),
            title: title.map(|bytes| PayloadBuffer::copy_from(bytes, &self.ledger)),
        };
        self.send(message)
    }

    /// Post a container-closed event. Returns `false` if the relay is gone.
    pub fn post_closed(&self, object_id: i32) -> bool {
        self.send(RelayMessage::Closed { object_id })
    }

    fn send(&self, message: RelayMessage) -> bool {
        // On failure the message comes back in the error and is dropped here,
        // releasing its buffers.
        match self.tx.send(message) {
            Ok(()) => true,
            Err(_) => {
                debug!("Relay closed, dropping event");
                false
            }
        }
    }

    /// Whether the consuming relay has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn ledger(&self) -> &PayloadLedger {
        &self.ledger
    }
}

// ============================================================================
// Consumer side
// ============================================================================

/// Receiving end of the relay before it is bound to the script thread.
///
/// Unlike [`EventRelay`] this can be moved across threads.
pub struct RelayInbox {
    rx: mpsc::UnboundedReceiver<RelayMessage>,
    ledger: Arc<PayloadLedger>,
}

impl RelayInbox {
    /// Bind the inbox to the current thread. Listeners attached to the
    /// returned relay run on this thread.
    pub fn into_relay(self) -> EventRelay {
        EventRelay {
            rx: self.rx,
            ledger: self.ledger,
            listeners: Rc::new(RefCell::new(Listeners::default())),
            next_listener: Cell::new(1),
            dropped: Cell::new(0),
        }
    }

    pub fn ledger(&self) -> &PayloadLedger {
        &self.ledger
    }
}

impl fmt::Debug for RelayInbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayInbox").finish_non_exhaustive()
    }
}

/// Identifies a listener attached with [`EventRelay::on_opened`] or
/// [`EventRelay::on_closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type OpenedListener = Rc<dyn Fn(&ContainerOpened)>;
type ClosedListener = Rc<dyn Fn(&ContainerClosed)>;

#[derive(Default)]
struct Listeners {
    opened: Vec<(ListenerId, OpenedListener)>,
    closed: Vec<(ListenerId, ClosedListener)>,
    opened_streams: Vec<mpsc::UnboundedSender<ContainerOpened>>,
    closed_streams: Vec<mpsc::UnboundedSender<ContainerClosed>>,
}

/// Per-subscriber stream of relayed events.
///
/// Unbounded, so a slow subscriber never loses events. Only events delivered
/// after the subscription are seen.
#[derive(Debug)]
pub struct EventStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> EventStream<T> {
    /// Wait for the next event. `None` once the relay is dropped and the
    /// stream is empty.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next already-delivered event, if any.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// Script-side end of the relay.
///
/// Not `Send`: it lives on the script runtime's thread, and listeners run
/// there.
pub struct EventRelay {
    rx: mpsc::UnboundedReceiver<RelayMessage>,
    ledger: Arc<PayloadLedger>,
    listeners: Rc<RefCell<Listeners>>,
    next_listener: Cell<u64>,
    dropped: Cell<u64>,
}

impl EventRelay {
    fn next_listener_id(&self) -> ListenerId {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        ListenerId(id)
    }

    /// Call `f` for every container-opened event.
    pub fn on_opened(&self, f: impl Fn(&ContainerOpened) + 'static) -> ListenerId {
        let id = self.next_listener_id();
        self.listeners.borrow_mut().opened.push((id, Rc::new(f)));
        id
    }

    /// Call `f` for every container-closed event.
    pub fn on_closed(&self, f: impl Fn(&ContainerClosed) + 'static) -> ListenerId {
        let id = self.next_listener_id();
        self.listeners.borrow_mut().closed.push((id, Rc::new(f)));
        id
    }

    /// Detach a listener. Returns `false` if it was not attached.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.opened.len() + listeners.closed.len();
        listeners.opened.retain(|(lid, _)| *lid != id);
        listeners.closed.retain(|(lid, _)| *lid != id);
        before != listeners.opened.len() + listeners.closed.len()
    }

    pub fn subscribe_opened(&self) -> EventStream<ContainerOpened> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.borrow_mut().opened_streams.push(tx);
        EventStream { rx }
    }

    pub fn subscribe_closed(&self) -> EventStream<ContainerClosed> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.borrow_mut().closed_streams.push(tx);
        EventStream { rx }
    }

    /// Deliver every event already queued. Returns how many were taken off
    /// the queue, including dropped ones.
    pub fn drain(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.deliver(message);
            processed += 1;
        }
        processed
    }

    /// Wait for one event and deliver it. Returns `false` once every sender
    /// is gone and the queue is empty.
    ///
    /// Cancel safe: an event is either fully delivered or left in the queue.
    pub async fn run_once(&mut self) -> bool {
        match self.rx.recv().await {
            Some(message) => {
                self.deliver(message);
                true
            }
            None => false,
        }
    }

    /// Deliver events until every sender is dropped.
    pub async fn run(&mut self) {
        while self.run_once().await {}
        debug!("All relay senders dropped");
    }

    /// Number of events rejected as malformed.
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    pub fn ledger(&self) -> &PayloadLedger {
        &self.ledger
    }

    fn deliver(&self, message: RelayMessage) {
        match message {
            RelayMessage::Opened {
                object_id,
                slot_count,
                type_id,
                title,
            } => match decode_opened(object_id, slot_count, type_id, title) {
                Ok(event) => self.deliver_opened(event),
                Err(e) => {
                    self.dropped.set(self.dropped.get() + 1);
                    warn!(object_id, "Dropping container event: {}", e);
                }
            },
            RelayMessage::Closed { object_id } => {
                self.deliver_closed(ContainerClosed { object_id });
            }
        }
    }

    fn deliver_opened(&self, event: ContainerOpened) {
        debug!(object_id = event.object_id, type_id = %event.type_id, "Container opened");

        // Copy listeners out so they may attach or detach listeners themselves.
        let listeners: Vec<OpenedListener> = {
            let mut state = self.listeners.borrow_mut();
            state
                .opened_streams
                .retain(|tx| tx.send(event.clone()).is_ok());
            state.opened.iter().map(|(_, f)| Rc::clone(f)).collect()
        };

        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                error!(object_id = event.object_id, "Container-opened listener panicked");
            }
        }
    }

    fn deliver_closed(&self, event: ContainerClosed) {
        debug!(object_id = event.object_id, "Container closed");

        let listeners: Vec<ClosedListener> = {
            let mut state = self.listeners.borrow_mut();
            state.closed_streams.retain(|tx| tx.send(event).is_ok());
            state.closed.iter().map(|(_, f)| Rc::clone(f)).collect()
        };

        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                error!(object_id = event.object_id, "Container-closed listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_pair() -> (RelaySender, EventRelay) {
        let (sender, inbox) = channel();
        (sender, inbox.into_relay())
    }

    #[test]
    fn test_fifo_per_subscriber() {
        let (sender, mut relay) = relay_pair();
        let mut first = relay.subscribe_opened();
        let mut second = relay.subscribe_opened();

        for id in 0..20 {
            assert!(sender.post_opened(id, 9, "mymod:crate", "Crate"));
        }
        assert_eq!(relay.drain(), 20);

        for stream in [&mut first, &mut second] {
            let ids: Vec<i32> = std::iter::from_fn(|| stream.try_recv())
                .map(|event| event.object_id)
                .collect();
            assert_eq!(ids, (0..20).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_late_subscriber_sees_no_replay() {
        let (sender, mut relay) = relay_pair();
        sender.post_closed(1);
        relay.drain();

        let mut late = relay.subscribe_closed();
        sender.post_closed(2);
        relay.drain();

        assert_eq!(late.try_recv(), Some(ContainerClosed { object_id: 2 }));
        assert_eq!(late.try_recv(), None);
    }

    #[test]
    fn test_listeners_receive_events() {
        let (sender, mut relay) = relay_pair();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&seen);
        relay.on_opened(move |e| log.borrow_mut().push(format!("open {} {}", e.object_id, e.title)));
        let log = Rc::clone(&seen);
        relay.on_closed(move |e| log.borrow_mut().push(format!("close {}", e.object_id)));

        sender.post_opened(42, 27, "mymod:chest", "Chest");
        sender.post_closed(42);
        relay.drain();

        assert_eq!(*seen.borrow(), vec!["open 42 Chest", "close 42"]);
    }

    #[test]
    fn test_remove_listener() {
        let (sender, mut relay) = relay_pair();
        let count = Rc::new(Cell::new(0));

        let c = Rc::clone(&count);
        let id = relay.on_closed(move |_| c.set(c.get() + 1));
        sender.post_closed(1);
        relay.drain();

        assert!(relay.remove_listener(id));
        assert!(!relay.remove_listener(id));
        sender.post_closed(2);
        relay.drain();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_malformed_payloads_are_dropped() {
        let (sender, mut relay) = relay_pair();
        let mut stream = relay.subscribe_opened();

        sender.post_opened_raw(1, 9, None, Some(b"Title"));
        sender.post_opened_raw(2, 9, Some(b""), Some(b"Title"));
        sender.post_opened_raw(3, 9, Some(&[0xff, 0xfe]), Some(b"Title"));
        sender.post_opened_raw(4, -1, Some(b"mymod:chest"), Some(b"Title"));
        sender.post_opened_raw(5, 9, Some(b"mymod:chest"), Some(&[0xc3]));
        sender.post_opened_raw(6, 9, Some(b"mymod:chest"), None);

        assert_eq!(relay.drain(), 6);
        assert_eq!(relay.dropped(), 5);

        let event = stream.try_recv().unwrap();
        assert_eq!(event.object_id, 6);
        assert_eq!(event.title, "");
        assert_eq!(stream.try_recv(), None);
        assert_eq!(relay.ledger().outstanding(), 0);
    }

    #[test]
    fn test_ledger_balanced_after_drain() {
        let (sender, mut relay) = relay_pair();
        for id in 0..10 {
            sender.post_opened(id, 3, "mymod:bin", "Bin");
        }
        assert_eq!(sender.ledger().allocated(), 20);
        assert_eq!(sender.ledger().outstanding(), 20);

        relay.drain();
        assert_eq!(relay.ledger().released(), 20);
        assert_eq!(relay.ledger().outstanding(), 0);
    }

    #[test]
    fn test_ledger_balanced_after_undelivered_drop() {
        let (sender, relay) = relay_pair();
        let ledger_view = sender.clone();
        for id in 0..5 {
            sender.post_opened(id, 3, "mymod:bin", "Bin");
        }
        drop(relay);

        assert!(ledger_view.is_closed());
        assert!(!sender.post_opened(99, 3, "mymod:bin", "Bin"));
        assert_eq!(ledger_view.ledger().allocated(), 12);
        assert_eq!(ledger_view.ledger().outstanding(), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let (sender, mut relay) = relay_pair();
        let reached = Rc::new(Cell::new(false));

        relay.on_closed(|_| panic!("listener bug"));
        let r = Rc::clone(&reached);
        relay.on_closed(move |_| r.set(true));

        sender.post_closed(7);
        relay.drain();
        assert!(reached.get());
    }

    #[tokio::test]
    async fn test_run_stops_when_senders_dropped() {
        let (sender, mut relay) = relay_pair();
        let mut stream = relay.subscribe_closed();

        let producer = std::thread::spawn(move || {
            for id in 0..3 {
                sender.post_closed(id);
            }
        });
        producer.join().unwrap();

        relay.run().await;
        let ids: Vec<i32> = std::iter::from_fn(|| stream.try_recv())
            .map(|e| e.object_id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
