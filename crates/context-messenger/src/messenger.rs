//! Envelope routing, listener lifecycle, and channel teardown.

use crate::{Envelope, MessengerError, MessengerResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Remote execution context a channel talks to.
///
/// The host supplies the real postMessage/extension-port plumbing; this core
/// only needs delivery and a liveness check.
pub trait RemoteContext: Send + Sync {
    /// Push an envelope into the remote context.
    fn deliver(&self, envelope: &Envelope) -> MessengerResult<()>;

    /// Whether the remote context has gone away (window closed, port dead).
    fn is_closed(&self) -> bool;
}

/// Kind of remote context a channel is opened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTarget {
    /// A spawned popup/iframe window.
    Iframe,
    /// The extension runtime.
    Extension,
}

/// Handle to a registered listener.
///
/// `unsubscribe` MUST be invoked on teardown to avoid leaking listeners
/// across repeated open/close cycles; dropping the guard does it too, and
/// doing both is safe — removal happens exactly once.
pub struct ListenerGuard {
    id: Uuid,
    active: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

impl ListenerGuard {
    /// Remove the listener. Idempotent.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.handle.abort();
            debug!(listener_id = %self.id, "Listener removed");
        }
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

struct ChannelInner {
    target: ChannelTarget,
    remote: Arc<dyn RemoteContext>,
    torn_down: AtomicBool,
    guards: Mutex<Vec<ListenerGuard>>,
}

impl ChannelInner {
    /// Tear the channel down exactly once, removing every attached listener.
    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let guards = {
            let mut guards = self.guards.lock().unwrap();
            std::mem::take(&mut *guards)
        };
        for guard in &guards {
            guard.unsubscribe();
        }
        info!(channel = ?self.target, listeners = guards.len(), "Channel torn down");
    }
}

/// An open channel to a remote context.
///
/// Teardown happens when the remote closes (detected by the liveness poll)
/// or when the local caller tears down explicitly; either way attached
/// listeners are removed exactly once. Dropping the channel also tears down.
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Send an envelope, fire-and-forget. Fails only locally (channel already
    /// torn down, or the host delivery hook refused).
    pub fn send(&self, envelope: &Envelope) -> MessengerResult<()> {
        if self.inner.torn_down.load(Ordering::SeqCst) {
            warn!(channel = ?self.inner.target, "Dropping send on torn-down channel");
            return Err(MessengerError::TornDown);
        }
        self.inner.remote.deliver(envelope)
    }

    /// Attach a listener whose lifetime is bound to this channel: it is
    /// removed when the channel tears down.
    pub fn attach(&self, guard: ListenerGuard) {
        if self.inner.torn_down.load(Ordering::SeqCst) {
            guard.unsubscribe();
            return;
        }
        self.inner.guards.lock().unwrap().push(guard);
    }

    /// Explicit local teardown. Idempotent.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    /// Whether the channel has been torn down.
    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }

    /// The kind of remote this channel targets.
    pub fn target(&self) -> ChannelTarget {
        self.inner.target
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

/// Routes envelopes between the local context and remote ones.
pub struct Messenger {
    inbound_tx: broadcast::Sender<Envelope>,
    close_poll_interval: Duration,
}

impl Default for Messenger {
    fn default() -> Self {
        Self::new()
    }
}

impl Messenger {
    /// Create a messenger with the default 1s remote-close poll.
    pub fn new() -> Self {
        Self::with_poll_interval(Duration::from_secs(1))
    }

    /// Create a messenger with a custom remote-close poll interval.
    pub fn with_poll_interval(close_poll_interval: Duration) -> Self {
        let (inbound_tx, _) = broadcast::channel(64);
        Self {
            inbound_tx,
            close_poll_interval,
        }
    }

    /// Feed a raw incoming cross-window message through the envelope filter.
    /// Returns whether the message was accepted for dispatch.
    pub fn deliver_raw(&self, raw: &str) -> bool {
        match Envelope::parse(raw) {
            Some(envelope) => {
                self.deliver(envelope);
                true
            }
            None => false,
        }
    }

    /// Dispatch an already-validated envelope to all listeners.
    pub fn deliver(&self, envelope: Envelope) {
        // No subscribers is fine; messages are fire-and-forget
        let _ = self.inbound_tx.send(envelope);
    }

    /// Register a listener for envelopes matching `predicate`.
    ///
    /// Returns a guard that MUST be unsubscribed (or dropped) on teardown.
    pub fn listen<P, C>(&self, predicate: P, callback: C) -> ListenerGuard
    where
        P: Fn(&Envelope) -> bool + Send + Sync + 'static,
        C: Fn(Envelope) + Send + Sync + 'static,
    {
        let mut rx = self.inbound_tx.subscribe();
        let active = Arc::new(AtomicBool::new(true));
        let task_active = active.clone();
        let id = Uuid::new_v4();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if !task_active.load(Ordering::SeqCst) {
                            break;
                        }
                        if predicate(&envelope) {
                            callback(envelope);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Listener lagged behind, envelopes dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        debug!(listener_id = %id, "Listener registered");
        ListenerGuard { id, active, handle }
    }

    /// Open a channel to a remote context.
    ///
    /// Spawns the liveness poll that tears the channel down once the remote
    /// reports closed. The poll stops as soon as the channel is torn down or
    /// dropped.
    pub fn open(&self, target: ChannelTarget, remote: Arc<dyn RemoteContext>) -> Channel {
        let inner = Arc::new(ChannelInner {
            target,
            remote,
            torn_down: AtomicBool::new(false),
            guards: Mutex::new(Vec::new()),
        });

        let weak: Weak<ChannelInner> = Arc::downgrade(&inner);
        let poll_interval = self.close_poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                let inner = match weak.upgrade() {
                    Some(inner) => inner,
                    None => break,
                };
                if inner.torn_down.load(Ordering::SeqCst) {
                    break;
                }
                if inner.remote.is_closed() {
                    debug!(channel = ?inner.target, "Remote context closed, tearing down channel");
                    inner.teardown();
                    break;
                }
            }
        });

        info!(channel = ?target, "Channel opened");
        Channel { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageKind, MessageSource};
    use std::sync::atomic::AtomicUsize;

    struct FakeRemote {
        delivered: Mutex<Vec<Envelope>>,
        closed: AtomicBool,
        refuse: bool,
    }

    impl FakeRemote {
        fn new() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                refuse: false,
            }
        }

        fn refusing() -> Self {
            Self {
                refuse: true,
                ..Self::new()
            }
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    impl RemoteContext for FakeRemote {
        fn deliver(&self, envelope: &Envelope) -> MessengerResult<()> {
            if self.refuse {
                return Err(MessengerError::Delivery("window gone".into()));
            }
            self.delivered.lock().unwrap().push(envelope.clone());
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    fn fast_messenger() -> Messenger {
        Messenger::with_poll_interval(Duration::from_millis(10))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn listener_receives_matching_envelopes_only() {
        let messenger = fast_messenger();
        let seen: Arc<Mutex<Vec<Envelope>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let guard = messenger.listen(
            |env| env.matches(MessageSource::OnairosIframe, MessageKind::ConsentApproved),
            move |env| sink.lock().unwrap().push(env),
        );

        messenger.deliver(Envelope::handshake(MessageSource::Webpage));
        messenger.deliver(Envelope::consent_approved(
            MessageSource::OnairosIframe,
            serde_json::json!({"ok": true}),
        ));
        settle().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, MessageKind::ConsentApproved);
        drop(guard);
    }

    #[tokio::test]
    async fn deliver_raw_filters_at_the_boundary() {
        let messenger = fast_messenger();
        let count = Arc::new(AtomicUsize::new(0));

        let sink = count.clone();
        let _guard = messenger.listen(
            |_| true,
            move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert!(!messenger.deliver_raw("not json"));
        assert!(!messenger.deliver_raw(r#"{"source":"evil","type":"CLOSE"}"#));
        assert!(messenger.deliver_raw(r#"{"source":"webpage","type":"CLOSE"}"#));
        settle().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery_and_is_idempotent() {
        let messenger = fast_messenger();
        let count = Arc::new(AtomicUsize::new(0));

        let sink = count.clone();
        let guard = messenger.listen(
            |_| true,
            move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            },
        );

        messenger.deliver(Envelope::close(MessageSource::Webpage));
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        guard.unsubscribe();
        guard.unsubscribe();
        assert!(!guard.is_active());

        messenger.deliver(Envelope::close(MessageSource::Webpage));
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_guard_unsubscribes() {
        let messenger = fast_messenger();
        let count = Arc::new(AtomicUsize::new(0));

        let sink = count.clone();
        let guard = messenger.listen(
            |_| true,
            move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            },
        );
        drop(guard);

        messenger.deliver(Envelope::close(MessageSource::Webpage));
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn channel_sends_until_torn_down() {
        let messenger = fast_messenger();
        let remote = Arc::new(FakeRemote::new());
        let channel = messenger.open(ChannelTarget::Iframe, remote.clone());

        channel
            .send(&Envelope::handshake(MessageSource::Webpage))
            .unwrap();
        assert_eq!(remote.delivered.lock().unwrap().len(), 1);

        channel.teardown();
        channel.teardown();
        assert!(channel.is_torn_down());

        let result = channel.send(&Envelope::close(MessageSource::Webpage));
        assert!(matches!(result, Err(MessengerError::TornDown)));
        assert_eq!(remote.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delivery_refusal_surfaces_locally() {
        let messenger = fast_messenger();
        let channel = messenger.open(ChannelTarget::Iframe, Arc::new(FakeRemote::refusing()));

        let result = channel.send(&Envelope::handshake(MessageSource::Webpage));
        assert!(matches!(result, Err(MessengerError::Delivery(_))));
    }

    #[tokio::test]
    async fn remote_close_tears_down_and_removes_listeners_once() {
        let messenger = fast_messenger();
        let remote = Arc::new(FakeRemote::new());
        let channel = messenger.open(ChannelTarget::Extension, remote.clone());

        let count = Arc::new(AtomicUsize::new(0));
        let sink = count.clone();
        let guard = messenger.listen(
            |_| true,
            move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            },
        );
        channel.attach(guard);

        remote.close();
        settle().await;

        assert!(channel.is_torn_down());

        // Attached listener was removed by the teardown
        messenger.deliver(Envelope::close(MessageSource::Webpage));
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn attach_after_teardown_removes_listener_immediately() {
        let messenger = fast_messenger();
        let channel = messenger.open(ChannelTarget::Iframe, Arc::new(FakeRemote::new()));
        channel.teardown();

        let guard = messenger.listen(|_| true, |_| {});
        channel.attach(guard);

        // The guard was deactivated on attach; no listeners remain
        let torn = channel.is_torn_down();
        assert!(torn);
    }

    #[tokio::test]
    async fn dropping_channel_tears_down() {
        let messenger = fast_messenger();
        let remote = Arc::new(FakeRemote::new());
        let count = Arc::new(AtomicUsize::new(0));

        {
            let channel = messenger.open(ChannelTarget::Iframe, remote.clone());
            let sink = count.clone();
            channel.attach(messenger.listen(
                |_| true,
                move |_| {
                    sink.fetch_add(1, Ordering::SeqCst);
                },
            ));
        }

        messenger.deliver(Envelope::close(MessageSource::Webpage));
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
