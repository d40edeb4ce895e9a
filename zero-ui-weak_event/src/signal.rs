use std::{
    fmt,
    sync::Arc,
    thread::{self, ThreadId},
};

use parking_lot::Mutex;

use crate::{Liveness, LivenessKey, SubscriptionKey, WeakHandler, WeakSubscriptionTable};

/// Who raised a [`RequerySignal`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SignalSender {
    /// The shared resender signal, raised on behalf of every command that has no signal of its own.
    Resender,
    /// An object, identified by its address.
    Object(LivenessKey),
}

/// Arguments of a [`RequerySignal`] notification.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RequeryArgs {
    /// Apparent sender of the notification.
    pub sender: SignalSender,
}
impl RequeryArgs {
    /// New args.
    pub fn new(sender: SignalSender) -> Self {
        RequeryArgs { sender }
    }
}

struct SignalData {
    resender: Option<ThreadId>,
    subscribers: Mutex<WeakSubscriptionTable<RequeryArgs>>,
}

/// Signal raised when the availability of one or more commands may have changed.
///
/// Subscribers are weak, see [`WeakSubscriptionTable`]. The signal is a cheap clone, all clones
/// raise the same subscribers.
#[derive(Clone)]
pub struct RequerySignal(Arc<SignalData>);
impl Default for RequerySignal {
    fn default() -> Self {
        Self::new()
    }
}
impl RequerySignal {
    /// New signal owned by an object.
    pub fn new() -> Self {
        RequerySignal(Arc::new(SignalData {
            resender: None,
            subscribers: Mutex::new(WeakSubscriptionTable::new()),
        }))
    }

    /// New shared resender signal, affine to the calling thread.
    ///
    /// The resender state must only be created and subscribed from its thread.
    pub fn new_resender() -> Self {
        RequerySignal(Arc::new(SignalData {
            resender: Some(thread::current().id()),
            subscribers: Mutex::new(WeakSubscriptionTable::new()),
        }))
    }

    /// If this is a resender signal.
    pub fn is_resender(&self) -> bool {
        self.0.resender.is_some()
    }

    /// Thread that created the resender, `None` for object signals.
    pub fn origin_thread(&self) -> Option<ThreadId> {
        self.0.resender
    }

    /// Add a weak subscription.
    pub fn subscribe(&self, subscriber: Liveness, handler: WeakHandler<RequeryArgs>) -> SubscriptionKey {
        self.0.subscribers.lock().subscribe(subscriber, handler)
    }

    /// Remove a subscription, returns `false` if it was already removed.
    pub fn unsubscribe(&self, key: SubscriptionKey) -> bool {
        self.0.subscribers.lock().remove(key).is_some()
    }

    /// Remove the first subscription of `handler`, returns `false` if it was not subscribed.
    pub fn unsubscribe_handler(&self, handler: &WeakHandler<RequeryArgs>) -> bool {
        self.0.subscribers.lock().unsubscribe(handler)
    }

    /// Raise the signal.
    ///
    /// The subscription list is copied before any handler is called, handlers can subscribe and
    /// unsubscribe during the notification, changes apply to the next raise.
    pub fn raise(&self, sender: SignalSender) {
        let (snapshot, has_dead) = self.0.subscribers.lock().snapshot();

        let args = RequeryArgs::new(sender);
        for (_, handler) in snapshot {
            handler.call(&args);
        }

        if has_dead {
            let removed = self.0.subscribers.lock().purge();
            tracing::trace!("requery signal purged {removed} dead subscribers");
        }
    }

    /// Raise the signal with the `sender` object as the sender.
    ///
    /// Resender signals ignore the `sender` and always raise as [`SignalSender::Resender`].
    pub fn raise_from<T: ?Sized>(&self, sender: &T) {
        if self.is_resender() {
            self.raise(SignalSender::Resender)
        } else {
            self.raise(SignalSender::Object(LivenessKey::of_ref(sender)))
        }
    }

    /// Number of subscriptions, including dead ones not purged yet.
    pub fn subscriber_count(&self) -> usize {
        self.0.subscribers.lock().len()
    }

    /// Remove dead subscriptions, returns how many were removed.
    pub fn purge(&self) -> usize {
        self.0.subscribers.lock().purge()
    }

    /// If `self` and `other` are clones of the same signal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl fmt::Debug for RequerySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequerySignal")
            .field("resender", &self.0.resender)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn raise_calls_live_subscribers() {
        let signal = RequerySignal::new();
        let target = Arc::new(AtomicUsize::new(0));
        signal.subscribe(
            Liveness::permanent(),
            WeakHandler::new(&target, |t: &AtomicUsize, _: &RequeryArgs| {
                t.fetch_add(1, Ordering::Relaxed);
            }),
        );

        signal.raise_from(&*target);
        signal.raise_from(&*target);
        assert_eq!(target.load(Ordering::Relaxed), 2);

        let dead = Arc::new(AtomicUsize::new(0));
        signal.subscribe(
            Liveness::permanent(),
            WeakHandler::new(&dead, |t: &AtomicUsize, _: &RequeryArgs| {
                t.fetch_add(1, Ordering::Relaxed);
            }),
        );
        assert_eq!(signal.subscriber_count(), 2);
        drop(dead);

        signal.raise(SignalSender::Resender);
        assert_eq!(signal.subscriber_count(), 1);
    }

    #[test]
    fn resender_sender() {
        let signal = RequerySignal::new_resender();
        assert!(signal.is_resender());
        assert_eq!(signal.origin_thread(), Some(thread::current().id()));

        let last = Arc::new(Mutex::new(None));
        signal.subscribe(
            Liveness::permanent(),
            WeakHandler::new(&last, |l: &Mutex<Option<SignalSender>>, a: &RequeryArgs| {
                *l.lock() = Some(a.sender);
            }),
        );
        signal.raise_from(&0u32);
        assert_eq!(*last.lock(), Some(SignalSender::Resender));
    }

    #[test]
    fn subscribe_during_raise() {
        let signal = RequerySignal::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let s = signal.clone();
        let c = calls.clone();
        signal.subscribe(
            Liveness::permanent(),
            WeakHandler::from_static(move |_| {
                let c = c.clone();
                s.subscribe(
                    Liveness::permanent(),
                    WeakHandler::from_static(move |_| {
                        c.fetch_add(1, Ordering::Relaxed);
                    }),
                );
            }),
        );

        signal.raise(SignalSender::Resender);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert_eq!(signal.subscriber_count(), 2);
    }
}
