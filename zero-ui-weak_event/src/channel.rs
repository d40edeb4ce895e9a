use std::{
    collections::HashMap,
    fmt,
    marker::PhantomData,
    mem,
    sync::{Arc, Weak},
    thread::{self, ThreadId},
};

use parking_lot::Mutex;

use crate::{Liveness, LivenessKey, SubscriptionKey, TaskPriority, TaskSender, WeakHandler, WeakSubscriptionTable};

/// Identifies an event kind dispatched by a [`WeakEventChannel`].
pub trait WeakEventKind: Send + Sync + 'static {
    /// Event args.
    type Args: 'static;
    /// Event name, for diagnostics.
    const NAME: &'static str;
}

/// Source of events in a [`WeakEventChannel`].
#[derive(Clone, Debug)]
pub enum EventSource {
    /// Events not raised by any object.
    Global,
    /// Events raised by the object.
    Object(Liveness),
}
impl EventSource {
    /// Source object in `arc`.
    pub fn of<T: ?Sized + Send + Sync + 'static>(arc: &Arc<T>) -> Self {
        EventSource::Object(Liveness::of(arc))
    }

    /// Key of the source in the channel tables.
    pub fn key(&self) -> SourceKey {
        match self {
            EventSource::Global => SourceKey::Global,
            EventSource::Object(l) => SourceKey::Object(l.key()),
        }
    }

    /// If the source is global or the object is still alive.
    pub fn is_alive(&self) -> bool {
        match self {
            EventSource::Global => true,
            EventSource::Object(l) => l.is_alive(),
        }
    }

    fn liveness(&self) -> Liveness {
        match self {
            EventSource::Global => Liveness::permanent(),
            EventSource::Object(l) => l.clone(),
        }
    }
}

/// Identity of an [`EventSource`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SourceKey {
    /// [`EventSource::Global`].
    Global,
    /// [`EventSource::Object`].
    Object(LivenessKey),
}

/// Private resources of a listener, released when the listener is removed or purged.
///
/// Listeners that forward events from another signal implement this to unsubscribe from it.
pub trait ListenerSink: Send + Sync {
    /// Release the listener resources.
    ///
    /// The `on_origin_thread` flag is `false` when the listener is purged from a thread that is not the
    /// one that added it, thread-affine resources must not be touched in that case.
    fn detach(&self, on_origin_thread: bool);
}

struct ListenerEntry {
    key: SubscriptionKey,
    source: EventSource,
    sink: Option<Arc<dyn ListenerSink>>,
    origin: ThreadId,
}

struct ChannelData<A> {
    table: WeakSubscriptionTable<A>,
    sources: HashMap<SourceKey, Vec<ListenerEntry>>,
    cleanup_pending: bool,
}

/// Weak event dispatcher for one event kind.
///
/// Listeners are grouped by source, delivery calls the listeners of one source in the order they
/// where added. Neither sources nor listener targets are kept alive by the channel, dead listeners
/// are skipped during delivery and removed by a cleanup task scheduled in the channel task queue.
///
/// Channels are affine to the thread that created them, see `CommandContext` for how one channel per
/// event kind is provided for a dispatch thread.
pub struct WeakEventChannel<K: WeakEventKind> {
    self_ref: Weak<WeakEventChannel<K>>,
    thread: ThreadId,
    tasks: Option<TaskSender>,
    purge_on_deliver: bool,
    data: Mutex<ChannelData<K::Args>>,
    _kind: PhantomData<fn() -> K>,
}
impl<K: WeakEventKind> WeakEventChannel<K> {
    /// New channel affine to the calling thread.
    ///
    /// If `tasks` is set cleanup is scheduled in that queue, otherwise cleanup runs immediately after delivery.
    /// If `purge_on_deliver` is `false` dead listeners are only removed by explicit purge calls.
    pub fn new(tasks: Option<TaskSender>, purge_on_deliver: bool) -> Arc<Self> {
        tracing::debug!("new weak event channel `{}`", K::NAME);
        Arc::new_cyclic(|self_ref| WeakEventChannel {
            self_ref: self_ref.clone(),
            thread: thread::current().id(),
            tasks,
            purge_on_deliver,
            data: Mutex::new(ChannelData {
                table: WeakSubscriptionTable::new(),
                sources: HashMap::new(),
                cleanup_pending: false,
            }),
            _kind: PhantomData,
        })
    }

    /// Thread that owns the channel.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Add a listener for events from `source`.
    pub fn add_handler(&self, source: EventSource, handler: WeakHandler<K::Args>) -> SubscriptionKey {
        self.add_entry(source, handler, None)
    }

    /// Add a listener that holds private resources, the `sink` is detached when the listener is removed or purged.
    pub fn add_listener(&self, source: EventSource, handler: WeakHandler<K::Args>, sink: Arc<dyn ListenerSink>) -> SubscriptionKey {
        self.add_entry(source, handler, Some(sink))
    }

    fn add_entry(&self, source: EventSource, handler: WeakHandler<K::Args>, sink: Option<Arc<dyn ListenerSink>>) -> SubscriptionKey {
        let mut data = self.data.lock();
        let key = data.table.subscribe(source.liveness(), handler);
        data.sources.entry(source.key()).or_default().push(ListenerEntry {
            key,
            source,
            sink,
            origin: thread::current().id(),
        });
        key
    }

    /// Remove the first listener of `source` that is `handler`.
    ///
    /// Returns `false` if the handler was not listening, removing twice is not an error.
    pub fn remove_handler(&self, source: SourceKey, handler: &WeakHandler<K::Args>) -> bool {
        let removed = {
            let mut data = self.data.lock();
            let data = &mut *data;
            let Some(list) = data.sources.get_mut(&source) else {
                return false;
            };
            let Some(i) = list
                .iter()
                .position(|e| data.table.get(e.key).map(|h| h.ptr_eq(handler)).unwrap_or(false))
            else {
                return false;
            };
            let entry = list.remove(i);
            if list.is_empty() {
                data.sources.remove(&source);
            }
            data.table.remove(entry.key);
            entry
        };
        if let Some(sink) = removed.sink {
            sink.detach(thread::current().id() == removed.origin);
        }
        true
    }

    /// Remove the listener added with the subscription `key`.
    pub fn remove_key(&self, source: SourceKey, key: SubscriptionKey) -> bool {
        let removed = {
            let mut data = self.data.lock();
            let data = &mut *data;
            let Some(list) = data.sources.get_mut(&source) else {
                return false;
            };
            let Some(i) = list.iter().position(|e| e.key == key) else {
                return false;
            };
            let entry = list.remove(i);
            if list.is_empty() {
                data.sources.remove(&source);
            }
            data.table.remove(entry.key);
            entry
        };
        if let Some(sink) = removed.sink {
            sink.detach(thread::current().id() == removed.origin);
        }
        true
    }

    /// Remove dead listeners of `source`.
    ///
    /// A listener is dead if its source or handler target was dropped. If all listeners are dead, or the source
    /// itself is dead, or `purge_all` is set, the source entry is removed entirely.
    ///
    /// Returns `true` if anything was removed.
    pub fn purge_source(&self, source: SourceKey, purge_all: bool) -> bool {
        let dead = {
            let mut data = self.data.lock();
            let data = &mut *data;
            let Some(list) = data.sources.get_mut(&source) else {
                return false;
            };

            let source_dead = list.first().map(|e| !e.source.is_alive()).unwrap_or(true);
            let (live, dead): (Vec<_>, Vec<_>) = mem::take(list)
                .into_iter()
                .partition(|e| !purge_all && e.source.is_alive() && data.table.is_active(e.key));

            if live.is_empty() || source_dead {
                data.sources.remove(&source);
                for e in &live {
                    data.table.remove(e.key);
                }
                for e in &dead {
                    data.table.remove(e.key);
                }
                let mut all = dead;
                all.extend(live);
                all
            } else {
                *list = live;
                for e in &dead {
                    data.table.remove(e.key);
                }
                dead
            }
        };

        let current = thread::current().id();
        let mut skipped = 0;
        for e in &dead {
            if let Some(sink) = &e.sink {
                let on_origin_thread = current == e.origin;
                if !on_origin_thread {
                    skipped += 1;
                }
                sink.detach(on_origin_thread);
            }
        }
        if skipped > 0 {
            tracing::warn!("`{}` purged {skipped} listeners outside of their origin thread", K::NAME);
        }
        if !dead.is_empty() {
            tracing::debug!("`{}` purged {} listeners", K::NAME, dead.len());
        }
        !dead.is_empty()
    }

    /// Remove dead listeners of all sources, returns `true` if anything was removed.
    pub fn purge_all_sources(&self) -> bool {
        let sources: Vec<_> = self.data.lock().sources.keys().copied().collect();
        let mut any = false;
        for s in sources {
            any |= self.purge_source(s, false);
        }
        any
    }

    /// Call every live listener of `source` in the order they where added.
    ///
    /// The listener list is copied before any handler is called, handlers can add or remove listeners,
    /// changes apply to the next delivery. Dead listeners are not called and a cleanup is scheduled.
    pub fn deliver_event(&self, source: SourceKey, args: &K::Args) {
        let (snapshot, mut has_dead) = {
            let data = self.data.lock();
            let mut has_dead = false;
            let mut snapshot = vec![];
            if let Some(list) = data.sources.get(&source) {
                for e in list {
                    match data.table.get(e.key) {
                        Some(h) if e.source.is_alive() && data.table.is_active(e.key) => snapshot.push(h.clone()),
                        _ => has_dead = true,
                    }
                }
            }
            (snapshot, has_dead)
        };

        for handler in snapshot {
            if !handler.call(args) {
                has_dead = true;
            }
        }

        if has_dead && self.purge_on_deliver {
            self.schedule_cleanup();
        }
    }

    /// Schedule a purge of all sources.
    ///
    /// Multiple requests before the cleanup runs are coalesced, if the queue is shut down the request is dropped.
    pub fn schedule_cleanup(&self) {
        {
            let mut data = self.data.lock();
            if mem::replace(&mut data.cleanup_pending, true) {
                return;
            }
        }

        match &self.tasks {
            Some(tasks) => {
                let self_ref = self.self_ref.clone();
                let r = tasks.post(TaskPriority::Background, move || {
                    if let Some(channel) = self_ref.upgrade() {
                        channel.data.lock().cleanup_pending = false;
                        channel.purge_all_sources();
                    }
                });
                if let Err(e) = r {
                    tracing::debug!("`{}` cleanup dropped, {e}", K::NAME);
                    self.data.lock().cleanup_pending = false;
                }
            }
            None => {
                self.data.lock().cleanup_pending = false;
                self.purge_all_sources();
            }
        }
    }

    /// Number of listeners of `source`, including dead ones not purged yet.
    pub fn listener_count(&self, source: SourceKey) -> usize {
        self.data.lock().sources.get(&source).map(Vec::len).unwrap_or(0)
    }

    /// Number of sources with listeners.
    pub fn source_count(&self) -> usize {
        self.data.lock().sources.len()
    }
}
impl<K: WeakEventKind> fmt::Debug for WeakEventChannel<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEventChannel")
            .field("kind", &pretty_type_name::pretty_type_name::<K>())
            .field("thread", &self.thread)
            .field("sources", &self.source_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::TaskQueue;

    use super::*;

    struct Ping;
    impl WeakEventKind for Ping {
        type Args = usize;
        const NAME: &'static str = "Ping";
    }

    fn adder(target: &Arc<AtomicUsize>) -> WeakHandler<usize> {
        WeakHandler::new(target, |t: &AtomicUsize, n: &usize| {
            t.fetch_add(*n, Ordering::Relaxed);
        })
    }

    #[test]
    fn deliver_to_source_only() {
        let channel = WeakEventChannel::<Ping>::new(None, true);
        let source_a = Arc::new(());
        let source_b = Arc::new(());
        let target = Arc::new(AtomicUsize::new(0));

        channel.add_handler(EventSource::of(&source_a), adder(&target));
        channel.add_handler(EventSource::Global, adder(&target));

        channel.deliver_event(EventSource::of(&source_a).key(), &1);
        channel.deliver_event(EventSource::of(&source_b).key(), &10);
        channel.deliver_event(SourceKey::Global, &100);

        assert_eq!(target.load(Ordering::Relaxed), 101);
    }

    #[test]
    fn fifo_order() {
        let channel = WeakEventChannel::<Ping>::new(None, true);
        let log = Arc::new(Mutex::new(vec![]));
        for i in 0..4 {
            let l = log.clone();
            channel.add_handler(EventSource::Global, WeakHandler::from_static(move |_| l.lock().push(i)));
        }
        channel.deliver_event(SourceKey::Global, &0);
        assert_eq!(*log.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn remove_idempotent() {
        let channel = WeakEventChannel::<Ping>::new(None, true);
        let target = Arc::new(AtomicUsize::new(0));
        let handler = adder(&target);
        channel.add_handler(EventSource::Global, handler.clone());

        assert!(channel.remove_handler(SourceKey::Global, &handler));
        assert!(!channel.remove_handler(SourceKey::Global, &handler));
        assert_eq!(channel.source_count(), 0);
    }

    #[test]
    fn dead_target_purged_after_delivery() {
        let queue = TaskQueue::new();
        let channel = WeakEventChannel::<Ping>::new(Some(queue.sender()), true);
        let live = Arc::new(AtomicUsize::new(0));
        let dead = Arc::new(AtomicUsize::new(0));
        channel.add_handler(EventSource::Global, adder(&live));
        channel.add_handler(EventSource::Global, adder(&dead));
        drop(dead);

        channel.deliver_event(SourceKey::Global, &1);
        channel.deliver_event(SourceKey::Global, &1);
        assert_eq!(live.load(Ordering::Relaxed), 2);
        assert_eq!(channel.listener_count(SourceKey::Global), 2);

        // two deliveries, one cleanup
        assert_eq!(queue.run_pending(), Ok(1));
        assert_eq!(channel.listener_count(SourceKey::Global), 1);
    }

    #[test]
    fn dead_source_removes_key() {
        let channel = WeakEventChannel::<Ping>::new(None, false);
        let source = Arc::new(());
        let key = EventSource::of(&source).key();
        channel.add_handler(EventSource::of(&source), WeakHandler::from_static(|_| {}));

        assert!(!channel.purge_source(key, false));
        drop(source);
        assert!(channel.purge_source(key, false));
        assert_eq!(channel.source_count(), 0);
    }

    #[test]
    fn purge_all_removes_live() {
        let channel = WeakEventChannel::<Ping>::new(None, false);
        channel.add_handler(EventSource::Global, WeakHandler::from_static(|_| {}));
        assert!(channel.purge_source(SourceKey::Global, true));
        assert_eq!(channel.source_count(), 0);
    }

    struct FlagSink(AtomicBool, AtomicBool);
    impl ListenerSink for FlagSink {
        fn detach(&self, on_origin_thread: bool) {
            self.0.store(true, Ordering::Relaxed);
            self.1.store(on_origin_thread, Ordering::Relaxed);
        }
    }

    #[test]
    fn cross_thread_purge_flags_detach() {
        let channel = WeakEventChannel::<Ping>::new(None, false);
        let target = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(FlagSink(AtomicBool::new(false), AtomicBool::new(true)));
        channel.add_listener(EventSource::Global, adder(&target), sink.clone());
        drop(target);

        let c = channel.clone();
        assert!(thread::spawn(move || c.purge_all_sources()).join().unwrap());
        assert!(sink.0.load(Ordering::Relaxed));
        assert!(!sink.1.load(Ordering::Relaxed));
    }

    #[test]
    fn remove_during_delivery() {
        let channel = WeakEventChannel::<Ping>::new(None, true);
        let calls = Arc::new(AtomicUsize::new(0));
        let second = WeakHandler::<usize>::from_static({
            let calls = calls.clone();
            move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
            }
        });
        let ch = Arc::downgrade(&channel);
        let s = second.clone();
        channel.add_handler(
            EventSource::Global,
            WeakHandler::from_static(move |_| {
                if let Some(ch) = ch.upgrade() {
                    ch.remove_handler(SourceKey::Global, &s);
                }
            }),
        );
        channel.add_handler(EventSource::Global, second);

        // snapshot still calls the second handler
        channel.deliver_event(SourceKey::Global, &0);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        channel.deliver_event(SourceKey::Global, &0);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
