use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, ThreadId},
};

use parking_lot::Mutex;
use zero_ui_weak_event::{
    QueueError, QueueState, RequerySignal, SignalSender, TaskPriority, TaskQueue, TaskSender, WeakEventChannel, WeakEventKind,
};

use crate::CommandError;

struct ContextData {
    thread: ThreadId,
    queue: TaskQueue,
    resender: RequeryResender,
    purge_on_deliver: bool,
    channels: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

/// Command processing context of a dispatch thread.
///
/// The context owns the thread task queue, the requery resender and one [`WeakEventChannel`] per event kind.
/// It is affine to the thread that creates it, channels can only be requested from that thread. Create one
/// context per dispatch thread and pass it to the APIs that need it, tests can create isolated contexts.
#[derive(Clone)]
pub struct CommandContext(Arc<ContextData>);
impl Default for CommandContext {
    fn default() -> Self {
        Self::new()
    }
}
impl CommandContext {
    /// New context with the default options, affine to the calling thread.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Context builder.
    pub fn builder() -> CommandContextBuilder {
        CommandContextBuilder {
            purge_on_deliver: true,
            requery_priority: TaskPriority::Background,
        }
    }

    /// Thread that owns the context.
    pub fn thread(&self) -> ThreadId {
        self.0.thread
    }

    /// If called from the context thread.
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.0.thread
    }

    /// The thread task queue.
    pub fn queue(&self) -> &TaskQueue {
        &self.0.queue
    }

    /// Run all pending tasks of the context queue, this is where deferred requery is raised.
    pub fn run_pending(&self) -> Result<usize, QueueError> {
        self.0.queue.run_pending()
    }

    /// Shutdown the context queue, pending and future requery requests are dropped.
    pub fn shutdown(&self) {
        self.0.queue.shutdown()
    }

    /// The requery resender shared by all commands without own signal.
    pub fn resender(&self) -> &RequeryResender {
        &self.0.resender
    }

    /// Get or create the channel for the event kind `K`.
    ///
    /// Returns [`CommandError::WrongThread`] if not called from the context thread.
    pub fn channel<K: WeakEventKind>(&self) -> Result<Arc<WeakEventChannel<K>>, CommandError> {
        if !self.is_current_thread() {
            tracing::error!("cannot access `{}` channel outside of the context thread", K::NAME);
            return Err(CommandError::WrongThread);
        }

        let mut channels = self.0.channels.lock();
        let channel = channels
            .entry(TypeId::of::<K>())
            .or_insert_with(|| {
                let channel: Arc<dyn Any + Send + Sync> = WeakEventChannel::<K>::new(Some(self.0.queue.sender()), self.0.purge_on_deliver);
                channel
            })
            .clone();
        drop(channels);

        match channel.downcast::<WeakEventChannel<K>>() {
            Ok(c) => Ok(c),
            Err(_) => unreachable!("channel entry is keyed by kind type"),
        }
    }
}
impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("thread", &self.0.thread)
            .field("queue", &self.0.queue)
            .field("purge_on_deliver", &self.0.purge_on_deliver)
            .finish_non_exhaustive()
    }
}

/// Builds a [`CommandContext`].
#[derive(Debug, Clone)]
pub struct CommandContextBuilder {
    purge_on_deliver: bool,
    requery_priority: TaskPriority,
}
impl CommandContextBuilder {
    /// If channels schedule a cleanup when a delivery finds dead listeners.
    ///
    /// Is `true` by default. If `false` dead listeners are only removed by explicit purge.
    pub fn purge_on_deliver(mut self, enabled: bool) -> Self {
        self.purge_on_deliver = enabled;
        self
    }

    /// Priority of the deferred requery task.
    ///
    /// Is [`TaskPriority::Background`] by default.
    pub fn requery_priority(mut self, priority: TaskPriority) -> Self {
        self.requery_priority = priority;
        self
    }

    /// Build the context, affine to the calling thread.
    pub fn build(self) -> CommandContext {
        let queue = TaskQueue::new();
        let resender = RequeryResender {
            signal: RequerySignal::new_resender(),
            pending: Arc::new(AtomicBool::new(false)),
            tasks: queue.sender(),
            priority: self.requery_priority,
        };
        CommandContext(Arc::new(ContextData {
            thread: thread::current().id(),
            queue,
            resender,
            purge_on_deliver: self.purge_on_deliver,
            channels: Mutex::new(HashMap::new()),
        }))
    }
}

/// The shared requery signal of a context.
///
/// Requery requests are deferred to the context queue and coalesced, any number of [`invalidate`] calls
/// before the queue runs raise the signal once.
///
/// [`invalidate`]: Self::invalidate
#[derive(Clone)]
pub struct RequeryResender {
    signal: RequerySignal,
    pending: Arc<AtomicBool>,
    tasks: TaskSender,
    priority: TaskPriority,
}
impl RequeryResender {
    /// The resender signal.
    pub fn signal(&self) -> &RequerySignal {
        &self.signal
    }

    /// Schedule a requery.
    ///
    /// The request is dropped if the context queue is shutting down or has shut down.
    pub fn invalidate(&self) {
        let state = self.tasks.state();
        if state != QueueState::Running {
            // pending task was dropped by the shutdown
            self.pending.store(false, Ordering::Release);
            tracing::debug!("requery dropped, queue is {state:?}");
            return;
        }
        if self.pending.swap(true, Ordering::AcqRel) {
            tracing::debug!("requery already pending, coalesced");
            return;
        }
        let signal = self.signal.clone();
        let pending = self.pending.clone();
        if let Err(e) = self.tasks.post(self.priority, move || {
            pending.store(false, Ordering::Release);
            tracing::trace!("requery raised");
            signal.raise(SignalSender::Resender);
        }) {
            self.pending.store(false, Ordering::Release);
            tracing::debug!("requery dropped, {e}");
        }
    }

    /// Raise the signal now.
    pub fn raise_now(&self) {
        tracing::trace!("requery raised");
        self.signal.raise(SignalSender::Resender);
    }

    /// If a requery is scheduled.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}
impl fmt::Debug for RequeryResender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequeryResender")
            .field("signal", &self.signal)
            .field("pending", &self.is_pending())
            .field("priority", &self.priority)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use zero_ui_weak_event::{Liveness, RequeryArgs, WeakHandler};

    use super::*;

    #[test]
    fn coalesced_requery() {
        let ctx = CommandContext::new();
        let calls = Arc::new(AtomicUsize::new(0));
        ctx.resender().signal().subscribe(
            Liveness::permanent(),
            WeakHandler::new(&calls, |c: &AtomicUsize, _: &RequeryArgs| {
                c.fetch_add(1, Ordering::Relaxed);
            }),
        );

        for _ in 0..5 {
            ctx.resender().invalidate();
        }
        assert!(ctx.resender().is_pending());
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        assert_eq!(ctx.run_pending(), Ok(1));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(!ctx.resender().is_pending());

        ctx.resender().invalidate();
        ctx.run_pending().unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn requery_dropped_after_shutdown() {
        let ctx = CommandContext::new();
        let calls = Arc::new(AtomicUsize::new(0));
        ctx.resender().signal().subscribe(
            Liveness::permanent(),
            WeakHandler::new(&calls, |c: &AtomicUsize, _: &RequeryArgs| {
                c.fetch_add(1, Ordering::Relaxed);
            }),
        );

        ctx.resender().invalidate();
        ctx.shutdown();
        ctx.resender().invalidate();
        assert!(!ctx.resender().is_pending());
        assert_eq!(ctx.run_pending(), Ok(0));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    struct Probe;
    impl WeakEventKind for Probe {
        type Args = ();
        const NAME: &'static str = "Probe";
    }

    #[test]
    fn channel_per_kind_and_thread() {
        let ctx = CommandContext::new();
        let a = ctx.channel::<Probe>().unwrap();
        let b = ctx.channel::<Probe>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = ctx.clone();
        let r = thread::spawn(move || c.channel::<Probe>().map(|_| ())).join().unwrap();
        assert_eq!(r, Err(CommandError::WrongThread));
    }
}
