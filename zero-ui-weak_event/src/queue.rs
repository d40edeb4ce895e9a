use std::{
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    thread::{self, ThreadId},
};

type Task = Box<dyn FnOnce() + Send>;

/// Priority of a task posted to a [`TaskQueue`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum TaskPriority {
    /// Runs before any background task.
    #[default]
    Normal,
    /// Runs after all normal tasks pending at the time.
    Background,
}

/// Lifecycle of a [`TaskQueue`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum QueueState {
    /// Accepting and running tasks.
    Running,
    /// Shutdown started, new tasks are rejected.
    ShuttingDown,
    /// Pending tasks where dropped, new tasks are rejected.
    ShutDown,
}
impl QueueState {
    fn from_u8(s: u8) -> Self {
        match s {
            RUNNING => QueueState::Running,
            SHUTTING_DOWN => QueueState::ShuttingDown,
            _ => QueueState::ShutDown,
        }
    }
}
const RUNNING: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const SHUT_DOWN: u8 = 2;

/// Error posting or running tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueueError {
    /// The queue is shutting down or has shut down.
    ShutDown,
    /// Tasks can only run in the queue thread.
    WrongThread,
}
impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::ShutDown => write!(f, "task queue is shutting down or has shut down"),
            QueueError::WrongThread => write!(f, "task queue can only run in the thread that created it"),
        }
    }
}
impl std::error::Error for QueueError {}

struct Channels {
    normal: flume::Sender<Task>,
    background: flume::Sender<Task>,
}

/// Task queue of a dispatch thread.
///
/// Tasks can be posted from any thread using a [`TaskSender`], they only run when the owning thread
/// calls [`run_pending`]. This is the queue deferred requery notifications and scheduled purges post to.
///
/// [`run_pending`]: Self::run_pending
pub struct TaskQueue {
    thread: ThreadId,
    state: Arc<AtomicU8>,
    sender: Arc<Channels>,
    normal: flume::Receiver<Task>,
    background: flume::Receiver<Task>,
}
impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
impl TaskQueue {
    /// New queue owned by the calling thread.
    pub fn new() -> Self {
        #[cfg(feature = "deadlock_detection")]
        spawn_deadlock_detection();

        let (normal_tx, normal) = flume::unbounded();
        let (background_tx, background) = flume::unbounded();
        TaskQueue {
            thread: thread::current().id(),
            state: Arc::new(AtomicU8::new(RUNNING)),
            sender: Arc::new(Channels {
                normal: normal_tx,
                background: background_tx,
            }),
            normal,
            background,
        }
    }

    /// Thread that owns the queue.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Current state.
    pub fn state(&self) -> QueueState {
        QueueState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// New sender that can post to this queue from any thread.
    pub fn sender(&self) -> TaskSender {
        TaskSender {
            state: self.state.clone(),
            channels: self.sender.clone(),
        }
    }

    /// Post a task.
    pub fn post(&self, priority: TaskPriority, task: impl FnOnce() + Send + 'static) -> Result<(), QueueError> {
        self.sender().post(priority, task)
    }

    /// Run all pending tasks, including tasks posted by the tasks that run.
    ///
    /// Normal tasks always run before background tasks. Returns the number of tasks that run.
    pub fn run_pending(&self) -> Result<usize, QueueError> {
        if thread::current().id() != self.thread {
            return Err(QueueError::WrongThread);
        }
        let mut count = 0;
        while self.state() == QueueState::Running {
            let task = match self.normal.try_recv() {
                Ok(t) => t,
                Err(_) => match self.background.try_recv() {
                    Ok(t) => t,
                    Err(_) => break,
                },
            };
            task();
            count += 1;
        }
        Ok(count)
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.normal.len() + self.background.len()
    }

    /// If there are no pending tasks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting tasks and drop all pending tasks.
    ///
    /// The queue is [`QueueState::ShuttingDown`] while pending tasks are dropped.
    pub fn shutdown(&self) {
        if self
            .state
            .compare_exchange(RUNNING, SHUTTING_DOWN, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let dropped = self.normal.drain().count() + self.background.drain().count();
        self.state.store(SHUT_DOWN, Ordering::Release);
        tracing::debug!("task queue shutdown, dropped {dropped} pending tasks");
    }
}
impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("thread", &self.thread)
            .field("state", &self.state())
            .field("len", &self.len())
            .finish()
    }
}

/// Posts tasks to a [`TaskQueue`] from any thread.
#[derive(Clone)]
pub struct TaskSender {
    state: Arc<AtomicU8>,
    channels: Arc<Channels>,
}
impl TaskSender {
    /// Post a task, fails if the queue is shutting down or has shut down.
    pub fn post(&self, priority: TaskPriority, task: impl FnOnce() + Send + 'static) -> Result<(), QueueError> {
        if self.state() != QueueState::Running {
            return Err(QueueError::ShutDown);
        }
        let ch = match priority {
            TaskPriority::Normal => &self.channels.normal,
            TaskPriority::Background => &self.channels.background,
        };
        ch.send(Box::new(task)).map_err(|_| QueueError::ShutDown)
    }

    /// State of the queue.
    pub fn state(&self) -> QueueState {
        QueueState::from_u8(self.state.load(Ordering::Acquire))
    }
}
impl fmt::Debug for TaskSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSender").field("state", &self.state()).finish_non_exhaustive()
    }
}

/// Spawn a thread that periodically checks for `parking_lot` deadlocks.
///
/// Only spawns once per process, called by [`TaskQueue::new`].
#[cfg(feature = "deadlock_detection")]
pub fn spawn_deadlock_detection() {
    use parking_lot::deadlock;
    use std::{sync::atomic::AtomicBool, time::Duration};

    static CHECK_RUNNING: AtomicBool = AtomicBool::new(false);

    if CHECK_RUNNING.swap(true, Ordering::SeqCst) {
        return;
    }

    thread::spawn(|| loop {
        thread::sleep(Duration::from_secs(10));

        let deadlocks = deadlock::check_deadlock();
        if deadlocks.is_empty() {
            continue;
        }

        use std::fmt::Write;
        let mut msg = String::new();
        let _ = writeln!(&mut msg, "{} deadlocks detected", deadlocks.len());
        for (i, threads) in deadlocks.iter().enumerate() {
            let _ = writeln!(&mut msg, "Deadlock #{}, {} threads", i, threads.len());
            for t in threads {
                let _ = writeln!(&mut msg, "Thread Id {:#?}", t.thread_id());
                let _ = writeln!(&mut msg, "{:#?}", t.backtrace());
            }
        }
        tracing::error!("{msg}");
    });
}
