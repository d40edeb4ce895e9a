use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use parking_lot::Mutex;
use zero_ui_cmd::{
    command::CanExecuteChanged,
    prelude::*,
    weak_event::{EventSource, LivenessKey, SourceKey, WeakEventKind},
};

struct Clicked;
impl WeakEventKind for Clicked {
    type Args = u32;
    const NAME: &'static str = "Clicked";
}

struct Listener {
    received: Mutex<Vec<u32>>,
}
impl Listener {
    fn new() -> Arc<Self> {
        Arc::new(Listener { received: Mutex::new(vec![]) })
    }
}

#[test]
fn subscription_does_not_keep_target_alive() {
    let channel = WeakEventChannel::<Clicked>::new(None, true);
    let button = Arc::new(());
    let listener = Listener::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let c = calls.clone();
    channel.add_handler(
        EventSource::of(&button),
        WeakHandler::new(&listener, move |l: &Listener, args: &u32| {
            l.received.lock().push(*args);
            c.fetch_add(1, Ordering::Relaxed);
        }),
    );
    assert_eq!(Arc::strong_count(&listener), 1);

    let source = EventSource::of(&button).key();
    channel.deliver_event(source, &1);
    assert_eq!(*listener.received.lock(), vec![1]);

    drop(listener);
    channel.purge_all_sources();
    assert_eq!(channel.listener_count(source), 0);

    channel.deliver_event(source, &2);
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn dead_listener_purged_on_deliver() {
    let ctx = CommandContext::new();
    let channel = ctx.channel::<Clicked>().unwrap();
    let listener = Listener::new();
    let survivor = Listener::new();

    channel.add_handler(
        EventSource::Global,
        WeakHandler::new(&listener, |l: &Listener, a: &u32| l.received.lock().push(*a)),
    );
    channel.add_handler(
        EventSource::Global,
        WeakHandler::new(&survivor, |l: &Listener, a: &u32| l.received.lock().push(*a)),
    );
    drop(listener);

    channel.deliver_event(SourceKey::Global, &7);
    assert_eq!(channel.listener_count(SourceKey::Global), 2);
    ctx.run_pending().unwrap();
    assert_eq!(channel.listener_count(SourceKey::Global), 1);
    assert_eq!(*survivor.received.lock(), vec![7]);
}

#[test]
fn resender_substitutes_command_as_sender() {
    let ctx = CommandContext::new();
    let copy = BoundCommand::from(ApplicationCommands::copy());
    let paste = BoundCommand::from(ApplicationCommands::paste());
    let log = Arc::new(Mutex::new(vec![]));

    CanExecuteChangedManager::add_handler(
        &ctx,
        &copy,
        WeakHandler::new(&log, |l: &Mutex<Vec<SignalSender>>, args: &RequeryArgs| l.lock().push(args.sender)),
    )
    .unwrap();
    CanExecuteChangedManager::add_handler(
        &ctx,
        &paste,
        WeakHandler::new(&log, |l: &Mutex<Vec<SignalSender>>, args: &RequeryArgs| l.lock().push(args.sender)),
    )
    .unwrap();

    // many requests before the queue runs, one notification per listener
    for _ in 0..5 {
        ctx.resender().invalidate();
    }
    assert!(ctx.resender().is_pending());
    ctx.run_pending().unwrap();
    assert!(!ctx.resender().is_pending());

    let log = log.lock();
    assert_eq!(log.len(), 2);
    assert!(log.contains(&SignalSender::Object(copy.key())));
    assert!(log.contains(&SignalSender::Object(paste.key())));
    assert!(!log.contains(&SignalSender::Resender));
}

struct Document {
    requery: RequerySignal,
    dirty: AtomicUsize,
}
impl CustomCommand for Document {
    fn can_execute(&self, _: Option<&CommandParam>) -> bool {
        self.dirty.load(Ordering::Relaxed) > 0
    }

    fn execute(&self, _: Option<&CommandParam>) {
        self.dirty.store(0, Ordering::Relaxed);
    }

    fn requery_signal(&self) -> Option<&RequerySignal> {
        Some(&self.requery)
    }
}

#[test]
fn custom_signal_sender_passes_through() {
    let ctx = CommandContext::new();
    let doc = Arc::new(Document {
        requery: RequerySignal::new(),
        dirty: AtomicUsize::new(0),
    });
    let command = BoundCommand::Custom(doc.clone());
    let log = Arc::new(Mutex::new(vec![]));

    CanExecuteChangedManager::add_handler(
        &ctx,
        &command,
        WeakHandler::new(&log, |l: &Mutex<Vec<SignalSender>>, args: &RequeryArgs| l.lock().push(args.sender)),
    )
    .unwrap();

    doc.dirty.fetch_add(1, Ordering::Relaxed);
    doc.requery.raise_from(&*doc);
    assert_eq!(*log.lock(), vec![SignalSender::Object(LivenessKey::of_ref(&*doc))]);

    // custom signals are not raised by the resender
    ctx.resender().invalidate();
    ctx.run_pending().unwrap();
    assert_eq!(log.lock().len(), 1);
}

#[test]
fn remove_listener_is_idempotent() {
    let ctx = CommandContext::new();
    let command = BoundCommand::from(MediaCommands::stop());
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = WeakHandler::new(&calls, |c: &AtomicUsize, _: &RequeryArgs| {
        c.fetch_add(1, Ordering::Relaxed);
    });

    CanExecuteChangedManager::add_handler(&ctx, &command, handler.clone()).unwrap();
    assert_eq!(CanExecuteChangedManager::listener_count(&ctx, &command).unwrap(), 1);

    assert!(CanExecuteChangedManager::remove_handler(&ctx, &command, &handler).unwrap());
    assert!(!CanExecuteChangedManager::remove_handler(&ctx, &command, &handler).unwrap());
    assert_eq!(CanExecuteChangedManager::listener_count(&ctx, &command).unwrap(), 0);

    ctx.resender().invalidate();
    ctx.run_pending().unwrap();
    assert_eq!(calls.load(Ordering::Relaxed), 0);
    assert_eq!(ctx.resender().signal().subscriber_count(), 0);
}

#[test]
fn dropped_listener_target_is_purged() {
    let ctx = CommandContext::new();
    let command = BoundCommand::from(ApplicationCommands::find());
    let target = Arc::new(AtomicUsize::new(0));

    CanExecuteChangedManager::add_handler(
        &ctx,
        &command,
        WeakHandler::new(&target, |c: &AtomicUsize, _: &RequeryArgs| {
            c.fetch_add(1, Ordering::Relaxed);
        }),
    )
    .unwrap();
    drop(target);

    // the raise finds the dead listener and schedules a cleanup
    ctx.resender().invalidate();
    ctx.run_pending().unwrap();
    ctx.run_pending().unwrap();
    assert_eq!(CanExecuteChangedManager::listener_count(&ctx, &command).unwrap(), 0);

    // the upstream subscription died with the listener
    ctx.resender().raise_now();
    assert_eq!(ctx.resender().signal().subscriber_count(), 0);
}

#[test]
fn purge_outside_origin_thread() {
    let ctx = CommandContext::new();
    let channel = ctx.channel::<CanExecuteChanged>().unwrap();
    let command = BoundCommand::from(ApplicationCommands::redo());
    let target = Arc::new(AtomicUsize::new(0));

    CanExecuteChangedManager::add_handler(
        &ctx,
        &command,
        WeakHandler::new(&target, |c: &AtomicUsize, _: &RequeryArgs| {
            c.fetch_add(1, Ordering::Relaxed);
        }),
    )
    .unwrap();
    assert_eq!(ctx.resender().signal().subscriber_count(), 1);
    drop(target);

    let c = channel.clone();
    thread::spawn(move || {
        assert!(c.purge_all_sources());
    })
    .join()
    .unwrap();

    assert_eq!(CanExecuteChangedManager::listener_count(&ctx, &command).unwrap(), 0);
    // the resender subscription is not touched outside its thread, the next raise drops it
    assert_eq!(ctx.resender().signal().subscriber_count(), 1);
    ctx.resender().raise_now();
    assert_eq!(ctx.resender().signal().subscriber_count(), 0);

    let other = ctx.clone();
    let r = thread::spawn(move || other.channel::<CanExecuteChanged>().map(|_| ())).join().unwrap();
    assert!(matches!(r, Err(CommandError::WrongThread)));
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

    ctx.shutdown();
    ctx.resender().invalidate();
    assert!(!ctx.resender().is_pending());
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn handle_bound_handler() {
    let channel = WeakEventChannel::<Clicked>::new(None, false);
    let (owner, handle) = Handle::new(());
    let received = Arc::new(AtomicUsize::new(0));

    let r = received.clone();
    channel.add_handler(
        EventSource::Global,
        WeakHandler::with_handle(&handle, move |a: &u32| {
            r.fetch_add(*a as usize, Ordering::Relaxed);
        }),
    );

    channel.deliver_event(SourceKey::Global, &3);
    drop(handle);
    assert!(owner.is_dropped());
    channel.deliver_event(SourceKey::Global, &3);
    assert_eq!(received.load(Ordering::Relaxed), 3);
    assert!(channel.purge_all_sources());
}
