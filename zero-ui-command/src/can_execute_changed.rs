use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use zero_ui_weak_event::{
    EventSource, ListenerSink, LivenessKey, RequeryArgs, RequerySignal, SignalSender, SourceKey, SubscriptionKey, WeakEventChannel,
    WeakEventKind, WeakHandler,
};

use crate::{BoundCommand, CommandContext, CommandError};

/// "Can execute changed" event kind.
///
/// Listeners are grouped by command, see [`CanExecuteChangedManager`].
pub struct CanExecuteChanged;
impl WeakEventKind for CanExecuteChanged {
    type Args = RequeryArgs;
    const NAME: &'static str = "CanExecuteChanged";
}

/// Forwards the upstream requery signal of a command to one listener.
struct HandlerSink {
    source: LivenessKey,
    handler: WeakHandler<RequeryArgs>,
    upstream: RequerySignal,
    upstream_key: Mutex<Option<SubscriptionKey>>,
    channel: Weak<WeakEventChannel<CanExecuteChanged>>,
}
impl HandlerSink {
    fn forward(&self, args: &RequeryArgs) {
        // the resender raises for every command, listeners see the command they subscribed to
        let sender = match args.sender {
            SignalSender::Resender => SignalSender::Object(self.source),
            s => s,
        };
        if !self.handler.call(&RequeryArgs::new(sender)) {
            if let Some(c) = self.channel.upgrade() {
                c.schedule_cleanup();
            }
        }
    }
}
impl ListenerSink for HandlerSink {
    fn detach(&self, on_origin_thread: bool) {
        if self.upstream.is_resender() && !on_origin_thread {
            // resender is thread-affine, the subscription is purged by the next raise
            return;
        }
        if let Some(key) = self.upstream_key.lock().take() {
            self.upstream.unsubscribe(key);
        }
    }
}

/// Manages weak "can execute changed" listeners of commands.
///
/// Routed commands and custom commands without own signal are signaled by the context [`RequeryResender`],
/// listeners still receive the command they subscribed to as the sender.
///
/// [`RequeryResender`]: crate::RequeryResender
pub struct CanExecuteChangedManager;
impl CanExecuteChangedManager {
    /// Add a weak listener for changes of the `command` availability.
    ///
    /// Neither the command nor the handler target are kept alive by the subscription.
    pub fn add_handler(
        ctx: &CommandContext,
        command: &BoundCommand,
        handler: WeakHandler<RequeryArgs>,
    ) -> Result<SubscriptionKey, CommandError> {
        let channel = ctx.channel::<CanExecuteChanged>()?;

        let upstream = match command {
            BoundCommand::Custom(c) => c.requery_signal().cloned(),
            BoundCommand::Routed(_) => None,
        }
        .unwrap_or_else(|| ctx.resender().signal().clone());

        let sink = Arc::new(HandlerSink {
            source: command.key(),
            handler: handler.clone(),
            upstream: upstream.clone(),
            upstream_key: Mutex::new(None),
            channel: Arc::downgrade(&channel),
        });
        let upstream_key = upstream.subscribe(
            command.liveness(),
            WeakHandler::new(&sink, |s: &HandlerSink, args: &RequeryArgs| s.forward(args)),
        );
        *sink.upstream_key.lock() = Some(upstream_key);

        tracing::trace!("add can-execute-changed listener for {command:?}");
        Ok(channel.add_listener(EventSource::Object(command.liveness()), handler, sink))
    }

    /// Remove a listener added by [`add_handler`].
    ///
    /// Returns `false` if the handler was not listening, removing twice is not an error.
    ///
    /// [`add_handler`]: Self::add_handler
    pub fn remove_handler(ctx: &CommandContext, command: &BoundCommand, handler: &WeakHandler<RequeryArgs>) -> Result<bool, CommandError> {
        let channel = ctx.channel::<CanExecuteChanged>()?;
        Ok(channel.remove_handler(SourceKey::Object(command.key()), handler))
    }

    /// Notify the listeners of `command` now, without raising the upstream signal.
    pub fn notify(ctx: &CommandContext, command: &BoundCommand) -> Result<(), CommandError> {
        let channel = ctx.channel::<CanExecuteChanged>()?;
        let key = command.key();
        channel.deliver_event(SourceKey::Object(key), &RequeryArgs::new(SignalSender::Object(key)));
        Ok(())
    }

    /// Number of listeners of `command`, including dead ones not purged yet.
    pub fn listener_count(ctx: &CommandContext, command: &BoundCommand) -> Result<usize, CommandError> {
        let channel = ctx.channel::<CanExecuteChanged>()?;
        Ok(channel.listener_count(SourceKey::Object(command.key())))
    }
}
