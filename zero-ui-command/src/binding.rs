use std::{any::Any, fmt, sync::Arc};

use crate::{BoundCommand, Command, CommandParam, ElementId, InputGesture, KeyGesture, Key, ModifiersState, MouseAction, MouseGesture};

/// Binds an input gesture to a command.
#[derive(Clone)]
pub struct InputBinding {
    command: BoundCommand,
    gesture: Arc<dyn InputGesture>,
    target: Option<ElementId>,
    parameter: Option<CommandParam>,
}
impl InputBinding {
    /// New binding.
    pub fn new(command: impl Into<BoundCommand>, gesture: impl InputGesture) -> Self {
        InputBinding {
            command: command.into(),
            gesture: Arc::new(gesture),
            target: None,
            parameter: None,
        }
    }

    /// New key gesture binding.
    pub fn key(command: impl Into<BoundCommand>, modifiers: ModifiersState, key: impl Into<Key>) -> Self {
        Self::new(command, KeyGesture::new(modifiers, key))
    }

    /// New mouse gesture binding.
    pub fn mouse(command: impl Into<BoundCommand>, modifiers: ModifiersState, action: MouseAction) -> Self {
        Self::new(command, MouseGesture::new(modifiers, action))
    }

    /// Route the command to `target` instead of the element that received the input.
    pub fn with_target(mut self, target: ElementId) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the command parameter.
    pub fn with_parameter(mut self, parameter: impl Any + Send + Sync + 'static) -> Self {
        self.parameter = Some(CommandParam::new(parameter));
        self
    }

    /// The command.
    pub fn command(&self) -> &BoundCommand {
        &self.command
    }

    /// The gesture.
    pub fn gesture(&self) -> &Arc<dyn InputGesture> {
        &self.gesture
    }

    /// Explicit target.
    pub fn target(&self) -> Option<ElementId> {
        self.target
    }

    /// Command parameter.
    pub fn parameter(&self) -> Option<&CommandParam> {
        self.parameter.as_ref()
    }
}
impl fmt::Debug for InputBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputBinding")
            .field("command", &self.command)
            .field("gesture", &self.gesture)
            .field("target", &self.target)
            .field("parameter", &self.parameter)
            .finish()
    }
}

/// Routing phase of a command notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoutePhase {
    /// Tunnels from the root to the target.
    Preview,
    /// Bubbles from the target to the root.
    Main,
}

/// Arguments of a can-execute notification.
#[derive(Debug)]
pub struct CanExecuteArgs {
    pub(crate) command: Command,
    pub(crate) parameter: Option<CommandParam>,
    pub(crate) source: ElementId,
    pub(crate) phase: RoutePhase,
    pub(crate) user_initiated: bool,
    pub(crate) can_execute: bool,
    pub(crate) continue_routing: bool,
    pub(crate) handled: bool,
}
impl CanExecuteArgs {
    pub(crate) fn new(command: Command, parameter: Option<CommandParam>, source: ElementId, user_initiated: bool) -> Self {
        CanExecuteArgs {
            command,
            parameter,
            source,
            phase: RoutePhase::Preview,
            user_initiated,
            can_execute: false,
            continue_routing: false,
            handled: false,
        }
    }

    /// The command.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// The command parameter.
    pub fn parameter(&self) -> Option<&CommandParam> {
        self.parameter.as_ref()
    }

    /// The command parameter, if it is of type `T`.
    pub fn param<T: Any>(&self) -> Option<&T> {
        self.parameter.as_ref().and_then(|p| p.downcast_ref::<T>())
    }

    /// Element the notification was raised on.
    pub fn source(&self) -> ElementId {
        self.source
    }

    /// Current phase.
    pub fn phase(&self) -> RoutePhase {
        self.phase
    }

    /// If the notification is caused by user input.
    pub fn is_user_initiated(&self) -> bool {
        self.user_initiated
    }

    /// Current answer.
    pub fn can_execute(&self) -> bool {
        self.can_execute
    }

    /// Set the answer.
    pub fn set_can_execute(&mut self, can_execute: bool) {
        self.can_execute = can_execute;
    }

    /// If the input that caused the notification should continue routing after the notification.
    pub fn continue_routing(&self) -> bool {
        self.continue_routing
    }

    /// Set [`continue_routing`].
    ///
    /// [`continue_routing`]: Self::continue_routing
    pub fn set_continue_routing(&mut self, continue_routing: bool) {
        self.continue_routing = continue_routing;
    }

    /// If a binding has handled the notification, routing stops once handled.
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Set [`is_handled`].
    ///
    /// [`is_handled`]: Self::is_handled
    pub fn set_handled(&mut self, handled: bool) {
        self.handled = handled;
    }
}

/// Arguments of an executed notification.
#[derive(Debug)]
pub struct ExecutedArgs {
    pub(crate) command: Command,
    pub(crate) parameter: Option<CommandParam>,
    pub(crate) source: ElementId,
    pub(crate) phase: RoutePhase,
    pub(crate) user_initiated: bool,
    pub(crate) handled: bool,
}
impl ExecutedArgs {
    pub(crate) fn new(command: Command, parameter: Option<CommandParam>, source: ElementId, user_initiated: bool) -> Self {
        ExecutedArgs {
            command,
            parameter,
            source,
            phase: RoutePhase::Preview,
            user_initiated,
            handled: false,
        }
    }

    /// The command.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// The command parameter.
    pub fn parameter(&self) -> Option<&CommandParam> {
        self.parameter.as_ref()
    }

    /// The command parameter, if it is of type `T`.
    pub fn param<T: Any>(&self) -> Option<&T> {
        self.parameter.as_ref().and_then(|p| p.downcast_ref::<T>())
    }

    /// Element the notification was raised on.
    pub fn source(&self) -> ElementId {
        self.source
    }

    /// Current phase.
    pub fn phase(&self) -> RoutePhase {
        self.phase
    }

    /// If the notification is caused by user input.
    pub fn is_user_initiated(&self) -> bool {
        self.user_initiated
    }

    /// If a binding has handled the notification.
    ///
    /// Is `true` while an executed handler runs, handlers that did not execute the command
    /// set it to `false` so that the next binding is tried.
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Set [`is_handled`].
    ///
    /// [`is_handled`]: Self::is_handled
    pub fn set_handled(&mut self, handled: bool) {
        self.handled = handled;
    }
}

type CanExecuteHandler = Arc<dyn Fn(ElementId, &mut CanExecuteArgs) + Send + Sync>;
type ExecutedHandler = Arc<dyn Fn(ElementId, &mut ExecutedArgs) + Send + Sync>;

/// Binds handlers to a command.
///
/// Handlers receive the element that declared the binding and the notification args. A binding without
/// can-execute handler but with an executed handler answers *can execute* for its command.
#[derive(Clone)]
pub struct CommandBinding {
    command: Command,
    preview_can_execute: Option<CanExecuteHandler>,
    can_execute: Option<CanExecuteHandler>,
    preview_executed: Option<ExecutedHandler>,
    executed: Option<ExecutedHandler>,
}
impl CommandBinding {
    /// New binding without handlers.
    pub fn new(command: Command) -> Self {
        CommandBinding {
            command,
            preview_can_execute: None,
            can_execute: None,
            preview_executed: None,
            executed: None,
        }
    }

    /// Set the can-execute handler.
    pub fn on_can_execute(mut self, handler: impl Fn(ElementId, &mut CanExecuteArgs) + Send + Sync + 'static) -> Self {
        self.can_execute = Some(Arc::new(handler));
        self
    }

    /// Set the preview can-execute handler.
    pub fn on_preview_can_execute(mut self, handler: impl Fn(ElementId, &mut CanExecuteArgs) + Send + Sync + 'static) -> Self {
        self.preview_can_execute = Some(Arc::new(handler));
        self
    }

    /// Set the executed handler.
    pub fn on_executed(mut self, handler: impl Fn(ElementId, &mut ExecutedArgs) + Send + Sync + 'static) -> Self {
        self.executed = Some(Arc::new(handler));
        self
    }

    /// Set the preview executed handler.
    pub fn on_preview_executed(mut self, handler: impl Fn(ElementId, &mut ExecutedArgs) + Send + Sync + 'static) -> Self {
        self.preview_executed = Some(Arc::new(handler));
        self
    }

    /// The command.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// If the binding has a main can-execute handler.
    pub fn has_can_execute(&self) -> bool {
        self.can_execute.is_some()
    }

    /// If the binding has a main executed handler.
    pub fn has_executed(&self) -> bool {
        self.executed.is_some()
    }

    pub(crate) fn notify_can_execute(&self, sender: ElementId, args: &mut CanExecuteArgs) {
        if args.handled {
            return;
        }
        match args.phase {
            RoutePhase::Main => {
                if let Some(h) = &self.can_execute {
                    h(sender, args);
                    if args.can_execute {
                        args.handled = true;
                    }
                } else if !args.can_execute && self.executed.is_some() {
                    args.can_execute = true;
                    args.handled = true;
                }
            }
            RoutePhase::Preview => {
                if let Some(h) = &self.preview_can_execute {
                    h(sender, args);
                    if args.can_execute {
                        args.handled = true;
                    }
                }
            }
        }
    }

    /// Fresh main phase query against this binding only.
    fn check_can_execute(&self, sender: ElementId, args: &ExecutedArgs) -> bool {
        let mut check = CanExecuteArgs::new(args.command.clone(), args.parameter.clone(), args.source, args.user_initiated);
        check.phase = RoutePhase::Main;
        self.notify_can_execute(sender, &mut check);
        check.can_execute
    }

    pub(crate) fn notify_executed(&self, sender: ElementId, args: &mut ExecutedArgs) {
        if args.handled {
            return;
        }
        let handler = match args.phase {
            RoutePhase::Main => &self.executed,
            RoutePhase::Preview => &self.preview_executed,
        };
        if let Some(h) = handler {
            if self.check_can_execute(sender, args) {
                // handlers decline by clearing the flag
                args.handled = true;
                h(sender, args);
            }
        }
    }
}
impl fmt::Debug for CommandBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBinding")
            .field("command", &self.command)
            .field("preview_can_execute", &self.preview_can_execute.is_some())
            .field("can_execute", &self.can_execute.is_some())
            .field("preview_executed", &self.preview_executed.is_some())
            .field("executed", &self.executed.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn cmd() -> Command {
        Command::new("Test", "binding::tests").unwrap()
    }

    fn query(binding: &CommandBinding, phase: RoutePhase) -> CanExecuteArgs {
        let el = ElementId::new_unique();
        let mut args = CanExecuteArgs::new(binding.command().clone(), None, el, false);
        args.phase = phase;
        binding.notify_can_execute(el, &mut args);
        args
    }

    #[test]
    fn executed_only_implies_can_execute() {
        let binding = CommandBinding::new(cmd()).on_executed(|_, _| {});
        let args = query(&binding, RoutePhase::Main);
        assert!(args.can_execute());
        assert!(args.is_handled());

        let args = query(&binding, RoutePhase::Preview);
        assert!(!args.can_execute());
        assert!(!args.is_handled());
    }

    #[test]
    fn no_handlers_not_handled() {
        let args = query(&CommandBinding::new(cmd()), RoutePhase::Main);
        assert!(!args.can_execute());
        assert!(!args.is_handled());
    }

    #[test]
    fn explicit_refusal_not_handled() {
        let binding = CommandBinding::new(cmd())
            .on_can_execute(|_, a| a.set_can_execute(false))
            .on_executed(|_, _| {});
        let args = query(&binding, RoutePhase::Main);
        assert!(!args.can_execute());
        assert!(!args.is_handled());
    }

    #[test]
    fn executed_checks_can_execute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let param = Arc::new(AtomicUsize::new(0));
        let p = param.clone();
        let binding = CommandBinding::new(cmd())
            .on_can_execute(move |_, a| {
                let allow = a.param::<bool>().copied().unwrap_or(false);
                a.set_can_execute(allow);
                p.fetch_add(1, Ordering::Relaxed);
            })
            .on_executed(move |_, _| {
                c.fetch_add(1, Ordering::Relaxed);
            });

        let el = ElementId::new_unique();
        let mut args = ExecutedArgs::new(binding.command().clone(), Some(CommandParam::new(false)), el, true);
        args.phase = RoutePhase::Main;
        binding.notify_executed(el, &mut args);
        assert!(!args.is_handled());
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        let mut args = ExecutedArgs::new(binding.command().clone(), Some(CommandParam::new(true)), el, true);
        args.phase = RoutePhase::Main;
        binding.notify_executed(el, &mut args);
        assert!(args.is_handled());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(param.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn executed_can_decline() {
        let binding = CommandBinding::new(cmd()).on_executed(|_, a| a.set_handled(false));
        let el = ElementId::new_unique();
        let mut args = ExecutedArgs::new(binding.command().clone(), None, el, false);
        args.phase = RoutePhase::Main;
        binding.notify_executed(el, &mut args);
        assert!(!args.is_handled());
    }
}
