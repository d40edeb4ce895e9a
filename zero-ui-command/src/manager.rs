use std::{fmt, sync::Arc};

use once_cell::sync::Lazy;
use zero_ui_weak_event::{RequeryArgs, SubscriptionKey, WeakHandler};

use crate::{
    BoundCommand, CanExecuteArgs, ClassRegistry, Command, CommandBinding, CommandContext, CommandError, CommandParam, ElementClass,
    ElementId, ElementTree, ExecutedArgs, InputBinding, InputRecord, RoutePhase,
};

static CLASS_INPUT_BINDINGS: Lazy<Arc<ClassRegistry<InputBinding>>> = Lazy::new(Default::default);
static CLASS_COMMAND_BINDINGS: Lazy<Arc<ClassRegistry<CommandBinding>>> = Lazy::new(Default::default);

/// Routes commands in an element tree.
///
/// # Input
///
/// [`translate_input`] resolves an input to a command by looking, in order, at the target instance input bindings,
/// the class input bindings of the target class and base classes, the gestures of commands bound by instance command
/// bindings and the gestures of commands bound by class command bindings. The first match is queried and
/// executed if it can execute.
///
/// # Routing
///
/// Notifications tunnel from the root to the target in the preview phase and bubble back in the main phase.
/// At each element the instance command bindings are tried first, then the class command bindings from the most
/// derived class, the first binding that handles the notification stops routing. A focus scope that does not handle
/// a main phase notification transfers it to the focused element of the parent scope.
///
/// [`translate_input`]: Self::translate_input
pub struct CommandManager {
    ctx: CommandContext,
    class_input_bindings: Arc<ClassRegistry<InputBinding>>,
    class_command_bindings: Arc<ClassRegistry<CommandBinding>>,
}
impl CommandManager {
    /// New manager that uses the process wide class bindings.
    pub fn new(ctx: CommandContext) -> Self {
        CommandManager {
            ctx,
            class_input_bindings: CLASS_INPUT_BINDINGS.clone(),
            class_command_bindings: CLASS_COMMAND_BINDINGS.clone(),
        }
    }

    /// New manager with its own class bindings.
    pub fn isolated(ctx: CommandContext) -> Self {
        CommandManager {
            ctx,
            class_input_bindings: Arc::default(),
            class_command_bindings: Arc::default(),
        }
    }

    /// The context.
    pub fn context(&self) -> &CommandContext {
        &self.ctx
    }

    /// Register an input binding for all elements of the `class` and derived classes.
    pub fn register_class_input_binding(&self, class: &'static ElementClass, binding: InputBinding) {
        tracing::trace!("register class input binding {binding:?} for {}", class.name());
        self.class_input_bindings.register(class, binding);
    }

    /// Register a command binding for all elements of the `class` and derived classes.
    pub fn register_class_command_binding(&self, class: &'static ElementClass, binding: CommandBinding) {
        tracing::trace!("register class command binding {:?} for {}", binding.command(), class.name());
        self.class_command_bindings.register(class, binding);
    }

    /// Class input bindings.
    pub fn class_input_bindings(&self) -> &ClassRegistry<InputBinding> {
        &self.class_input_bindings
    }

    /// Class command bindings.
    pub fn class_command_bindings(&self) -> &ClassRegistry<CommandBinding> {
        &self.class_command_bindings
    }

    /// Resolve the `input` received by `target` to a command, then query and execute it.
    ///
    /// Returns `true` if the input was consumed. Inputs that resolve to no command or to
    /// [`ApplicationCommands::not_a_command`] are not consumed.
    ///
    /// [`ApplicationCommands::not_a_command`]: crate::ApplicationCommands::not_a_command
    pub fn translate_input(&self, tree: &dyn ElementTree, target: ElementId, input: &InputRecord) -> Result<bool, CommandError> {
        let class = tree.class_of(target).ok_or(CommandError::ElementNotFound(target))?;

        let Some((command, explicit_target, parameter)) = self.resolve_input(tree, class, target, input) else {
            tracing::trace!("input {input:?} on {target} did not resolve");
            return Ok(false);
        };

        match command {
            BoundCommand::Routed(command) => {
                if command.is_not_a_command() {
                    tracing::trace!("input {input:?} on {target} resolved to {command:?}, not consumed");
                    return Ok(false);
                }

                let target = explicit_target.unwrap_or(target);
                let (can_execute, mut continue_routing) =
                    self.query_core(tree, &command, parameter.clone(), Some(target), input.user_initiated)?;
                if can_execute {
                    continue_routing = false;
                    self.execute_core(tree, &command, parameter, Some(target), input.user_initiated)?;
                }
                Ok(!continue_routing)
            }
            BoundCommand::Custom(command) => {
                if command.can_execute(parameter.as_ref()) {
                    command.execute(parameter.as_ref());
                }
                Ok(true)
            }
        }
    }

    fn resolve_input(
        &self,
        tree: &dyn ElementTree,
        class: &'static ElementClass,
        target: ElementId,
        input: &InputRecord,
    ) -> Option<(BoundCommand, Option<ElementId>, Option<CommandParam>)> {
        let from_input_binding = |b: &Arc<InputBinding>| (b.command().clone(), b.target(), b.parameter().cloned());

        if let Some(b) = tree.input_bindings(target).and_then(|c| c.find_match(target, input)) {
            tracing::trace!("{input:?} matched instance input binding of {target}");
            return Some(from_input_binding(b));
        }

        for level in self.class_input_bindings.lookup(class) {
            if let Some(b) = level.bindings.iter().find(|b| b.gesture().matches(target, input)) {
                tracing::trace!("{input:?} matched class input binding of {}", level.class.name());
                return Some(from_input_binding(b));
            }
        }

        if let Some(b) = tree.command_bindings(target).and_then(|c| c.find_match_input(target, input)) {
            tracing::trace!("{input:?} matched gesture of {:?} in instance command binding of {target}", b.command());
            return Some((BoundCommand::Routed(b.command().clone()), None, None));
        }

        for level in self.class_command_bindings.lookup(class) {
            if let Some(b) = level.bindings.iter().find(|b| b.command().gestures_match(target, input)) {
                tracing::trace!(
                    "{input:?} matched gesture of {:?} in class command binding of {}",
                    b.command(),
                    level.class.name()
                );
                return Some((BoundCommand::Routed(b.command().clone()), None, None));
            }
        }

        None
    }

    /// Query if the `command` can execute on the `target`.
    ///
    /// If `target` is not set the keyboard focused element is the target, without focus the command cannot execute.
    /// Returns the answer and if the input that caused the query should continue routing.
    pub fn can_execute(
        &self,
        tree: &dyn ElementTree,
        command: &Command,
        parameter: Option<CommandParam>,
        target: Option<ElementId>,
    ) -> Result<(bool, bool), CommandError> {
        self.query_core(tree, command, parameter, target, false)
    }

    /// Execute the `command` on the `target`.
    ///
    /// If `target` is not set the keyboard focused element is the target. Returns if any binding handled the command.
    pub fn execute(
        &self,
        tree: &dyn ElementTree,
        command: &Command,
        parameter: Option<CommandParam>,
        target: Option<ElementId>,
    ) -> Result<bool, CommandError> {
        self.execute_core(tree, command, parameter, target, false)
    }

    fn resolve_target(tree: &dyn ElementTree, target: Option<ElementId>) -> Result<Option<ElementId>, CommandError> {
        match target {
            Some(t) => {
                if tree.class_of(t).is_none() {
                    return Err(CommandError::ElementNotFound(t));
                }
                Ok(Some(t))
            }
            None => Ok(tree.keyboard_focus().filter(|f| tree.class_of(*f).is_some())),
        }
    }

    fn query_core(
        &self,
        tree: &dyn ElementTree,
        command: &Command,
        parameter: Option<CommandParam>,
        target: Option<ElementId>,
        user_initiated: bool,
    ) -> Result<(bool, bool), CommandError> {
        let Some(target) = Self::resolve_target(tree, target)? else {
            return Ok((false, false));
        };

        let mut args = CanExecuteArgs::new(command.clone(), parameter, target, user_initiated);
        self.raise(tree, target, RoutePhase::Preview, &mut args)?;
        if !args.handled {
            self.raise(tree, target, RoutePhase::Main, &mut args)?;
        }
        if !args.handled && command.has_default_can_execute() {
            args.can_execute = command.default_can_execute(args.parameter.as_ref());
        }

        tracing::trace!("{command:?} on {target} can_execute: {}", args.can_execute);
        Ok((args.can_execute, args.continue_routing))
    }

    fn execute_core(
        &self,
        tree: &dyn ElementTree,
        command: &Command,
        parameter: Option<CommandParam>,
        target: Option<ElementId>,
        user_initiated: bool,
    ) -> Result<bool, CommandError> {
        let Some(target) = Self::resolve_target(tree, target)? else {
            return Ok(false);
        };

        let mut args = ExecutedArgs::new(command.clone(), parameter, target, user_initiated);
        self.raise(tree, target, RoutePhase::Preview, &mut args)?;
        if !args.handled {
            self.raise(tree, target, RoutePhase::Main, &mut args)?;
        }

        tracing::trace!("{command:?} on {target} handled: {}", args.handled);
        Ok(args.handled)
    }

    fn raise<N: Notification>(
        &self,
        tree: &dyn ElementTree,
        target: ElementId,
        phase: RoutePhase,
        args: &mut N,
    ) -> Result<(), CommandError> {
        args.set_phase(phase);
        let mut route = tree.route(target);
        if phase == RoutePhase::Preview {
            route.reverse();
        }
        for element in route {
            if args.handled() {
                break;
            }
            self.on_element(tree, element, args)?;
        }
        Ok(())
    }

    fn on_element<N: Notification>(&self, tree: &dyn ElementTree, element: ElementId, args: &mut N) -> Result<(), CommandError> {
        self.find_command_binding(tree, element, args);

        if !args.handled() && args.phase() == RoutePhase::Main && tree.is_focus_scope(element) {
            if let Some(focused) = parent_scope_focused_element(tree, element) {
                tracing::trace!("{} of {:?} transferred from scope {element} to {focused}", N::NAME, args.command());
                N::transfer(self, tree, focused, args)?;
            }
        }
        Ok(())
    }

    fn find_command_binding<N: Notification>(&self, tree: &dyn ElementTree, element: ElementId, args: &mut N) {
        let command = args.command().clone();

        if let Some(bindings) = tree.command_bindings(element) {
            let mut cursor = 0;
            while let Some(b) = bindings.find_match(&command, &mut cursor) {
                N::notify(b, element, args);
                if args.succeeded() {
                    tracing::trace!("{} of {command:?} handled by instance binding of {element}", N::NAME);
                    return;
                }
            }
        }

        let Some(class) = tree.class_of(element) else {
            return;
        };
        // bindings are copied out of the registry lock before any handler runs
        for level in self.class_command_bindings.lookup(class) {
            for b in level.bindings.iter().filter(|b| b.command() == &command) {
                N::notify(b, element, args);
                if args.succeeded() {
                    tracing::trace!("{} of {command:?} handled by class binding of {}", N::NAME, level.class.name());
                    return;
                }
            }
        }
    }

    /// Schedule a coalesced requery notification.
    ///
    /// See [`RequeryResender::invalidate`] for details.
    ///
    /// [`RequeryResender::invalidate`]: crate::RequeryResender::invalidate
    pub fn invalidate_requery_suggested(&self) {
        self.ctx.resender().invalidate()
    }

    /// Add a weak listener for requery notifications.
    pub fn add_requery_suggested(&self, handler: WeakHandler<RequeryArgs>) -> SubscriptionKey {
        let subscriber = zero_ui_weak_event::Liveness::permanent();
        self.ctx.resender().signal().subscribe(subscriber, handler)
    }

    /// Remove a listener added by [`add_requery_suggested`].
    ///
    /// Returns `false` if the handler was not listening.
    ///
    /// [`add_requery_suggested`]: Self::add_requery_suggested
    pub fn remove_requery_suggested(&self, handler: &WeakHandler<RequeryArgs>) -> bool {
        self.ctx.resender().signal().unsubscribe_handler(handler)
    }
}
impl fmt::Debug for CommandManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandManager")
            .field("ctx", &self.ctx)
            .field("class_input_bindings", &self.class_input_bindings)
            .field("class_command_bindings", &self.class_command_bindings)
            .finish()
    }
}

/// Focused element of the parent scope of `scope`, if it is still in the tree and not inside `scope`.
fn parent_scope_focused_element(tree: &dyn ElementTree, scope: ElementId) -> Option<ElementId> {
    let parent_scope = tree.parent_scope(scope)?;
    let focused = tree.focused_element(parent_scope).filter(|e| tree.class_of(*e).is_some())?;
    if tree.is_ancestor_of(scope, focused) {
        None
    } else {
        Some(focused)
    }
}

/// Sets `handled` on drop, even when unwinding.
struct HandledOnDrop<'a>(&'a mut bool);
impl Drop for HandledOnDrop<'_> {
    fn drop(&mut self) {
        *self.0 = true;
    }
}

trait Notification {
    const NAME: &'static str;

    fn command(&self) -> &Command;
    fn phase(&self) -> RoutePhase;
    fn set_phase(&mut self, phase: RoutePhase);
    fn handled(&self) -> bool;
    /// If the binding that was just notified stops the binding search.
    fn succeeded(&self) -> bool;
    fn notify(binding: &CommandBinding, sender: ElementId, args: &mut Self);
    fn transfer(manager: &CommandManager, tree: &dyn ElementTree, new_target: ElementId, args: &mut Self) -> Result<(), CommandError>;
}
impl Notification for CanExecuteArgs {
    const NAME: &'static str = "can-execute";

    fn command(&self) -> &Command {
        &self.command
    }

    fn phase(&self) -> RoutePhase {
        self.phase
    }

    fn set_phase(&mut self, phase: RoutePhase) {
        self.phase = phase;
    }

    fn handled(&self) -> bool {
        self.handled
    }

    fn succeeded(&self) -> bool {
        self.can_execute || self.handled
    }

    fn notify(binding: &CommandBinding, sender: ElementId, args: &mut Self) {
        binding.notify_can_execute(sender, args);
    }

    fn transfer(manager: &CommandManager, tree: &dyn ElementTree, new_target: ElementId, args: &mut Self) -> Result<(), CommandError> {
        let command = args.command.clone();
        let parameter = args.parameter.clone();
        let _handled = HandledOnDrop(&mut args.handled);
        let (can_execute, _) = manager.query_core(tree, &command, parameter, Some(new_target), false)?;
        args.can_execute = can_execute;
        Ok(())
    }
}
impl Notification for ExecutedArgs {
    const NAME: &'static str = "executed";

    fn command(&self) -> &Command {
        &self.command
    }

    fn phase(&self) -> RoutePhase {
        self.phase
    }

    fn set_phase(&mut self, phase: RoutePhase) {
        self.phase = phase;
    }

    fn handled(&self) -> bool {
        self.handled
    }

    fn succeeded(&self) -> bool {
        self.handled
    }

    fn notify(binding: &CommandBinding, sender: ElementId, args: &mut Self) {
        binding.notify_executed(sender, args);
    }

    fn transfer(manager: &CommandManager, tree: &dyn ElementTree, new_target: ElementId, args: &mut Self) -> Result<(), CommandError> {
        let command = args.command.clone();
        let parameter = args.parameter.clone();
        let user_initiated = args.user_initiated;
        let _handled = HandledOnDrop(&mut args.handled);
        manager.execute_core(tree, &command, parameter, Some(new_target), user_initiated)?;
        Ok(())
    }
}
