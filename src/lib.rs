//! Command routing and weak events.
//!
//! This crate re-exports the workspace crates and provides the [`tracing`] setup used by tests and demos.
//!
//! # Crates
//!
//! * [`handle`] - resource handles that notify the end of life of collaborators.
//! * [`weak_event`] - weak subscriptions, requery signals, event channels and the owning thread task queue.
//! * [`command`] - commands, input and command bindings, class bindings and the command manager.
//!
//! # Usage
//!
//! ```
//! use zero_ui_cmd::{command::TestTree, prelude::*};
//!
//! element_class! {
//!     pub static CONTROL;
//!     pub static TEXT_BOX: CONTROL;
//! }
//!
//! let manager = CommandManager::isolated(CommandContext::new());
//! manager.register_class_command_binding(&TEXT_BOX, CommandBinding::new(ApplicationCommands::copy()).on_executed(|_, _| {}));
//!
//! let mut tree = TestTree::new();
//! let text_box = tree.add_root(&TEXT_BOX);
//!
//! let consumed = manager.translate_input(&tree, text_box, &InputRecord::key(ModifiersState::CTRL, 'c')).unwrap();
//! assert!(consumed);
//! ```
//!
//! [`tracing`]: https://docs.rs/tracing

#![cfg_attr(doc_nightly, feature(doc_auto_cfg))]
#![warn(missing_docs)]

pub use zero_ui_command as command;
pub use zero_ui_handle as handle;
pub use zero_ui_weak_event as weak_event;

/// Types for general command routing.
pub mod prelude {
    #[doc(no_inline)]
    pub use crate::command::{
        element_class, ApplicationCommands, BoundCommand, CanExecuteArgs, CanExecuteChangedManager, ClassRegistry, Command,
        CommandBinding, CommandContext, CommandError, CommandManager, CommandParam, CustomCommand, ElementClass, ElementId,
        ElementTree, ExecutedArgs, InputBinding, InputGesture, InputRecord, Key, KeyGesture, MediaCommands, ModifiersState,
        MouseAction, MouseGesture, RoutePhase,
    };

    #[doc(no_inline)]
    pub use crate::weak_event::{Liveness, RequeryArgs, RequerySignal, SignalSender, TaskPriority, WeakEventChannel, WeakHandler};

    #[doc(no_inline)]
    pub use crate::handle::{Handle, HandleOwner, WeakHandle};
}

/// Prints `tracing` events to stdout.
///
/// All non-fatal errors in the command routing are logged using tracing, trace events record how each input and
/// command resolved.
///
/// Returns `false` if a global subscriber was already set.
///
/// See also [`test_log`] to enable panicking on error log.
pub fn print_tracing(max: tracing::Level) -> bool {
    use tracing_subscriber::prelude::*;

    let fmt_layer = tracing_subscriber::fmt::layer().without_time();
    tracing_subscriber::registry().with(FilterLayer(max)).with(fmt_layer).try_init().is_ok()
}

struct FilterLayer(tracing::Level);
impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FilterLayer {
    fn enabled(&self, metadata: &tracing::Metadata<'_>, _: tracing_subscriber::layer::Context<'_, S>) -> bool {
        print_tracing_filter(&self.0, metadata)
    }

    fn max_level_hint(&self) -> Option<tracing::metadata::LevelFilter> {
        Some(self.0.into())
    }

    #[cfg(any(test, feature = "test_util"))]
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        if event.metadata().level() == &tracing::Level::ERROR && TEST_LOG.with(std::cell::Cell::get) {
            struct MsgCollector<'a>(&'a mut String);
            impl tracing::field::Visit for MsgCollector<'_> {
                fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                    use std::fmt::Write;
                    let _ = write!(self.0, "\n  {} = {:?}", field.name(), value);
                }
            }

            let meta = event.metadata();
            let file = meta.file().unwrap_or("");
            let line = meta.line().unwrap_or(0);

            let mut msg = format!("[{file}:{line}]");
            event.record(&mut MsgCollector(&mut msg));

            panic!("[LOG-ERROR]{msg}")
        }
    }
}

/// Filter used by [`print_tracing`].
///
/// Events from dependencies are limited to warnings.
pub fn print_tracing_filter(level: &tracing::Level, metadata: &tracing::Metadata) -> bool {
    if metadata.level() > level {
        return false;
    }

    if metadata.level() > &tracing::Level::WARN && !metadata.target().starts_with("zero_ui_") {
        return false;
    }

    true
}

/// Modifies the [`print_tracing`] subscriber to panic for error logs in the current thread.
#[cfg(any(test, feature = "test_util"))]
pub fn test_log() {
    TEST_LOG.with(|t| t.set(true));
}

#[cfg(any(test, feature = "test_util"))]
thread_local! {
    static TEST_LOG: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}
