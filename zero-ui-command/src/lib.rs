//! Command routing.
//!
//! Commands are semantic actions (copy, paste, play) decoupled from the inputs that invoke them and from
//! the elements that implement them. Elements declare what they do for a command using [`CommandBinding`]s,
//! inputs are mapped to commands by [`InputBinding`]s and by the default gestures of each [`Command`].
//!
//! # Crate Items
//!
//! * [`Command`] - identity of a routed command, with name, owner and lazy default gestures.
//! * [`ApplicationCommands`], [`MediaCommands`] - libraries of standard commands.
//! * [`InputBinding`], [`CommandBinding`] - per element or per class bindings.
//! * [`ElementTree`] - the element hierarchy and focus state commands are routed in.
//! * [`CommandManager`] - input resolution, can-execute queries and execution.
//! * [`CommandContext`] - per thread state, event channels and the coalesced requery resender.
//! * [`CanExecuteChangedManager`] - weak "can execute changed" listeners of commands.

#![warn(missing_docs)]

mod error;
pub use error::*;

mod gesture;
pub use gesture::*;

mod tree;
pub use tree::*;

mod collection;
pub use collection::*;

mod class;
pub use class::*;

mod command;
pub use command::*;

mod library;
pub use library::*;

mod binding;
pub use binding::*;

mod context;
pub use context::*;

mod can_execute_changed;
pub use can_execute_changed::*;

mod manager;
pub use manager::*;

pub use zero_ui_weak_event::{RequeryArgs, SignalSender, SubscriptionKey, TaskPriority, WeakHandler};
