//! Weak event subscriptions.
//!
//! Event subscriptions that do not keep the subscriber or the handler target alive. Handlers are
//! stored with a non-owning reference to their target, entries become inactive as soon as the target
//! or the subscriber is dropped and are purged lazily.
//!
//! # Crate Items
//!
//! * [`Liveness`] - non-owning reference used to check if something is still alive.
//! * [`WeakHandler`] - event handler bound to a target by a weak reference.
//! * [`WeakSubscriptionTable`] - arena of subscription records indexed by target.
//! * [`RequerySignal`] - an upstream "please recheck" signal that holds its subscribers weakly.
//! * [`WeakEventChannel`] - per event kind dispatcher of listeners grouped by source.
//! * [`TaskQueue`] - the owning thread queue that runs deferred callbacks and scheduled purges.

#![warn(missing_docs)]

mod liveness;
pub use liveness::*;

mod handler;
pub use handler::*;

mod table;
pub use table::*;

mod signal;
pub use signal::*;

mod queue;
pub use queue::*;

mod channel;
pub use channel::*;
