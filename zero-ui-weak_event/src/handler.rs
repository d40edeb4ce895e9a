use std::{fmt, sync::Arc};

use zero_ui_handle::Handle;

use crate::{Liveness, LivenessKey};

type HandlerFn<A> = dyn Fn(&A) -> bool + Send + Sync;

/// Event handler bound to a target by a weak reference.
///
/// The handler closure receives a strong reference to the target only for the duration of the call,
/// the handler itself never keeps the target alive. The closure must not capture the target strongly,
/// that would make the target live for as long as the subscription.
///
/// Handlers are compared by identity, clones of the same handler are equal, two handlers created
/// from the same closure code are not.
pub struct WeakHandler<A: ?Sized> {
    target: Liveness,
    call: Arc<HandlerFn<A>>,
}
impl<A: ?Sized + 'static> WeakHandler<A> {
    /// New handler bound to `target`.
    pub fn new<T, F>(target: &Arc<T>, handler: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&T, &A) + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(target);
        WeakHandler {
            target: Liveness::of(target),
            call: Arc::new(move |args: &A| match weak.upgrade() {
                Some(target) => {
                    handler(&target, args);
                    true
                }
                None => false,
            }),
        }
    }

    /// New handler bound to a resource that signals its end by dropping all `handle` clones.
    pub fn with_handle<F>(handle: &Handle<()>, handler: F) -> Self
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let liveness = Liveness::of_handle(handle);
        let check = liveness.clone();
        WeakHandler {
            target: liveness,
            call: Arc::new(move |args: &A| {
                if check.is_alive() {
                    handler(args);
                    true
                } else {
                    false
                }
            }),
        }
    }

    /// New handler without target, it stays alive until unsubscribed.
    pub fn from_static<F>(handler: F) -> Self
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        WeakHandler {
            target: Liveness::permanent(),
            call: Arc::new(move |args: &A| {
                handler(args);
                true
            }),
        }
    }

    /// Call the handler if the target is still alive.
    ///
    /// Returns `false` if the target was dropped and the handler was not called.
    pub fn call(&self, args: &A) -> bool {
        (self.call)(args)
    }
}
impl<A: ?Sized> WeakHandler<A> {
    /// If the handler target is still alive.
    pub fn is_alive(&self) -> bool {
        self.target.is_alive()
    }

    /// Identity of the target, [`LivenessKey::Static`] for static handlers.
    pub fn target_key(&self) -> LivenessKey {
        self.target.key()
    }

    /// If `self` and `other` are clones of the same handler.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.call, &other.call)
    }
}
impl<A: ?Sized> Clone for WeakHandler<A> {
    fn clone(&self) -> Self {
        WeakHandler {
            target: self.target.clone(),
            call: self.call.clone(),
        }
    }
}
impl<A: ?Sized> PartialEq for WeakHandler<A> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}
impl<A: ?Sized> Eq for WeakHandler<A> {}
impl<A: ?Sized> fmt::Debug for WeakHandler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandler")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
