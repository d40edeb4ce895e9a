use std::{
    fmt,
    sync::{Arc, Weak},
};

use zero_ui_handle::{Handle, WeakHandle};

trait WeakRef: Send + Sync {
    fn is_alive(&self) -> bool;
}
impl<T: ?Sized + Send + Sync> WeakRef for Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// Identity of the object tracked by a [`Liveness`].
///
/// The key is the object address, it is only unique while the object is alive, tables
/// must always check [`Liveness::is_alive`] before trusting a key match.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LivenessKey {
    /// Process wide sentinel, used by static handlers and global sources.
    Static,
    /// Address of a live object.
    Addr(usize),
}
impl LivenessKey {
    /// Key of the value referenced by `value`.
    ///
    /// This is the same key as [`Liveness::of`] for the `Arc` that contains `value`.
    pub fn of_ref<T: ?Sized>(value: &T) -> Self {
        LivenessKey::Addr(value as *const T as *const () as usize)
    }
}

#[derive(Clone)]
enum Kind {
    Static,
    Object(Arc<dyn WeakRef>),
    Handle(WeakHandle<()>),
}

/// Non-owning reference that can only answer if the referenced object is still alive.
///
/// Checking liveness never upgrades to a strong reference, so a table of `Liveness` values
/// never extends the lifetime of anything.
#[derive(Clone)]
pub struct Liveness {
    key: LivenessKey,
    kind: Kind,
}
impl Liveness {
    /// Tracks the value in `arc`.
    pub fn of<T: ?Sized + Send + Sync + 'static>(arc: &Arc<T>) -> Self {
        Self::from_weak(Arc::downgrade(arc))
    }

    /// Tracks the value referenced by `weak`.
    pub fn from_weak<T: ?Sized + Send + Sync + 'static>(weak: Weak<T>) -> Self {
        Liveness {
            key: LivenessKey::Addr(weak.as_ptr() as *const () as usize),
            kind: Kind::Object(Arc::new(weak)),
        }
    }

    /// Tracks a resource that explicitly signals its end by dropping all handles.
    ///
    /// This is how collaborators that are not reference counted notify their destruction.
    pub fn of_handle(handle: &Handle<()>) -> Self {
        Self::from_weak_handle(handle.downgrade())
    }

    /// Tracks the handle referenced by `weak`.
    pub fn from_weak_handle(weak: WeakHandle<()>) -> Self {
        Liveness {
            key: LivenessKey::Addr(weak.as_ptr() as usize),
            kind: Kind::Handle(weak),
        }
    }

    /// Liveness that is always alive, used for static handlers.
    pub fn permanent() -> Self {
        Liveness {
            key: LivenessKey::Static,
            kind: Kind::Static,
        }
    }

    /// If the tracked object is still alive.
    pub fn is_alive(&self) -> bool {
        match &self.kind {
            Kind::Static => true,
            Kind::Object(w) => w.is_alive(),
            Kind::Handle(h) => h.is_alive(),
        }
    }

    /// Identity of the tracked object.
    pub fn key(&self) -> LivenessKey {
        self.key
    }

    /// If this is the [`permanent`](Self::permanent) sentinel.
    pub fn is_permanent(&self) -> bool {
        matches!(self.kind, Kind::Static)
    }
}
impl fmt::Debug for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Liveness")
            .field("key", &self.key)
            .field("is_alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arc_liveness() {
        let value = Arc::new(10);
        let l = Liveness::of(&value);
        assert!(l.is_alive());
        assert_eq!(l.key(), LivenessKey::of_ref(&*value));

        drop(value);
        assert!(!l.is_alive());
    }

    #[test]
    fn dyn_liveness_same_key() {
        let value: Arc<dyn Fn() + Send + Sync> = Arc::new(|| {});
        let l = Liveness::of(&value);
        assert_eq!(l.key(), LivenessKey::of_ref(&*value));
    }

    #[test]
    fn handle_liveness() {
        let (_owner, handle) = Handle::new(());
        let l = Liveness::of_handle(&handle);
        assert!(l.is_alive());

        drop(handle);
        assert!(!l.is_alive());
    }

    #[test]
    fn permanent() {
        let l = Liveness::permanent();
        assert!(l.is_alive());
        assert!(l.is_permanent());
        assert_eq!(l.key(), LivenessKey::Static);
    }
}
