//! Resource handle type.
//!
//! A [`Handle<D>`] represents a resource that stays *alive* while at least one handle exists, the
//! [`HandleOwner<D>`] is held by the resource manager and can query if the handles were dropped.
//!
//! Handles are how collaborators that are not reference counted by the manager (UI elements, subscriptions)
//! notify their end of life, the manager never keeps a resource alive by holding its owner.

#![warn(missing_docs)]

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU8, AtomicUsize, Ordering},
        Arc, Weak,
    },
};

const NONE: u8 = 0;
const PERMANENT: u8 = 0b01;
const FORCE_DROP: u8 = 0b10;

struct HandleData<D> {
    state: AtomicU8,
    handles: AtomicUsize,
    data: D,
}

/// Represents a resource handle.
///
/// The resource stays in memory as long as a handle clone is alive. After the handle
/// is dropped the resource will be removed after an indeterminate time at the discretion of the
/// resource manager.
///
/// You can *forget* a handle by calling [`perm`](Self::perm), this releases the handle memory
/// but the resource stays alive for the duration of the process, this is different from calling [`mem::forget`]
/// because no memory is leaked.
///
/// The handle value can hold extra data `D` that is shared between all handles and the owner.
///
/// [`mem::forget`]: std::mem::forget
#[must_use = "the resource id dropped if the handle is dropped"]
pub struct Handle<D: Send + Sync>(Arc<HandleData<D>>);
impl<D: Send + Sync> Handle<D> {
    /// Create a handle with owner pair.
    pub fn new(data: D) -> (HandleOwner<D>, Handle<D>) {
        let handle = Handle(Arc::new(HandleData {
            state: AtomicU8::new(NONE),
            handles: AtomicUsize::new(1),
            data,
        }));
        (HandleOwner(handle.0.clone()), handle)
    }

    /// Create a handle to nothing, the handle always in the *dropped* state.
    ///
    /// Note that `Option<Handle<D>>` takes up the same space as `Handle<D>` and avoids an allocation.
    pub fn dummy(data: D) -> Self {
        Handle(Arc::new(HandleData {
            state: AtomicU8::new(FORCE_DROP),
            handles: AtomicUsize::new(1),
            data,
        }))
    }

    /// Reference the attached data.
    pub fn data(&self) -> &D {
        &self.0.data
    }

    /// Mark the handle as permanent and drops this clone of it. This causes the resource to stay in memory
    /// until the process exits, no memory is leaked.
    pub fn perm(self) {
        self.0.state.fetch_or(PERMANENT, Ordering::Relaxed);
    }

    /// If [`perm`](Self::perm) was called in another clone of this handle.
    ///
    /// If `true` the resource will stay in memory for the duration of the process, unless [`force_drop`](Self::force_drop)
    /// is also called.
    pub fn is_permanent(&self) -> bool {
        self.0.state.load(Ordering::Relaxed) == PERMANENT
    }

    /// Force drops the handle, meaning the resource will be dropped even if there are other handles active.
    pub fn force_drop(self) {
        self.0.state.store(FORCE_DROP, Ordering::Relaxed);
    }

    /// If the handle is in *dropped* state.
    ///
    /// The handle is only dropped when [`force_drop`](Self::force_drop) or an owner method is called.
    pub fn is_dropped(&self) -> bool {
        self.0.state.load(Ordering::Relaxed) == FORCE_DROP
    }

    /// Create a [`WeakHandle`] to this handle.
    pub fn downgrade(&self) -> WeakHandle<D> {
        WeakHandle(Arc::downgrade(&self.0))
    }
}
impl<D: Send + Sync> Clone for Handle<D> {
    fn clone(&self) -> Self {
        self.0.handles.fetch_add(1, Ordering::Relaxed);
        Handle(self.0.clone())
    }
}
impl<D: Send + Sync> PartialEq for Handle<D> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl<D: Send + Sync> Eq for Handle<D> {}
impl<D: Send + Sync> Hash for Handle<D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let ptr = Arc::as_ptr(&self.0) as usize;
        ptr.hash(state);
    }
}
impl<D: Send + Sync> Drop for Handle<D> {
    fn drop(&mut self) {
        self.0.handles.fetch_sub(1, Ordering::Relaxed);
    }
}
impl<D: Send + Sync> fmt::Debug for Handle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_permanent() {
            "permanent"
        } else if self.is_dropped() {
            "dropped"
        } else {
            "holding"
        };

        write!(f, "Handle({state})")
    }
}

/// A weak reference to a [`Handle`].
pub struct WeakHandle<D: Send + Sync>(Weak<HandleData<D>>);
impl<D: Send + Sync> WeakHandle<D> {
    /// New weak handle that does not upgrade.
    pub fn new() -> Self {
        WeakHandle(Weak::new())
    }

    /// Get a live handle if it was not dropped or force-dropped.
    pub fn upgrade(&self) -> Option<Handle<D>> {
        let data = self.0.upgrade()?;
        if data.state.load(Ordering::Relaxed) == FORCE_DROP {
            return None;
        }
        // only upgrades if another handle is still holding, never resurrects.
        data.handles
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| if n == 0 { None } else { Some(n + 1) })
            .ok()?;
        Some(Handle(data))
    }

    /// Address of the shared handle data, identifies all handles of the same owner.
    pub fn as_ptr(&self) -> *const () {
        self.0.as_ptr() as *const ()
    }

    /// If the handle can still upgrade.
    pub fn is_alive(&self) -> bool {
        match self.0.upgrade() {
            Some(data) => {
                let state = data.state.load(Ordering::Relaxed);
                state != FORCE_DROP && (state == PERMANENT || data.handles.load(Ordering::Relaxed) > 0)
            }
            None => false,
        }
    }
}
impl<D: Send + Sync> Default for WeakHandle<D> {
    fn default() -> Self {
        Self::new()
    }
}
impl<D: Send + Sync> Clone for WeakHandle<D> {
    fn clone(&self) -> Self {
        WeakHandle(self.0.clone())
    }
}
impl<D: Send + Sync> PartialEq for WeakHandle<D> {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}
impl<D: Send + Sync> Eq for WeakHandle<D> {}
impl<D: Send + Sync> Hash for WeakHandle<D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let ptr = self.0.as_ptr() as usize;
        ptr.hash(state);
    }
}
impl<D: Send + Sync> fmt::Debug for WeakHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_alive() {
            write!(f, "WeakHandle(alive)")
        } else {
            write!(f, "WeakHandle(dropped)")
        }
    }
}

/// A [`Handle`] owner.
///
/// Use [`Handle::new`] to create.
///
/// Dropping the [`HandleOwner`] marks all active handles as *dropped*.
pub struct HandleOwner<D: Send + Sync>(Arc<HandleData<D>>);
impl<D: Send + Sync> HandleOwner<D> {
    /// If the handle is in *dropped* state.
    ///
    /// The handle is dropped when all [`Handle`] clones are dropped without calling [`perm`](Handle::perm),
    /// or when [`force_drop`](Handle::force_drop) was called in any clone.
    pub fn is_dropped(&self) -> bool {
        let state = self.0.state.load(Ordering::Relaxed);
        state == FORCE_DROP || (state != PERMANENT && self.0.handles.load(Ordering::Relaxed) == 0)
    }

    /// New handle owner in the dropped state.
    pub fn dropped(data: D) -> HandleOwner<D> {
        HandleOwner(Arc::new(HandleData {
            state: AtomicU8::new(FORCE_DROP),
            handles: AtomicUsize::new(0),
            data,
        }))
    }

    /// Gets a new handle and resets the state if it was *dropped*.
    pub fn reanimate(&self) -> Handle<D> {
        self.0.state.store(NONE, Ordering::Relaxed);
        self.0.handles.fetch_add(1, Ordering::Relaxed);
        Handle(self.0.clone())
    }

    /// Gets an weak handle that may-not be able to upgrade.
    pub fn weak_handle(&self) -> WeakHandle<D> {
        WeakHandle(Arc::downgrade(&self.0))
    }

    /// Reference the attached data.
    pub fn data(&self) -> &D {
        &self.0.data
    }
}
impl<D: Send + Sync> Drop for HandleOwner<D> {
    fn drop(&mut self) {
        self.0.state.store(FORCE_DROP, Ordering::Relaxed);
    }
}
impl<D: Send + Sync> fmt::Debug for HandleOwner<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleOwner").field("is_dropped", &self.is_dropped()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_all_handles() {
        let (owner, handle) = Handle::new(());
        let clone = handle.clone();
        assert!(!owner.is_dropped());

        drop(handle);
        assert!(!owner.is_dropped());

        drop(clone);
        assert!(owner.is_dropped());
    }

    #[test]
    fn perm_keeps_alive() {
        let (owner, handle) = Handle::new(());
        let weak = handle.downgrade();
        handle.perm();

        assert!(!owner.is_dropped());
        assert!(weak.is_alive());
    }

    #[test]
    fn force_drop_wins() {
        let (owner, handle) = Handle::new(());
        let clone = handle.clone();
        clone.force_drop();

        assert!(owner.is_dropped());
        assert!(handle.is_dropped());
        assert!(handle.downgrade().upgrade().is_none());
    }

    #[test]
    fn weak_does_not_resurrect() {
        let (owner, handle) = Handle::new(7u32);
        let weak = handle.downgrade();

        let strong = weak.upgrade().unwrap();
        assert_eq!(*strong.data(), 7);
        drop(strong);
        drop(handle);

        assert!(weak.upgrade().is_none());
        assert!(!weak.is_alive());
        assert!(owner.is_dropped());
    }

    #[test]
    fn owner_drop_marks_dropped() {
        let (owner, handle) = Handle::new(());
        drop(owner);
        assert!(handle.is_dropped());
        assert!(!handle.downgrade().is_alive());
    }

    #[test]
    fn reanimate() {
        let (owner, handle) = Handle::new(());
        drop(handle);
        assert!(owner.is_dropped());

        let handle = owner.reanimate();
        assert!(!owner.is_dropped());
        assert!(!handle.is_dropped());
    }

    #[test]
    fn dummy_is_dropped() {
        let handle = Handle::dummy(());
        assert!(handle.is_dropped());
        assert!(WeakHandle::<()>::new().upgrade().is_none());
    }
}
