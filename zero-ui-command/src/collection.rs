use std::{fmt, sync::Arc};

use crate::{Command, CommandBinding, CommandError, ElementId, InputBinding, InputGesture, InputRecord};

/// Ordered list of shared bindings.
///
/// Items are kept in insertion order, lookups scan in order so the first registered item wins.
/// After [`seal`] all mutators return [`CommandError::ReadOnly`].
///
/// [`seal`]: Self::seal
pub struct BindingList<T: ?Sized> {
    items: Vec<Arc<T>>,
    sealed: bool,
}
impl<T: ?Sized> Default for BindingList<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T: ?Sized> Clone for BindingList<T> {
    /// Clones the item references, the clone is not sealed.
    fn clone(&self) -> Self {
        BindingList {
            items: self.items.clone(),
            sealed: false,
        }
    }
}
impl<T: ?Sized> From<Vec<Arc<T>>> for BindingList<T> {
    fn from(items: Vec<Arc<T>>) -> Self {
        BindingList { items, sealed: false }
    }
}
impl<T: ?Sized> BindingList<T> {
    /// New empty list.
    pub fn new() -> Self {
        BindingList { items: vec![], sealed: false }
    }

    /// Insert `items` before the current items, sealed or not.
    pub(crate) fn prepend(&mut self, items: Vec<Arc<T>>) {
        self.items.splice(0..0, items);
    }

    fn check_mut(&self) -> Result<(), CommandError> {
        if self.sealed {
            Err(CommandError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn check_index(&self, index: usize, len: usize) -> Result<(), CommandError> {
        if index < len {
            Ok(())
        } else {
            Err(CommandError::IndexOutOfBounds { index, len: self.items.len() })
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// If the list has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the item at the `index`.
    pub fn get(&self, index: usize) -> Option<&Arc<T>> {
        self.items.get(index)
    }

    /// Iterate over items in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<T>> {
        self.items.iter()
    }

    /// If the exact `item` is in the list.
    pub fn contains(&self, item: &Arc<T>) -> bool {
        self.position(item).is_some()
    }

    /// Index of the exact `item`.
    pub fn position(&self, item: &Arc<T>) -> Option<usize> {
        self.items.iter().position(|i| Arc::ptr_eq(i, item))
    }

    /// Push the item at the end of the list.
    pub fn add(&mut self, item: impl Into<Arc<T>>) -> Result<(), CommandError> {
        self.check_mut()?;
        self.items.push(item.into());
        Ok(())
    }

    /// Insert the item at the `index`, `index` can be the length to insert at the end.
    pub fn insert(&mut self, index: usize, item: impl Into<Arc<T>>) -> Result<(), CommandError> {
        self.check_mut()?;
        self.check_index(index, self.items.len() + 1)?;
        self.items.insert(index, item.into());
        Ok(())
    }

    /// Replace the item at the `index`, returns the previous item.
    pub fn set(&mut self, index: usize, item: impl Into<Arc<T>>) -> Result<Arc<T>, CommandError> {
        self.check_mut()?;
        self.check_index(index, self.items.len())?;
        Ok(std::mem::replace(&mut self.items[index], item.into()))
    }

    /// Remove the item at the `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<Arc<T>, CommandError> {
        self.check_mut()?;
        self.check_index(index, self.items.len())?;
        Ok(self.items.remove(index))
    }

    /// Remove the exact `item`, returns `false` if it was not in the list.
    pub fn remove(&mut self, item: &Arc<T>) -> Result<bool, CommandError> {
        self.check_mut()?;
        match self.position(item) {
            Some(i) => {
                self.items.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove all items.
    pub fn clear(&mut self) -> Result<(), CommandError> {
        self.check_mut()?;
        self.items.clear();
        Ok(())
    }

    /// Make the list read-only.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// If [`seal`] was called.
    ///
    /// [`seal`]: Self::seal
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}
impl<'a, T: ?Sized> IntoIterator for &'a BindingList<T> {
    type Item = &'a Arc<T>;
    type IntoIter = std::slice::Iter<'a, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
impl<T: ?Sized + fmt::Debug> fmt::Debug for BindingList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()?;
        if self.sealed {
            write!(f, " (sealed)")?;
        }
        Ok(())
    }
}

/// Input gestures of a command.
pub type InputGestureCollection = BindingList<dyn InputGesture>;
impl BindingList<dyn InputGesture> {
    /// Push a gesture.
    pub fn add_gesture(&mut self, gesture: impl InputGesture) -> Result<(), CommandError> {
        self.add(Arc::new(gesture) as Arc<dyn InputGesture>)
    }

    /// First gesture that matches the `input`.
    pub fn find_match(&self, target: ElementId, input: &InputRecord) -> Option<&Arc<dyn InputGesture>> {
        self.items.iter().find(|g| g.matches(target, input))
    }
}

/// Input bindings of an element or class.
pub type InputBindingCollection = BindingList<InputBinding>;
impl BindingList<InputBinding> {
    /// First binding with a gesture that matches the `input`.
    pub fn find_match(&self, target: ElementId, input: &InputRecord) -> Option<&Arc<InputBinding>> {
        self.items.iter().find(|b| b.gesture().matches(target, input))
    }
}

/// Command bindings of an element or class.
pub type CommandBindingCollection = BindingList<CommandBinding>;
impl BindingList<CommandBinding> {
    /// Next binding for the `command`, starting from `cursor`.
    ///
    /// On match the `cursor` is advanced past the returned binding, so calling again finds the next binding for the
    /// same command.
    pub fn find_match(&self, command: &Command, cursor: &mut usize) -> Option<&Arc<CommandBinding>> {
        while let Some(b) = self.items.get(*cursor) {
            *cursor += 1;
            if b.command() == command {
                return Some(b);
            }
        }
        None
    }

    /// First binding of a command that has a gesture that matches the `input`.
    pub fn find_match_input(&self, target: ElementId, input: &InputRecord) -> Option<&Arc<CommandBinding>> {
        self.items.iter().find(|b| b.command().gestures_match(target, input))
    }
}
