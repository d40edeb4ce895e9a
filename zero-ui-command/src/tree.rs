use std::fmt;

use zng_unique_id::unique_id_64;

use crate::{CommandBindingCollection, ElementClass, InputBindingCollection};

unique_id_64! {
    /// Unique identifier of an element in an [`ElementTree`].
    ///
    /// IDs are only unique for the same process.
    pub struct ElementId;
}
impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.debug_struct("ElementId")
                .field("id", &self.get())
                .field("sequential", &self.sequential())
                .finish()
        } else {
            write!(f, "ElementId(#{})", self.sequential())
        }
    }
}
impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.sequential())
    }
}

/// Element tree the commands route in.
///
/// The tree owns the per-element binding collections and tracks logical focus. Commands route from a target
/// element up to the root, the preview phase visits the route in reverse.
pub trait ElementTree {
    /// Class of the element, `None` if the element is not in the tree.
    fn class_of(&self, element: ElementId) -> Option<&'static ElementClass>;

    /// Parent element, `None` for the root.
    fn parent(&self, element: ElementId) -> Option<ElementId>;

    /// Input bindings declared on the element instance.
    fn input_bindings(&self, element: ElementId) -> Option<&InputBindingCollection>;

    /// Command bindings declared on the element instance.
    fn command_bindings(&self, element: ElementId) -> Option<&CommandBindingCollection>;

    /// If the element is a focus scope.
    fn is_focus_scope(&self, element: ElementId) -> bool;

    /// Element that has logical focus inside the focus `scope`.
    fn focused_element(&self, scope: ElementId) -> Option<ElementId>;

    /// Element that has keyboard focus.
    fn keyboard_focus(&self) -> Option<ElementId>;

    /// Focus scope of the element, the element itself if it is a scope.
    fn focus_scope(&self, element: ElementId) -> Option<ElementId> {
        let mut next = Some(element);
        while let Some(e) = next {
            if self.is_focus_scope(e) {
                return Some(e);
            }
            next = self.parent(e);
        }
        None
    }

    /// Focus scope that contains the `scope`.
    fn parent_scope(&self, scope: ElementId) -> Option<ElementId> {
        self.parent(scope).and_then(|p| self.focus_scope(p))
    }

    /// If `ancestor` is `element` or one of its ancestors.
    fn is_ancestor_of(&self, ancestor: ElementId, element: ElementId) -> bool {
        let mut next = Some(element);
        while let Some(e) = next {
            if e == ancestor {
                return true;
            }
            next = self.parent(e);
        }
        false
    }

    /// Elements from `target` to the root.
    fn route(&self, target: ElementId) -> Vec<ElementId> {
        let mut r = vec![target];
        while let Some(p) = r.last().and_then(|e| self.parent(*e)) {
            r.push(p);
        }
        r
    }
}

#[cfg(any(test, feature = "test_util"))]
pub use test_tree::TestTree;

#[cfg(any(test, feature = "test_util"))]
mod test_tree {
    use zng_unique_id::IdMap;

    use crate::{CommandBindingCollection, CommandError, ElementClass, InputBindingCollection};

    use super::{ElementId, ElementTree};

    struct TestNode {
        class: &'static ElementClass,
        parent: Option<ElementId>,
        input_bindings: InputBindingCollection,
        command_bindings: CommandBindingCollection,
        is_focus_scope: bool,
        focused: Option<ElementId>,
    }

    /// Simple [`ElementTree`] for tests.
    #[derive(Default)]
    pub struct TestTree {
        nodes: IdMap<ElementId, TestNode>,
        keyboard_focus: Option<ElementId>,
    }
    impl TestTree {
        /// New empty tree.
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a root element.
        pub fn add_root(&mut self, class: &'static ElementClass) -> ElementId {
            self.insert(None, class)
        }

        /// Add a child element.
        pub fn add_child(&mut self, parent: ElementId, class: &'static ElementClass) -> Result<ElementId, CommandError> {
            if !self.nodes.contains_key(&parent) {
                return Err(CommandError::ElementNotFound(parent));
            }
            Ok(self.insert(Some(parent), class))
        }

        fn insert(&mut self, parent: Option<ElementId>, class: &'static ElementClass) -> ElementId {
            let id = ElementId::new_unique();
            self.nodes.insert(
                id,
                TestNode {
                    class,
                    parent,
                    input_bindings: InputBindingCollection::new(),
                    command_bindings: CommandBindingCollection::new(),
                    is_focus_scope: false,
                    focused: None,
                },
            );
            id
        }

        fn node_mut(&mut self, id: ElementId) -> Result<&mut TestNode, CommandError> {
            self.nodes.get_mut(&id).ok_or(CommandError::ElementNotFound(id))
        }

        /// Instance input bindings of the element.
        pub fn input_bindings_mut(&mut self, id: ElementId) -> Result<&mut InputBindingCollection, CommandError> {
            self.node_mut(id).map(|n| &mut n.input_bindings)
        }

        /// Instance command bindings of the element.
        pub fn command_bindings_mut(&mut self, id: ElementId) -> Result<&mut CommandBindingCollection, CommandError> {
            self.node_mut(id).map(|n| &mut n.command_bindings)
        }

        /// Set if the element is a focus scope.
        pub fn set_focus_scope(&mut self, id: ElementId, is_scope: bool) -> Result<(), CommandError> {
            self.node_mut(id).map(|n| n.is_focus_scope = is_scope)
        }

        /// Set the logical focus inside the `scope`.
        pub fn set_focused_element(&mut self, scope: ElementId, focused: Option<ElementId>) -> Result<(), CommandError> {
            self.node_mut(scope).map(|n| n.focused = focused)
        }

        /// Set the keyboard focus.
        pub fn set_keyboard_focus(&mut self, focus: Option<ElementId>) {
            self.keyboard_focus = focus;
        }
    }
    impl ElementTree for TestTree {
        fn class_of(&self, element: ElementId) -> Option<&'static ElementClass> {
            self.nodes.get(&element).map(|n| n.class)
        }

        fn parent(&self, element: ElementId) -> Option<ElementId> {
            self.nodes.get(&element).and_then(|n| n.parent)
        }

        fn input_bindings(&self, element: ElementId) -> Option<&InputBindingCollection> {
            self.nodes.get(&element).map(|n| &n.input_bindings)
        }

        fn command_bindings(&self, element: ElementId) -> Option<&CommandBindingCollection> {
            self.nodes.get(&element).map(|n| &n.command_bindings)
        }

        fn is_focus_scope(&self, element: ElementId) -> bool {
            self.nodes.get(&element).map(|n| n.is_focus_scope).unwrap_or(false)
        }

        fn focused_element(&self, scope: ElementId) -> Option<ElementId> {
            self.nodes.get(&scope).and_then(|n| n.focused)
        }

        fn keyboard_focus(&self) -> Option<ElementId> {
            self.keyboard_focus
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{element_class, CommandError};

    element_class! {
        static PANEL;
    }

    #[test]
    fn route_and_scopes() {
        let mut tree = TestTree::new();
        let root = tree.add_root(&PANEL);
        let scope = tree.add_child(root, &PANEL).unwrap();
        let leaf = tree.add_child(scope, &PANEL).unwrap();
        tree.set_focus_scope(root, true).unwrap();
        tree.set_focus_scope(scope, true).unwrap();

        assert_eq!(tree.route(leaf), vec![leaf, scope, root]);
        assert_eq!(tree.focus_scope(leaf), Some(scope));
        assert_eq!(tree.parent_scope(scope), Some(root));
        assert!(tree.is_ancestor_of(scope, leaf));
        assert!(!tree.is_ancestor_of(leaf, scope));
    }

    #[test]
    fn unique_ids() {
        let mut tree = TestTree::new();
        let a = tree.add_root(&PANEL);
        let b = tree.add_root(&PANEL);
        assert_ne!(a, b);
        assert_ne!(a.get(), b.get());

        let set: zng_unique_id::IdSet<ElementId> = [a, b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(tree.class_of(b).is_some());
    }

    #[test]
    fn unknown_parent() {
        let mut tree = TestTree::new();
        let orphan = ElementId::new_unique();
        assert_eq!(tree.add_child(orphan, &PANEL), Err(CommandError::ElementNotFound(orphan)));
    }
}
