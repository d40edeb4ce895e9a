use std::{collections::HashMap, fmt, hash::Hash, sync::Arc};

use parking_lot::Mutex;

/// <span data-del-macro-root></span> Declares [`ElementClass`] statics.
///
/// # Examples
///
/// ```
/// use zero_ui_command::element_class;
///
/// element_class! {
///     /// Base of all controls.
///     pub static CONTROL;
///     /// Text input control.
///     pub static TEXT_BOX: CONTROL;
/// }
///
/// assert!(TEXT_BOX.is_subclass_of(&CONTROL));
/// ```
#[macro_export]
macro_rules! element_class {
    ($(
        $(#[$attr:meta])*
        $vis:vis static $CLASS:ident $(: $BASE:path)?;
    )+) => {
        $(
            $(#[$attr])*
            $vis static $CLASS: $crate::ElementClass = $crate::ElementClass::new(
                std::stringify!($CLASS),
                $crate::__element_class_base!($($BASE)?),
            );
        )+
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __element_class_base {
    () => {
        None
    };
    ($BASE:path) => {
        Some(&$BASE)
    };
}

/// Runtime class of an element.
///
/// Classes form a single inheritance chain, class bindings registered for a class apply to all elements of
/// that class and of derived classes. Classes are identified by address, declare them as statics using [`element_class!`].
///
/// [`element_class!`]: crate::element_class!
pub struct ElementClass {
    name: &'static str,
    base: Option<&'static ElementClass>,
}
impl ElementClass {
    #[doc(hidden)]
    pub const fn new(name: &'static str, base: Option<&'static ElementClass>) -> Self {
        ElementClass { name, base }
    }

    /// Class name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Base class.
    pub fn base(&self) -> Option<&'static ElementClass> {
        self.base
    }

    /// Unique identity of the class.
    pub fn id(&self) -> ClassId {
        ClassId(self as *const ElementClass as usize)
    }

    /// Iterate over `self` and each base class, most derived first.
    pub fn ancestors(&'static self) -> impl Iterator<Item = &'static ElementClass> {
        std::iter::successors(Some(self), |c| c.base)
    }

    /// If `self` is `class` or derives from it.
    pub fn is_subclass_of(&'static self, class: &ElementClass) -> bool {
        self.ancestors().any(|c| c == class)
    }
}
impl PartialEq for ElementClass {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}
impl Eq for ElementClass {}
impl Hash for ElementClass {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state)
    }
}
impl fmt::Debug for ElementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(b) = self.base {
            write!(f, ": {b:?}")?;
        }
        Ok(())
    }
}

/// Identity of an [`ElementClass`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClassId(usize);

/// Bindings of one class level found by [`ClassRegistry::lookup`].
pub struct ClassLevel<B> {
    /// The class.
    pub class: &'static ElementClass,
    /// Bindings registered for the class, in registration order.
    pub bindings: Vec<Arc<B>>,
}
impl<B> fmt::Debug for ClassLevel<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassLevel")
            .field("class", &self.class.name)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

/// Class bindings table.
///
/// Bindings are append-only, registering is rare and serialized by one lock for the whole table. Lookups copy the
/// bindings out of the lock, no binding code runs while the table is locked.
pub struct ClassRegistry<B> {
    table: Mutex<HashMap<ClassId, Vec<Arc<B>>>>,
}
impl<B> Default for ClassRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}
impl<B> ClassRegistry<B> {
    /// New empty registry.
    pub fn new() -> Self {
        ClassRegistry {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Append a binding for the class.
    pub fn register(&self, class: &'static ElementClass, binding: impl Into<Arc<B>>) {
        self.table.lock().entry(class.id()).or_default().push(binding.into());
    }

    /// Bindings of `class` and each base class that has any, most derived first.
    pub fn lookup(&self, class: &'static ElementClass) -> Vec<ClassLevel<B>> {
        let table = self.table.lock();
        class
            .ancestors()
            .filter_map(|c| {
                table.get(&c.id()).map(|b| ClassLevel {
                    class: c,
                    bindings: b.clone(),
                })
            })
            .collect()
    }

    /// Bindings registered exactly for `class`.
    pub fn get(&self, class: &'static ElementClass) -> Vec<Arc<B>> {
        self.table.lock().get(&class.id()).cloned().unwrap_or_default()
    }

    /// Number of classes with bindings.
    pub fn class_count(&self) -> usize {
        self.table.lock().len()
    }
}
impl<B> fmt::Debug for ClassRegistry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("binding", &pretty_type_name::pretty_type_name::<B>())
            .field("classes", &self.class_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    element_class! {
        static BASE;
        static MIDDLE: BASE;
        static LEAF: MIDDLE;
    }

    #[test]
    fn ancestors() {
        let names: Vec<_> = LEAF.ancestors().map(|c| c.name()).collect();
        assert_eq!(names, vec!["LEAF", "MIDDLE", "BASE"]);
        assert!(LEAF.is_subclass_of(&BASE));
        assert!(!BASE.is_subclass_of(&LEAF));
        assert_eq!(format!("{LEAF:?}"), "LEAF: MIDDLE: BASE");
    }

    #[test]
    fn lookup_walks_bases() {
        let registry = ClassRegistry::<&'static str>::new();
        registry.register(&BASE, "base-1");
        registry.register(&LEAF, "leaf-1");
        registry.register(&BASE, "base-2");

        let levels = registry.lookup(&LEAF);
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].class, &LEAF);
        assert_eq!(*levels[0].bindings[0], "leaf-1");
        assert_eq!(levels[1].class, &BASE);
        assert_eq!(levels[1].bindings.iter().map(|b| **b).collect::<Vec<_>>(), vec!["base-1", "base-2"]);

        assert!(registry.lookup(&MIDDLE).iter().all(|l| l.class == &BASE));
    }

    #[test]
    fn concurrent_register() {
        let registry = Arc::new(ClassRegistry::<usize>::new());
        let threads: Vec<_> = (0..4)
            .map(|i| {
                let r = registry.clone();
                std::thread::spawn(move || {
                    for n in 0..100 {
                        r.register(if i % 2 == 0 { &LEAF } else { &BASE }, n);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(registry.get(&LEAF).len(), 200);
        assert_eq!(registry.get(&BASE).len(), 200);
    }
}
