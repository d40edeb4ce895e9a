use std::fmt;

use crate::ElementId;

/// Programming errors reported by command registries and the dispatcher.
///
/// Unresolved commands are not errors, a command without binding just does not execute.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CommandError {
    /// Command created with an empty name.
    EmptyName,
    /// Command id is not in the owner library.
    IdOutOfRange {
        /// Library owner tag.
        owner: &'static str,
        /// Requested id.
        id: usize,
        /// Number of commands in the library.
        len: usize,
    },
    /// Element is not in the tree or has no class.
    ElementNotFound(ElementId),
    /// Collection is sealed.
    ReadOnly,
    /// Index is not in the collection.
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Collection length.
        len: usize,
    },
    /// Thread-affine resource requested from another thread.
    WrongThread,
}
impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::EmptyName => write!(f, "command name cannot be empty"),
            CommandError::IdOutOfRange { owner, id, len } => {
                write!(f, "command id `{id}` out of range for `{owner}`, only has {len} commands")
            }
            CommandError::ElementNotFound(id) => write!(f, "element `{id}` not found in the tree"),
            CommandError::ReadOnly => write!(f, "cannot modify sealed collection"),
            CommandError::IndexOutOfBounds { index, len } => write!(f, "index `{index}` out of bounds, len is {len}"),
            CommandError::WrongThread => write!(f, "cannot access thread-affine resource from another thread"),
        }
    }
}
impl std::error::Error for CommandError {}
