//! Canonical representations shared by the kernels.
//!
//! - [`ClassTree`]: the class hierarchy (read-only during all passes)
//! - [`PathRecorder`]: decisions recorded by a forward pass, consumed by both
//!   backward passes

pub mod path;
pub mod tree;

pub use path::{PathError, PathRecorder};
pub use tree::{Ancestors, Branch, ClassTree, ParentLink, SignedTree, TreeValidationError};
