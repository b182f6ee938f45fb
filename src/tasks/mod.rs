//! Versioned task definitions.
//!
//! Tasks are declared idempotently through [`TaskDeclaration::ensure`]; every
//! real change to a task's definition is kept as a new [`Content`] version so
//! past runs can always be traced to what actually ran.

pub mod declare;
pub mod model;
pub mod store;

pub use declare::TaskDeclaration;
pub use model::{Content, Task, Trigger};
pub use store::{StoreState, TaskStore};
