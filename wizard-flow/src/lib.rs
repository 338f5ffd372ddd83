pub mod error;
pub mod flow;
pub mod runner;
pub mod storage;

// Re-export commonly used types
pub use error::{FlowError, StorageError};
pub use flow::{Transition, Workflow};
pub use runner::{FlowRunner, Outcome};
pub use storage::{InMemorySessionStorage, Session, SessionStorage};
