// Test Helpers Module - Testing Infrastructure
//
// An in-memory SQL execution layer plus a shared fixture schema, used by the
// inline unit tests and the integration tests under tests/.

pub mod fixtures;
pub mod in_memory;

pub use fixtures::RecordingHooks;
pub use in_memory::{ExecutedStatement, InMemoryDatabase, StatementKind};
