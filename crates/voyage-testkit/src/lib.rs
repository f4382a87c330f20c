//! Canned steps and an in-memory journal for exercising the engine
//! without a database.

pub mod factory;
pub mod memory_journal;
pub mod steps;

pub use factory::{FnFactory, SingleClassFactory};
pub use memory_journal::MemoryJournal;
pub use steps::{
    AlwaysFailFatal, AlwaysFailUndo, FailNTimesThenSucceed, Noop, ReadWorkingValue,
    RecordingUndo, StopOnce, WaitOnce, WriteWorkingValue,
};
