//! Work Queue Adapter: abstracts over whatever cluster message queue
//! actually delivers `Ready{op_id}` messages at least once.

pub mod local;
pub mod message;
pub mod pg_queue;
pub mod work_queue;

pub use local::LocalWorkQueue;
pub use message::ReadyMessage;
pub use pg_queue::PgWorkQueue;
pub use work_queue::{DispatchHandler, WorkQueue};
