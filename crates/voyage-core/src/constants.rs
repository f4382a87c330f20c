//! Small shared constants.

/// Progress meter names beginning with this prefix are reserved for the
/// engine itself and rejected with `Error::InvalidMeterName`.
pub const RESERVED_METER_PREFIX: &str = "ENGINE_RESERVED_";

/// Current wire-format version for queue `Ready` messages.
pub const READY_MESSAGE_VERSION: u32 = 1;

/// Default worker pool size when `max_parallel` is unset or invalid (<= 0).
pub const DEFAULT_MAX_PARALLEL: usize = 20;

/// Default local backlog size; must be at least 1.
pub const DEFAULT_MAX_QUEUED: usize = 1;
