//! Structured logging for the bridge.
//!
//! Console and rolling-file output, secret redaction, and the relay audit trail.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{EventLogger, RelayEvent, RelayEventEntry};
pub use logger::{init_logger, LoggerOptions};
pub use redact::{redact_sensitive_data, truncate_for_log};
