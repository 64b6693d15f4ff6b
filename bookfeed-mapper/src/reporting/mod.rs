//! Event logging and reports
//!
//! - [`event_log`]: per-record structured event log with verbosity filtering
//! - [`session_log`]: JSON-lines persistence of retained events
//! - [`report`]: completeness reports and batch summaries
//! - [`html`]: self-contained HTML rendering of reports

pub mod event_log;
pub mod html;
pub mod report;
pub mod session_log;

pub use event_log::{EventKind, EventLog, LogEvent};
pub use report::{BatchSummary, CompletenessReport};
pub use session_log::SessionLogWriter;
