//! Data types exchanged with the chat API.

mod api_error;
mod record;

pub use api_error::{is_record_not_found, ApiErrorBody};
pub use record::{ActOutcome, Operation, Record, RecordKind};
