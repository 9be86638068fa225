//! Report job records: status state machine, record type and store.

pub mod record;
pub mod status;
pub mod store;

pub use record::JobRecord;
pub use status::{JobStatus, TransitionError};
pub use store::{JobStore, StoreError};
