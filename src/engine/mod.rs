//! The Store Controller and the machinery it persists through.
pub mod controller;
pub(crate) mod queue;
pub mod session;

pub use controller::{Backends, ControllerOptions, FetchSummary, PublishOutcome, StoreController};
pub use session::{LoadTicket, SelectionKind, SessionPhase};
