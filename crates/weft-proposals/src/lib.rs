pub mod error;
pub mod manager;
pub mod types;

pub use error::ProposalError;
pub use manager::ProposalEngine;
pub use types::{JournalEntry, Proposal, SharePayload};
