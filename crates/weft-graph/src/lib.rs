pub mod error;
pub mod manager;
pub mod types;

pub use error::GraphError;
pub use manager::{normalize_term, GraphStore};
pub use types::{Keyword, KeywordWithSubjects, Subject, TimeRange, TIME_RANGE_MERGE_WINDOW_MS};
