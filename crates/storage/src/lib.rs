pub mod schema;
pub mod store;

pub use store::{BookStore, BookSummary, NewAnalysis, StoredAnalysis};
