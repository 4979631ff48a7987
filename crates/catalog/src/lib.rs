pub mod book;
pub mod client;
pub mod metadata;
pub mod text;

pub use book::{Book, BookId, BookMetadata, InvalidBookId};
pub use client::{GutenbergClient, DEFAULT_BASE_URL};
pub use metadata::parse_metadata;
pub use text::extract_body;
