//! Bulk DSV transfer between streams and tables.
//!
//! - [`dsv`]: streaming record reader and field encoder
//! - [`import`]: chunked, transactional import pipeline
//! - [`export`]: row-at-a-time export of query results
//! - [`sanitize`]: value rewriting applied before INSERT compilation

pub mod dsv;
pub mod export;
pub mod import;
pub mod sanitize;

pub use dsv::{DsvReader, SEPARATORS};
pub use export::{export, export_query, write_to, ExportOptions};
pub use import::{
    BulkImportPipeline, ImportOptions, ImportOutcome, ImportStatus, DEFAULT_CHUNK_SIZE,
    MAX_CHUNK_SIZE,
};
pub use sanitize::{QuoteDoubling, ValueSanitizer};
