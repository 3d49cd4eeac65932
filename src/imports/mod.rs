//! SFTP placement-file ingestion: CSV parsing and batch import

pub mod importer;
pub mod parser;

pub use importer::BatchImporter;
pub use parser::{parse_placement_csv, ImportRecord, ParseOutcome, ParsedRow, RowError};
