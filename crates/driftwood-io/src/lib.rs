//! File I/O for the driftwood pipeline: CSV example streams, label
//! encoding and JSON report artifacts.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::{LabelEncoder, PrequentialReport, Record, Task};
pub use error::IoError;
pub use reader::CsvStream;
pub use writer::ReportWriter;
