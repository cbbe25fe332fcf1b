//! File adapters: extract, snapshot and history readers, target loader,
//! report sink
//!
//! Everything here speaks CSV. Readers never fail on bad rows; they return
//! the rows they could use together with [`Diagnostic`](os_monitor_types::Diagnostic)s
//! for the rest.

pub mod batch_reader;
pub mod csv_sink;
pub mod history_file;
pub mod schema;
pub mod snapshot;
pub mod targets_file;

pub use batch_reader::{load_batches, parse_batch, read_batch_file, reference_date_from_name};
pub use csv_sink::{CsvDirectorySink, ReportSink};
pub use history_file::{parse_history, read_history};
pub use snapshot::{parse_snapshot, read_snapshot};
pub use targets_file::load_targets;
