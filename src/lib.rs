//! OS Monitor - service-order status consolidation
//!
//! Consolidates periodic extracts of service orders ("OS") into a running
//! history: how many business days each order spent in each status, whether
//! its current status is over the target for that status, and which
//! locations, orders and statuses concentrate the delay.
//!
//! ## Architecture
//! Extracts -> [`io`] readers -> [`pipeline::consolidate`] -> [`io::ReportSink`]
//!
//! Inside the pipeline:
//! - [`history::HistoryStore`] applies batches in date order through the
//!   transition engine ([`history::apply_observation`])
//! - [`calendar`] counts business days
//! - [`targets::TargetTable`] resolves the target of each status
//! - [`report`] builds the consolidated table, history and rankings
//!
//! The consolidated table a run writes is the snapshot the next run resumes
//! from.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use os_monitor::config::MonitorConfig;
//! use os_monitor::io::CsvDirectorySink;
//! use os_monitor::runner::run;
//! use std::path::PathBuf;
//!
//! let config = MonitorConfig::load(None)?;
//! let mut sink = CsvDirectorySink::new(&config.output_dir);
//! let batches = vec![PathBuf::from("uploads/Base 04-03-2024.csv")];
//! let outcome = run(&config, &batches, &mut sink)?;
//! println!("{} entities", outcome.report.consolidated.len());
//! # Ok::<(), os_monitor::error::MonitorError>(())
//! ```

// Core error handling
pub mod error;

// Engine
pub mod calendar;
pub mod history;
pub mod pipeline;
pub mod report;
pub mod targets;

// Configuration and file adapters
pub mod config;
pub mod io;
pub mod runner;

pub use error::{MonitorError, MonitorResult};
pub use pipeline::{consolidate, ConsolidationInputs, ConsolidationOutcome, EngineOptions};

// Re-export the foundation types
pub use os_monitor_types::{
    ConsolidatedRow, Diagnostic, DiagnosticKind, EntityId, Observation, ObservationAttributes,
    ObservationBatch, SnapshotEntry, StatusInterval, StatusLabel,
};
