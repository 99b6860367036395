//! # graphetl
//!
//! Command line front end for [`graphetl_core`]: configuration, record
//! files, sample data, the external analytics process and the CLI itself.
//! All file and process I/O lives here; the core only sees parsed records.

pub mod cli;
pub mod config;
pub mod process;
pub mod records;
pub mod sample;
