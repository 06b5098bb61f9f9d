//! Foundation crate for the gphotos-sync fleet: the error taxonomy, the explicit
//! configuration record, bounded-time process execution, and tracing setup.

pub mod command_stream;
pub mod config;
pub mod error;
pub mod tracing_init;

pub use config::FleetConfig;
pub use error::{ErrorKind, FleetError, Result};
