pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod source;

pub use error::{CdcStreamError, Result};
