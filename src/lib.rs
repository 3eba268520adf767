pub mod aggregate;
pub mod clean;
pub mod config;
pub mod country;
pub mod error;
pub mod geo;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod stats;
pub mod unify;

pub use error::{PipelineError, Result};
