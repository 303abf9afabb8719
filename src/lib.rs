pub mod connector;
pub mod core;
pub mod pipeline;
pub mod sink;
pub mod source;

pub use crate::connector::*;
pub use crate::core::*;
pub use crate::pipeline::{Pipeline, PipelineSummary};
