//! Inference jobs: payload validation and sandboxed execution

mod input;
mod runner;

pub use input::{InferenceJob, JobRequest};
pub use runner::{Frame, JobRunner};

#[cfg(test)]
pub(crate) use input::fixtures;
