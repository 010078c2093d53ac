// Social analytics: cohort likes and music-streaming aggregation
//
// This is the library root. Each module corresponds to one stage or
// collaborator of the batch job.

pub mod aggregate;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod lenient;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod source;
