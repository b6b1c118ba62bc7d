//! `reliefq-core`: job model building blocks.
//!
//! This crate contains **pure** types (no queue or transport concerns): the
//! job record, its identifiers and the domain error model.

pub mod error;
pub mod id;
pub mod job;

pub use error::DomainError;
pub use id::{JobId, JobType};
pub use job::{Job, JobStatus};
