pub mod checkpoint;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod io;
pub mod kind;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod record_store;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;
