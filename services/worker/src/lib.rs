//! Oral-Exam Feedback Worker
//!
//! The caller side of the feedback pipeline: configuration, session storage,
//! the lifecycle service and the background queue that grades completed
//! sessions. The `oralexam` binary is a thin CLI over this library.

pub mod analyze;
pub mod config;
pub mod db;
pub mod jobs;
pub mod models;
pub mod prompts;
pub mod sessions;
pub mod state;
pub mod store;

#[cfg(test)]
mod test_support;
