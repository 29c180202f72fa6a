//! proctor-core — exam data model, runner engine, and grading parser.
//!
//! This crate defines the fundamental types, the model-adapter trait, the
//! sequential exam runner, and the tolerant grading parser that the entire
//! proctor system builds on.

pub mod engine;
pub mod error;
pub mod grading;
pub mod model;
pub mod parser;
pub mod record;
pub mod traits;
