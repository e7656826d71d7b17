//! Pipeline stages and orchestration for svcaudit.
//!
//! The audit is a one-shot batch pipeline over `AccountRecord`s:
//! collector → transformer → enricher → checker, each stage fully
//! materializing its output before the next begins.

pub mod checker;
pub mod collector;
pub mod enricher;
pub mod notify;
pub mod pipeline;
pub mod transformer;
