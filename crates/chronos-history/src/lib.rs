//! Temporal analysis of git history: churn, co-change, and team distance.
//!
//! Mines the commit log once and derives three independent signal sets
//! from it: per-file churn series with a trajectory classification, a
//! decay-weighted co-change matrix, and author-distribution distances
//! between files. When history is missing or too short, every output is a
//! [`chronos_core::HistoryUnavailable`] reason instead of zeroed data.

pub mod analysis;
pub mod authorship;
pub mod cache;
pub mod churn;
pub mod cochange;
pub mod mining;
pub mod stats;
