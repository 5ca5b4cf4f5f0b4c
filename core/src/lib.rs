//! fraudscore-core: per-card transaction fraud scoring.
//!
//! A hidden Markov model over each card's spending history, fused with an
//! external gradient-boosted classifier. See `engine` for the pipeline.

pub mod account;
pub mod account_lock;
pub mod classifier;
pub mod clustering;
pub mod config;
pub mod encoder;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod event;
pub mod features;
pub mod hmm;
pub mod ip_reputation;
pub mod pipeline;
pub mod rng;
pub mod store;
pub mod transaction;
pub mod types;
