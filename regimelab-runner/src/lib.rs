//! RegimeLab Runner — orchestration, statistics, and artifact export.
//!
//! Sits on top of `regimelab-core`: loads CSV bar data, prepares the trend
//! series per strategy policy, drives the engine across the configured
//! universe (rayon-parallel for independent portfolios), reduces results
//! into summaries and regime-conditioned tables, and writes the CSV
//! artifact set per symbol.

pub mod config;
pub mod data_loader;
pub mod decile;
pub mod export;
pub mod metrics;
pub mod regime_stats;
pub mod runner;
