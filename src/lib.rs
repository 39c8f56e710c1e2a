//! chart-sync library - track normalization and chart-to-playlist reconciliation.

pub mod catalog;
pub mod config;
pub mod error;
pub mod matching;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod reconcile;
pub mod services;
pub mod sqlite;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
