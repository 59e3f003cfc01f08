pub mod aggregator;
pub mod alert;
pub mod case;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod features;
pub mod history;
pub mod rng;
pub mod rules;
pub mod stats;
pub mod store;
pub mod transaction;
pub mod types;
pub mod workload;
