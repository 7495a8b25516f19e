pub mod alert_subsystem;
pub mod baseline_subsystem;
pub mod case_subsystem;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod graph;
pub mod name_generator;
pub mod news;
pub mod population_subsystem;
pub mod projection;
pub mod registry;
pub mod report;
pub mod rng;
pub mod rules;
pub mod signal;
pub mod signal_subsystem;
pub mod store;
pub mod transaction;
pub mod types;
pub mod typology_subsystem;
