pub mod config;
pub mod data;
pub mod dataset;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod extract;
pub mod model;
pub mod providers;
pub mod report;
