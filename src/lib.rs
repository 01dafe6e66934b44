pub mod config;
pub mod console;
pub mod data;
pub mod error;
pub mod generate;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod ranking;
pub mod report;
pub mod signals;
pub mod validation;
