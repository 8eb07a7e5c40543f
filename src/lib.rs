pub mod analytics;
pub mod common;
pub mod config;
pub mod event;
pub mod ledger;
pub mod matcher;
pub mod model;
pub mod pipeline;
pub mod reporter;
pub mod trigger;
pub mod upload;
