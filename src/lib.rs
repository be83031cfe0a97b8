pub mod analysis;
pub mod args;
pub mod attempts;
pub mod config;
pub mod logging;
pub mod recommend;
pub mod report;
pub mod scoring;
