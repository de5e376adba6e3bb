pub mod api;
pub mod app;
pub mod callcontrol;
pub mod cli;
pub mod config;
pub mod db;
pub mod global;
pub mod jobs;
pub mod lifecycle;
pub mod pipeline;
pub mod summarize;
pub mod webhook;
