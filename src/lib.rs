#![forbid(unsafe_code)]

pub mod batch;
pub mod capture;
pub mod cleanup;
pub mod cli;
pub mod command_capture;
pub mod config;
pub mod download;
pub mod error;
pub mod formats;
pub mod layout;
pub mod logging;
pub mod manifest;
pub mod merge;
pub mod pdf;
pub mod reconcile;
pub mod retry;
pub mod segment;
