//! Stickerpress - batch conversion of video clips into looping WebM stickers.
//!
//! This library crate exposes the conversion pipeline for integration testing.

pub mod batch;
pub mod config;
pub mod encoder;
pub mod error;
pub mod planner;
pub mod probe;
pub mod prompt;
pub mod runner;
