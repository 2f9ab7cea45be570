//! Keyboard and pointer activity tracker.
//! A daemon attributes every keystroke and click to the foreground application and keeps them in
//! an append-only log. The cli reconstructs what was typed during a day, shows statistics and
//! summarizes the text into a tree of concepts.
//!

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod fs;
pub mod generate;
pub mod hierarchy;
pub mod keys;
pub mod reconstruct;
pub mod utils;
pub mod window_api;
