//! `fx-bands` library crate.
//!
//! The binary (`bands`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the projector is reusable without the fetch layer or the TUI

pub mod app;
pub mod bands;
pub mod cli;
pub mod data;
pub mod debug;
pub mod domain;
pub mod error;
pub mod io;
pub mod plot;
pub mod report;
pub mod tui;
