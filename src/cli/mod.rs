//! Terminal front end: argument-level parsing helpers and table rendering

pub mod refresh;
pub mod reward;
pub mod setup;
pub mod ui;
pub mod views;
