// Pomodoro ritual bot - core library
//
// A chat bot that walks one user through a planning ritual, times a focused work
// interval, and collects a reflection before filing the finished session.
//
// The session state machine lives in domains/pomodoro; infrastructure behind Base*
// traits lives in kernel.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
