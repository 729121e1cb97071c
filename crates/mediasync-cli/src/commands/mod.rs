pub mod clear;
pub mod config;
pub mod daemon;
pub mod sync;
