//! Integration tests for trailguard
//!
//! Drive the public engine API end to end with the simulation gateway and
//! the in-memory store.

mod common;
mod concurrency_test;
mod config_test;
mod lifecycle_test;
mod persistence_test;
mod scenarios_test;
