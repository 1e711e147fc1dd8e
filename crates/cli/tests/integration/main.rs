//! CLI integration tests for microfunc.

mod build_tests;
mod cache_tests;
mod common;
mod plan_tests;
mod status_tests;
