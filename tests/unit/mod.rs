//! Unit tests for individual components

mod error_test;
mod config_test;
mod worker_pool_types_test;
