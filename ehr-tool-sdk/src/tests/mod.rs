//! Unit tests for the EHR Tool SDK
//!
//! This module contains tests for various components of the SDK.

pub mod support;

pub mod session_tests;
pub mod token_cache_tests;
