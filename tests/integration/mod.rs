//! Integration tests for the record/replay core
//!
//! These tests drive full record → serialize → replay round trips against a
//! fake live API.

#[path = "../common/mod.rs"]
pub mod common;

pub mod matching_quality;
