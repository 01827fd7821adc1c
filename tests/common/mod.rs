//! Shared test utilities
//!
//! Provides a fake live API (`fake_api`) standing in for the external
//! system: a module with functions, a class, raising calls and
//! callback-taking calls, plus a loader resolving it by name.

pub mod fake_api;
