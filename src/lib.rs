//! Integration-test package for the keywork workspace.
//!
//! Nothing lives here; the component and property suites are under
//! `tests/`. See the workspace README for the crate map.
