//! Property tests, one module per component.

mod admission;
mod cache;
