//! Core infrastructure for keywork.
//!
//! This crate provides shared functionality used across all keywork modules:
//! - Event system for observability
//! - Monotonic clock wrapper
//! - Trace id generation for per-instance bookkeeping
//! - The priority admission queue shared by both task managers

pub mod admission;
pub mod clock;
pub mod events;
pub mod trace;

pub use admission::{Admitted, AdmissionPolicy, AdmissionQueue};
pub use clock::Clock;
pub use events::{CoordinationEvent, EventListener, EventListeners, FnListener};
pub use trace::TraceIdFactory;
