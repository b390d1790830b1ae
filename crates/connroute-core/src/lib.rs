//! Core infrastructure for connroute.
//!
//! This crate provides functionality shared by the resolver crates:
//! - Event system for observability
//! - The boxed error alias used at client-library seams

pub mod events;

pub use events::{BoxedEventListener, EventListener, EventListeners, FnListener, RouterEvent};

/// Type-erased error returned by connection factories and remote stores.
///
/// Errors crossing a factory boundary are kept in this form so callers can
/// `downcast_ref` to the concrete client library error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
