//! Property-based tests for connroute.
//!
//! Run with: cargo test --test property_tests
//!
//! These tests use proptest to generate random candidate lists and
//! environments and verify that selection invariants hold.
