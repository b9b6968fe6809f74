//! Property-based tests for delivery guarantees
