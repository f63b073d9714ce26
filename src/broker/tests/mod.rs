//! Tests for the in-process broker
//!
//! Organised by the behaviour under test: point-to-point delivery,
//! publish/subscribe fan-out and session settlement.
