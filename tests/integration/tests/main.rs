//! End-to-End Integration Tests
//!
//! These tests drive the binding engine through complete flows: a peer
//! produces traffic, the proxy receives, verifies and sends it on.

mod common;
mod internal_flows;
mod post_flows;
mod redirect_flows;
