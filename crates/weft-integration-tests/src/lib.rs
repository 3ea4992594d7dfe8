//! Integration test crate for the Weft router.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise end-to-end routing flows across multiple workspace
//! crates, with several in-process routers wired together through
//! in-memory sinks and a hand-advanced clock. No sockets are involved.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p weft-integration-tests
//! ```
