//! # Courier Test Suite
//!
//! Cross-crate tests that drive the whole stack: messaging container,
//! resource factory, typed endpoints, and the in-memory broker.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs     # Event types, failing broker wrapper
//!     ├── pubsub.rs       # Typed publish/subscribe flows
//!     └── lifecycle.rs    # Boot, teardown, aggregated close failures
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p courier-tests
//! cargo test -p courier-tests integration::lifecycle
//! ```

#![allow(dead_code)]

pub mod integration;
