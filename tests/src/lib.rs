//! # Agent Mesh Test Suite
//!
//! Cross-crate integration scenarios exercising the full delivery pipeline:
//! signing, registry, routing, persisted-queue fallback, and
//! request/response correlation.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── delivery.rs          # End-to-end send/subscribe flows
//!     ├── request_response.rs  # Correlation, timeout, late responses
//!     └── shared_queue.rs      # Two buses over one queue directory
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p mesh-tests
//! cargo test -p mesh-tests integration::delivery::
//! ```

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
