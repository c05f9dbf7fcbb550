//! # Request Bridge Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs         # request/response scenarios over the bus
//!     ├── concurrency.rs   # cross-talk, single subscription, fixed-key mode
//!     └── http_e2e.rs      # real listener, real HTTP client
//!
//! tests/benches/
//! └── correlator_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bridge-tests
//! cargo test -p bridge-tests integration::concurrency
//! cargo bench -p bridge-tests
//! ```
