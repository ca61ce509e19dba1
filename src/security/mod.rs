//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Credential required:
//!     → brute_force.rs (is the client IP blocked?)
//!     → authentication
//!     → brute_force.rs (record failure, detect the blocking one)
//! ```
//!
//! # Design Decisions
//! - Blocked clients are rejected before their credentials are verified
//! - State is process-local and rebuilt from nothing on restart

pub mod brute_force;

pub use brute_force::BruteForceTracker;
