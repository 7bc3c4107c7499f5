//! Testing utilities and mock implementations
//!
//! Mocks for the transport, clock, frame source and command seams, so the
//! station can be exercised without a server, a camera or real time.

pub mod mocks;

pub use mocks::*;
