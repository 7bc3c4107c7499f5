//! Wire protocol for the station link
//!
//! JSON envelopes exchanged over the channel and the endpoint candidates
//! the channel is opened against.

pub mod endpoints;
pub mod messages;

pub use endpoints::*;
pub use messages::*;
