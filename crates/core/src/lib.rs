//! `lockgate-core`: shared primitives for the auth workspace.
//!
//! Addresses, identifiers, hashing and the clock abstraction. No I/O.

pub mod address;
pub mod clock;
pub mod error;
pub mod hash;
pub mod id;

pub use address::Address;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ValidationError, ValidationResult};
pub use hash::{keccak256, keccak256_concat};
pub use id::{ApplicationId, ChainNetwork, TokenId};
