//! Iterative DNS resolution
//!
//! # Module Structure
//!
//! * `buffer` - Low-level packet buffer operations and name compression
//! * `protocol` - DNS message types, query encoding and response decoding
//! * `client` - UDP transport for outgoing queries
//! * `validate` - Matching responses to the queries they answer
//! * `hostname` - Host name grammar for user input
//! * `context` - Resolver configuration and shared state
//! * `resolve` - The referral walk from the root servers down

/// Low-level buffer operations for DNS packet handling
pub mod buffer;

/// DNS client for making outgoing queries
pub mod client;

/// Resolver configuration and shared context
pub mod context;

/// Host name validation
pub mod hostname;

/// DNS protocol definitions and packet structures
pub mod protocol;

/// Iterative resolution
pub mod resolve;

/// Response validation
pub mod validate;
