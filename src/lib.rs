//! iterdns
//!
//! An iterative DNS resolver. Queries are sent without the recursion desired
//! bit, starting at the root servers and following referrals, glue and
//! aliases until the authoritative answer for a name is found.
//!
//! Everything lives in the `dns` module:
//! * `dns::protocol` builds queries and decodes responses
//! * `dns::resolve` performs the walk

/// DNS protocol handling and iterative resolution
pub mod dns;
