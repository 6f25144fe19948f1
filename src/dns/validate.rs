//! checks that a decoded message really answers the query we sent

use derive_more::{Display, Error};

use crate::dns::protocol::{DnsHeader, ResultCode};

#[derive(Debug, Display, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[display(fmt = "transaction id mismatch (expected {}, got {})", expected, actual)]
    TransactionMismatch { expected: u16, actual: u16 },
    #[display(fmt = "message {} is not a response", id)]
    NotAResponse { id: u16 },
}

/// Checks `header` against the id of the outstanding query
///
/// The id is compared first, then the QR bit. On success the response code
/// is handed back for the resolver to act on; NXDOMAIN and server errors are
/// not failures at this level.
pub fn validate(header: &DnsHeader, expected_id: u16) -> Result<ResultCode, ValidationError> {
    if header.id != expected_id {
        return Err(ValidationError::TransactionMismatch {
            expected: expected_id,
            actual: header.id,
        });
    }

    if !header.response {
        return Err(ValidationError::NotAResponse { id: header.id });
    }

    Ok(header.rescode)
}
