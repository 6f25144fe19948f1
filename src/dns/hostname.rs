//! Host name grammar checks
//!
//! Names typed by a user are held to the usual host name rules before any
//! packet is sent: letters, digits and hyphens, no hyphen at either end of a
//! label, and an alphabetic top level label of at least two characters.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Valid host label pattern (RFC 1123)
    static ref HOST_LABEL_REGEX: Regex = Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9\-]{0,61}[A-Za-z0-9])?$")
        .expect("Failed to compile host label regex");

    /// Top level label: alphabetic, at least two characters
    static ref TLD_REGEX: Regex = Regex::new(r"^[A-Za-z]{2,63}$")
        .expect("Failed to compile top level label regex");
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostnameError {
    Empty,
    MissingSuffix(String),
    InvalidLabel(String),
    InvalidSuffix(String),
}

impl std::fmt::Display for HostnameError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            HostnameError::Empty => write!(f, "name is empty"),
            HostnameError::MissingSuffix(name) => {
                write!(f, "{} has no top level domain", name)
            }
            HostnameError::InvalidLabel(label) => write!(
                f,
                "label {:?} must be 1-63 letters, digits or inner hyphens",
                label
            ),
            HostnameError::InvalidSuffix(label) => write!(
                f,
                "top level domain {:?} must be at least two letters",
                label
            ),
        }
    }
}

impl std::error::Error for HostnameError {}

/// Validate a host name given on the command line
///
/// A single trailing dot is accepted.
pub fn validate(name: &str) -> Result<(), HostnameError> {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() {
        return Err(HostnameError::Empty);
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return Err(HostnameError::MissingSuffix(name.to_string()));
    }

    for label in &labels {
        if !HOST_LABEL_REGEX.is_match(label) {
            return Err(HostnameError::InvalidLabel(label.to_string()));
        }
    }

    if let Some(tld) = labels.last() {
        if !TLD_REGEX.is_match(tld) {
            return Err(HostnameError::InvalidSuffix(tld.to_string()));
        }
    }

    Ok(())
}

/// Whether `name` equals `zone` or lies below it, compared label by label
/// and without regard to case. Every name lies within the root zone.
pub fn is_within(name: &str, zone: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    let zone = zone.strip_suffix('.').unwrap_or(zone);

    if zone.is_empty() {
        return true;
    }

    let mut name_labels = name.rsplit('.');
    for zone_label in zone.rsplit('.') {
        match name_labels.next() {
            Some(label) if label.eq_ignore_ascii_case(zone_label) => {}
            _ => return false,
        }
    }

    true
}
