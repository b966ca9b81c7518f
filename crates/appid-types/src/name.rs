//! Party full names.
//!
//! Every party of an identity graph is addressed by a three-part name:
//!
//! ```text
//! Acme/Sales/$Billing/#Prod
//! └─domain─┘ └─party┘ └env┘
//! ```
//!
//! - The domain is one or more `/`-separated segments.
//! - The party name always starts with `$`.
//! - The environment name always starts with `#` and defaults to `#Dev`.
//!
//! Names compare case-insensitively: `acme/$billing/#prod` and
//! `Acme/$Billing/#Prod` are the same [`FullName`].
//!
//! Two domains are reserved. A domain starting with `External` is
//! normalized to `External` and marks a party that belongs to no domain
//! of ours. A domain starting with `Undefined` is normalized to
//! `Undefined`. Neither may have sub domains.

use crate::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Environment used when none is configured.
pub const DEFAULT_ENVIRONMENT_NAME: &str = "#Dev";

/// Domain used when none is configured.
pub const DEFAULT_DOMAIN_NAME: &str = "Undefined";

/// Party name of a root that configures none.
pub const DEFAULT_PARTY_NAME: &str = "$Undefined";

/// Normalized domain of external parties.
pub const EXTERNAL_DOMAIN_NAME: &str = "External";

/// Name syntax error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// The name is empty.
    #[error("name is empty")]
    Empty,

    /// A domain segment is malformed.
    #[error("invalid domain name '{0}'")]
    InvalidDomain(String),

    /// The party name is malformed.
    #[error("invalid party name '{0}'")]
    InvalidParty(String),

    /// The environment name is malformed.
    #[error("invalid environment name '{0}'")]
    InvalidEnvironment(String),

    /// `External` and `Undefined` cannot have sub domains.
    #[error("reserved domain '{0}' cannot have sub domains")]
    ReservedSubDomain(String),

    /// A full name must contain a `$party` segment.
    #[error("full name '{0}' has no party name")]
    MissingParty(String),
}

impl ErrorCode for NameError {
    fn code(&self) -> &'static str {
        match self {
            Self::Empty => "NAME_EMPTY",
            Self::InvalidDomain(_) => "NAME_INVALID_DOMAIN",
            Self::InvalidParty(_) => "NAME_INVALID_PARTY",
            Self::InvalidEnvironment(_) => "NAME_INVALID_ENVIRONMENT",
            Self::ReservedSubDomain(_) => "NAME_RESERVED_SUB_DOMAIN",
            Self::MissingParty(_) => "NAME_MISSING_PARTY",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Parts read from a possibly partial full name.
///
/// `"Acme/$Billing"` has no environment; `"Acme"` has neither party nor
/// environment. The configuration layer fills the gaps from the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    /// Normalized domain name.
    pub domain: String,
    /// Party name with its `$` prefix.
    pub party: Option<String>,
    /// Environment name with its `#` prefix.
    pub environment: Option<String>,
}

impl NameParts {
    /// Splits a full name into its parts.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] when a segment is malformed, when segments are
    /// out of order or when the domain is missing.
    pub fn parse(full_name: &str) -> Result<Self, NameError> {
        let trimmed = full_name.trim();
        if trimmed.is_empty() {
            return Err(NameError::Empty);
        }

        let mut domain = Vec::new();
        let mut party = None;
        let mut environment = None;
        for segment in trimmed.split('/') {
            if environment.is_some() {
                return Err(NameError::InvalidEnvironment(trimmed.to_string()));
            }
            if let Some(rest) = segment.strip_prefix('#') {
                if !is_valid_segment(rest) {
                    return Err(NameError::InvalidEnvironment(segment.to_string()));
                }
                environment = Some(segment.to_string());
            } else if let Some(rest) = segment.strip_prefix('$') {
                if party.is_some() || !is_valid_segment(rest) {
                    return Err(NameError::InvalidParty(segment.to_string()));
                }
                party = Some(segment.to_string());
            } else {
                if party.is_some() || !is_valid_segment(segment) {
                    return Err(NameError::InvalidDomain(trimmed.to_string()));
                }
                domain.push(segment);
            }
        }
        if domain.is_empty() {
            return Err(NameError::InvalidDomain(trimmed.to_string()));
        }
        Ok(Self {
            domain: normalize_domain_name(&domain.join("/"))?,
            party,
            environment,
        })
    }
}

/// Case-insensitive `Domain/$Party/#Environment` name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FullName {
    domain: String,
    party: String,
    environment: String,
    key: String,
}

impl FullName {
    /// Builds a full name from its three parts.
    ///
    /// The `$` and `#` prefixes are added when missing.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] if any part is invalid.
    ///
    /// # Example
    ///
    /// ```
    /// use appid_types::FullName;
    ///
    /// let name = FullName::new("Acme", "Billing", "Prod").unwrap();
    /// assert_eq!(name.to_string(), "Acme/$Billing/#Prod");
    /// ```
    pub fn new(domain: &str, party: &str, environment: &str) -> Result<Self, NameError> {
        let domain = normalize_domain_name(domain)?;
        let party = normalize_party_name(party)?;
        let environment = normalize_environment_name(environment)?;
        let key = format!("{domain}/{party}/{environment}").to_lowercase();
        Ok(Self {
            domain,
            party,
            environment,
            key,
        })
    }

    /// Parses `Domain/$Party[/#Environment]`.
    ///
    /// # Errors
    ///
    /// Returns [`NameError::MissingParty`] when no `$party` segment exists.
    pub fn parse(full_name: &str) -> Result<Self, NameError> {
        let parts = NameParts::parse(full_name)?;
        let party = parts
            .party
            .ok_or_else(|| NameError::MissingParty(full_name.to_string()))?;
        let environment = parts
            .environment
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT_NAME.to_string());
        Self::new(&parts.domain, &party, &environment)
    }

    /// Domain name, `/`-separated.
    #[must_use]
    pub fn domain_name(&self) -> &str {
        &self.domain
    }

    /// Party name, including the leading `$`.
    #[must_use]
    pub fn party_name(&self) -> &str {
        &self.party
    }

    /// Environment name, including the leading `#`.
    #[must_use]
    pub fn environment_name(&self) -> &str {
        &self.environment
    }

    /// Last segment of the domain.
    #[must_use]
    pub fn last_domain_segment(&self) -> &str {
        self.domain.rsplit('/').next().unwrap_or(&self.domain)
    }

    /// Domain segments in order.
    pub fn domain_segments(&self) -> impl Iterator<Item = &str> {
        self.domain.split('/')
    }

    /// True for parties of the `External` domain.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.domain == EXTERNAL_DOMAIN_NAME
    }

    /// True when the party name (without `$`) equals the last domain
    /// segment: `Acme/Sales/$Sales` names the `Acme/Sales` domain itself.
    #[must_use]
    pub fn names_its_domain(&self) -> bool {
        self.party[1..].eq_ignore_ascii_case(self.last_domain_segment())
    }

    /// Lowercased form used for equality, hashing and indexes.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.domain, self.party, self.environment)
    }
}

impl PartialEq for FullName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for FullName {}

impl Hash for FullName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl TryFrom<String> for FullName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FullName> for String {
    fn from(value: FullName) -> Self {
        value.to_string()
    }
}

/// Checks a `/`-separated domain name.
#[must_use]
pub fn is_valid_domain_name(name: &str) -> bool {
    !name.is_empty() && name.split('/').all(is_valid_segment)
}

/// Checks a party name, with or without its `$` prefix.
#[must_use]
pub fn is_valid_party_name(name: &str) -> bool {
    is_valid_segment(name.strip_prefix('$').unwrap_or(name))
}

/// Checks an environment name, with or without its `#` prefix.
#[must_use]
pub fn is_valid_environment_name(name: &str) -> bool {
    is_valid_segment(name.strip_prefix('#').unwrap_or(name))
}

/// Validates a domain name and folds the reserved domains.
///
/// # Errors
///
/// Returns [`NameError::InvalidDomain`] or [`NameError::ReservedSubDomain`].
pub fn normalize_domain_name(name: &str) -> Result<String, NameError> {
    if !is_valid_domain_name(name) {
        return Err(NameError::InvalidDomain(name.to_string()));
    }
    for reserved in [EXTERNAL_DOMAIN_NAME, DEFAULT_DOMAIN_NAME] {
        if starts_with_ignore_case(name, reserved) {
            if name.contains('/') {
                return Err(NameError::ReservedSubDomain(name.to_string()));
            }
            return Ok(reserved.to_string());
        }
    }
    Ok(name.to_string())
}

/// Validates a party name and adds the `$` prefix if missing.
///
/// # Errors
///
/// Returns [`NameError::InvalidParty`].
pub fn normalize_party_name(name: &str) -> Result<String, NameError> {
    if !is_valid_party_name(name) {
        return Err(NameError::InvalidParty(name.to_string()));
    }
    Ok(if name.starts_with('$') {
        name.to_string()
    } else {
        format!("${name}")
    })
}

/// Validates an environment name and adds the `#` prefix if missing.
///
/// # Errors
///
/// Returns [`NameError::InvalidEnvironment`].
pub fn normalize_environment_name(name: &str) -> Result<String, NameError> {
    if !is_valid_environment_name(name) {
        return Err(NameError::InvalidEnvironment(name.to_string()));
    }
    Ok(if name.starts_with('#') {
        name.to_string()
    } else {
        format!("#{name}")
    })
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}
