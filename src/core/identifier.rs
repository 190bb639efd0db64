//! Global identifiers.
//!
//! A global identifier names either a bundled credential or a single claim:
//!
//! ```text
//! credential-cvc:Identity-v1
//! claim-cvc:Address.city-v1
//! ```
//!
//! Claim definitions additionally use a colon delimited form,
//! `<namespace>:...:<property>`, which locates the claim at
//! `claim.<namespace>.<property>` inside a credential.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::claim_path::ClaimPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Credential,
    Claim,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::Claim => "claim",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "credential" => Some(Self::Credential),
            "claim" => Some(Self::Claim),
            _ => None,
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `<kind>-<type>-<version>` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalIdentifier {
    kind: IdentifierKind,
    identifier_type: String,
    version: String,
}

impl GlobalIdentifier {
    /// Splits at the first and last hyphen, so types may contain hyphens
    /// themselves. Returns `None` for an unknown kind or when fewer than two
    /// hyphens are present.
    pub fn parse(identifier: &str) -> Option<Self> {
        let (kind, rest) = identifier.split_once('-')?;
        let kind = IdentifierKind::from_prefix(kind)?;
        let (identifier_type, version) = rest.rsplit_once('-')?;
        if identifier_type.is_empty() {
            return None;
        }
        Some(Self {
            kind,
            identifier_type: identifier_type.to_owned(),
            version: version.to_owned(),
        })
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    /// The type segment, e.g. `cvc:Identity`.
    pub fn identifier_type(&self) -> &str {
        &self.identifier_type
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Versions are a decimal number with an optional `v` prefix.
    pub fn has_valid_version(&self) -> bool {
        let digits = self.version.strip_prefix('v').unwrap_or(&self.version);
        !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    }

    /// Same kind and type, any version.
    pub fn same_family(&self, other: &GlobalIdentifier) -> bool {
        self.kind == other.kind && self.identifier_type == other.identifier_type
    }
}

impl fmt::Display for GlobalIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.kind, self.identifier_type, self.version)
    }
}

/// Where a claim definition stores its value: `claim.<namespace>.<property>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClaimLocation {
    namespace: String,
    property: String,
}

impl ClaimLocation {
    /// The namespace sits between the first and last colon and is lower-cased;
    /// the property follows the last colon. Fewer than two colons is a gap.
    pub fn parse(identifier: &str) -> Option<Self> {
        let first = identifier.find(':')?;
        let last = identifier.rfind(':')?;
        if first == last {
            return None;
        }
        let namespace = identifier[first + 1..last].to_lowercase();
        let property = &identifier[last + 1..];
        if namespace.is_empty() || property.is_empty() {
            return None;
        }
        Some(Self {
            namespace,
            property: property.to_owned(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    /// `claim.<namespace>`, the root claim constraint paths are relative to.
    pub fn namespace_path(&self) -> ClaimPath {
        ClaimPath::claim_root().join(&self.namespace)
    }

    /// `claim.<namespace>.<property>`.
    pub fn path(&self) -> ClaimPath {
        self.namespace_path().join(&self.property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_credential_and_claim_identifiers() {
        let credential = GlobalIdentifier::parse("credential-cvc:Identity-v1").unwrap();
        assert_eq!(credential.kind(), IdentifierKind::Credential);
        assert_eq!(credential.identifier_type(), "cvc:Identity");
        assert_eq!(credential.version(), "v1");
        assert!(credential.has_valid_version());

        let claim = GlobalIdentifier::parse("claim-cvc:Address.city-v1").unwrap();
        assert_eq!(claim.kind(), IdentifierKind::Claim);
        assert_eq!(claim.identifier_type(), "cvc:Address.city");
        assert_eq!(claim.to_string(), "claim-cvc:Address.city-v1");
    }

    #[test]
    fn types_may_contain_hyphens() {
        let id = GlobalIdentifier::parse("credential-cvc:Covid19-Vaccination-1").unwrap();
        assert_eq!(id.identifier_type(), "cvc:Covid19-Vaccination");
        assert_eq!(id.version(), "1");
    }

    #[test]
    fn rejects_malformed_identifiers() {
        assert!(GlobalIdentifier::parse("credential-cvc:Identity").is_none());
        assert!(GlobalIdentifier::parse("document-cvc:Identity-v1").is_none());
        assert!(GlobalIdentifier::parse("claim--v1").is_none());
        assert!(!GlobalIdentifier::parse("claim-cvc:Name-vX")
            .unwrap()
            .has_valid_version());
    }

    #[test]
    fn families_ignore_version() {
        let v1 = GlobalIdentifier::parse("credential-cvc:IdDocument-v1").unwrap();
        let v2 = GlobalIdentifier::parse("credential-cvc:IdDocument-v2").unwrap();
        let other = GlobalIdentifier::parse("credential-cvc:Identity-v1").unwrap();
        assert!(v1.same_family(&v2));
        assert!(!v1.same_family(&other));
    }

    #[test]
    fn locates_claims() {
        let location = ClaimLocation::parse("cvc:Address:city").unwrap();
        assert_eq!(location.namespace(), "address");
        assert_eq!(location.property(), "city");
        assert_eq!(location.path().to_string(), "claim.address.city");

        let nested = ClaimLocation::parse("cvc:Validation:evidences.selfie").unwrap();
        assert_eq!(nested.path().to_string(), "claim.validation.evidences.selfie");

        assert!(ClaimLocation::parse("cvc:Address.city").is_none());
        assert!(ClaimLocation::parse("cvc::city").is_none());
    }
}
