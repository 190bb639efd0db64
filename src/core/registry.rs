use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::identifier::ClaimLocation;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No claim definition is registered under the identifier.
    #[error("unknown claim definition: {0}")]
    UnknownDefinition(String),
}

/// A claim known to the registry.
///
/// `also_known` lists alternate identifiers that store the same claim under a
/// different namespace; when present they replace the definition's own
/// identifier as the places to look.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimDefinition {
    identifier: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    also_known: Vec<String>,
}

impl ClaimDefinition {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            also_known: Vec::new(),
        }
    }

    pub fn with_also_known<I, S>(mut self, also_known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.also_known = also_known.into_iter().map(Into::into).collect();
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn also_known(&self) -> &[String] {
        &self.also_known
    }

    /// Every storage location this claim may occupy. Identifiers that do not
    /// follow the `<namespace>:...:<property>` form are skipped.
    pub fn locations(&self) -> Vec<ClaimLocation> {
        let identifiers: Vec<&str> = if self.also_known.is_empty() {
            vec![self.identifier.as_str()]
        } else {
            self.also_known.iter().map(String::as_str).collect()
        };

        identifiers
            .into_iter()
            .filter_map(|identifier| {
                let location = ClaimLocation::parse(identifier);
                if location.is_none() {
                    tracing::warn!(identifier, "claim identifier has no storage location");
                }
                location
            })
            .collect()
    }
}

/// Lookup of claim definitions and known credential types.
pub trait ClaimRegistry: Send + Sync {
    fn definition(&self, identifier: &str) -> Result<&ClaimDefinition, RegistryError>;

    /// Whether `identifier` (a credential type such as `cvc:Identity`) is known.
    fn is_known_credential(&self, identifier: &str) -> bool;

    fn is_known_claim(&self, identifier: &str) -> bool {
        self.definition(identifier).is_ok()
    }
}

/// An in-memory registry.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    claims: BTreeMap<String, ClaimDefinition>,
    credentials: BTreeSet<String>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_claim(mut self, definition: ClaimDefinition) -> Self {
        self.insert_claim(definition);
        self
    }

    pub fn with_credential(mut self, identifier: impl Into<String>) -> Self {
        self.credentials.insert(identifier.into());
        self
    }

    pub fn insert_claim(&mut self, definition: ClaimDefinition) {
        self.claims
            .insert(definition.identifier().to_owned(), definition);
    }

    pub fn claims(&self) -> impl Iterator<Item = &ClaimDefinition> {
        self.claims.values()
    }

    /// The default `cvc` vocabulary.
    pub fn builtin() -> Self {
        let claims = [
            ClaimDefinition::new("cvc:Address:city"),
            ClaimDefinition::new("cvc:Address:country"),
            ClaimDefinition::new("cvc:Address:postalCode"),
            ClaimDefinition::new("cvc:Address.city").with_also_known(["cvc:Address:city"]),
            ClaimDefinition::new("cvc:Address.country").with_also_known(["cvc:Address:country"]),
            ClaimDefinition::new("cvc:Identity:name"),
            ClaimDefinition::new("cvc:Identity:dateOfBirth"),
            ClaimDefinition::new("cvc:Document:name"),
            ClaimDefinition::new("cvc:Document:type"),
            ClaimDefinition::new("cvc:Document:number"),
            ClaimDefinition::new("cvc:Document:dateOfBirth"),
            ClaimDefinition::new("cvc:Document:dateOfExpiry"),
            ClaimDefinition::new("cvc:Document.dateOfBirth")
                .with_also_known(["cvc:Document:dateOfBirth"]),
            ClaimDefinition::new("cvc:Name:givenNames").with_also_known([
                "cvc:Identity:name.givenNames",
                "cvc:Document:name.givenNames",
            ]),
            ClaimDefinition::new("cvc:Name:familyNames").with_also_known([
                "cvc:Identity:name.familyNames",
                "cvc:Document:name.familyNames",
            ]),
            ClaimDefinition::new("cvc:Contact:email"),
            ClaimDefinition::new("cvc:Contact:phoneNumber"),
            ClaimDefinition::new("cvc:Phone.countryCode")
                .with_also_known(["cvc:Contact:phoneNumber.country"]),
            ClaimDefinition::new("cvc:Validation:evidences.idDocumentFront"),
            ClaimDefinition::new("cvc:Validation:evidences.idDocumentBack"),
            ClaimDefinition::new("cvc:Validation:evidences.selfie"),
            ClaimDefinition::new("cvc:Random:node"),
        ];

        let credentials = [
            "cvc:Address",
            "cvc:Identity",
            "cvc:IdDocument",
            "cvc:GenericDocumentId",
            "cvc:Email",
            "cvc:PhoneNumber",
            "cvc:Covid19",
            "cvc:IDVaaS",
        ];

        let registry = claims
            .into_iter()
            .fold(Self::new(), |registry, claim| registry.with_claim(claim));
        credentials
            .into_iter()
            .fold(registry, |registry, credential| registry.with_credential(credential))
    }
}

impl ClaimRegistry for StaticRegistry {
    fn definition(&self, identifier: &str) -> Result<&ClaimDefinition, RegistryError> {
        self.claims
            .get(identifier)
            .ok_or_else(|| RegistryError::UnknownDefinition(identifier.to_owned()))
    }

    fn is_known_credential(&self, identifier: &str) -> bool {
        self.credentials.contains(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternates_replace_own_location() {
        let registry = StaticRegistry::builtin();
        let city = registry.definition("cvc:Address.city").unwrap();
        let paths: Vec<String> = city
            .locations()
            .iter()
            .map(|location| location.path().to_string())
            .collect();
        assert_eq!(paths, ["claim.address.city"]);

        let given = registry.definition("cvc:Name:givenNames").unwrap();
        let paths: Vec<String> = given
            .locations()
            .iter()
            .map(|location| location.path().to_string())
            .collect();
        assert_eq!(
            paths,
            ["claim.identity.name.givenNames", "claim.document.name.givenNames"]
        );
    }

    #[test]
    fn unknown_definition() {
        let registry = StaticRegistry::builtin();
        assert_eq!(
            registry.definition("cvc:Nope:nothing").unwrap_err(),
            RegistryError::UnknownDefinition("cvc:Nope:nothing".into())
        );
        assert!(registry.is_known_credential("cvc:Identity"));
        assert!(!registry.is_known_credential("cvc:Passport"));
    }

    #[test]
    fn definitions_without_location_are_skipped() {
        let definition = ClaimDefinition::new("cvc:Phone.countryCode").with_also_known(["bad"]);
        assert!(definition.locations().is_empty());
    }
}
