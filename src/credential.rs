use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::core::identifier::GlobalIdentifier;

/// A credential held by the holder, kept as its JSON document.
///
/// Full credentials carry `identifier`, `issuer`, `issued`, `expiry` and a
/// `claim` object. Partial presentations carry a
/// `granted` marker and may omit everything but `identifier` and `claim`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Credential(Json);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    /// A field required for this kind of credential is absent.
    #[error("credential is missing `{0}`")]
    MissingField(&'static str),
}

impl Credential {
    pub fn new(document: Json) -> Self {
        Self(document)
    }

    pub fn document(&self) -> &Json {
        &self.0
    }

    pub fn into_document(self) -> Json {
        self.0
    }

    pub fn identifier(&self) -> Option<&str> {
        self.0.get("identifier").and_then(Json::as_str)
    }

    pub fn global_identifier(&self) -> Option<GlobalIdentifier> {
        self.identifier().and_then(GlobalIdentifier::parse)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.0.get("issuer").and_then(Json::as_str)
    }

    pub fn issued(&self) -> Option<&Json> {
        self.field("issued")
    }

    pub fn expiry(&self) -> Option<&Json> {
        self.field("expiry")
    }

    pub fn claim(&self) -> Option<&Json> {
        self.field("claim")
    }

    /// Partial presentations expose only the granted claims.
    pub fn is_partial(&self) -> bool {
        self.field("granted").is_some()
    }

    /// Checks the fields a single-credential match reads are present.
    pub fn view(&self) -> Result<CredentialView<'_>, ViewError> {
        CredentialView::new(self)
    }

    fn field(&self, name: &str) -> Option<&Json> {
        self.0.get(name).filter(|value| !value.is_null())
    }
}

impl From<Json> for Credential {
    fn from(document: Json) -> Self {
        Self(document)
    }
}

/// A credential whose required fields have been checked.
#[derive(Debug, Clone, Copy)]
pub struct CredentialView<'a> {
    credential: &'a Credential,
    identifier: &'a str,
}

impl<'a> CredentialView<'a> {
    pub fn new(credential: &'a Credential) -> Result<Self, ViewError> {
        let identifier = credential
            .identifier()
            .ok_or(ViewError::MissingField("identifier"))?;
        credential.claim().ok_or(ViewError::MissingField("claim"))?;

        if !credential.is_partial() {
            credential.issuer().ok_or(ViewError::MissingField("issuer"))?;
            credential.issued().ok_or(ViewError::MissingField("issued"))?;
        }

        Ok(Self {
            credential,
            identifier,
        })
    }

    pub fn identifier(&self) -> &'a str {
        self.identifier
    }

    pub fn is_partial(&self) -> bool {
        self.credential.is_partial()
    }

    pub fn credential(&self) -> &'a Credential {
        self.credential
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn full_credentials_need_issuer_and_issuance() {
        let credential = Credential::new(json!({
            "identifier": "credential-cvc:Address-v1",
            "issuer": "did:ethr:0xaf9482c84De4e2a961B98176C9f295F9b6008BfD",
            "claim": { "address": { "city": "Belo Horizonte" } }
        }));
        assert_eq!(
            credential.view().unwrap_err(),
            ViewError::MissingField("issued")
        );
    }

    #[test]
    fn partial_credentials_need_identifier_and_claim() {
        let credential = Credential::new(json!({
            "identifier": "credential-cvc:IdDocument-v2",
            "granted": "0x1234",
            "claim": { "document": { "dateOfBirth": { "day": 20, "month": 3, "year": 2000 } } }
        }));
        let view = credential.view().unwrap();
        assert!(view.is_partial());
        assert_eq!(view.identifier(), "credential-cvc:IdDocument-v2");

        let empty = Credential::new(json!({ "granted": "0x1234", "claim": {} }));
        assert_eq!(empty.view().unwrap_err(), ViewError::MissingField("identifier"));
    }
}
