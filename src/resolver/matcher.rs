use std::iter;

use serde_json::Value as Json;

use super::{compiler::CompiledItem, Resolver, ResolverError};
use crate::{
    core::{
        claim_path::ClaimPath,
        identifier::{ClaimLocation, GlobalIdentifier, IdentifierKind},
        scope_request::{ScopeRequest, StructuredItem},
    },
    credential::Credential,
};

impl Resolver {
    /// Whether every item of `request` is satisfied by one of `candidates`.
    ///
    /// Each item is checked against a single candidate: the first whose
    /// identifier equals the item identifier or its credential tag, then the
    /// first of the same credential family, then (for claim items) the first
    /// holding the claim. Claim constraint paths are relative to `claim` for
    /// credential items and, as in [`Resolver::resolve`], to
    /// `claim.<namespace>` of each claim location for claim items; the item
    /// matches when any location passes. Aggregate-only items are satisfied
    /// trivially.
    ///
    /// With `strict_meta_check`, an item carrying a credential tag only matches
    /// a candidate whose identifier is exactly that tag.
    pub fn matches(
        &self,
        request: &ScopeRequest,
        candidates: &[Credential],
        strict_meta_check: bool,
    ) -> Result<bool, ResolverError> {
        if candidates.is_empty() {
            return Err(ResolverError::EmptyCandidateList);
        }
        if request.credential_items().is_empty() {
            return Err(ResolverError::InvalidRequestShape(
                "no credential items requested".to_owned(),
            ));
        }

        Ok(request.credential_items().iter().all(|item| {
            let item = item.normalized();
            if item.is_aggregate_only() {
                return true;
            }
            let matched = self.item_matches(&item, candidates, strict_meta_check);
            if !matched {
                tracing::debug!(identifier = item.identifier(), "credential item not satisfied");
            }
            matched
        }))
    }

    /// [`Resolver::matches`] for a request that has not been parsed yet.
    pub fn matches_document(
        &self,
        request: &Json,
        candidates: &[Credential],
        strict_meta_check: bool,
    ) -> Result<bool, ResolverError> {
        if candidates.is_empty() {
            return Err(ResolverError::EmptyCandidateList);
        }
        if !request.is_object() {
            return Err(ResolverError::InvalidRequestShape(
                "expected a JSON object".to_owned(),
            ));
        }
        let request: ScopeRequest = serde_json::from_value(request.clone())
            .map_err(|error| ResolverError::InvalidRequestShape(error.to_string()))?;
        self.matches(&request, candidates, strict_meta_check)
    }

    fn item_matches(
        &self,
        item: &StructuredItem,
        candidates: &[Credential],
        strict_meta_check: bool,
    ) -> bool {
        let Some(candidate) = self.find_candidate(item, candidates) else {
            tracing::debug!(identifier = item.identifier(), "no candidate for item");
            return false;
        };

        let view = match candidate.view() {
            Ok(view) => view,
            Err(error) => {
                tracing::debug!(%error, "candidate cannot be matched");
                return false;
            }
        };

        if strict_meta_check {
            if let Some(tag) = item.credential_tag() {
                if view.identifier() != tag {
                    tracing::debug!(
                        expected = tag,
                        found = view.identifier(),
                        "credential tag mismatch"
                    );
                    return false;
                }
            }
        }

        self.claim_roots(item)
            .iter()
            .any(|root| {
                CompiledItem::compile(item.constraints(), root)
                    .pass()
                    .evaluate(candidate.document())
            })
    }

    /// Roots the item's claim constraint paths are joined onto: `claim` for
    /// credential items, `claim.<namespace>` of every location for claim items.
    fn claim_roots(&self, item: &StructuredItem) -> Vec<ClaimPath> {
        match GlobalIdentifier::parse(item.identifier()) {
            Some(identifier) if identifier.kind() == IdentifierKind::Claim => self
                .claim_locations(&identifier)
                .iter()
                .map(ClaimLocation::namespace_path)
                .collect(),
            _ => vec![ClaimPath::claim_root()],
        }
    }

    fn find_candidate<'a>(
        &self,
        item: &StructuredItem,
        candidates: &'a [Credential],
    ) -> Option<&'a Credential> {
        let wanted: Vec<&str> = iter::once(item.identifier())
            .chain(item.credential_tag())
            .collect();

        let exact = candidates.iter().find(|candidate| {
            candidate
                .identifier()
                .is_some_and(|identifier| wanted.contains(&identifier))
        });
        if exact.is_some() {
            return exact;
        }

        let families: Vec<GlobalIdentifier> = wanted
            .iter()
            .filter_map(|identifier| GlobalIdentifier::parse(identifier))
            .collect();
        let family = candidates.iter().find(|candidate| {
            candidate.global_identifier().is_some_and(|identifier| {
                families.iter().any(|family| family.same_family(&identifier))
            })
        });
        if family.is_some() {
            return family;
        }

        let paths: Vec<ClaimPath> = GlobalIdentifier::parse(item.identifier())
            .filter(|identifier| identifier.kind() == IdentifierKind::Claim)
            .map(|identifier| self.claim_locations(&identifier))
            .unwrap_or_default()
            .iter()
            .map(ClaimLocation::path)
            .collect();
        candidates
            .iter()
            .find(|candidate| paths.iter().any(|path| path.exists_in(candidate.document())))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::{
        constraint::Constraint,
        scope_request::{CredentialItem, MetaConstraints},
    };

    fn address() -> Credential {
        Credential::new(json!({
            "identifier": "credential-cvc:Address-v1",
            "issuer": "did:ethr:0xaf9482c84De4e2a961B98176C9f295F9b6008BfD",
            "issued": "2018-09-27T01:14:41.287Z",
            "claim": { "address": { "city": "Belo Horizonte", "country": "BR" } }
        }))
    }

    #[test]
    fn rejects_empty_inputs() {
        let resolver = Resolver::default();
        let request = ScopeRequest::from_items("abcd", vec![]);
        assert_eq!(
            resolver.matches(&request, &[], false).unwrap_err(),
            ResolverError::EmptyCandidateList
        );
        assert!(matches!(
            resolver.matches(&request, &[address()], false),
            Err(ResolverError::InvalidRequestShape(_))
        ));
        assert!(matches!(
            resolver.matches_document(&json!(["x"]), &[address()], false),
            Err(ResolverError::InvalidRequestShape(_))
        ));
    }

    #[test]
    fn claim_items_find_candidates_by_content() {
        let item = StructuredItem::new("claim-cvc:Address.city-v1")
            .with_claim("city", Constraint::eq("Belo Horizonte"));
        let request = ScopeRequest::from_items("abcd", vec![item.into()]);
        assert!(Resolver::default()
            .matches(&request, &[address()], false)
            .unwrap());
    }

    #[test]
    fn claim_item_paths_are_relative_to_the_namespace() {
        let rooted = StructuredItem::new("claim-cvc:Address.city-v1")
            .with_claim("address.city", Constraint::eq("Belo Horizonte"));
        let request = ScopeRequest::from_items("abcd", vec![rooted.into()]);
        assert!(!Resolver::default()
            .matches(&request, &[address()], false)
            .unwrap());

        let credential = StructuredItem::new("credential-cvc:Address-v1")
            .with_claim("address.city", Constraint::eq("Belo Horizonte"));
        let request = ScopeRequest::from_items("abcd", vec![credential.into()]);
        assert!(Resolver::default()
            .matches(&request, &[address()], false)
            .unwrap());
    }

    #[test]
    fn unknown_claims_never_match() {
        let item = StructuredItem::new("claim-cvc:Address.planet-v1")
            .with_claim("planet", Constraint::eq("Earth"));
        let request = ScopeRequest::from_items("abcd", vec![item.into()]);
        assert!(!Resolver::default()
            .matches(&request, &[address()], false)
            .unwrap());
    }

    #[test]
    fn every_item_must_match() {
        let request = ScopeRequest::from_items(
            "abcd",
            vec![
                CredentialItem::bare("credential-cvc:Address-v1"),
                CredentialItem::bare("credential-cvc:Identity-v1"),
            ],
        );
        assert!(!Resolver::default()
            .matches(&request, &[address()], false)
            .unwrap());
    }

    #[test]
    fn strict_meta_check_requires_exact_tag() {
        let item = StructuredItem::new("credential-cvc:Address-v2")
            .with_meta(MetaConstraints::new().with_credential("credential-cvc:Address-v2"));
        let request = ScopeRequest::from_items("abcd", vec![item.into()]);
        let resolver = Resolver::default();
        assert!(resolver.matches(&request, &[address()], false).unwrap());
        assert!(!resolver.matches(&request, &[address()], true).unwrap());
    }
}
