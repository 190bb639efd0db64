//! Holder-side resolution of scope requests.
//!
//! [`Resolver::resolve`] filters a holder's credentials down to those that
//! satisfy a request, item by item and in request order:
//!
//! 1. The item identifier picks the base candidates. A credential item keeps
//!    candidates whose `identifier` mentions its type. A claim item is looked
//!    up in the [`ClaimRegistry`] and keeps candidates holding one of the
//!    claim's storage locations, one branch per location.
//! 2. The item's meta and claim constraints are compiled into predicates
//!    (see [`compiler`]) and evaluated against each branch.
//! 3. Matches are folded into a [`ResolutionAccumulator`] according to the
//!    request's [`ResolutionMode`].
//!
//! Items that cannot be resolved (malformed identifier, unknown claim,
//! untranslatable operator) contribute nothing and are logged, they never
//! abort the remaining items.
//!
//! [`ResolutionMode`]: crate::core::scope_request::ResolutionMode

use std::sync::Arc;

use crate::{
    core::{
        claim_path::ClaimPath,
        identifier::{ClaimLocation, GlobalIdentifier, IdentifierKind},
        registry::{ClaimRegistry, StaticRegistry},
        scope_request::{ResolutionMode, ScopeRequest, StructuredItem},
    },
    credential::Credential,
};

use self::compiler::CompiledItem;

pub mod compiler;
mod matcher;
pub mod operator;
pub mod predicate;
pub mod result;

pub use result::{Partition, ResolutionAccumulator, ResolutionResult};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverError {
    /// No candidate credentials were supplied.
    #[error("empty credentialItems param")]
    EmptyCandidateList,
    /// The request is not a scope request object, or requests nothing.
    #[error("invalid scopeRequest object: {0}")]
    InvalidRequestShape(String),
}

/// Resolves scope requests against candidate credentials.
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<dyn ClaimRegistry>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(Arc::new(StaticRegistry::builtin()))
    }
}

/// Candidates selected for one claim location (or the credential type) with
/// the item compiled against that location.
struct Branch<'a> {
    candidates: Vec<&'a Credential>,
    compiled: CompiledItem,
}

impl Resolver {
    pub fn new(registry: Arc<dyn ClaimRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &dyn ClaimRegistry {
        self.registry.as_ref()
    }

    /// Candidates satisfying the request. Output order follows item order,
    /// then candidate order.
    pub fn resolve<'a>(
        &self,
        request: &ScopeRequest,
        candidates: &'a [Credential],
    ) -> ResolutionResult<'a> {
        let mut accumulator = ResolutionAccumulator::new(request.mode());

        for item in request.credential_items() {
            let item = item.normalized();
            if item.is_aggregate_only() {
                tracing::debug!(identifier = item.identifier(), "aggregate-only item skipped");
                continue;
            }
            accumulator = self.resolve_item(&item, candidates, accumulator);
        }

        let result = accumulator.into_result();
        tracing::debug!(
            id = request.id(),
            mode = ?result.mode(),
            matched = result.credentials().len(),
            failed = result.failed_constraints().len(),
            "resolved scope request"
        );
        result
    }

    fn resolve_item<'a>(
        &self,
        item: &StructuredItem,
        candidates: &'a [Credential],
        mut accumulator: ResolutionAccumulator<'a>,
    ) -> ResolutionAccumulator<'a> {
        for branch in self.branches(item, candidates) {
            match accumulator.mode() {
                ResolutionMode::Strict => {
                    let matched = predicate::filter(
                        &branch.compiled.pass(),
                        branch.candidates.iter().copied(),
                    );
                    accumulator.extend(matched);
                }
                ResolutionMode::Simple => {
                    let mut passing = Vec::new();
                    for prefix in branch.compiled.prefixes() {
                        let failing = predicate::filter(
                            &prefix.clone().negate(),
                            branch.candidates.iter().copied(),
                        );
                        accumulator.record_failures(failing);
                        passing = accumulator.without_failures(predicate::filter(
                            &prefix,
                            branch.candidates.iter().copied(),
                        ));
                    }
                    accumulator.accept(passing);
                }
            }
        }
        accumulator
    }

    fn branches<'a>(&self, item: &StructuredItem, candidates: &'a [Credential]) -> Vec<Branch<'a>> {
        let Some(identifier) = GlobalIdentifier::parse(item.identifier()) else {
            tracing::warn!(
                identifier = item.identifier(),
                "unresolvable identifier, item contributes nothing"
            );
            return Vec::new();
        };

        match identifier.kind() {
            IdentifierKind::Credential => {
                let Some(base) = compiler::identifier_pattern(identifier.identifier_type()) else {
                    return Vec::new();
                };
                vec![Branch {
                    candidates: predicate::filter(&base, candidates),
                    compiled: CompiledItem::compile(item.constraints(), &ClaimPath::claim_root()),
                }]
            }
            IdentifierKind::Claim => self
                .claim_locations(&identifier)
                .into_iter()
                .map(|location| Branch {
                    candidates: predicate::filter(&compiler::exists(location.path()), candidates),
                    compiled: CompiledItem::compile(
                        item.constraints(),
                        &location.namespace_path(),
                    ),
                })
                .collect(),
        }
    }

    /// Storage locations of a claim identifier; empty when the registry does
    /// not know the claim.
    fn claim_locations(&self, identifier: &GlobalIdentifier) -> Vec<ClaimLocation> {
        match self.registry.definition(identifier.identifier_type()) {
            Ok(definition) => definition.locations(),
            Err(error) => {
                tracing::warn!(%error, "claim resolves to no credentials");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::{
        constraint::Constraint,
        registry::ClaimDefinition,
        scope_request::{AggregateFilter, CredentialItem, MetaConstraints},
    };

    fn candidates() -> Vec<Credential> {
        vec![
            Credential::new(json!({
                "identifier": "credential-cvc:Address-v1",
                "issuer": "did:ethr:0xaf9482c84De4e2a961B98176C9f295F9b6008BfD",
                "claim": { "address": { "city": "Belo Horizonte", "country": "BR" } }
            })),
            Credential::new(json!({
                "identifier": "credential-cvc:Address-v1",
                "issuer": "did:ethr:0x1a88a35421a4a0d3e13fe4e8ebcf18e9a249dc5a",
                "claim": { "address": { "city": "Sao Paulo", "country": "BR" } }
            })),
            Credential::new(json!({
                "identifier": "credential-cvc:Identity-v1",
                "issuer": "did:ethr:0xaf9482c84De4e2a961B98176C9f295F9b6008BfD",
                "claim": { "identity": { "name": { "givenNames": "Joao" } } }
            })),
        ]
    }

    fn request(items: Vec<CredentialItem>) -> ScopeRequest {
        ScopeRequest::from_items("abcd", items)
    }

    #[test]
    fn bare_credential_item_selects_by_type() {
        let candidates = candidates();
        let resolved = Resolver::default().resolve(
            &request(vec![CredentialItem::bare("credential-cvc:Address-v1")]),
            &candidates,
        );
        assert_eq!(resolved.credentials(), [&candidates[0], &candidates[1]]);
    }

    #[test]
    fn claim_item_filters_within_namespace() {
        let candidates = candidates();
        let item = StructuredItem::new("claim-cvc:Address.city-v1")
            .with_claim("city", Constraint::eq("Belo Horizonte"));
        let resolved = Resolver::default().resolve(&request(vec![item.into()]), &candidates);
        assert_eq!(resolved.credentials(), [&candidates[0]]);
    }

    #[test]
    fn unresolvable_items_contribute_nothing() {
        let candidates = candidates();
        let resolved = Resolver::default().resolve(
            &request(vec![
                CredentialItem::bare("claim-cvc:Unknown:thing-v1"),
                CredentialItem::bare("document-cvc:Identity-v1"),
                CredentialItem::bare("credential-cvc:Identity-v1"),
            ]),
            &candidates,
        );
        assert_eq!(resolved.credentials(), [&candidates[2]]);
    }

    #[test]
    fn aggregate_only_items_are_skipped() {
        let candidates = candidates();
        let item = StructuredItem::new("credential-cvc:Address-v1")
            .with_aggregate(AggregateFilter::new("$limit", 1));
        let resolved = Resolver::default().resolve(&request(vec![item.into()]), &candidates);
        assert!(resolved.credentials().is_empty());
    }

    #[test]
    fn alternates_are_concatenated() {
        let registry = StaticRegistry::new().with_claim(
            ClaimDefinition::new("cvc:Home:city")
                .with_also_known(["cvc:Address:city", "cvc:Address:city"]),
        );
        let candidates = candidates();
        let resolved = Resolver::new(Arc::new(registry))
            .resolve(&request(vec![CredentialItem::bare("claim-cvc:Home:city-v1")]), &candidates);
        assert_eq!(resolved.credentials().len(), 4);
    }

    #[test]
    fn simple_mode_partitions() {
        let candidates = candidates();
        let item = StructuredItem::new("credential-cvc:Address-v1")
            .with_meta(MetaConstraints::new().with_issuer(Constraint::eq(
                "did:ethr:0xaf9482c84De4e2a961B98176C9f295F9b6008BfD",
            )))
            .with_claim("address.country", Constraint::eq("BR"));
        let resolved = Resolver::default().resolve(
            &request(vec![item.into()]).with_mode(ResolutionMode::Simple),
            &candidates,
        );
        assert_eq!(resolved.credentials(), [&candidates[0]]);
        assert_eq!(resolved.failed_constraints(), [&candidates[1]]);
    }
}
