use super::{operator, predicate::Predicate};
use crate::core::{
    claim_path::ClaimPath,
    constraint::Constraint,
    scope_request::{ClaimConstraint, ItemConstraints, MetaConstraints},
};

/// An item's constraints compiled against one claim root.
///
/// Meta predicates come first (`issued`, `expiry`, `issuer`), followed by one
/// predicate per claim constraint in request order.
#[derive(Debug, Clone, Default)]
pub struct CompiledItem {
    meta: Vec<Predicate>,
    claims: Vec<Predicate>,
}

impl CompiledItem {
    /// Claim constraint paths are joined onto `claim_root`.
    pub fn compile(constraints: Option<&ItemConstraints>, claim_root: &ClaimPath) -> Self {
        let Some(constraints) = constraints else {
            return Self::default();
        };
        Self {
            meta: constraints.meta().map(compile_meta).unwrap_or_default(),
            claims: constraints
                .claims()
                .iter()
                .filter_map(|claim| compile_claim(claim, claim_root))
                .collect(),
        }
    }

    pub fn meta(&self) -> &[Predicate] {
        &self.meta
    }

    pub fn claims(&self) -> &[Predicate] {
        &self.claims
    }

    /// Every predicate, meta first.
    pub fn predicates(&self) -> Vec<Predicate> {
        self.meta.iter().chain(&self.claims).cloned().collect()
    }

    /// The conjunction a candidate must satisfy to pass.
    pub fn pass(&self) -> Predicate {
        Predicate::And(self.predicates())
    }

    /// Growing conjunctions: the meta predicates plus the first claim, then
    /// the first two claims, and so on. An item without claim constraints has
    /// a single step.
    pub fn prefixes(&self) -> Vec<Predicate> {
        if self.claims.is_empty() {
            return vec![Predicate::And(self.meta.clone())];
        }
        (1..=self.claims.len())
            .map(|end| {
                Predicate::And(
                    self.meta
                        .iter()
                        .chain(&self.claims[..end])
                        .cloned()
                        .collect(),
                )
            })
            .collect()
    }
}

fn compile_meta(meta: &MetaConstraints) -> Vec<Predicate> {
    let timestamps = [("issued", meta.issued()), ("expiry", meta.expiry())];
    let mut predicates: Vec<Predicate> = timestamps
        .into_iter()
        .filter_map(|(field, constraint)| compile_timestamp(field, constraint?))
        .collect();

    if let Some(issuer) = meta.issuer().and_then(Constraint::operand) {
        predicates.push(Predicate::Equals {
            path: ClaimPath::parse("issuer"),
            value: issuer.clone(),
        });
    }
    predicates
}

fn compile_timestamp(field: &str, constraint: &Constraint) -> Option<Predicate> {
    let token = constraint.operator_token().unwrap_or_default();
    let Some(comparator) = operator::translate(token) else {
        tracing::warn!(field, operator = token, "untranslatable operator, constraint skipped");
        return None;
    };
    let operand = constraint.operand()?;
    Some(Predicate::Compare {
        path: ClaimPath::parse(field),
        comparator,
        operand: operand.clone(),
    })
}

fn compile_claim(claim: &ClaimConstraint, root: &ClaimPath) -> Option<Predicate> {
    let constraint = claim.constraint();
    if constraint.operand().is_none() {
        tracing::warn!(path = claim.path(), "claim constraint without operand skipped");
        return None;
    }
    Some(Predicate::Operator {
        path: root.join(claim.path()),
        constraint: constraint.as_map().clone(),
    })
}

/// Escaped pattern matching `identifier_type` anywhere in a credential's
/// `identifier`.
pub fn identifier_pattern(identifier_type: &str) -> Option<Predicate> {
    let pattern = regex::Regex::new(&regex::escape(identifier_type))
        .map_err(|error| tracing::warn!(identifier_type, %error, "unusable identifier pattern"))
        .ok()?;
    Some(Predicate::Regex {
        path: ClaimPath::parse("identifier"),
        pattern,
    })
}

/// Presence of a claim location.
pub fn exists(path: ClaimPath) -> Predicate {
    Predicate::Exists { path, exists: true }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value as Json};

    use super::*;
    use crate::core::scope_request::StructuredItem;

    fn constraints(value: Json) -> StructuredItem {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn compiles_meta_then_claims() {
        let item = constraints(json!({
            "identifier": "credential-cvc:Identity-v1",
            "constraints": {
                "meta": {
                    "issuer": { "is": { "$eq": "did:ethr:0xaf9482c84De4e2a961B98176C9f295F9b6008BfD" } },
                    "issued": { "is": { "$gte": "2018-01-01" } },
                    "expiry": { "is": { "$in": [1, 2] } }
                },
                "claims": [
                    { "path": "identity.name.givenNames", "is": { "$eq": "Joao" } },
                    { "path": "identity.age", "is": { "$gte": 21 } }
                ]
            }
        }));

        let compiled = CompiledItem::compile(item.constraints(), &ClaimPath::claim_root());
        assert_eq!(compiled.meta().len(), 2);
        assert!(matches!(
            &compiled.meta()[0],
            Predicate::Compare { path, .. } if path.to_string() == "issued"
        ));
        assert!(matches!(
            &compiled.meta()[1],
            Predicate::Equals { path, .. } if path.to_string() == "issuer"
        ));
        assert!(matches!(
            &compiled.claims()[1],
            Predicate::Operator { path, .. } if path.to_string() == "claim.identity.age"
        ));
        assert_eq!(compiled.predicates().len(), 4);
    }

    #[test]
    fn prefixes_grow_one_claim_at_a_time() {
        let item = StructuredItem::new("claim-cvc:Address.city-v1")
            .with_claim("city", Constraint::eq("Belo Horizonte"))
            .with_claim("country", Constraint::eq("BR"));
        let root = ClaimPath::parse("claim.address");
        let compiled = CompiledItem::compile(item.constraints(), &root);

        let sizes: Vec<usize> = compiled
            .prefixes()
            .iter()
            .map(|prefix| match prefix {
                Predicate::And(parts) => parts.len(),
                _ => 0,
            })
            .collect();
        assert_eq!(sizes, [1, 2]);

        assert_eq!(CompiledItem::default().prefixes().len(), 1);
    }

    #[test]
    fn identifier_pattern_is_escaped() {
        let pattern = identifier_pattern("cvc:Id.Document").unwrap();
        assert!(pattern.evaluate(&json!({ "identifier": "credential-cvc:Id.Document-v1" })));
        assert!(!pattern.evaluate(&json!({ "identifier": "credential-cvc:IdXDocument-v1" })));
    }
}
