use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value as Json;
use url::Url;

use super::{
    constraint::{Constraint, Operator},
    identifier::{GlobalIdentifier, IdentifierKind},
    registry::ClaimRegistry,
    scope_request::{
        AggregateFilter, Channels, CredentialItem, StructuredItem, AGGREGATE_FILTERS,
        EVIDENCE_CHANNELS,
    },
};
use crate::config::{AppConfig, PartnerConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("uniqueId is required")]
    MissingUniqueId,
    #[error("{0} is not valid CredentialItem identifier")]
    InvalidIdentifier(String),
    #[error("CredentialItem identifier is required")]
    MissingIdentifier,
    #[error("The META issuer constraint is required")]
    MissingIssuer,
    #[error("{0} is not a valid issuer")]
    InvalidIssuer(String),
    #[error("Cannot ask for Claims and also have the flag noClaims equals true")]
    NoClaimsWithClaims,
    #[error("Claim path is required")]
    MissingClaimPath,
    #[error("Claim constraint is required")]
    MissingClaimConstraint,
    #[error("Invalid Constraint Object - only one operator is allowed")]
    MultipleOperators,
    #[error("Invalid Constraint Object - {0} is not a valid operator")]
    InvalidOperator(String),
    #[error("Invalid Constraint Object - a constraint value is required")]
    MissingConstraintValue,
    #[error("Invalid Aggregate Object - only one filter is allowed")]
    MultipleAggregateFilters,
    #[error("Invalid Aggregate Object - {0} is not a valid filter")]
    InvalidAggregateFilter(String),
    #[error("eventsURL is required")]
    MissingEventsUrl,
    /// Channel and logo URLs must be HTTPS unless they point at the local host.
    #[error("only HTTPS is supported for {0}")]
    InsecureUrl(String),
    #[error("{0} is not a valid evidence channel")]
    UnknownEvidenceChannel(String),
    #[error("evidence {0} method must be put or post")]
    InvalidEvidenceMethod(String),
    #[error("evidence {0} url is required")]
    MissingEvidenceUrl(String),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("Partner public and private signing keys are required")]
    MissingSigningKeys,
    #[error("unable to derive channel url: {0}")]
    ChannelUrl(String),
}

pub fn validate_credential_items(
    items: &[CredentialItem],
    registry: &dyn ClaimRegistry,
) -> Result<(), ValidationError> {
    for item in items {
        match item {
            CredentialItem::Bare(identifier) => {
                if !is_valid_identifier(identifier, registry) {
                    return Err(ValidationError::InvalidIdentifier(identifier.clone()));
                }
            }
            CredentialItem::Structured(item) => validate_structured_item(item, registry)?,
        }
    }
    Ok(())
}

fn validate_structured_item(
    item: &StructuredItem,
    registry: &dyn ClaimRegistry,
) -> Result<(), ValidationError> {
    if item.identifier().is_empty() {
        return Err(ValidationError::MissingIdentifier);
    }
    if !is_valid_identifier(item.identifier(), registry) {
        return Err(ValidationError::InvalidIdentifier(
            item.identifier().to_owned(),
        ));
    }

    if let Some(constraints) = item.constraints() {
        let meta = constraints.meta().ok_or(ValidationError::MissingIssuer)?;
        let issuer = meta.issuer().ok_or(ValidationError::MissingIssuer)?;
        match issuer.as_map().get(Operator::Eq.as_str()) {
            Some(Json::String(did)) if is_valid_issuer(did) => {}
            Some(other) => return Err(ValidationError::InvalidIssuer(other.to_string())),
            None => return Err(ValidationError::InvalidIssuer("missing".to_owned())),
        }

        if meta.no_claims() && constraints.has_claims() {
            return Err(ValidationError::NoClaimsWithClaims);
        }

        for constraint in [meta.issued(), meta.expiry()].into_iter().flatten() {
            validate_constraint(constraint)?;
        }

        for claim in constraints.claims() {
            if claim.path().is_empty() {
                return Err(ValidationError::MissingClaimPath);
            }
            if claim.constraint().is_empty() {
                return Err(ValidationError::MissingClaimConstraint);
            }
            validate_constraint(claim.constraint())?;
        }
    }

    for filter in item.aggregate() {
        validate_aggregate(filter)?;
    }
    Ok(())
}

/// A constraint has exactly one known operator with a non-null operand.
pub fn validate_constraint(constraint: &Constraint) -> Result<(), ValidationError> {
    if constraint.len() > 1 {
        return Err(ValidationError::MultipleOperators);
    }
    let token = constraint.operator_token().unwrap_or_default();
    if constraint.operator().is_none() {
        return Err(ValidationError::InvalidOperator(token.to_owned()));
    }
    if constraint.operand().is_none() {
        return Err(ValidationError::MissingConstraintValue);
    }
    Ok(())
}

pub fn validate_aggregate(filter: &AggregateFilter) -> Result<(), ValidationError> {
    if filter.as_map().len() > 1 {
        return Err(ValidationError::MultipleAggregateFilters);
    }
    match filter.as_map().keys().next() {
        Some(name) if AGGREGATE_FILTERS.contains(&name.as_str()) => Ok(()),
        Some(name) => Err(ValidationError::InvalidAggregateFilter(name.clone())),
        None => Err(ValidationError::InvalidAggregateFilter(String::new())),
    }
}

/// Grammar check plus registry membership for the identifier's kind.
pub fn is_valid_identifier(identifier: &str, registry: &dyn ClaimRegistry) -> bool {
    let Some(parsed) = GlobalIdentifier::parse(identifier) else {
        return false;
    };
    if !parsed.has_valid_version() {
        return false;
    }
    match parsed.kind() {
        IdentifierKind::Credential => registry.is_known_credential(parsed.identifier_type()),
        IdentifierKind::Claim => registry.is_known_claim(parsed.identifier_type()),
    }
}

/// Generic DID syntax; `did:ethr` identifiers must carry a 20 byte address.
pub fn is_valid_issuer(issuer: &str) -> bool {
    static DID: OnceLock<Option<Regex>> = OnceLock::new();
    static ETHR: OnceLock<Option<Regex>> = OnceLock::new();

    let did = DID.get_or_init(|| Regex::new(r"^did:[a-z0-9]+:[A-Za-z0-9._%:-]+$").ok());
    let ethr = ETHR.get_or_init(|| Regex::new(r"^did:ethr:0x[0-9a-fA-F]{40}$").ok());

    match (did, ethr) {
        (Some(did), Some(ethr)) => {
            if issuer.starts_with("did:ethr:") {
                ethr.is_match(issuer)
            } else {
                did.is_match(issuer)
            }
        }
        _ => false,
    }
}

pub fn validate_channels(channels: &Channels) -> Result<(), ValidationError> {
    let events = channels
        .events_url()
        .ok_or(ValidationError::MissingEventsUrl)?;
    require_https(events, "eventsURL")?;
    if let Some(payload) = channels.payload_url() {
        require_https(payload, "payloadURL")?;
    }

    for (name, channel) in channels.evidences() {
        if !EVIDENCE_CHANNELS.contains(&name) {
            return Err(ValidationError::UnknownEvidenceChannel(name.to_owned()));
        }
        let method = channel.method().unwrap_or_default().to_ascii_lowercase();
        if method != "put" && method != "post" {
            return Err(ValidationError::InvalidEvidenceMethod(name.to_owned()));
        }
        let url = channel
            .url()
            .ok_or_else(|| ValidationError::MissingEvidenceUrl(name.to_owned()))?;
        require_https(url, name)?;
    }
    Ok(())
}

pub fn validate_app(app: &AppConfig) -> Result<(), ValidationError> {
    let required = [
        (&app.id, "app.id"),
        (&app.name, "app.name"),
        (&app.logo, "app.logo"),
    ];
    for (value, field) in required {
        if value.is_empty() {
            return Err(ValidationError::MissingField(field));
        }
    }

    match Url::parse(&app.logo) {
        Ok(logo) => require_https(&logo, "app.logo")?,
        Err(_) => return Err(ValidationError::InsecureUrl("app.logo".to_owned())),
    }

    let required = [
        (&app.description, "app.description"),
        (&app.primary_color, "app.primaryColor"),
        (&app.secondary_color, "app.secondaryColor"),
    ];
    for (value, field) in required {
        if value.is_empty() {
            return Err(ValidationError::MissingField(field));
        }
    }
    Ok(())
}

pub fn validate_partner(partner: &PartnerConfig) -> Result<(), ValidationError> {
    if partner.id.is_empty() {
        return Err(ValidationError::MissingField("partner.id"));
    }
    if partner.signing_keys.xpub.is_empty() || partner.signing_keys.xprv.is_empty() {
        return Err(ValidationError::MissingSigningKeys);
    }
    Ok(())
}

fn require_https(url: &Url, field: &str) -> Result<(), ValidationError> {
    let local = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"));
    if url.scheme() == "https" || local {
        Ok(())
    } else {
        Err(ValidationError::InsecureUrl(field.to_owned()))
    }
}
