use std::{borrow::Cow, collections::BTreeMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

use super::{
    constraint::Constraint,
    registry::ClaimRegistry,
    validation::{self, ValidationError},
};
use crate::config::{AppConfig, Config, PartnerConfig};

pub const SCOPE_REQUEST_VERSION: &str = "1";

/// How the resolver reports results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// A flat list of every credential satisfying all constraints.
    #[default]
    #[serde(alias = "advanced")]
    Strict,
    /// A partition into passing credentials and those failing a constraint.
    Simple,
}

/// A Dynamic Scope Request: what a requester asks a holder to share.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRequest {
    #[serde(default = "default_version")]
    version: String,
    id: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default = "default_authentication")]
    authentication: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<ResolutionMode>,
    #[serde(default)]
    credential_items: Vec<CredentialItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channels: Option<Channels>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requester_info: Option<RequesterInfo>,
}

fn default_version() -> String {
    SCOPE_REQUEST_VERSION.to_owned()
}

fn default_authentication() -> bool {
    true
}

impl ScopeRequest {
    pub fn builder(id: impl Into<String>) -> ScopeRequestBuilder {
        ScopeRequestBuilder::new(id.into())
    }

    /// A request carrying only credential items, for resolution. No validation
    /// is applied.
    pub fn from_items(id: impl Into<String>, credential_items: Vec<CredentialItem>) -> Self {
        Self {
            version: default_version(),
            id: id.into(),
            timestamp: String::new(),
            authentication: true,
            mode: None,
            credential_items,
            channels: None,
            requester_info: None,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn authentication(&self) -> bool {
        self.authentication
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode.unwrap_or_default()
    }

    pub fn set_mode(&mut self, mode: Option<ResolutionMode>) {
        self.mode = mode;
    }

    pub fn with_mode(mut self, mode: ResolutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn credential_items(&self) -> &[CredentialItem] {
        &self.credential_items
    }

    pub fn credential_items_mut(&mut self) -> &mut Vec<CredentialItem> {
        &mut self.credential_items
    }

    pub fn channels(&self) -> Option<&Channels> {
        self.channels.as_ref()
    }

    pub fn requester_info(&self) -> Option<&RequesterInfo> {
        self.requester_info.as_ref()
    }
}

impl TryFrom<Json> for ScopeRequest {
    type Error = serde_json::Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        serde_json::from_value(value)
    }
}

/// One requested credential or claim: either a bare global identifier or a
/// structured item with constraints.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CredentialItem {
    Bare(String),
    Structured(StructuredItem),
}

impl CredentialItem {
    pub fn bare(identifier: impl Into<String>) -> Self {
        Self::Bare(identifier.into())
    }

    pub fn identifier(&self) -> &str {
        match self {
            Self::Bare(identifier) => identifier,
            Self::Structured(item) => item.identifier(),
        }
    }

    /// Both shapes as a structured item.
    pub fn normalized(&self) -> Cow<'_, StructuredItem> {
        match self {
            Self::Bare(identifier) => Cow::Owned(StructuredItem::new(identifier.clone())),
            Self::Structured(item) => Cow::Borrowed(item),
        }
    }
}

impl From<StructuredItem> for CredentialItem {
    fn from(item: StructuredItem) -> Self {
        Self::Structured(item)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredItem {
    #[serde(default)]
    identifier: String,
    /// The credential type expected to carry a requested claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credential: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    constraints: Option<ItemConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aggregate: Option<Vec<AggregateFilter>>,
}

impl StructuredItem {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_meta(mut self, meta: MetaConstraints) -> Self {
        self.constraints.get_or_insert_with(Default::default).meta = Some(meta);
        self
    }

    pub fn with_claim(mut self, path: impl Into<String>, is: Constraint) -> Self {
        self.constraints
            .get_or_insert_with(Default::default)
            .claims
            .get_or_insert_with(Vec::new)
            .push(ClaimConstraint::new(path, is));
        self
    }

    pub fn with_aggregate(mut self, filter: AggregateFilter) -> Self {
        self.aggregate.get_or_insert_with(Vec::new).push(filter);
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The credential tag, from the item or from its meta constraints.
    pub fn credential_tag(&self) -> Option<&str> {
        self.credential
            .as_deref()
            .or_else(|| self.meta().and_then(MetaConstraints::credential))
    }

    pub fn constraints(&self) -> Option<&ItemConstraints> {
        self.constraints.as_ref()
    }

    pub fn meta(&self) -> Option<&MetaConstraints> {
        self.constraints.as_ref().and_then(|c| c.meta.as_ref())
    }

    pub fn claims(&self) -> &[ClaimConstraint] {
        self.constraints
            .as_ref()
            .and_then(|c| c.claims.as_deref())
            .unwrap_or_default()
    }

    pub fn aggregate(&self) -> &[AggregateFilter] {
        self.aggregate.as_deref().unwrap_or_default()
    }

    /// Items with aggregate filters but no constraints take no part in
    /// resolution.
    pub fn is_aggregate_only(&self) -> bool {
        self.aggregate.is_some() && self.constraints.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ItemConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<MetaConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    claims: Option<Vec<ClaimConstraint>>,
}

impl ItemConstraints {
    pub fn meta(&self) -> Option<&MetaConstraints> {
        self.meta.as_ref()
    }

    pub fn claims(&self) -> &[ClaimConstraint] {
        self.claims.as_deref().unwrap_or_default()
    }

    pub fn has_claims(&self) -> bool {
        self.claims.is_some()
    }
}

/// Constraints on credential metadata rather than claim values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issuer: Option<MetaConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issued: Option<MetaConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<MetaConstraint>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    no_claims: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credential: Option<String>,
}

impl MetaConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issuer(mut self, is: Constraint) -> Self {
        self.issuer = Some(MetaConstraint { is });
        self
    }

    pub fn with_issued(mut self, is: Constraint) -> Self {
        self.issued = Some(MetaConstraint { is });
        self
    }

    pub fn with_expiry(mut self, is: Constraint) -> Self {
        self.expiry = Some(MetaConstraint { is });
        self
    }

    pub fn with_no_claims(mut self, no_claims: bool) -> Self {
        self.no_claims = no_claims;
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn issuer(&self) -> Option<&Constraint> {
        self.issuer.as_ref().map(|m| &m.is)
    }

    pub fn issued(&self) -> Option<&Constraint> {
        self.issued.as_ref().map(|m| &m.is)
    }

    pub fn expiry(&self) -> Option<&Constraint> {
        self.expiry.as_ref().map(|m| &m.is)
    }

    pub fn no_claims(&self) -> bool {
        self.no_claims
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MetaConstraint {
    #[serde(default)]
    is: Constraint,
}

/// A constraint on one claim, `path` relative to the claim's namespace.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ClaimConstraint {
    #[serde(default)]
    path: String,
    #[serde(default)]
    is: Constraint,
}

impl ClaimConstraint {
    pub fn new(path: impl Into<String>, is: Constraint) -> Self {
        Self {
            path: path.into(),
            is,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn constraint(&self) -> &Constraint {
        &self.is
    }
}

/// Aggregate filters accepted on an item.
pub const AGGREGATE_FILTERS: [&str; 6] = ["$limit", "$max", "$min", "$first", "$last", "$sort"];

/// A post-selection filter such as `{ "$limit": 1 }`. Carried on the request,
/// never applied by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AggregateFilter(Map<String, Json>);

impl AggregateFilter {
    pub fn new(filter: impl Into<String>, value: impl Into<Json>) -> Self {
        let mut map = Map::new();
        map.insert(filter.into(), value.into());
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Json> {
        &self.0
    }
}

/// Where the holder posts events, the payload and evidences.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Channels {
    #[serde(rename = "eventsURL", default, skip_serializing_if = "Option::is_none")]
    events_url: Option<Url>,
    #[serde(rename = "payloadURL", default, skip_serializing_if = "Option::is_none")]
    payload_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    evidences: Option<BTreeMap<String, EvidenceChannel>>,
}

impl Channels {
    pub fn new(events_url: Url) -> Self {
        Self {
            events_url: Some(events_url),
            ..Default::default()
        }
    }

    pub fn with_payload_url(mut self, payload_url: Url) -> Self {
        self.payload_url = Some(payload_url);
        self
    }

    pub fn with_evidence(mut self, name: impl Into<String>, channel: EvidenceChannel) -> Self {
        self.evidences
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), channel);
        self
    }

    pub fn events_url(&self) -> Option<&Url> {
        self.events_url.as_ref()
    }

    pub fn payload_url(&self) -> Option<&Url> {
        self.payload_url.as_ref()
    }

    pub fn evidences(&self) -> impl Iterator<Item = (&str, &EvidenceChannel)> {
        self.evidences
            .iter()
            .flatten()
            .map(|(name, channel)| (name.as_str(), channel))
    }
}

/// Evidence channel names.
pub const EVIDENCE_CHANNELS: [&str; 3] = ["idDocumentFront", "idDocumentBack", "selfie"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EvidenceChannel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    accepts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization: Option<String>,
}

impl EvidenceChannel {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: Some(method.into()),
            url: Some(url),
            ..Default::default()
        }
    }

    pub fn with_accepts(mut self, accepts: impl Into<String>) -> Self {
        self.accepts = Some(accepts.into());
        self
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    pub fn accepts(&self) -> Option<&str> {
        self.accepts.as_deref()
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterInfo {
    app: AppConfig,
    requester_id: String,
}

impl RequesterInfo {
    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    pub fn requester_id(&self) -> &str {
        &self.requester_id
    }
}

/// Builds and validates a [`ScopeRequest`], filling gaps from [`Config`].
#[derive(Debug, Clone)]
pub struct ScopeRequestBuilder {
    id: String,
    credential_items: Vec<CredentialItem>,
    channels: Option<Channels>,
    app: Option<AppConfig>,
    partner: Option<PartnerConfig>,
    authentication: bool,
    mode: Option<ResolutionMode>,
}

impl ScopeRequestBuilder {
    fn new(id: String) -> Self {
        Self {
            id,
            credential_items: Vec::new(),
            channels: None,
            app: None,
            partner: None,
            authentication: true,
            mode: None,
        }
    }

    /// A fresh request id.
    pub fn random_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn with_credential_items(mut self, items: impl IntoIterator<Item = CredentialItem>) -> Self {
        self.credential_items.extend(items);
        self
    }

    pub fn with_credential_item(mut self, item: impl Into<CredentialItem>) -> Self {
        self.credential_items.push(item.into());
        self
    }

    pub fn with_channels(mut self, channels: Channels) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_app(mut self, app: AppConfig) -> Self {
        self.app = Some(app);
        self
    }

    pub fn with_partner(mut self, partner: PartnerConfig) -> Self {
        self.partner = Some(partner);
        self
    }

    pub fn with_authentication(mut self, authentication: bool) -> Self {
        self.authentication = authentication;
        self
    }

    pub fn with_mode(mut self, mode: ResolutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn build(
        self,
        config: &Config,
        registry: &dyn ClaimRegistry,
    ) -> Result<ScopeRequest, ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingUniqueId);
        }
        validation::validate_credential_items(&self.credential_items, registry)?;

        let channels = match self.channels {
            Some(channels) => channels,
            None => default_channels(&self.id, config)?,
        };
        validation::validate_channels(&channels)?;

        let app = self.app.unwrap_or_else(|| config.app.clone());
        validation::validate_app(&app)?;

        let partner = self.partner.unwrap_or_else(|| config.partner.clone());
        validation::validate_partner(&partner)?;

        tracing::debug!(
            id = %self.id,
            items = self.credential_items.len(),
            "built scope request"
        );

        Ok(ScopeRequest {
            version: default_version(),
            id: self.id,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            authentication: self.authentication,
            mode: self.mode,
            credential_items: self.credential_items,
            channels: Some(channels),
            requester_info: Some(RequesterInfo {
                app,
                requester_id: partner.id,
            }),
        })
    }
}

fn default_channels(id: &str, config: &Config) -> Result<Channels, ValidationError> {
    let Some(events) = &config.channels.base_events_url else {
        return Err(ValidationError::MissingEventsUrl);
    };
    let events_url = events
        .for_request(id)
        .map_err(|e| ValidationError::ChannelUrl(e.to_string()))?;
    let payload_url = config
        .channels
        .base_payload_url
        .as_ref()
        .map(|base| base.for_request(id))
        .transpose()
        .map_err(|e| ValidationError::ChannelUrl(e.to_string()))?;

    Ok(Channels {
        events_url: Some(events_url),
        payload_url,
        evidences: None,
    })
}
