//! This library provides a Rust implementation of Dynamic Scope Requests: a
//! requester describes which credentials or claims it wants, under which
//! constraints, and a holder resolves that description against the
//! credentials it has.
//!
//! # Requester Usage
//!
//! Requests are built with [`ScopeRequest::builder`], which fills channels and
//! requester details from a [`Config`] and validates the result:
//!
//! ```ignore
//! use scope_request::config::Config;
//! use scope_request::core::constraint::{Constraint, Operator};
//! use scope_request::core::registry::StaticRegistry;
//! use scope_request::core::scope_request::{
//!     MetaConstraints, ScopeRequest, ScopeRequestBuilder, StructuredItem,
//! };
//! use scope_request::signer::{build_signed_request_body, Secp256k1Signer};
//!
//! let config = Config::discover()?;
//! let registry = StaticRegistry::builtin();
//!
//! let item = StructuredItem::new("claim-cvc:Document.dateOfBirth-v1")
//!     .with_meta(MetaConstraints::new().with_issuer(Constraint::eq(issuer_did)))
//!     .with_claim("dateOfBirth", Constraint::new(Operator::Lte, "-21y"));
//!
//! let request = ScopeRequest::builder(ScopeRequestBuilder::random_id())
//!     .with_credential_item(item)
//!     .build(&config, &registry)?;
//!
//! // Sign it for transport.
//! let signer = Secp256k1Signer::from_partner(&config.partner)?;
//! let body = build_signed_request_body(&request, &signer).await?;
//! ```
//!
//! # Holder Usage
//!
//! Holders verify the body, then resolve the request against their
//! credentials with a [`Resolver`]:
//!
//! ```ignore
//! use scope_request::resolver::Resolver;
//! use scope_request::signer::verify_signed_request_body;
//!
//! if !verify_signed_request_body(&body, Some(&known_requester_xpub))? {
//!     bail!("request signature does not verify");
//! }
//! let request = ScopeRequest::try_from(body.payload.unwrap_or_default())?;
//!
//! let resolver = Resolver::default();
//! let selected = resolver.resolve(&request, &credentials);
//! for credential in selected.credentials() {
//!     // Offer `credential` to the user.
//! }
//!
//! // Or check that a presentation answers the request.
//! let satisfied = resolver.matches(&request, &presented, true)?;
//! ```
//!
//! Claim identifiers are resolved through a [`ClaimRegistry`]. The built-in
//! [`StaticRegistry`] carries the `cvc` vocabulary and can be extended.
//!
//! [`ScopeRequest::builder`]: crate::core::scope_request::ScopeRequest::builder
//! [`Config`]: crate::config::Config
//! [`Resolver`]: crate::resolver::Resolver
//! [`ClaimRegistry`]: crate::core::registry::ClaimRegistry
//! [`StaticRegistry`]: crate::core::registry::StaticRegistry
//!
//! # Resolution Modes
//!
//! - **strict** (the default, also accepted as `advanced`): the flat list of
//!   every credential satisfying all constraints of an item, concatenated
//!   over items.
//! - **simple**: a partition into `credentials` that pass and
//!   `failedConstraints` that failed some constraint along the way.
//!
//! See the [`resolver`] module for the full algorithm.

pub mod config;
pub mod core;
pub mod credential;
pub mod resolver;
pub mod schema;
pub mod signer;

pub use crate::core::claim_path::ClaimPath;
