//! Signed request bodies.
//!
//! A scope request is signed over its canonical JSON form (object keys sorted
//! recursively, no insignificant whitespace) with ECDSA over secp256k1 and
//! SHA-256. The algorithm tag on the wire is `ES256`. Signatures are the hex
//! encoded 64 byte `r || s`; public keys are SEC1 uncompressed points, accepted
//! with or without the leading `04` tag.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::{config::PartnerConfig, core::scope_request::ScopeRequest};

pub const ES256: &str = "ES256";

#[async_trait]
pub trait RequestSigner: Send + Sync {
    /// The algorithm that will be used to sign.
    fn alg(&self) -> &str;
    /// Hex encoded SEC1 public key of the signer.
    fn xpub(&self) -> String;
    async fn sign(&self, payload: &[u8]) -> Vec<u8>;
}

#[derive(Debug)]
pub struct Secp256k1Signer {
    key: SigningKey,
}

impl Secp256k1Signer {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn generate() -> Self {
        Self::new(SigningKey::random(&mut OsRng))
    }

    /// From a hex encoded 32 byte private scalar.
    pub fn from_hex(xprv: &str) -> Result<Self> {
        let bytes = hex::decode(xprv.trim()).context("private key is not hex")?;
        let key = SigningKey::from_slice(&bytes).context("invalid secp256k1 private key")?;
        Ok(Self::new(key))
    }

    pub fn from_partner(partner: &PartnerConfig) -> Result<Self> {
        let signer = Self::from_hex(&partner.signing_keys.xprv)
            .with_context(|| format!("signing keys of partner {}", partner.id))?;
        if !partner.signing_keys.xpub.is_empty()
            && !same_public_key(&partner.signing_keys.xpub, &signer.xpub())
        {
            anyhow::bail!("partner public key does not belong to its private key");
        }
        Ok(signer)
    }

    pub fn xprv(&self) -> String {
        hex::encode(self.key.to_bytes())
    }
}

#[async_trait]
impl RequestSigner for Secp256k1Signer {
    fn alg(&self) -> &str {
        ES256
    }

    fn xpub(&self) -> String {
        hex::encode(self.key.verifying_key().to_encoded_point(false).as_bytes())
    }

    async fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let sig: Signature = self.key.sign(payload);
        sig.to_vec()
    }
}

/// A request as posted to a holder.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SignedRequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpub: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Request must have a payload object")]
    MissingPayload,
    #[error("Request must have a signature")]
    MissingSignature,
    #[error("Request must have a public key")]
    MissingPublicKey,
    /// The body was signed by a key other than the pinned one.
    #[error("Request public key not match")]
    PublicKeyMismatch,
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),
}

/// Serializes `document` with object keys sorted at every level.
pub fn canonical_bytes<T: Serialize>(document: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(document)?;
    serde_json::to_vec(&sort_keys(value))
}

fn sort_keys(value: Json) -> Json {
    match value {
        Json::Object(map) => {
            let sorted: BTreeMap<String, Json> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Json::Object(sorted.into_iter().collect())
        }
        Json::Array(items) => Json::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

pub async fn build_signed_request_body(
    request: &ScopeRequest,
    signer: &dyn RequestSigner,
) -> Result<SignedRequestBody> {
    let payload = serde_json::to_value(request).context("unable to serialize scope request")?;
    let message = canonical_bytes(&payload).context("unable to canonicalize scope request")?;
    let signature = signer.sign(&message).await;

    tracing::debug!(id = request.id(), alg = signer.alg(), "signed scope request");

    Ok(SignedRequestBody {
        payload: Some(payload),
        signature: Some(hex::encode(signature)),
        algorithm: Some(signer.alg().to_owned()),
        xpub: Some(signer.xpub()),
    })
}

/// Checks a body's signature. When `pinned_xpub` is given the body must have
/// been signed by that key.
///
/// A well-formed signature that does not verify yields `Ok(false)`.
pub fn verify_signed_request_body(
    body: &SignedRequestBody,
    pinned_xpub: Option<&str>,
) -> Result<bool, SignatureError> {
    let payload = body
        .payload
        .as_ref()
        .filter(|payload| payload.is_object())
        .ok_or(SignatureError::MissingPayload)?;
    let signature = body
        .signature
        .as_deref()
        .ok_or(SignatureError::MissingSignature)?;
    let xpub = body
        .xpub
        .as_deref()
        .ok_or(SignatureError::MissingPublicKey)?;

    if let Some(pinned) = pinned_xpub {
        if !same_public_key(pinned, xpub) {
            return Err(SignatureError::PublicKeyMismatch);
        }
    }
    if let Some(algorithm) = body.algorithm.as_deref() {
        if algorithm != ES256 {
            return Err(SignatureError::UnsupportedAlgorithm(algorithm.to_owned()));
        }
    }

    verify(payload, signature, xpub)
}

/// Verifies a hex signature over the canonical form of `document`.
pub fn verify(document: &Json, signature: &str, xpub: &str) -> Result<bool, SignatureError> {
    let key = verifying_key(xpub)?;
    let bytes =
        hex::decode(signature).map_err(|e| SignatureError::InvalidSignature(e.to_string()))?;
    let signature =
        Signature::from_slice(&bytes).map_err(|e| SignatureError::InvalidSignature(e.to_string()))?;
    // Signers other than this crate do not always emit low-S signatures.
    let signature = signature.normalize_s().unwrap_or(signature);
    let message =
        canonical_bytes(document).map_err(|e| SignatureError::InvalidSignature(e.to_string()))?;
    Ok(key.verify(&message, &signature).is_ok())
}

fn verifying_key(xpub: &str) -> Result<VerifyingKey, SignatureError> {
    let bytes = sec1_bytes(xpub).map_err(SignatureError::InvalidPublicKey)?;
    VerifyingKey::from_sec1_bytes(&bytes).map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))
}

/// Public key bytes with the uncompressed point tag restored if missing.
fn sec1_bytes(xpub: &str) -> Result<Vec<u8>, String> {
    let bytes = hex::decode(xpub.trim()).map_err(|e| e.to_string())?;
    if bytes.len() == 64 {
        let mut tagged = Vec::with_capacity(65);
        tagged.push(0x04);
        tagged.extend(bytes);
        return Ok(tagged);
    }
    Ok(bytes)
}

fn same_public_key(a: &str, b: &str) -> bool {
    match (sec1_bytes(a), sec1_bytes(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
