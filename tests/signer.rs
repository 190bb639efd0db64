use pretty_assertions::assert_eq;
use scope_request::{
    config::{PartnerConfig, SigningKeys},
    core::scope_request::ScopeRequest,
    signer::{
        build_signed_request_body, canonical_bytes, verify, verify_signed_request_body,
        RequestSigner, Secp256k1Signer, SignatureError, SignedRequestBody, ES256,
    },
};
use serde_json::{json, Value as Json};

const PARTNER_XPUB: &str = "04378df3e480e626541daec66c4bbad532430d28e1ecb6b70a03313fc07fbad5c0d8b26410eac8f0b1a448898cbed9d714fd9cab2a8d1a7885bfbb48bd673da03c";
const PARTNER_XPRV: &str = "f728fed0153f3b46a0fccdd9ed9954ad56fd4e8af016fe59075655aa9feb9a59";

fn partner() -> PartnerConfig {
    PartnerConfig {
        id: "partner-1".to_owned(),
        signing_keys: SigningKeys {
            xpub: PARTNER_XPUB.to_owned(),
            xprv: PARTNER_XPRV.to_owned(),
        },
    }
}

fn request() -> ScopeRequest {
    serde_json::from_str(include_str!("fixtures/requests/complexUnresolvedRequest.json")).unwrap()
}

#[tokio::test]
async fn signed_body_verifies() {
    let signer = Secp256k1Signer::generate();
    let body = build_signed_request_body(&request(), &signer).await.unwrap();

    assert_eq!(body.algorithm.as_deref(), Some(ES256));
    assert_eq!(body.xpub, Some(signer.xpub()));
    assert_eq!(body.payload.as_ref().unwrap()["id"], "456");

    assert!(verify_signed_request_body(&body, None).unwrap());
    assert!(verify_signed_request_body(&body, Some(&signer.xpub())).unwrap());

    let payload = body.payload.clone().unwrap();
    assert_eq!(ScopeRequest::try_from(payload).unwrap(), request());
}

#[tokio::test]
async fn body_survives_transport() {
    let signer = Secp256k1Signer::generate();
    let body = build_signed_request_body(&request(), &signer).await.unwrap();

    let wire = serde_json::to_string(&body).unwrap();
    let fields: Json = serde_json::from_str(&wire).unwrap();
    for field in ["payload", "signature", "algorithm", "xpub"] {
        assert!(fields.get(field).is_some(), "{field} missing");
    }

    let received: SignedRequestBody = serde_json::from_str(&wire).unwrap();
    assert!(verify_signed_request_body(&received, Some(&signer.xpub())).unwrap());
}

#[tokio::test]
async fn pinned_key_must_match() {
    let signer = Secp256k1Signer::generate();
    let other = Secp256k1Signer::generate();
    let body = build_signed_request_body(&request(), &signer).await.unwrap();

    let error = verify_signed_request_body(&body, Some(&other.xpub())).unwrap_err();
    assert!(matches!(error, SignatureError::PublicKeyMismatch));
    assert_eq!(error.to_string(), "Request public key not match");
}

#[tokio::test]
async fn tampered_payload_does_not_verify() {
    let signer = Secp256k1Signer::generate();
    let mut body = build_signed_request_body(&request(), &signer).await.unwrap();
    body.payload.as_mut().unwrap()["authentication"] = json!(true);

    assert!(!verify_signed_request_body(&body, None).unwrap());
}

#[tokio::test]
async fn incomplete_bodies_are_rejected() {
    let signer = Secp256k1Signer::generate();
    let body = build_signed_request_body(&request(), &signer).await.unwrap();

    let no_payload = SignedRequestBody {
        payload: None,
        ..body.clone()
    };
    assert_eq!(
        verify_signed_request_body(&no_payload, None)
            .unwrap_err()
            .to_string(),
        "Request must have a payload object"
    );

    let not_an_object = SignedRequestBody {
        payload: Some(json!("456")),
        ..body.clone()
    };
    assert!(matches!(
        verify_signed_request_body(&not_an_object, None),
        Err(SignatureError::MissingPayload)
    ));

    let no_signature = SignedRequestBody {
        signature: None,
        ..body.clone()
    };
    assert_eq!(
        verify_signed_request_body(&no_signature, None)
            .unwrap_err()
            .to_string(),
        "Request must have a signature"
    );

    let no_key = SignedRequestBody {
        xpub: None,
        ..body.clone()
    };
    assert_eq!(
        verify_signed_request_body(&no_key, None)
            .unwrap_err()
            .to_string(),
        "Request must have a public key"
    );

    let other_algorithm = SignedRequestBody {
        algorithm: Some("ES256K".to_owned()),
        ..body
    };
    assert!(matches!(
        verify_signed_request_body(&other_algorithm, None),
        Err(SignatureError::UnsupportedAlgorithm(alg)) if alg == "ES256K"
    ));
}

#[tokio::test]
async fn existing_partner_keys_sign_and_verify() {
    let signer = Secp256k1Signer::from_partner(&partner()).unwrap();
    assert_eq!(signer.xpub(), PARTNER_XPUB);
    assert_eq!(signer.xprv(), PARTNER_XPRV);

    let message = json!({ "zhed": 200, "hello": "world", "alpha": "beta" });
    let signature = hex::encode(signer.sign(&canonical_bytes(&message).unwrap()).await);
    assert_eq!(signature.len(), 128);

    assert!(verify(&message, &signature, PARTNER_XPUB).unwrap());
    assert!(verify(&message, &signature, &PARTNER_XPUB[2..]).unwrap());
    assert!(!verify(&json!({ "zhed": 201 }), &signature, PARTNER_XPUB).unwrap());

    let body = build_signed_request_body(&request(), &signer).await.unwrap();
    assert!(verify_signed_request_body(&body, Some(PARTNER_XPUB)).unwrap());
}
