//! Commit signing with gpg-generated ed25519 keys.

use pgp::composed::{Deserializable, SignedPublicKey, StandaloneSignature};

use codeowners_sync_core::errors::SigningError;
use codeowners_sync_core::signing::{CommitPayload, Signer};

fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {path}: {e}"))
}

fn payload() -> String {
    CommitPayload {
        tree: "9bb3a4a1f4f3a1c2e5d0f1a2b3c4d5e6f7a8b9c0".into(),
        parent: "0123456789abcdef0123456789abcdef01234567".into(),
        author_name: "Codeowners Test".into(),
        author_email: "codeowners-test@example.com".into(),
        timestamp: 1_718_000_000,
        message: "Adding CODEOWNERS file".into(),
    }
    .to_string()
}

fn verify(armored_signature: &str, data: &str) -> bool {
    let (public, _) = SignedPublicKey::from_string(&fixture("signing-key.pub.asc")).unwrap();
    let (signature, _) = StandaloneSignature::from_string(armored_signature).unwrap();
    signature.verify(&public, data.as_bytes()).is_ok()
}

#[test]
fn test_signature_verifies_over_payload() {
    let data = payload();
    let signature = Signer::from_armored(&fixture("signing-key.asc"), "")
        .unwrap()
        .sign(&data)
        .unwrap();

    assert!(signature.starts_with("-----BEGIN PGP SIGNATURE-----"));
    assert!(signature.trim_end().ends_with("-----END PGP SIGNATURE-----"));
    assert!(verify(&signature, &data));
}

#[test]
fn test_signature_does_not_verify_other_payload() {
    let data = payload();
    let signature = Signer::from_armored(&fixture("signing-key.asc"), "")
        .unwrap()
        .sign(&data)
        .unwrap();
    let tampered = data.replace("Adding", "Deleting");
    assert!(!verify(&signature, &tampered));
}

#[test]
fn test_unencrypted_key_ignores_passphrase() {
    let signer = Signer::from_armored(&fixture("signing-key.asc"), "anything").unwrap();
    assert_eq!(signer.key_id(), "2F4CACDEB64399EB");
}

#[test]
fn test_locked_key_with_passphrase() {
    let signer = Signer::from_armored(&fixture("signing-key-locked.asc"), "correct horse").unwrap();
    assert_eq!(signer.key_id(), "6364F36712215DFF");
    let signature = signer.sign(&payload()).unwrap();
    assert!(signature.contains("BEGIN PGP SIGNATURE"));
}

#[test]
fn test_locked_key_wrong_passphrase() {
    let err = Signer::from_armored(&fixture("signing-key-locked.asc"), "wrong horse").unwrap_err();
    assert!(matches!(err, SigningError::DecryptionFailed(_)));
}

#[test]
fn test_public_key_is_not_a_signing_key() {
    let err = Signer::from_armored(&fixture("signing-key.pub.asc"), "").unwrap_err();
    assert!(matches!(err, SigningError::InvalidKey(_)));
}

#[test]
fn test_debug_hides_key_material() {
    let signer = Signer::from_armored(&fixture("signing-key-locked.asc"), "correct horse").unwrap();
    let shown = format!("{signer:?}");
    assert!(shown.contains("6364F36712215DFF"));
    assert!(!shown.contains("correct horse"));
}
