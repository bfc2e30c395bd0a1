//! Cross-module behavior exercised through the crate's public surface
//! rather than any one module's internals: a method file backed by a real
//! key store, encrypted to an artifact, and decrypted back out.

use std::path::Path;

use ssops_core::protector::wrap_passphrase;
use ssops_core::recipient::{generate_keypair, private_key_to_pkcs8_der, public_key_to_pem};
use ssops_core::{
    decrypt_from_artifact_json, encrypt_to_artifact_json, Error, KeyStore, MethodFile,
    PassphraseSource, RecipientDescriptor,
};

struct FixedPassphrase(&'static str);
impl PassphraseSource for FixedPassphrase {
    fn read(&self, _prompt: &str) -> ssops_core::Result<String> {
        Ok(self.0.to_string())
    }
}

fn generate_stored_recipient(store: &KeyStore, name: &str, passphrase: &'static str) {
    let (sk, pk) = generate_keypair().unwrap();
    let der = private_key_to_pkcs8_der(&sk).unwrap();
    let protected = wrap_passphrase(name, &der, &FixedPassphrase(passphrase)).unwrap();
    let public_pem = public_key_to_pem(&pk).unwrap();
    store.write_keypair(name, &protected, &public_pem, false).unwrap();
}

#[test]
fn encrypt_decrypt_round_trip_via_key_store() {
    let tmp = tempfile::tempdir().unwrap();
    let store = KeyStore::open(tmp.path().join(".ssops")).unwrap();
    generate_stored_recipient(&store, "alex", "correct horse battery staple");

    let method_path = tmp.path().join("method.json");
    let mut method = MethodFile::new();
    method
        .add(RecipientDescriptor {
            kind: "rsa".to_string(),
            name: "alex".to_string(),
            public_key: store.read_public_key("alex").unwrap(),
            encrypted_private_key: None,
        })
        .unwrap();
    method.save(&method_path).unwrap();

    let plaintext = b"launch codes: none, this is a test\n";
    let artifact_json = encrypt_to_artifact_json(&method_path, plaintext, None).unwrap();

    let out = decrypt_from_artifact_json(
        &artifact_json,
        Some(&store),
        &FixedPassphrase("correct horse battery staple"),
        None,
    )
    .unwrap();
    assert_eq!(out, plaintext);
}

#[test]
fn decrypt_without_key_store_fails_for_non_embedded_recipient() {
    let tmp = tempfile::tempdir().unwrap();
    let store = KeyStore::open(tmp.path().join(".ssops")).unwrap();
    generate_stored_recipient(&store, "mathieu", "hunter2");

    let method_path = tmp.path().join("method.json");
    let mut method = MethodFile::new();
    method
        .add(RecipientDescriptor {
            kind: "rsa".to_string(),
            name: "mathieu".to_string(),
            public_key: store.read_public_key("mathieu").unwrap(),
            encrypted_private_key: None,
        })
        .unwrap();
    method.save(&method_path).unwrap();

    let artifact_json = encrypt_to_artifact_json(&method_path, b"payload", None).unwrap();

    let err = decrypt_from_artifact_json(&artifact_json, None, &FixedPassphrase("hunter2"), None)
        .unwrap_err();
    match err {
        Error::AllRecipientsFailed(causes) => {
            assert_eq!(causes.len(), 1);
            assert!(matches!(causes[0].1, Error::KeyStoreMissing(_)));
        }
        other => panic!("expected AllRecipientsFailed, got {other:?}"),
    }
}

#[test]
fn key_store_survives_reopen_across_a_simulated_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let store_path = tmp.path().join(".ssops");
    {
        let store = KeyStore::open(store_path.clone()).unwrap();
        generate_stored_recipient(&store, "alex", "hunter2");
    }
    let reopened = KeyStore::open(store_path).unwrap();
    assert_eq!(reopened.list().unwrap(), vec!["alex".to_string()]);
    assert!(reopened.read_public_key("alex").unwrap().starts_with("-----BEGIN PUBLIC KEY-----"));
}

#[test]
fn method_file_rejects_adding_an_ssh_key_pointing_at_a_missing_file() {
    let tmp = tempfile::tempdir().unwrap();
    let mut method = MethodFile::new();
    let missing = Path::new("/nonexistent/path/id_rsa.pub");
    assert!(method.add_ssh_key(missing).is_err());
    let method_path = tmp.path().join("method.json");
    method.save(&method_path).unwrap();
    assert!(MethodFile::load(&method_path).unwrap().methods.is_empty());
}
