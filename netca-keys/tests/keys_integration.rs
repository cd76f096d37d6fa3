//! Integration tests for the key and certificate hierarchy
//!
//! Root → network admin → node, with the node's HD key derived from the
//! admin's HD root and used as an encryption target.

use std::sync::Arc;

use netca_common::logging::{Component, Logger};
use netca_keys::*;

fn create_test_logger() -> Arc<Logger> {
    Arc::new(Logger::new_root(Component::Keys, "keys-test"))
}

#[test]
fn test_hierarchy_and_hd_decryption() -> Result<()> {
    let root = CertificateAuthority::self_signed("NetCA Integration Root")?;
    let issuer = CertificateIssuer::new(root, ValidityPolicy::default(), create_test_logger())?;

    // Admin is signed by the root and gets a fresh HD root
    let admin = issuer.issue(issuer.root_authority(), "netA", CertificateRole::Admin)?;
    let admin_hd_root = derive_network_root_key()?;
    let admin_ca = CertificateAuthority::from_pem(&admin.cert_pem, &admin.key_pem)?;

    // Two nodes under the admin, ordinals 0 and 1
    let mut node_keys = Vec::new();
    for ordinal in 0..2u32 {
        let issued = issuer.issue(&admin_ca, "netA", CertificateRole::Node)?;
        let cert = X509Certificate::from_pem(&issued.cert_pem)?;
        cert.validate_issued_by(admin_ca.certificate())?;
        node_keys.push(derive_node_key(&admin_hd_root, ordinal)?);
    }
    assert_ne!(node_keys[0], node_keys[1]);

    // A stored node key can be regenerated from the stored root + ordinal
    let stored_root = admin_hd_root.to_encoded();
    let regenerated = derive_node_key_encoded(&stored_root, 1)?;
    assert_eq!(regenerated, node_keys[1]);

    // Something encrypted to node 1's public key is recoverable by the admin
    let public = node_keys[1].public_key().to_encoded();
    let envelope = encrypt_for_hd_public_key(&HdPublicKey::from_encoded(&public)?, b"block 42")?;
    let restored_root = HdPrivateKey::from_encoded(&stored_root)?;
    let plain =
        decrypt_with_derived_key(&restored_root, &HdPublicKey::from_encoded(&public)?, &envelope)?;
    assert_eq!(plain, b"block 42");

    // The node itself can decrypt with its own key
    let plain = decrypt_with_secret_key(node_keys[1].secret_key(), &envelope)?;
    assert_eq!(plain, b"block 42");
    Ok(())
}

#[test]
fn test_wrong_index_does_not_decrypt() -> Result<()> {
    let admin_hd_root = derive_network_root_key()?;
    let node = derive_node_key(&admin_hd_root, 5)?;
    let envelope = encrypt_for_hd_public_key(&node.public_key(), b"payload")?;

    // Same point, claimed at the wrong index
    let lying = derive_node_key(&admin_hd_root, 6)?.public_key();
    let err = decrypt_with_derived_key(&admin_hd_root, &lying, &envelope).unwrap_err();
    assert!(matches!(err, KeyError::DecryptionError(_)));
    Ok(())
}

#[test]
fn test_root_authority_from_pem_roundtrip() -> Result<()> {
    let root = CertificateAuthority::self_signed("NetCA PEM Root")?;
    let cert_pem = root.certificate().to_pem()?;
    let key_pem = root.key_pair().private_key_pem()?;

    let loaded = CertificateAuthority::from_pem(&cert_pem, &key_pem)?;
    loaded.check_signing_material()?;
    assert_eq!(loaded.certificate().subject(), root.certificate().subject());

    // A key that does not belong to the certificate is rejected up front
    let other_key = EcdsaKeyPair::new()?.private_key_pem()?;
    let mismatched = CertificateAuthority::from_pem(&cert_pem, &other_key)?;
    let err = CertificateIssuer::new(mismatched, ValidityPolicy::default(), create_test_logger())
        .err()
        .expect("mismatched root must be rejected");
    assert!(matches!(err, KeyError::SigningError(_)));
    Ok(())
}
