use std::collections::HashSet;

use unicloud::crypto::{
    decrypt, encrypt, encrypt_with, random_file_name, CryptoError, EncryptionKey, StoredKey,
    KEY_LEN,
};

#[test]
fn test_round_trip_various_sizes() {
    for size in [0usize, 1, 15, 16, 17, 4096, 1024 * 1024 + 3] {
        let plaintext: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let (ciphertext, key) = encrypt(&plaintext).unwrap();

        assert_ne!(ciphertext, plaintext);
        assert_eq!(decrypt(&ciphertext, &key).unwrap(), plaintext, "size {size}");
    }
}

#[test]
fn test_same_plaintext_encrypts_differently() {
    let key = EncryptionKey::generate().unwrap();
    let a = encrypt_with(&key, b"lecture notes").unwrap();
    let b = encrypt_with(&key, b"lecture notes").unwrap();
    assert_ne!(a, b);

    let (c, other_key) = encrypt(b"lecture notes").unwrap();
    assert_ne!(key, other_key);
    assert_ne!(a, c);
}

#[test]
fn test_wrong_key_fails() {
    let (ciphertext, _) = encrypt(b"secret syllabus").unwrap();
    let wrong = EncryptionKey::generate().unwrap();
    assert!(matches!(
        decrypt(&ciphertext, &wrong),
        Err(CryptoError::Decrypt)
    ));
}

#[test]
fn test_tampered_ciphertext_fails() {
    let (mut ciphertext, key) = encrypt(b"exam answers").unwrap();
    let last = ciphertext.len() - 1;
    ciphertext[last] ^= 0x01;
    assert!(matches!(decrypt(&ciphertext, &key), Err(CryptoError::Decrypt)));

    let (mut ciphertext, key) = encrypt(b"exam answers").unwrap();
    ciphertext[0] ^= 0x80;
    assert!(matches!(decrypt(&ciphertext, &key), Err(CryptoError::Decrypt)));
}

#[test]
fn test_truncated_ciphertext_fails() {
    let (ciphertext, key) = encrypt(b"homework").unwrap();

    for len in [0, 5, 12, 27, ciphertext.len() - 1] {
        assert!(
            matches!(decrypt(&ciphertext[..len], &key), Err(CryptoError::Decrypt)),
            "len {len}"
        );
    }
}

#[test]
fn test_key_encoding() {
    let key = EncryptionKey::generate().unwrap();
    assert_eq!(key.as_bytes().len(), KEY_LEN);

    let decoded = EncryptionKey::from_base64(&key.to_base64()).unwrap();
    assert_eq!(decoded, key);

    assert!(matches!(
        EncryptionKey::from_bytes(&[0u8; 16]),
        Err(CryptoError::InvalidKey(_))
    ));
    assert!(EncryptionKey::from_base64("not base64!").is_err());
}

#[test]
fn test_random_file_name_format() {
    let name = random_file_name("Lecture 01.PDF").unwrap();
    let (id, ext) = name.split_once('.').expect("extension kept");
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(ext, "pdf");

    let bare = random_file_name("Makefile").unwrap();
    assert_eq!(bare.len(), 32);
    assert!(!bare.contains('.'));

    let traversal = random_file_name("../../etc/passwd").unwrap();
    assert!(!traversal.contains('/'));
    assert_eq!(traversal.len(), 32);
}

#[test]
fn test_random_file_names_are_unique() {
    let names: HashSet<String> = (0..256)
        .map(|_| random_file_name("notes.txt").unwrap())
        .collect();
    assert_eq!(names.len(), 256);
}

#[test]
fn test_stored_key_plain_without_master() {
    let key = EncryptionKey::generate().unwrap();
    let stored = StoredKey::seal(&key, None).unwrap();

    assert!(matches!(stored, StoredKey::Plain(_)));
    assert_eq!(stored.open(None).unwrap(), key);
}

#[test]
fn test_stored_key_wrapped_with_master() {
    let master = EncryptionKey::generate().unwrap();
    let key = EncryptionKey::generate().unwrap();
    let stored = StoredKey::seal(&key, Some(&master)).unwrap();

    match &stored {
        StoredKey::Wrapped(encoded) => assert_ne!(encoded, &key.to_base64()),
        StoredKey::Plain(_) => panic!("expected a wrapped key"),
    }
    assert_eq!(stored.open(Some(&master)).unwrap(), key);

    assert!(stored.open(None).is_err());
    let other = EncryptionKey::generate().unwrap();
    assert!(stored.open(Some(&other)).is_err());
}

#[test]
fn test_stored_key_serialized_shape() {
    let key = EncryptionKey::generate().unwrap();
    let stored = StoredKey::seal(&key, None).unwrap();

    let json = serde_json::to_value(&stored).unwrap();
    assert_eq!(json["kind"], "plain");
    assert_eq!(json["value"], key.to_base64());
}
