use std::collections::HashSet;

use proptest::prelude::*;

use rememberpass::crypto::{self, Ciphertext, NONCE_LEN, TAG_LEN};
use rememberpass::encoding::{decimal_to_field, field_to_decimal, low_160_bits};
use rememberpass::error::CryptoError;
use rememberpass::keys::derive_key;
use rememberpass::SeedMaterial;

proptest! {
    #[test]
    fn prop_encrypt_decrypt_round_trip(
        seed in any::<[u8; 20]>(),
        plaintext in prop::collection::vec(any::<u8>(), 1..512),
    ) {
        let key = derive_key(&SeedMaterial::from_bytes(seed)).unwrap();
        let ct = crypto::encrypt(&plaintext, &key).unwrap();
        prop_assert_eq!(ct.to_bytes().unwrap().len(), NONCE_LEN + plaintext.len() + TAG_LEN);
        prop_assert_eq!(crypto::decrypt(&ct, &key).unwrap(), plaintext);
    }

    #[test]
    fn prop_same_seed_derives_same_key(
        seed in any::<[u8; 20]>(),
        plaintext in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        let first = derive_key(&SeedMaterial::from_bytes(seed)).unwrap();
        let second = derive_key(&SeedMaterial::from_bytes(seed)).unwrap();
        let ct = crypto::encrypt(&plaintext, &first).unwrap();
        prop_assert_eq!(crypto::decrypt(&ct, &second).unwrap(), plaintext);
    }

    #[test]
    fn prop_different_seed_fails(
        seed in any::<[u8; 20]>(),
        other in any::<[u8; 20]>(),
    ) {
        prop_assume!(seed != other);
        let key = derive_key(&SeedMaterial::from_bytes(seed)).unwrap();
        let wrong = derive_key(&SeedMaterial::from_bytes(other)).unwrap();
        let ct = crypto::encrypt(b"secret", &key).unwrap();
        prop_assert_eq!(crypto::decrypt(&ct, &wrong), Err(CryptoError::AuthenticationFailure));
    }

    #[test]
    fn prop_any_single_bit_flip_detected(
        plaintext in prop::collection::vec(any::<u8>(), 1..128),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let key = derive_key(&SeedMaterial::from_bytes([7; 20])).unwrap();
        let mut bytes = crypto::encrypt(&plaintext, &key).unwrap().to_bytes().unwrap();
        let i = position.index(bytes.len());
        bytes[i] ^= 1 << bit;
        let tampered = Ciphertext::from_bytes(&bytes);
        prop_assert_eq!(crypto::decrypt(&tampered, &key), Err(CryptoError::AuthenticationFailure));
    }

    #[test]
    fn prop_decimal_round_trip(field in any::<[u8; 32]>()) {
        let decimal = field_to_decimal(&field);
        prop_assert!(decimal.bytes().all(|b| b.is_ascii_digit()));
        prop_assert!(decimal == "0" || !decimal.starts_with('0'));
        prop_assert_eq!(decimal_to_field(&decimal).unwrap(), field);
    }

    #[test]
    fn prop_seed_field_round_trip(seed in any::<[u8; 20]>()) {
        let material = SeedMaterial::from_bytes(seed);
        let field = material.to_field();
        prop_assert!(field[..12].iter().all(|b| *b == 0));
        prop_assert_eq!(low_160_bits(&field), seed);
        let back = SeedMaterial::from_field(&field);
        prop_assert_eq!(back.as_bytes(), &seed);
    }
}

#[test]
fn test_nonces_do_not_repeat() {
    let key = derive_key(&SeedMaterial::from_bytes([3; 20])).unwrap();
    let mut nonces = HashSet::new();
    for _ in 0..2_000 {
        let bytes = crypto::encrypt(b"same plaintext", &key).unwrap().to_bytes().unwrap();
        assert!(nonces.insert(bytes[..NONCE_LEN].to_vec()));
    }
}
