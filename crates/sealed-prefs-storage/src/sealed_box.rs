//! Anonymous public-key encryption ("sealed box").
//!
//! Layout: `version (1) | ephemeral public key (32) | nonce (12) | ciphertext + tag`.
//! The AES-256-GCM key is `SHA-256(shared secret | ephemeral public | recipient public)`.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::key_store::KeyStoreError;

const VERSION: u8 = 1;
const PUBLIC_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = 1 + PUBLIC_KEY_LEN + NONCE_LEN;

pub(crate) fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, KeyStoreError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);
    if !shared.was_contributory() {
        return Err(KeyStoreError::Cipher(
            "recipient public key is a low-order point".to_string(),
        ));
    }

    let cipher = build_cipher(shared.as_bytes(), &ephemeral_public, recipient)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| KeyStoreError::Cipher(format!("encrypt failed: {e}")))?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.push(VERSION);
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub(crate) fn open(
    secret: &StaticSecret,
    envelope: &[u8],
) -> Result<Zeroizing<Vec<u8>>, KeyStoreError> {
    if envelope.len() < HEADER_LEN {
        return Err(KeyStoreError::Cipher(format!(
            "envelope too short: expected at least {HEADER_LEN} bytes, got {}",
            envelope.len()
        )));
    }
    if envelope[0] != VERSION {
        return Err(KeyStoreError::Cipher(format!(
            "unsupported envelope version {}",
            envelope[0]
        )));
    }

    let mut ephemeral_bytes = [0u8; PUBLIC_KEY_LEN];
    ephemeral_bytes.copy_from_slice(&envelope[1..1 + PUBLIC_KEY_LEN]);
    let ephemeral_public = PublicKey::from(ephemeral_bytes);
    let nonce = Nonce::from_slice(&envelope[1 + PUBLIC_KEY_LEN..HEADER_LEN]);
    let ciphertext = &envelope[HEADER_LEN..];

    let recipient = PublicKey::from(secret);
    let shared = secret.diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(KeyStoreError::Cipher(
            "ephemeral public key is a low-order point".to_string(),
        ));
    }

    let cipher = build_cipher(shared.as_bytes(), &ephemeral_public, &recipient)?;
    cipher
        .decrypt(nonce, ciphertext)
        .map(Zeroizing::new)
        .map_err(|e| KeyStoreError::Cipher(format!("decrypt failed: {e}")))
}

fn build_cipher(
    shared: &[u8; 32],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> Result<Aes256Gcm, KeyStoreError> {
    let digest = Sha256::new()
        .chain_update(shared)
        .chain_update(ephemeral.as_bytes())
        .chain_update(recipient.as_bytes())
        .finalize();
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&digest);

    Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| KeyStoreError::Cipher(format!("cipher init failed: {e}")))
}
