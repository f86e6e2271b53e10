use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{
    CertificateInfo, KeyPairEntry, KeyPairSpec, KeyStoreError, PrivateKeyHandle, PublicKeyHandle,
};
use crate::{
    constants::{KEYSTORE_PROVIDER, KEYSTORE_TRANSFORMATION},
    sealed_box,
};

/// X25519 key pair held in process memory by the software key stores.
#[derive(Clone)]
pub(crate) struct SoftwareKeyPair {
    secret: StaticSecret,
    public: PublicKey,
    certificate: CertificateInfo,
}

/// Serialized form persisted in the OS keyring.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct KeyPairRecord {
    secret: String,
    public: String,
    #[zeroize(skip)]
    certificate: CertificateInfo,
}

impl SoftwareKeyPair {
    pub(crate) fn generate(spec: &KeyPairSpec) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret,
            public,
            certificate: spec.certificate.clone(),
        }
    }

    pub(crate) fn entry(&self, alias: &str) -> KeyPairEntry {
        KeyPairEntry {
            public_key: PublicKeyHandle::new(alias, *self.public.as_bytes()),
            private_key: PrivateKeyHandle::new(alias),
            certificate: self.certificate.clone(),
        }
    }

    pub(crate) fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KeyStoreError> {
        let plaintext = sealed_box::open(&self.secret, ciphertext)?;
        Ok(plaintext.to_vec())
    }

    pub(crate) fn to_json(&self) -> Result<Zeroizing<String>, KeyStoreError> {
        let secret_bytes = Zeroizing::new(self.secret.to_bytes());
        let record = KeyPairRecord {
            secret: general_purpose::STANDARD.encode(secret_bytes.as_slice()),
            public: general_purpose::STANDARD.encode(self.public.as_bytes()),
            certificate: self.certificate.clone(),
        };
        serde_json::to_string(&record)
            .map(Zeroizing::new)
            .map_err(|e| KeyStoreError::Decode(e.to_string()))
    }

    pub(crate) fn from_json(json: &str) -> Result<Self, KeyStoreError> {
        let record: KeyPairRecord =
            serde_json::from_str(json).map_err(|e| KeyStoreError::Decode(e.to_string()))?;

        let secret = StaticSecret::from(*decode_key(&record.secret)?);
        let public = PublicKey::from(&secret);
        if general_purpose::STANDARD.encode(public.as_bytes()) != record.public {
            return Err(KeyStoreError::Decode(
                "stored public key does not match stored secret".to_string(),
            ));
        }

        Ok(Self {
            secret,
            public,
            certificate: record.certificate.clone(),
        })
    }
}

/// Both software stores implement exactly one transformation.
pub(crate) fn supports(transformation: &str, provider: &str) -> bool {
    transformation == KEYSTORE_TRANSFORMATION && provider == KEYSTORE_PROVIDER
}

pub(crate) fn seal_to(key: &PublicKeyHandle, plaintext: &[u8]) -> Result<Vec<u8>, KeyStoreError> {
    sealed_box::seal(&PublicKey::from(*key.as_bytes()), plaintext)
}

fn decode_key(encoded: &str) -> Result<Zeroizing<[u8; 32]>, KeyStoreError> {
    let bytes = Zeroizing::new(
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| KeyStoreError::Decode(e.to_string()))?,
    );

    if bytes.len() != 32 {
        return Err(KeyStoreError::Decode(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> KeyPairSpec {
        KeyPairSpec::starting_now("alias", "CN=test", 1, 1).expect("spec")
    }

    #[test]
    fn json_record_restores_same_key_pair() {
        let pair = SoftwareKeyPair::generate(&spec());
        let json = pair.to_json().expect("to_json");
        let restored = SoftwareKeyPair::from_json(&json).expect("from_json");

        assert_eq!(restored.public.as_bytes(), pair.public.as_bytes());
        assert_eq!(restored.certificate, pair.certificate);

        let sealed = seal_to(&pair.entry("alias").public_key, b"secret").expect("seal");
        assert_eq!(restored.open(&sealed).expect("open"), b"secret");
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = decode_key("abcd").expect_err("should reject wrong length");
        assert!(matches!(err, KeyStoreError::Decode(_)));
    }

    #[test]
    fn only_the_fixed_transformation_is_supported() {
        assert!(supports(KEYSTORE_TRANSFORMATION, KEYSTORE_PROVIDER));
        assert!(!supports("RSA/ECB/PKCS1Padding", KEYSTORE_PROVIDER));
        assert!(!supports(KEYSTORE_TRANSFORMATION, "AndroidOpenSSL"));
    }
}
