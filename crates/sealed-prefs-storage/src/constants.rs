//! Process-wide crypto parameters. Changing any of these makes values written
//! under the old parameters permanently unreadable.

/// Provider that implements [`KEYSTORE_TRANSFORMATION`].
pub const KEYSTORE_PROVIDER: &str = "SealedPrefsSoftware";

/// Key-store instance name; the keyring service under which key pairs live.
pub const KEYSTORE_NAME: &str = "sealed-prefs-keystore";

/// The one key pair used by this crate.
pub const KEYSTORE_ALIAS: &str = "sealed-prefs-master";

/// Sealed box: ephemeral X25519 agreement, SHA-256 key derivation, AES-256-GCM.
pub const KEYSTORE_TRANSFORMATION: &str = "X25519/SHA256/AES256GCM";

/// Subject of the self-signed certificate attached to a generated key pair.
pub const KEYSTORE_CERTIFICATE_SUBJECT: &str = "CN=sealed-prefs, O=sealed-prefs";

pub const KEYSTORE_CERTIFICATE_SERIAL: u64 = 1;

pub const KEYSTORE_CERTIFICATE_VALIDITY_YEARS: u32 = 25;
