//! Shared test utilities for authentication testing.
//!
//! This module provides key pairs that render their public half in both
//! directory forms (raw blob and `authorized_keys` line), SSH-encoded
//! signatures over challenges, and a standard cache configuration. It is
//! feature-gated behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! credbroker-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use credbroker_authn::testutil::{TestKeyPair, random_challenge};
//!
//! let pair = TestKeyPair::generate_ed25519();
//! let challenge = random_challenge();
//! let signature = pair.sign(&challenge);
//! ```

use base64::{Engine, engine::general_purpose::STANDARD};
use credbroker_directory::testutil::TEST_BASE_DN;
use ed25519_dalek::{Signer, SigningKey};
use rand_core::{OsRng, RngCore};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, traits::PublicKeyParts};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::{
    config::UserCacheConfig,
    signature::SshSignature,
    wire::{WireError, put_mpint, put_string},
};

/// Role attribute used by [`test_config`].
pub const TEST_ROLE_ATTRIBUTE: &str = "roleAttribute";

/// Timeout attribute used by [`test_config`].
pub const TEST_TIMEOUT_ATTRIBUTE: &str = "timeoutAttribute";

/// RSA key size for generated test keys. The smallest size the key codec
/// accepts, to keep generation fast.
pub const TEST_RSA_BITS: usize = 1024;

/// Hash used for an RSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaHash {
    /// `rsa-sha2-256`
    Sha256,
    /// `rsa-sha2-512`
    Sha512,
    /// Legacy `ssh-rsa` (SHA-1)
    Sha1,
}

/// A private key able to sign challenges, with helpers rendering its public
/// key the way a directory stores it.
pub enum TestKeyPair {
    /// Ed25519 key pair.
    Ed25519(SigningKey),
    /// RSA key pair.
    Rsa(Box<RsaPrivateKey>),
    /// ECDSA key pair on NIST P-256.
    EcdsaP256(p256::ecdsa::SigningKey),
    /// ECDSA key pair on NIST P-384.
    EcdsaP384(p384::ecdsa::SigningKey),
}

impl TestKeyPair {
    /// Generates a fresh Ed25519 key pair.
    #[must_use]
    pub fn generate_ed25519() -> Self {
        Self::Ed25519(SigningKey::generate(&mut OsRng))
    }

    /// Derives an Ed25519 key pair from a fixed seed.
    #[must_use]
    pub fn ed25519_from_seed(seed: &[u8; 32]) -> Self {
        Self::Ed25519(SigningKey::from_bytes(seed))
    }

    /// Generates a fresh RSA key pair of [`TEST_RSA_BITS`] bits.
    ///
    /// # Panics
    ///
    /// Panics if key generation fails.
    #[must_use]
    pub fn generate_rsa() -> Self {
        let key = RsaPrivateKey::new(&mut OsRng, TEST_RSA_BITS).expect("rsa key generation");
        Self::Rsa(Box::new(key))
    }

    /// Generates a fresh ECDSA key pair on NIST P-256.
    #[must_use]
    pub fn generate_ecdsa_p256() -> Self {
        Self::EcdsaP256(p256::ecdsa::SigningKey::random(&mut OsRng))
    }

    /// Generates a fresh ECDSA key pair on NIST P-384.
    #[must_use]
    pub fn generate_ecdsa_p384() -> Self {
        Self::EcdsaP384(p384::ecdsa::SigningKey::random(&mut OsRng))
    }

    /// The SSH wire-format public key blob.
    ///
    /// # Panics
    ///
    /// Panics if a field does not fit the wire format.
    #[must_use]
    pub fn public_blob(&self) -> Vec<u8> {
        self.encode_public_blob().expect("key blob fits the wire format")
    }

    fn encode_public_blob(&self) -> Result<Vec<u8>, WireError> {
        let mut blob = Vec::new();
        match self {
            Self::Ed25519(key) => {
                put_string(&mut blob, b"ssh-ed25519")?;
                put_string(&mut blob, key.verifying_key().as_bytes())?;
            },
            Self::Rsa(key) => {
                put_string(&mut blob, b"ssh-rsa")?;
                put_mpint(&mut blob, &key.e().to_bytes_be())?;
                put_mpint(&mut blob, &key.n().to_bytes_be())?;
            },
            Self::EcdsaP256(key) => {
                put_string(&mut blob, b"ecdsa-sha2-nistp256")?;
                put_string(&mut blob, b"nistp256")?;
                put_string(&mut blob, key.verifying_key().to_encoded_point(false).as_bytes())?;
            },
            Self::EcdsaP384(key) => {
                put_string(&mut blob, b"ecdsa-sha2-nistp384")?;
                put_string(&mut blob, b"nistp384")?;
                put_string(&mut blob, key.verifying_key().to_encoded_point(false).as_bytes())?;
            },
        }
        Ok(blob)
    }

    /// The public key as a bare base64 blob.
    #[must_use]
    pub fn raw_key(&self) -> String {
        STANDARD.encode(self.public_blob())
    }

    /// The public key as an `authorized_keys` line. An empty comment is
    /// omitted.
    #[must_use]
    pub fn authorized_key(&self, comment: &str) -> String {
        let line = format!("{} {} {comment}", self.algorithm(), self.raw_key());
        line.trim_end().to_owned()
    }

    /// SSH name of the key type.
    #[must_use]
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Ed25519(_) => "ssh-ed25519",
            Self::Rsa(_) => "ssh-rsa",
            Self::EcdsaP256(_) => "ecdsa-sha2-nistp256",
            Self::EcdsaP384(_) => "ecdsa-sha2-nistp384",
        }
    }

    /// Signs `challenge` and returns the SSH-encoded signature. RSA keys
    /// sign with `rsa-sha2-256`.
    #[must_use]
    pub fn sign(&self, challenge: &[u8]) -> Vec<u8> {
        self.sign_rsa(challenge, RsaHash::Sha256)
    }

    /// Signs `challenge`, choosing the hash for RSA keys. Other key types
    /// ignore `hash`.
    ///
    /// # Panics
    ///
    /// Panics if RSA signing fails.
    #[must_use]
    pub fn sign_rsa(&self, challenge: &[u8], hash: RsaHash) -> Vec<u8> {
        let signature = match self {
            Self::Ed25519(key) => {
                SshSignature::new("ssh-ed25519", key.sign(challenge).to_bytes().to_vec())
            },
            Self::Rsa(key) => {
                let (format, sig) = match hash {
                    RsaHash::Sha256 => (
                        "rsa-sha2-256",
                        key.sign(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(challenge)),
                    ),
                    RsaHash::Sha512 => (
                        "rsa-sha2-512",
                        key.sign(Pkcs1v15Sign::new::<Sha512>(), &Sha512::digest(challenge)),
                    ),
                    RsaHash::Sha1 => (
                        "ssh-rsa",
                        key.sign(Pkcs1v15Sign::new::<Sha1>(), &Sha1::digest(challenge)),
                    ),
                };
                SshSignature::new(format, sig.expect("rsa signing"))
            },
            Self::EcdsaP256(key) => {
                let sig: p256::ecdsa::Signature = key.sign(challenge);
                let (r, s) = sig.split_bytes();
                SshSignature::new("ecdsa-sha2-nistp256", ecdsa_signature_blob(&r, &s))
            },
            Self::EcdsaP384(key) => {
                let sig: p384::ecdsa::Signature = key.sign(challenge);
                let (r, s) = sig.split_bytes();
                SshSignature::new("ecdsa-sha2-nistp384", ecdsa_signature_blob(&r, &s))
            },
        };
        signature.encode().expect("signature fits the wire format")
    }
}

/// Inner blob of an ECDSA signature: `mpint r`, `mpint s`.
fn ecdsa_signature_blob(r: &[u8], s: &[u8]) -> Vec<u8> {
    let mut blob = Vec::new();
    put_mpint(&mut blob, r).expect("scalar r");
    put_mpint(&mut blob, s).expect("scalar s");
    blob
}

/// Returns 32 random bytes to use as a challenge.
#[must_use]
pub fn random_challenge() -> Vec<u8> {
    let mut challenge = vec![0u8; 32];
    OsRng.fill_bytes(&mut challenge);
    challenge
}

/// A configuration over the directory fixtures' base DN with role and
/// timeout attributes enabled.
///
/// # Panics
///
/// Panics if the configuration does not validate.
#[must_use]
pub fn test_config() -> UserCacheConfig {
    UserCacheConfig::builder()
        .base_dn(TEST_BASE_DN)
        .role_attribute(TEST_ROLE_ATTRIBUTE)
        .timeout_attribute(TEST_TIMEOUT_ATTRIBUTE)
        .build()
        .expect("valid test config")
}

/// Asserts that a `Result` is an `Err` matching the given
/// [`AuthError`](crate::AuthError) variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use credbroker_authn::{assert_auth_error, error::AuthError};
///
/// let result: Result<(), AuthError> = Err(AuthError::RefreshAbandoned);
/// assert_auth_error!(result, RefreshAbandoned);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
}
