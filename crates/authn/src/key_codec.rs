//! Public key parsing for directory key attributes.
//!
//! Directories store SSH public keys in one of two textual forms:
//!
//! ```text
//! raw:             AAAAC3NzaC1lZDI1NTE5AAAAIBx...
//! authorized_keys: ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIBx... alice@laptop
//! ```
//!
//! [`parse_raw_key`] and [`parse_authorized_key`] each handle one form.
//! [`parse_public_key`] tries the raw form first and falls back to the
//! `authorized_keys` form, so both spellings of a key produce equal
//! [`PublicKey`] values with identical fingerprints.
//!
//! Supported key types are `ssh-ed25519`, `ssh-rsa`, `ecdsa-sha2-nistp256`
//! and `ecdsa-sha2-nistp384`.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
};
use ed25519_dalek::{PUBLIC_KEY_LENGTH, VerifyingKey};
use rsa::{BigUint, RsaPublicKey, traits::PublicKeyParts};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::wire::{WireError, WireReader};

/// Smallest RSA modulus accepted, in bits.
pub const MIN_RSA_BITS: usize = 1024;

/// Largest RSA modulus accepted, in bits.
pub const MAX_RSA_BITS: usize = 16384;

/// Why a key attribute value could not be parsed.
///
/// These never fail a snapshot build: the offending value is skipped and the
/// failure is logged and counted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum KeyParseError {
    /// The value is empty or whitespace.
    #[error("empty key value")]
    Empty,

    /// The key blob is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(String),

    /// The decoded blob ended before all fields were read.
    #[error("truncated key blob")]
    Truncated,

    /// The decoded blob has bytes after the last field.
    #[error("{0} unexpected trailing bytes in key blob")]
    TrailingBytes(usize),

    /// The key type is not one this cache can verify signatures for.
    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The `authorized_keys` type field disagrees with the blob.
    #[error("key type {declared} does not match encoded type {encoded}")]
    AlgorithmMismatch {
        /// Type named in the text field.
        declared: String,
        /// Type embedded in the blob.
        encoded: String,
    },

    /// The key fields decode but do not form a usable key.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// An `authorized_keys` line has no blob after its key type.
    #[error("missing key blob field")]
    MissingKeyField,
}

impl From<WireError> for KeyParseError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Truncated => KeyParseError::Truncated,
            WireError::InvalidUtf8 => {
                KeyParseError::InvalidKeyMaterial("key type is not UTF-8".into())
            },
        }
    }
}

/// Supported public key algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// `ssh-ed25519`
    Ed25519,
    /// `ssh-rsa`, verified with `rsa-sha2-256`, `rsa-sha2-512` or `ssh-rsa`
    /// (SHA-1) signatures.
    Rsa,
    /// `ecdsa-sha2-nistp256`
    EcdsaP256,
    /// `ecdsa-sha2-nistp384`
    EcdsaP384,
}

impl KeyAlgorithm {
    /// Looks up an algorithm by its SSH name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ssh-ed25519" => Some(Self::Ed25519),
            "ssh-rsa" => Some(Self::Rsa),
            "ecdsa-sha2-nistp256" => Some(Self::EcdsaP256),
            "ecdsa-sha2-nistp384" => Some(Self::EcdsaP384),
            _ => None,
        }
    }

    /// The SSH name of the algorithm.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Ed25519 => "ssh-ed25519",
            Self::Rsa => "ssh-rsa",
            Self::EcdsaP256 => "ecdsa-sha2-nistp256",
            Self::EcdsaP384 => "ecdsa-sha2-nistp384",
        }
    }

    /// Curve identifier carried inside an ECDSA key blob.
    fn curve(self) -> Option<&'static str> {
        match self {
            Self::EcdsaP256 => Some("nistp256"),
            Self::EcdsaP384 => Some("nistp384"),
            Self::Ed25519 | Self::Rsa => None,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone)]
pub(crate) enum KeyMaterial {
    Ed25519(VerifyingKey),
    Rsa(RsaPublicKey),
    EcdsaP256(p256::ecdsa::VerifyingKey),
    EcdsaP384(p384::ecdsa::VerifyingKey),
}

/// A parsed SSH public key.
///
/// Equality and hashing use the decoded wire blob only, so a key read from a
/// raw attribute equals the same key read from an `authorized_keys` line.
#[derive(Clone)]
pub struct PublicKey {
    algorithm: KeyAlgorithm,
    blob: Vec<u8>,
    fingerprint: String,
    pub(crate) material: KeyMaterial,
}

impl PublicKey {
    /// Parses an SSH wire-format key blob.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyParseError`] if the blob is truncated, has trailing
    /// bytes, names an unsupported algorithm, or carries invalid key material.
    pub fn from_blob(blob: &[u8]) -> Result<Self, KeyParseError> {
        let mut reader = WireReader::new(blob);
        let name = reader.read_utf8()?;
        let algorithm = KeyAlgorithm::from_name(name)
            .ok_or_else(|| KeyParseError::UnsupportedAlgorithm(name.to_owned()))?;

        let material = match algorithm {
            KeyAlgorithm::Ed25519 => {
                let raw = reader.read_string()?;
                let bytes: [u8; PUBLIC_KEY_LENGTH] = raw.try_into().map_err(|_| {
                    KeyParseError::InvalidKeyMaterial(format!(
                        "expected {PUBLIC_KEY_LENGTH} byte ed25519 key, got {}",
                        raw.len()
                    ))
                })?;
                let key = VerifyingKey::from_bytes(&bytes)
                    .map_err(|e| KeyParseError::InvalidKeyMaterial(e.to_string()))?;
                KeyMaterial::Ed25519(key)
            },
            KeyAlgorithm::Rsa => {
                let e = reader.read_string()?;
                let n = reader.read_string()?;
                let key = RsaPublicKey::new_with_max_size(
                    BigUint::from_bytes_be(n),
                    BigUint::from_bytes_be(e),
                    MAX_RSA_BITS,
                )
                .map_err(|e| KeyParseError::InvalidKeyMaterial(e.to_string()))?;
                if key.size() * 8 < MIN_RSA_BITS {
                    return Err(KeyParseError::InvalidKeyMaterial(format!(
                        "rsa modulus of {} bits is below the {MIN_RSA_BITS} bit minimum",
                        key.size() * 8
                    )));
                }
                KeyMaterial::Rsa(key)
            },
            KeyAlgorithm::EcdsaP256 | KeyAlgorithm::EcdsaP384 => {
                let curve = reader.read_utf8()?;
                if Some(curve) != algorithm.curve() {
                    return Err(KeyParseError::InvalidKeyMaterial(format!(
                        "curve {curve} does not match key type {algorithm}"
                    )));
                }
                let point = reader.read_string()?;
                let invalid_point = |e: p256::ecdsa::Error| {
                    KeyParseError::InvalidKeyMaterial(format!("invalid {curve} point: {e}"))
                };
                if algorithm == KeyAlgorithm::EcdsaP256 {
                    KeyMaterial::EcdsaP256(
                        p256::ecdsa::VerifyingKey::from_sec1_bytes(point).map_err(invalid_point)?,
                    )
                } else {
                    KeyMaterial::EcdsaP384(
                        p384::ecdsa::VerifyingKey::from_sec1_bytes(point).map_err(invalid_point)?,
                    )
                }
            },
        };

        if reader.remaining() > 0 {
            return Err(KeyParseError::TrailingBytes(reader.remaining()));
        }

        Ok(Self {
            algorithm,
            blob: blob.to_vec(),
            fingerprint: fingerprint_of(blob),
            material,
        })
    }

    /// The key algorithm.
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// The SSH wire-format blob.
    #[must_use]
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// OpenSSH SHA-256 fingerprint, e.g. `SHA256:nThbg6kXUpJWGl7E1IGOCspRomTxdCARLviKw6E5SY8`.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Renders the key as an `authorized_keys` line without a comment.
    #[must_use]
    pub fn to_authorized_key(&self) -> String {
        format!("{} {}", self.algorithm, STANDARD.encode(&self.blob))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.blob == other.blob
    }
}

impl Eq for PublicKey {}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.blob.hash(state);
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("algorithm", &self.algorithm)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

fn fingerprint_of(blob: &[u8]) -> String {
    format!("SHA256:{}", STANDARD_NO_PAD.encode(Sha256::digest(blob)))
}

fn decode_blob(encoded: &str) -> Result<Vec<u8>, KeyParseError> {
    STANDARD.decode(encoded).map_err(|e| KeyParseError::Base64(e.to_string()))
}

/// Parses a bare base64-encoded key blob.
///
/// # Errors
///
/// Returns a [`KeyParseError`] if the value is empty, not base64, or not a
/// valid key blob.
pub fn parse_raw_key(value: &str) -> Result<PublicKey, KeyParseError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(KeyParseError::Empty);
    }
    PublicKey::from_blob(&decode_blob(value)?)
}

/// Parses an `authorized_keys` line: `[options] keytype base64blob [comment]`.
///
/// The first field naming a supported key type is taken as the type and the
/// next field as the blob, which lets leading options through as long as
/// they contain no spaces.
///
/// # Errors
///
/// Returns a [`KeyParseError`] if no supported key type is present, the blob
/// field is missing or malformed, or the declared type disagrees with the
/// type encoded in the blob.
pub fn parse_authorized_key(line: &str) -> Result<PublicKey, KeyParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = fields.first() else {
        return Err(KeyParseError::Empty);
    };
    let Some(type_idx) = fields.iter().position(|f| KeyAlgorithm::from_name(f).is_some()) else {
        return Err(if fields.len() < 2 {
            KeyParseError::MissingKeyField
        } else {
            KeyParseError::UnsupportedAlgorithm((*first).to_owned())
        });
    };
    let declared = fields[type_idx];
    let encoded = fields.get(type_idx + 1).ok_or(KeyParseError::MissingKeyField)?;

    let key = PublicKey::from_blob(&decode_blob(encoded)?)?;
    if key.algorithm().name() != declared {
        return Err(KeyParseError::AlgorithmMismatch {
            declared: declared.to_owned(),
            encoded: key.algorithm().name().to_owned(),
        });
    }
    Ok(key)
}

/// Parses a key attribute value in either supported form.
///
/// The raw form is tried first. If it fails, the value is parsed as an
/// `authorized_keys` line. When both fail, the error reported is the one for
/// the form the value most resembles: the `authorized_keys` error if the value
/// contains whitespace, otherwise the raw error.
///
/// # Errors
///
/// Returns a [`KeyParseError`] if the value matches neither form.
pub fn parse_public_key(value: &str) -> Result<PublicKey, KeyParseError> {
    match parse_raw_key(value) {
        Ok(key) => Ok(key),
        Err(raw_err) => parse_authorized_key(value).map_err(|line_err| {
            if value.trim().contains(char::is_whitespace) { line_err } else { raw_err }
        }),
    }
}
