//! SSH signature decoding and verification.
//!
//! A presented signature is the SSH wire encoding produced by agents and
//! `ssh-keygen -Y`: a `string` naming the signature format followed by a
//! `string` holding the raw signature. Verification uses the standard
//! primitives for each format:
//!
//! | Format         | Key           | Primitive                         |
//! |----------------|---------------|-----------------------------------|
//! | `ssh-ed25519`  | `ssh-ed25519` | Ed25519 (strict)                  |
//! | `rsa-sha2-256` | `ssh-rsa`     | RSASSA-PKCS1-v1_5 with SHA-256    |
//! | `rsa-sha2-512` | `ssh-rsa`     | RSASSA-PKCS1-v1_5 with SHA-512    |
//! | `ssh-rsa`      | `ssh-rsa`     | RSASSA-PKCS1-v1_5 with SHA-1      |
//! | `ecdsa-sha2-nistp256` | `ecdsa-sha2-nistp256` | ECDSA P-256 with SHA-256 |
//! | `ecdsa-sha2-nistp384` | `ecdsa-sha2-nistp384` | ECDSA P-384 with SHA-384 |
//!
//! Legacy `ssh-rsa` signatures are still what many agents and older clients
//! produce by default, so they are accepted for RSA keys. ECDSA signature
//! blobs carry the two scalars as `mpint r`, `mpint s`.

use ed25519_dalek::Signature as Ed25519Signature;
use p256::ecdsa::signature::Verifier;
use rsa::{Pkcs1v15Sign, RsaPublicKey, traits::PublicKeyParts};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::{
    key_codec::{KeyMaterial, PublicKey},
    wire::{WireReader, put_string},
};

/// A decoded SSH signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSignature {
    format: String,
    blob: Vec<u8>,
}

impl SshSignature {
    /// Creates a signature from its format name and raw signature bytes.
    #[must_use]
    pub fn new(format: impl Into<String>, blob: impl Into<Vec<u8>>) -> Self {
        Self { format: format.into(), blob: blob.into() }
    }

    /// Decodes the SSH wire encoding. Returns `None` for anything malformed,
    /// including trailing bytes.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut reader = WireReader::new(bytes);
        let format = reader.read_utf8().ok()?;
        let blob = reader.read_string().ok()?;
        (reader.remaining() == 0).then(|| Self::new(format, blob))
    }

    /// Encodes the signature in SSH wire format. Returns `None` if a field
    /// is longer than the format's `u32` length prefix allows.
    #[must_use]
    pub fn encode(&self) -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(8 + self.format.len() + self.blob.len());
        put_string(&mut out, self.format.as_bytes()).ok()?;
        put_string(&mut out, &self.blob).ok()?;
        Some(out)
    }

    /// Signature format name, e.g. `rsa-sha2-256`.
    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Raw signature bytes.
    #[must_use]
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }
}

impl PublicKey {
    /// Returns `true` if `signature` is a valid signature over `message` by
    /// this key.
    ///
    /// A signature whose format does not belong to this key's algorithm never
    /// verifies.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &SshSignature) -> bool {
        match (&self.material, signature.format()) {
            (KeyMaterial::Ed25519(key), "ssh-ed25519") => {
                Ed25519Signature::from_slice(signature.blob())
                    .is_ok_and(|sig| key.verify_strict(message, &sig).is_ok())
            },
            (KeyMaterial::Rsa(key), "rsa-sha2-256") => verify_rsa(
                key,
                Pkcs1v15Sign::new::<Sha256>(),
                &Sha256::digest(message),
                signature.blob(),
            ),
            (KeyMaterial::Rsa(key), "rsa-sha2-512") => verify_rsa(
                key,
                Pkcs1v15Sign::new::<Sha512>(),
                &Sha512::digest(message),
                signature.blob(),
            ),
            (KeyMaterial::Rsa(key), "ssh-rsa") => verify_rsa(
                key,
                Pkcs1v15Sign::new::<Sha1>(),
                &Sha1::digest(message),
                signature.blob(),
            ),
            (KeyMaterial::EcdsaP256(key), "ecdsa-sha2-nistp256") => {
                ecdsa_scalars(signature.blob(), P256_SCALAR_LEN)
                    .and_then(|rs| p256::ecdsa::Signature::from_slice(&rs).ok())
                    .is_some_and(|sig| key.verify(message, &sig).is_ok())
            },
            (KeyMaterial::EcdsaP384(key), "ecdsa-sha2-nistp384") => {
                ecdsa_scalars(signature.blob(), P384_SCALAR_LEN)
                    .and_then(|rs| p384::ecdsa::Signature::from_slice(&rs).ok())
                    .is_some_and(|sig| key.verify(message, &sig).is_ok())
            },
            _ => false,
        }
    }
}

const P256_SCALAR_LEN: usize = 32;
const P384_SCALAR_LEN: usize = 48;

/// Reads `mpint r`, `mpint s` and returns them as fixed-width big-endian
/// `r || s`, the layout the ECDSA signature types parse.
fn ecdsa_scalars(blob: &[u8], scalar_len: usize) -> Option<Vec<u8>> {
    let mut reader = WireReader::new(blob);
    let r = reader.read_string().ok()?;
    let s = reader.read_string().ok()?;
    if reader.remaining() != 0 {
        return None;
    }

    let mut out = vec![0u8; 2 * scalar_len];
    for (scalar, slot) in [r, s].into_iter().zip(out.chunks_exact_mut(scalar_len)) {
        let start = scalar.iter().position(|&b| b != 0).unwrap_or(scalar.len());
        let magnitude = &scalar[start..];
        if magnitude.len() > scalar_len {
            return None;
        }
        slot[scalar_len - magnitude.len()..].copy_from_slice(magnitude);
    }
    Some(out)
}

fn verify_rsa(key: &RsaPublicKey, scheme: Pkcs1v15Sign, digest: &[u8], sig: &[u8]) -> bool {
    let size = key.size();
    if sig.len() > size {
        return false;
    }
    // Some signers strip leading zero bytes; PKCS#1 verification wants the full width.
    let mut padded = vec![0u8; size - sig.len()];
    padded.extend_from_slice(sig);
    key.verify(scheme, digest, &padded).is_ok()
}
