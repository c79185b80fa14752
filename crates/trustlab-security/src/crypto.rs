// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Crypto provider — key generation, signatures, HMAC and SHA-256 hashing.
//
// Everything here is stateless apart from the key material passed in.
// Signing keys are held as PKCS#8 v1/v2 DER documents and re-parsed by `ring`
// on every signature, which keeps `SigningKeyPair` a plain byte container.
//
// Verification functions return `bool`: a mismatching signature or tag is
// data, not an error.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use ring::hmac;
use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_ASN1, ECDSA_P256_SHA256_ASN1_SIGNING, ED25519, EcdsaKeyPair, Ed25519KeyPair,
    KeyPair, UnparsedPublicKey,
};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use trustlab_core::error::{Result, TrustlabError};
use trustlab_core::types::SigningAlgorithm;

/// Default read buffer for [`hash_reader`] / [`hash_file`].
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// A public verification key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    algorithm: SigningAlgorithm,
    bytes: Vec<u8>,
}

impl PublicKey {
    pub fn new(algorithm: SigningAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Raw key bytes: 32 bytes for Ed25519, 65-byte uncompressed SEC1 point
    /// for P-256.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}:{})", self.algorithm, self.to_hex())
    }
}

/// A private signing key and its public half.
///
/// The private half only leaves the process through
/// [`SigningKeyPair::export_encrypted`].
pub struct SigningKeyPair {
    algorithm: SigningAlgorithm,
    pkcs8_der: Vec<u8>,
    public_key: PublicKey,
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("algorithm", &self.algorithm)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    /// Load a key pair from a PKCS#8 DER document.
    ///
    /// Fails with [`TrustlabError::Key`] if the document is not a valid key
    /// for `algorithm`.
    pub fn from_pkcs8(algorithm: SigningAlgorithm, pkcs8_der: &[u8]) -> Result<Self> {
        let public = match algorithm {
            SigningAlgorithm::Ed25519 => Ed25519KeyPair::from_pkcs8(pkcs8_der)
                .map_err(|e| TrustlabError::Key(format!("ed25519 key rejected: {e}")))?
                .public_key()
                .as_ref()
                .to_vec(),
            SigningAlgorithm::EcdsaP256Sha256 => {
                let rng = SystemRandom::new();
                EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8_der, &rng)
                    .map_err(|e| TrustlabError::Key(format!("p256 key rejected: {e}")))?
                    .public_key()
                    .as_ref()
                    .to_vec()
            }
        };

        Ok(Self {
            algorithm,
            pkcs8_der: pkcs8_der.to_vec(),
            public_key: PublicKey::new(algorithm, public),
        })
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The PKCS#8 document.  Crate-private: callers export through the vault.
    pub(crate) fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8_der
    }

    /// Seal the private key with an age passphrase.
    pub fn export_encrypted(&self, passphrase: &str) -> Result<Vec<u8>> {
        crate::vault::KeyVault::new(passphrase).seal_key(self)
    }
}

/// Generate a fresh key pair from the OS CSPRNG.
///
/// This is the config-signing key in place of RSA-2048: `ring` cannot
/// generate RSA keys, and Ed25519 (default) and ECDSA P-256 / SHA-256 both
/// give at least RSA-2048-class security.  There is no RSA path.
#[instrument]
pub fn generate_keypair(algorithm: SigningAlgorithm) -> Result<SigningKeyPair> {
    let rng = SystemRandom::new();

    let document = match algorithm {
        SigningAlgorithm::Ed25519 => Ed25519KeyPair::generate_pkcs8(&rng),
        SigningAlgorithm::EcdsaP256Sha256 => {
            EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
        }
    }
    .map_err(|e| TrustlabError::Crypto(format!("key generation failed: {e}")))?;

    let pair = SigningKeyPair::from_pkcs8(algorithm, document.as_ref())?;
    debug!(public_key = %pair.public_key.to_hex(), "signing key generated");
    Ok(pair)
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// Raw signature bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse a hex signature.  Bad hex yields [`TrustlabError::Crypto`].
    pub fn from_hex(value: &str) -> Result<Self> {
        hex::decode(value)
            .map(Self)
            .map_err(|e| TrustlabError::Crypto(format!("signature is not hex: {e}")))
    }
}

impl From<Vec<u8>> for Signature {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Sign `message` with `key`.
pub fn sign(key: &SigningKeyPair, message: &[u8]) -> Result<Signature> {
    let bytes = match key.algorithm {
        SigningAlgorithm::Ed25519 => Ed25519KeyPair::from_pkcs8(&key.pkcs8_der)
            .map_err(|e| TrustlabError::Key(format!("ed25519 key load failed: {e}")))?
            .sign(message)
            .as_ref()
            .to_vec(),
        SigningAlgorithm::EcdsaP256Sha256 => {
            let rng = SystemRandom::new();
            let pair =
                EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &key.pkcs8_der, &rng)
                    .map_err(|e| TrustlabError::Key(format!("p256 key load failed: {e}")))?;
            pair.sign(&rng, message)
                .map_err(|e| TrustlabError::Crypto(format!("signing failed: {e}")))?
                .as_ref()
                .to_vec()
        }
    };
    Ok(Signature(bytes))
}

/// Check `signature` over `message`.  Never fails: any mismatch, malformed
/// signature or wrong key is `false`.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let verifier = match public_key.algorithm {
        SigningAlgorithm::Ed25519 => UnparsedPublicKey::new(&ED25519, public_key.as_bytes()),
        SigningAlgorithm::EcdsaP256Sha256 => {
            UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, public_key.as_bytes())
        }
    };
    verifier.verify(message, signature.as_bytes()).is_ok()
}

// ---------------------------------------------------------------------------
// HMAC
// ---------------------------------------------------------------------------

/// HMAC-SHA-256 tag of `message` under `key`.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&key, message).as_ref().to_vec()
}

/// Constant-time check of an HMAC-SHA-256 tag.
pub fn verify_hmac(key: &[u8], message: &[u8], tag: &[u8]) -> bool {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, message, tag).is_ok()
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// SHA-256 of `data` as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 of everything `reader` yields, read `chunk_size` bytes at a time.
///
/// Memory use is bounded by `chunk_size` regardless of input length.
pub fn hash_reader<R: Read>(mut reader: R, chunk_size: usize) -> Result<String> {
    if chunk_size == 0 {
        return Err(TrustlabError::Validation("chunk size must be non-zero".into()));
    }

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_size];
    let mut total: u64 = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    debug!(bytes = total, "stream hashed");
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of the file at `path`, streamed.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn hash_file(path: impl AsRef<Path>, chunk_size: usize) -> Result<String> {
    let file = File::open(path.as_ref())?;
    hash_reader(file, chunk_size)
}
