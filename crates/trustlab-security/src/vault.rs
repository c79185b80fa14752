// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key vault — age (scrypt passphrase recipient) sealing for the config
// signing key.  This is the only path by which private key material leaves
// process memory.
//
// Sealed file layout (plaintext inside the age envelope):
//   line 1: algorithm name (e.g. "ed25519")
//   rest:   PKCS#8 DER document

use std::io::{Read, Write};
use std::path::Path;

use age::secrecy::SecretString;
use tracing::{debug, info, instrument};
use trustlab_core::error::{Result, TrustlabError};
use trustlab_core::types::SigningAlgorithm;

use crate::crypto::{SigningKeyPair, generate_keypair};

/// Passphrase-based sealing for signing keys.
///
/// The passphrase is held only for the lifetime of the `KeyVault` value.
pub struct KeyVault {
    /// Zeroised on drop.
    passphrase: SecretString,
}

impl KeyVault {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: SecretString::from(passphrase.into()),
        }
    }

    /// Encrypt `plaintext` into a complete age file.
    #[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let encryptor = age::Encryptor::with_user_passphrase(self.passphrase.clone());
        let mut ciphertext = Vec::new();

        let mut writer = encryptor
            .wrap_output(&mut ciphertext)
            .map_err(|e| TrustlabError::Encryption(e.to_string()))?;

        writer
            .write_all(plaintext)
            .map_err(|e| TrustlabError::Encryption(e.to_string()))?;

        writer
            .finish()
            .map_err(|e| TrustlabError::Encryption(e.to_string()))?;

        Ok(ciphertext)
    }

    #[instrument(skip_all, fields(ciphertext_len = ciphertext.len()))]
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let decryptor = age::Decryptor::new(ciphertext)
            .map_err(|e| TrustlabError::Decryption(e.to_string()))?;

        let identity = age::scrypt::Identity::new(self.passphrase.clone());

        let mut reader = decryptor
            .decrypt(std::iter::once(&identity as &dyn age::Identity))
            .map_err(|e| TrustlabError::Decryption(e.to_string()))?;

        let mut plaintext = Vec::new();
        reader
            .read_to_end(&mut plaintext)
            .map_err(|e| TrustlabError::Decryption(e.to_string()))?;

        Ok(plaintext)
    }

    /// Seal `key` into an age envelope.
    pub fn seal_key(&self, key: &SigningKeyPair) -> Result<Vec<u8>> {
        let mut plaintext = Vec::with_capacity(key.pkcs8_der().len() + 32);
        plaintext.extend_from_slice(key.algorithm().as_str().as_bytes());
        plaintext.push(b'\n');
        plaintext.extend_from_slice(key.pkcs8_der());

        let sealed = self.encrypt(&plaintext)?;
        debug!(sealed_len = sealed.len(), "signing key sealed");
        Ok(sealed)
    }

    /// Open an envelope produced by [`KeyVault::seal_key`].
    pub fn unseal_key(&self, sealed: &[u8]) -> Result<SigningKeyPair> {
        let plaintext = self.decrypt(sealed)?;

        let split = plaintext
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| TrustlabError::Key("sealed key has no algorithm header".into()))?;
        let (header, der) = plaintext.split_at(split);

        let algorithm = match header {
            b"ed25519" => SigningAlgorithm::Ed25519,
            b"ecdsa_p256_sha256" => SigningAlgorithm::EcdsaP256Sha256,
            other => {
                return Err(TrustlabError::Key(format!(
                    "unknown key algorithm {:?}",
                    String::from_utf8_lossy(other)
                )));
            }
        };

        SigningKeyPair::from_pkcs8(algorithm, &der[1..])
    }

    /// Load the sealed key at `path`, or generate one and seal it there.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), %algorithm))]
    pub fn load_or_create(
        &self,
        path: impl AsRef<Path>,
        algorithm: SigningAlgorithm,
    ) -> Result<SigningKeyPair> {
        let path = path.as_ref();
        if path.exists() {
            let sealed = std::fs::read(path)?;
            let key = self.unseal_key(&sealed)?;
            info!(algorithm = %key.algorithm(), "signing key unsealed");
            return Ok(key);
        }

        let key = generate_keypair(algorithm)?;
        std::fs::write(path, self.seal_key(&key)?)?;
        info!(algorithm = %algorithm, "new signing key generated and sealed");
        Ok(key)
    }
}
