use ring::{
    aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, NONCE_LEN},
    rand::{SecureRandom, SystemRandom},
};

use crate::{error::Error, Result};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Seals and opens storefront API credentials with AES-256-GCM.
///
/// Sealed form is `{nonce_hex}:{ciphertext_and_tag_hex}` with a fresh random
/// nonce per call, so sealing the same credential twice yields different
/// output.
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; KEY_LEN],
    rng: SystemRandom,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    /// Create a cipher from a 64-character hex key.
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let bytes = hex::decode(key_hex)
            .map_err(|_| Error::Config("encryption key must be a hex string".into()))?;
        let key = bytes.try_into().map_err(|_| {
            Error::Config(format!(
                "encryption key must be {} hex characters ({KEY_LEN} bytes)",
                KEY_LEN * 2
            ))
        })?;
        Ok(Self {
            key,
            rng: SystemRandom::new(),
        })
    }

    fn key(&self) -> Result<LessSafeKey> {
        let unbound = UnboundKey::new(&aead::AES_256_GCM, &self.key)
            .map_err(|_| Error::Crypto("invalid key material"))?;
        Ok(LessSafeKey::new(unbound))
    }

    /// Seal a plaintext credential.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| Error::Crypto("nonce generation failed"))?;
        let mut sealed = plaintext.as_bytes().to_vec();
        self.key()?
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::empty(),
                &mut sealed,
            )
            .map_err(|_| Error::Crypto("encryption failed"))?;
        Ok(format!("{}:{}", hex::encode(nonce), hex::encode(&sealed)))
    }

    /// Open a sealed credential.
    pub fn open(&self, sealed: &str) -> Result<String> {
        let (nonce_hex, data_hex) = sealed
            .split_once(':')
            .ok_or(Error::Crypto("invalid sealed credential format"))?;
        let nonce_bytes =
            hex::decode(nonce_hex).map_err(|_| Error::Crypto("invalid sealed credential format"))?;
        let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
            .map_err(|_| Error::Crypto("invalid sealed credential format"))?;
        let mut data =
            hex::decode(data_hex).map_err(|_| Error::Crypto("invalid sealed credential format"))?;
        let plain = self
            .key()?
            .open_in_place(nonce, Aad::empty(), &mut data)
            .map_err(|_| Error::Crypto("decryption failed"))?;
        String::from_utf8(plain.to_vec()).map_err(|_| Error::Crypto("credential is not utf-8"))
    }
}
