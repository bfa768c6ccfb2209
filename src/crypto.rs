//! Token handling, key derivation, payload encryption and the frame tag.
//!
//! The device firmware fixes the primitives: MD5 for key derivation and for
//! the frame tag, AES-128-CBC with PKCS#7 padding for payloads.

use std::fmt;
use std::str::FromStr;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};

use crate::error::{MiioError, Result};
use crate::messages::Frame;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES block size in bytes.
pub const BLOCK_LEN: usize = 16;

/// 16-byte device secret, obtained out of band.
#[derive(Clone, PartialEq, Eq)]
pub struct Token([u8; 16]);

impl Token {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parses the 32-character hex form handed out by the cloud account.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| MiioError::MalformedToken(e.to_string()))?;
        let bytes: [u8; 16] = bytes.try_into().map_err(|v: Vec<u8>| {
            MiioError::MalformedToken(format!("expected 16 bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl FromStr for Token {
    type Err = MiioError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Key material derived from the token after the handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub key: [u8; 16],
    pub iv: [u8; 16],
}

impl SessionKeys {
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        encrypt_payload(&self.key, &self.iv, plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        decrypt_payload(&self.key, &self.iv, ciphertext)
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys(<redacted>)")
    }
}

fn md5_concat(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// `key = MD5(token)`, `iv = MD5(key || token)`.
pub fn derive_key_material(token: &Token) -> SessionKeys {
    let key = md5_concat(&[&token.as_bytes()[..]]);
    let iv = md5_concat(&[&key[..], &token.as_bytes()[..]]);
    SessionKeys { key, iv }
}

/// AES-128-CBC with PKCS#7. A full padding block is added to aligned input.
pub fn encrypt_payload(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    Aes128CbcEnc::new(&(*key).into(), &(*iv).into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Inverse of [`encrypt_payload`].
pub fn decrypt_payload(key: &[u8; 16], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(MiioError::Decryption(format!(
            "ciphertext length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_LEN
        )));
    }
    Aes128CbcDec::new(&(*key).into(), &(*iv).into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| MiioError::Decryption("invalid PKCS#7 padding".into()))
}

/// MD5 over a serialized frame whose checksum field holds the token.
pub fn authentication_tag(frame_bytes: &[u8]) -> [u8; 16] {
    md5_concat(&[frame_bytes])
}

/// Recomputes the tag of a received frame and compares it with its checksum.
pub fn verify_authentication_tag(frame: &Frame, token: &Token) -> Result<bool> {
    let mut placeholder = frame.clone();
    placeholder.checksum = *token.as_bytes();
    let expected = authentication_tag(&placeholder.encode()?);
    Ok(expected == frame.checksum)
}
