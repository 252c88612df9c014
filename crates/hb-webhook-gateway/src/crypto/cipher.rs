//! # Platform Message Cipher
//!
//! AES-256-CBC as mandated by the WeCom callback protocol.
//!
//! ## Envelope Layout
//!
//! ```text
//! base64( AES-256-CBC( PKCS7_32( random[16] || len:u32be || msg || receiver_id ) ) )
//! ```
//!
//! - Key: `base64(EncodingAESKey + "=")`, 43 characters to 32 bytes
//! - IV: first 16 key bytes (fixed by the platform, not per message)
//! - Padding block: 32 bytes

use crate::crypto::padding::{pkcs7_pad, pkcs7_unpad};
use crate::crypto::CipherError;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, PAD, STANDARD};
use base64::Engine as _;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block size in bytes
pub const AES_BLOCK: usize = 16;
/// Padding block used by the platform envelope
pub const PLATFORM_PAD_BLOCK: usize = 32;
/// Leading random block of the envelope plaintext
pub const RANDOM_PREFIX_LEN: usize = 16;
/// Big-endian message length following the random block
const LENGTH_PREFIX_LEN: usize = 4;

/// The platform's EncodingAESKey may carry non-zero trailing bits in its
/// last character; decoders on the platform side ignore them.
const LENIENT_STANDARD: GeneralPurpose =
    GeneralPurpose::new(&alphabet::STANDARD, PAD.with_decode_allow_trailing_bits(true));

/// AES-256 key (256-bit).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AesKey([u8; 32]);

impl AesKey {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a slice that must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CipherError> {
        let key: [u8; 32] = bytes.try_into().map_err(|_| {
            CipherError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(key))
    }

    /// Decode a 43-character EncodingAESKey.
    pub fn from_encoding_aes_key(encoding_aes_key: &str) -> Result<Self, CipherError> {
        if encoding_aes_key.len() != 43 {
            return Err(CipherError::InvalidKey(format!(
                "EncodingAESKey must be 43 characters, got {}",
                encoding_aes_key.len()
            )));
        }
        let decoded = LENIENT_STANDARD
            .decode(format!("{}=", encoding_aes_key))
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        Self::from_slice(&decoded)
    }

    /// Get inner bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The fixed IV convention: the first 16 key bytes.
    pub fn derived_iv(&self) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&self.0[..16]);
        iv
    }
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesKey(<redacted>)")
    }
}

/// Encrypt already-padded data.
pub(crate) fn cbc_encrypt(key: &AesKey, iv: &[u8; 16], padded: &[u8]) -> Result<Vec<u8>, CipherError> {
    if padded.len() % AES_BLOCK != 0 {
        return Err(CipherError::Misaligned(padded.len()));
    }
    let encryptor = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
    Ok(encryptor.encrypt_padded_vec_mut::<NoPadding>(padded))
}

/// Decrypt without removing padding.
pub(crate) fn cbc_decrypt(key: &AesKey, iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK != 0 {
        return Err(CipherError::Misaligned(ciphertext.len()));
    }
    let decryptor = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
    decryptor
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CipherError::Misaligned(ciphertext.len()))
}

/// Plaintext recovered from a platform envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformMessage {
    /// Inner message (XML for callbacks, raw text for `echostr`)
    pub message: String,
    /// Receiver id carried after the message (corp id)
    pub receiver_id: String,
}

/// Encrypt/decrypt for the platform message envelope.
#[derive(Clone, Debug)]
pub struct PlatformCipher {
    key: AesKey,
    receiver_id: Option<String>,
}

impl PlatformCipher {
    /// Build from the configured EncodingAESKey.
    ///
    /// When `receiver_id` is set, decrypted envelopes addressed to anyone
    /// else are rejected.
    pub fn new(encoding_aes_key: &str, receiver_id: Option<String>) -> Result<Self, CipherError> {
        Ok(Self {
            key: AesKey::from_encoding_aes_key(encoding_aes_key)?,
            receiver_id,
        })
    }

    /// Decrypt a base64 envelope and strip its framing.
    pub fn decrypt(&self, ciphertext_b64: &str) -> Result<PlatformMessage, CipherError> {
        let ciphertext = STANDARD.decode(ciphertext_b64.trim())?;
        let plain = cbc_decrypt(&self.key, &self.key.derived_iv(), &ciphertext)?;
        let framed = pkcs7_unpad(&plain, PLATFORM_PAD_BLOCK)?;

        let header = RANDOM_PREFIX_LEN + LENGTH_PREFIX_LEN;
        if framed.len() < header {
            return Err(CipherError::Truncated(format!(
                "{} bytes, need at least {}",
                framed.len(),
                header
            )));
        }

        let body = &framed[RANDOM_PREFIX_LEN..];
        let (len_bytes, rest) = body.split_at(LENGTH_PREFIX_LEN);
        let msg_len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        if msg_len > rest.len() {
            return Err(CipherError::Truncated(format!(
                "length prefix {} exceeds {} remaining bytes",
                msg_len,
                rest.len()
            )));
        }

        let (msg, receiver) = rest.split_at(msg_len);
        let message = std::str::from_utf8(msg).map_err(|_| CipherError::InvalidUtf8)?;
        let receiver_id = std::str::from_utf8(receiver).map_err(|_| CipherError::InvalidUtf8)?;

        if let Some(expected) = &self.receiver_id {
            if expected != receiver_id {
                return Err(CipherError::ReceiverMismatch {
                    expected: expected.clone(),
                    actual: receiver_id.to_string(),
                });
            }
        }

        Ok(PlatformMessage {
            message: message.to_string(),
            receiver_id: receiver_id.to_string(),
        })
    }

    /// Encrypt a message into a base64 envelope with a fresh random prefix.
    pub fn encrypt(&self, message: &str) -> Result<String, CipherError> {
        let mut random = [0u8; RANDOM_PREFIX_LEN];
        rand::thread_rng().fill_bytes(&mut random);
        self.encrypt_with_prefix(random, message)
    }

    /// Encrypt with a caller-supplied random prefix.
    pub fn encrypt_with_prefix(
        &self,
        random: [u8; RANDOM_PREFIX_LEN],
        message: &str,
    ) -> Result<String, CipherError> {
        let receiver = self.receiver_id.as_deref().unwrap_or_default();
        let msg_len = u32::try_from(message.len())
            .map_err(|_| CipherError::Serialization("message exceeds u32 length".into()))?;

        let mut framed =
            Vec::with_capacity(RANDOM_PREFIX_LEN + LENGTH_PREFIX_LEN + message.len() + receiver.len());
        framed.extend_from_slice(&random);
        framed.extend_from_slice(&msg_len.to_be_bytes());
        framed.extend_from_slice(message.as_bytes());
        framed.extend_from_slice(receiver.as_bytes());

        let padded = pkcs7_pad(&framed, PLATFORM_PAD_BLOCK);
        let ciphertext = cbc_encrypt(&self.key, &self.key.derived_iv(), &padded)?;
        Ok(STANDARD.encode(ciphertext))
    }
}
