//! Generic at-rest encryption for serializable records.
//!
//! `seal` writes `base64(iv[16] || AES-256-CBC(PKCS7_16(json)))` with a fresh
//! random IV per call. `open_legacy` reads blobs from the older scheme that
//! reused the first 16 key bytes as IV and stored no IV.

use crate::crypto::cipher::{cbc_decrypt, cbc_encrypt, AesKey, AES_BLOCK};
use crate::crypto::padding::{pkcs7_pad, pkcs7_unpad};
use crate::crypto::CipherError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;

const IV_LEN: usize = 16;

/// Encrypt a record under a fresh random IV.
pub fn seal<T: Serialize>(record: &T, key: &AesKey) -> Result<String, CipherError> {
    let json = serde_json::to_vec(record).map_err(|e| CipherError::Serialization(e.to_string()))?;

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = cbc_encrypt(key, &iv, &pkcs7_pad(&json, AES_BLOCK))?;

    let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(blob))
}

/// Decrypt a blob produced by [`seal`].
pub fn open<T: DeserializeOwned>(sealed: &str, key: &AesKey) -> Result<T, CipherError> {
    let blob = STANDARD.decode(sealed.trim())?;
    if blob.len() < IV_LEN + AES_BLOCK {
        return Err(CipherError::Truncated(format!("{} byte blob", blob.len())));
    }

    let (iv_bytes, ciphertext) = blob.split_at(IV_LEN);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(iv_bytes);

    decode_record(&cbc_decrypt(key, &iv, ciphertext)?)
}

/// Decrypt a blob from the fixed-IV scheme (IV = first 16 key bytes).
pub fn open_legacy<T: DeserializeOwned>(sealed: &str, key: &AesKey) -> Result<T, CipherError> {
    let ciphertext = STANDARD.decode(sealed.trim())?;
    decode_record(&cbc_decrypt(key, &key.derived_iv(), &ciphertext)?)
}

fn decode_record<T: DeserializeOwned>(padded: &[u8]) -> Result<T, CipherError> {
    let json = pkcs7_unpad(padded, AES_BLOCK)?;
    serde_json::from_slice(json).map_err(|e| CipherError::Serialization(e.to_string()))
}
