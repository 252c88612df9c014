//! PKCS#7 padding with a caller-chosen block size.
//!
//! The platform envelope pads to 32 bytes even though AES blocks are 16, so
//! the block size is a parameter rather than the cipher's own.

use crate::crypto::CipherError;

/// Pad `data` to a multiple of `block_size`; always adds 1..=block_size bytes.
pub fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
    debug_assert!((1..=255).contains(&block_size));
    let pad = block_size - data.len() % block_size;
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.resize(data.len() + pad, pad as u8);
    out
}

/// Strip the padding read from the trailing byte.
pub fn pkcs7_unpad(data: &[u8], block_size: usize) -> Result<&[u8], CipherError> {
    let Some(&last) = data.last() else {
        return Err(CipherError::Truncated("empty plaintext".into()));
    };

    let pad = last as usize;
    if pad == 0 || pad > block_size || pad > data.len() {
        return Err(CipherError::BadPadding(last));
    }

    let (body, padding) = data.split_at(data.len() - pad);
    if padding.iter().any(|&b| b != last) {
        return Err(CipherError::BadPadding(last));
    }

    Ok(body)
}
