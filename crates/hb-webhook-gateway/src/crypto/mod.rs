//! # Crypto
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `signature` | SHA-1 over sorted token/timestamp/nonce | Callback authenticity |
//! | `cipher` | AES-256-CBC, key-derived IV, 32-byte PKCS#7 | Platform envelope |
//! | `sealed` | AES-256-CBC, random IV, 16-byte PKCS#7 | Records at rest |
//! | `padding` | PKCS#7 | Shared by both cipher paths |

pub mod cipher;
pub mod errors;
pub mod padding;
pub mod sealed;
pub mod signature;

pub use cipher::{AesKey, PlatformCipher, PlatformMessage};
pub use errors::CipherError;
pub use signature::{compute_signature, constant_time_compare, SignatureVerifier};
