// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! LAN payload encryption.
//!
//! Devices in LAN mode encrypt their advertisement payload, and expect
//! command payloads encrypted, with AES-128-CBC and PKCS#7 padding. The key
//! is the MD5 digest of the device key; the 16-byte IV travels next to the
//! payload. Both payload and IV are base64 encoded.

use aes::Aes128;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};
use rand::RngCore;
use serde_json::{Map, Value};

use crate::error::CryptoError;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

const IV_LEN: usize = 16;

/// Derives the payload key from a device key.
#[must_use]
pub fn derive_key(device_key: &str) -> [u8; 16] {
    Md5::digest(device_key.as_bytes()).into()
}

/// Generates a random IV, base64 encoded.
#[must_use]
pub fn random_iv() -> String {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    STANDARD.encode(iv)
}

fn decode_iv(iv: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = STANDARD
        .decode(iv.trim())
        .map_err(|e| CryptoError::Base64(e.to_string()))?;
    if bytes.len() != IV_LEN {
        return Err(CryptoError::InvalidIv(bytes.len()));
    }
    Ok(bytes)
}

/// Encrypts plain text, returning the base64 cipher text.
///
/// # Errors
///
/// Returns [`CryptoError`] if the IV is not valid base64 of 16 bytes.
pub fn encrypt(plain: &str, device_key: &str, iv: &str) -> Result<String, CryptoError> {
    let key = derive_key(device_key);
    let iv = decode_iv(iv)?;
    let cipher =
        Aes128CbcEnc::new_from_slices(&key, &iv).map_err(|_| CryptoError::InvalidIv(iv.len()))?;
    let encrypted = cipher.encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());
    Ok(STANDARD.encode(encrypted))
}

/// Decrypts base64 cipher text into a string.
///
/// # Errors
///
/// Returns [`CryptoError`] on bad base64, bad IV, wrong key (padding check)
/// or non-UTF-8 output.
pub fn decrypt(cipher_text: &str, device_key: &str, iv: &str) -> Result<String, CryptoError> {
    let key = derive_key(device_key);
    let iv = decode_iv(iv)?;
    let data = STANDARD
        .decode(cipher_text.trim())
        .map_err(|e| CryptoError::Base64(e.to_string()))?;
    let cipher =
        Aes128CbcDec::new_from_slices(&key, &iv).map_err(|_| CryptoError::InvalidIv(iv.len()))?;
    let plain = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&data)
        .map_err(|_| CryptoError::Decrypt)?;
    String::from_utf8(plain).map_err(|e| CryptoError::Payload(e.to_string()))
}

/// Decrypts a payload that must hold a JSON object (a state fragment).
///
/// # Errors
///
/// Returns [`CryptoError`] if decryption fails or the result is not a JSON
/// object.
pub fn decrypt_params(
    cipher_text: &str,
    device_key: &str,
    iv: &str,
) -> Result<Map<String, Value>, CryptoError> {
    let plain = decrypt(cipher_text, device_key, iv)?;
    match serde_json::from_str::<Value>(&plain) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CryptoError::Payload(format!("expected object, got {other}"))),
        Err(e) => Err(CryptoError::Payload(e.to_string())),
    }
}
