//! Transparent AES-256-CTR encryption of the archive file.
//!
//! A password turns the archive into: a 32-byte random salt, followed
//! by the unencrypted format XORed with an AES-256-CTR
//! keystream keyed by scrypt-stretching `(password, salt)`. Everything
//! above this layer — block, journal, scheduler — is unaware that
//! encryption is in effect; it just sees a plain `Read`/`Write`.

use std::io::{self, Read, Write};

use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::ResourceError;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

pub const SALT_LEN: usize = 32;
const KEY_LEN: usize = 32;
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// Stretch `(password, salt)` into a 32-byte AES-256 key with scrypt's
/// default cost parameters (N=2^14, r=8, p=1).
pub fn derive_key(password: &str, salt: &[u8; SALT_LEN]) -> Result<Zeroizing<[u8; KEY_LEN]>, ResourceError> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|e| ResourceError::KeyDerivation(e.to_string()))?;
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt::scrypt(password.as_bytes(), salt, &params, key.as_mut())
        .map_err(|e| ResourceError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Generate a fresh random 32-byte salt. Its first byte's high bit is
/// flipped so the *unencrypted* archive's first byte (after this salt)
/// can never collide with `'z'` (0x7A) or `'7'` (0x37), letting a
/// reader tell an encrypted archive apart from a plain one by sight.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt[0] |= 0x80;
    salt
}

/// Wraps a `Read` in an AES-256-CTR keystream: every byte read from the
/// underlying reader is XORed with the next keystream byte before
/// being handed to the caller.
pub struct CryptReader<R> {
    inner: R,
    cipher: Aes256Ctr,
}

impl<R: Read> CryptReader<R> {
    pub fn new(inner: R, key: &[u8; KEY_LEN]) -> Self {
        let iv = [0u8; 16];
        Self { inner, cipher: Aes256Ctr::new(key.into(), &iv.into()) }
    }
}

impl<R: Read> Read for CryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}

/// Wraps a `Write` in the same keystream on the write side.
pub struct CryptWriter<W> {
    inner: W,
    cipher: Aes256Ctr,
    scratch: Vec<u8>,
}

impl<W: Write> CryptWriter<W> {
    pub fn new(inner: W, key: &[u8; KEY_LEN]) -> Self {
        let iv = [0u8; 16];
        Self { inner, cipher: Aes256Ctr::new(key.into(), &iv.into()), scratch: Vec::new() }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.cipher.apply_keystream(&mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn generated_salts_never_start_with_the_archive_signature_bytes() {
        for _ in 0..64 {
            let salt = generate_salt();
            assert_ne!(salt[0], b'z');
            assert_ne!(salt[0], b'7');
        }
    }

    #[test]
    fn key_derivation_is_deterministic_for_the_same_inputs() {
        let salt = [1u8; SALT_LEN];
        let a = derive_key("hunter2", &salt).unwrap();
        let b = derive_key("hunter2", &salt).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn different_passwords_derive_different_keys() {
        let salt = [1u8; SALT_LEN];
        let a = derive_key("hunter2", &salt).unwrap();
        let b = derive_key("hunter3", &salt).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn writer_then_reader_round_trips_plaintext() {
        let key = [7u8; KEY_LEN];
        let plaintext = b"the archive body, byte for byte".to_vec();

        let mut writer = CryptWriter::new(Vec::new(), &key);
        writer.write_all(&plaintext).unwrap();
        let ciphertext = writer.into_inner();
        assert_ne!(ciphertext, plaintext);

        let mut reader = CryptReader::new(Cursor::new(ciphertext), &key);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, plaintext);
    }
}
