//! Stream wrappers over a key store's asymmetric cipher.
//!
//! The scheme is not a stream cipher: [`CipherWriter`] buffers plaintext and
//! only emits ciphertext in [`CipherWriter::finish`], and [`CipherReader`]
//! drains its input to end-of-stream before yielding any plaintext.

use std::io::{self, Read, Write};

use zeroize::Zeroizing;

use crate::key_store::{KeyStore, KeyStoreError, PrivateKeyHandle, PublicKeyHandle};

/// A key store's cipher for one fixed transformation.
pub struct Cipher<'a, K: KeyStore + ?Sized> {
    key_store: &'a K,
}

impl<'a, K: KeyStore + ?Sized> Cipher<'a, K> {
    /// Fails if the key store does not implement `transformation` under `provider`.
    pub fn get_instance(
        key_store: &'a K,
        transformation: &str,
        provider: &str,
    ) -> Result<Self, KeyStoreError> {
        if !key_store.supports(transformation, provider) {
            return Err(KeyStoreError::UnsupportedTransformation {
                transformation: transformation.to_string(),
                provider: provider.to_string(),
            });
        }
        Ok(Self { key_store })
    }

    /// Encrypt mode: plaintext written to the returned writer is sealed to `key`.
    pub fn encrypting_writer<W: Write>(
        &self,
        key: PublicKeyHandle,
        out: W,
    ) -> CipherWriter<'a, K, W> {
        CipherWriter {
            key_store: self.key_store,
            key,
            buffer: Zeroizing::new(Vec::new()),
            out,
        }
    }

    /// Decrypt mode: ciphertext read from `input` is opened with `key`.
    pub fn decrypting_reader<R: Read>(
        &self,
        key: PrivateKeyHandle,
        input: R,
    ) -> CipherReader<'a, K, R> {
        CipherReader {
            key_store: self.key_store,
            key,
            input,
            plaintext: None,
            pos: 0,
        }
    }
}

/// Buffers plaintext; nothing reaches the inner writer until [`finish`](Self::finish).
/// Dropping it without finishing discards the plaintext.
pub struct CipherWriter<'a, K: KeyStore + ?Sized, W: Write> {
    key_store: &'a K,
    key: PublicKeyHandle,
    buffer: Zeroizing<Vec<u8>>,
    out: W,
}

impl<K: KeyStore + ?Sized, W: Write> CipherWriter<'_, K, W> {
    /// Seal everything written so far, write the ciphertext, and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        let ciphertext = self
            .key_store
            .encrypt_bytes(&self.key, &self.buffer)
            .map_err(io::Error::other)?;
        self.out.write_all(&ciphertext)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<K: KeyStore + ?Sized, W: Write> Write for CipherWriter<'_, K, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Ciphertext cannot be produced before the whole plaintext is known.
        Ok(())
    }
}

pub struct CipherReader<'a, K: KeyStore + ?Sized, R: Read> {
    key_store: &'a K,
    key: PrivateKeyHandle,
    input: R,
    plaintext: Option<Zeroizing<Vec<u8>>>,
    pos: usize,
}

impl<K: KeyStore + ?Sized, R: Read> CipherReader<'_, K, R> {
    fn open(&mut self) -> io::Result<&[u8]> {
        if self.plaintext.is_none() {
            let mut ciphertext = Vec::new();
            self.input.read_to_end(&mut ciphertext)?;
            let opened = self
                .key_store
                .decrypt_bytes(&self.key, &ciphertext)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.plaintext = Some(Zeroizing::new(opened));
        }
        Ok(self.plaintext.as_deref().map(Vec::as_slice).unwrap_or_default())
    }
}

impl<K: KeyStore + ?Sized, R: Read> Read for CipherReader<'_, K, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.pos;
        let plaintext = self.open()?;
        let remaining = &plaintext[pos.min(plaintext.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}
