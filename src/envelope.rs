//! Length-prefixed multi-frame encoding.
//!
//! Used twice: once for the on-disk envelope (header frame, ciphertext frame) and once for
//! the packed-map buffer inside the ciphertext (alternating key/value frames). Each frame is
//! a 4-byte little-endian length prefix followed by that many raw bytes; frame count is not
//! stored, callers decode until the buffer is exhausted.

use crate::errors::{Result, StoreError};

/// Concatenate `frames` into a single length-prefixed buffer.
pub fn encode(frames: &[&[u8]]) -> Vec<u8> {
    let total: usize = frames.iter().map(|f| 4 + f.len()).sum();
    let mut out = Vec::with_capacity(total);
    for frame in frames {
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(frame);
    }
    out
}

/// Split `buf` back into its constituent frames, failing if the length prefixes don't
/// exactly exhaust the buffer.
pub fn decode(buf: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut frames = Vec::new();
    let mut pos = 0usize;
    while pos < buf.len() {
        if buf.len() - pos < 4 {
            return Err(StoreError::Decode(
                "truncated frame length prefix".to_string(),
            ));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[pos..pos + 4]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        pos += 4;
        if buf.len() - pos < len {
            return Err(StoreError::Decode("truncated frame body".to_string()));
        }
        frames.push(buf[pos..pos + len].to_vec());
        pos += len;
    }
    Ok(frames)
}

/// Decode exactly `n` frames, failing on a mismatched frame count (missing or excess
/// frames are both decode failures per the envelope's contract).
pub fn decode_exact(buf: &[u8], n: usize) -> Result<Vec<Vec<u8>>> {
    let frames = decode(buf)?;
    if frames.len() != n {
        return Err(StoreError::Decode(format!(
            "expected exactly {} frames, got {}",
            n,
            frames.len()
        )));
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_empty() {
        let buf = encode(&[]);
        assert!(decode(&buf).unwrap().is_empty());
    }

    #[test]
    fn round_trip_frames() {
        let buf = encode(&[b"hello", b"", b"world"]);
        let frames = decode(&buf).unwrap();
        assert_eq!(frames, vec![b"hello".to_vec(), b"".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn decode_exact_rejects_wrong_count() {
        let buf = encode(&[b"only-one"]);
        assert!(decode_exact(&buf, 2).is_err());
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let mut buf = encode(&[b"hello"]);
        buf.truncate(buf.len() - 1);
        assert!(decode(&buf).is_err());
    }
}
