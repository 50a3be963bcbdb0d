//! Word codec: pack/unpack 16-bit little-endian words from a byte image.

/// Unpacks a byte image into signed 16-bit little-endian words.
///
/// Any trailing odd byte is dropped, matching `len(raw) // 2` in the
/// reference implementation.
#[must_use]
pub fn unpack(raw: &[u8]) -> Vec<i16> {
    raw.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Packs signed 16-bit words into a little-endian byte buffer.
#[must_use]
pub fn pack(words: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 2);
    for &w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}
