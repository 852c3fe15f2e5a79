// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Length-prefixed byte encodings used for Paillier keys on the wire.

use crate::errors::{Error, Result};

/// Big-endian encoding of `input` in exactly `length` bytes (I2OSP from
/// RFC 8017).
pub(crate) fn i2osp(input: usize, length: usize) -> Result<Vec<u8>> {
    let bytes = input.to_be_bytes();
    let significant = bytes.len() - (input.leading_zeros() / 8) as usize;
    if significant > length {
        return Err(Error::Serialization(format!(
            "length {input} does not fit into {length} bytes"
        )));
    }

    let mut output = vec![0u8; length.saturating_sub(bytes.len())];
    output.extend_from_slice(&bytes[bytes.len().saturating_sub(length)..]);
    Ok(output)
}

/// Inverse of [`i2osp`].
pub(crate) fn os2ip(input: &[u8]) -> Result<usize> {
    if input.len() > core::mem::size_of::<usize>() {
        return Err(Error::Serialization("length prefix is too long".into()));
    }

    Ok(input
        .iter()
        .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte)))
}

// Computes I2OSP(len(input), max_bytes) || input
pub(crate) fn serialize(input: &[u8], max_bytes: usize) -> Result<Vec<u8>> {
    Ok([&i2osp(input.len(), max_bytes)?, input].concat())
}

// Tokenizes an input of the format I2OSP(len(input), max_bytes) || input, outputting
// (input, remainder)
pub(crate) fn tokenize(input: &[u8], size_bytes: usize) -> Result<(Vec<u8>, Vec<u8>)> {
    if size_bytes > core::mem::size_of::<usize>() || input.len() < size_bytes {
        return Err(Error::Serialization("input is shorter than its length prefix".into()));
    }

    let size = os2ip(&input[..size_bytes])?;
    if size_bytes + size > input.len() {
        return Err(Error::Serialization(format!(
            "length prefix {size} exceeds the remaining {} bytes",
            input.len() - size_bytes
        )));
    }

    Ok((
        input[size_bytes..size_bytes + size].to_vec(),
        input[size_bytes + size..].to_vec(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i2osp_rejects_oversized_lengths() {
        assert_eq!(i2osp(0x1234, 2).unwrap(), vec![0x12, 0x34]);
        assert!(i2osp(0x10000, 2).is_err());
    }

    #[test]
    fn tokenize_splits_off_the_first_field() {
        let encoded = [serialize(b"abc", 2).unwrap(), serialize(b"", 2).unwrap()].concat();
        let (first, rest) = tokenize(&encoded, 2).unwrap();
        assert_eq!(first, b"abc");
        let (second, rest) = tokenize(&rest, 2).unwrap();
        assert!(second.is_empty());
        assert!(rest.is_empty());
    }

    #[test]
    fn truncated_input_is_rejected() {
        let encoded = serialize(b"abcdef", 2).unwrap();
        assert!(tokenize(&encoded[..5], 2).is_err());
        assert!(tokenize(&[0u8], 2).is_err());
    }
}
