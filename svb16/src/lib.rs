//! Signal compression used by the POD5 format.
//!
//! POD5 stores signal with a variant of the streamvbyte algorithm. Since
//! signal values are 16-bit (i16), a value fits into either 1 or 2 data
//! bytes, so a single control bit per value is enough and every control
//! byte covers 8 values instead of 4.
//!
//! The full pipeline is `delta -> zig-zag -> streamvbyte -> zstd` on
//! encode, inverted on decode. Decoding is checked: the caller states how
//! many samples it expects and any shortfall in the payload is an error
//! rather than a panic.

use std::io;

use bitvec::{prelude::Lsb0, view::BitView};
use delta_encoding::{DeltaDecoderExt, DeltaEncoderExt};
use itertools::Itertools;
use zigzag::ZigZag;

/// Zstandard compression level used for signal chunks.
const ZSTD_LEVEL: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("zstd: {0}")]
    Zstd(#[from] io::Error),

    /// The payload ran out before the stated number of samples was
    /// recovered, or the control stream was shorter than required.
    #[error("compressed payload ended early: expected {expected} samples, recovered {recovered}")]
    TruncatedPayload { expected: usize, recovered: usize },

    /// Non-empty input was presented for a zero-sample decode.
    #[error("expected empty payload for zero samples, got {0} bytes")]
    UnexpectedPayload(usize),
}

/// Number of control bytes needed for `count` values.
///
/// Essentially ceil(count / 8), written with the same bit operators as
/// the reference implementation.
fn num_ctrl_bytes(count: usize) -> usize {
    (count >> 3) + (((count & 7) + 7) >> 3)
}

/// Worst-case size of the streamvbyte stream for `count` values, before
/// the zstd stage.
fn max_encoded_size(count: usize) -> usize {
    num_ctrl_bytes(count) + 2 * count
}

/// Tight upper bound on the compressed size of `count` samples, suitable
/// for preallocating output buffers.
pub fn max_compressed_size(count: usize) -> usize {
    zstd::zstd_safe::compress_bound(max_encoded_size(count))
}

/// Encode the streamvbyte body: one control bit per value (0 = one data
/// byte, 1 = two), control bytes first, data bytes after.
fn svb_encode(values: impl Iterator<Item = u16>, count: usize) -> Vec<u8> {
    let mut ctrl_bytes = Vec::with_capacity(num_ctrl_bytes(count));
    let mut data_bytes = Vec::with_capacity(2 * count);
    for chunk in &values.chunks(8) {
        let mut ctrl_byte = 0u8;
        let bits = ctrl_byte.view_bits_mut::<Lsb0>();
        for (value, mut code) in chunk.zip(bits.iter_mut()) {
            if value > u8::MAX as u16 {
                *code = true;
                data_bytes.extend_from_slice(&value.to_le_bytes());
            } else {
                data_bytes.push(value as u8);
            }
        }
        ctrl_bytes.push(ctrl_byte);
    }
    ctrl_bytes.append(&mut data_bytes);
    ctrl_bytes
}

/// Decode the streamvbyte body back into `count` unsigned values.
fn svb_decode(encoded: &[u8], count: usize) -> Result<Vec<u16>, CodecError> {
    let ctrl_len = num_ctrl_bytes(count);
    if encoded.len() < ctrl_len {
        return Err(CodecError::TruncatedPayload {
            expected: count,
            recovered: 0,
        });
    }
    let (ctrl, data) = encoded.split_at(ctrl_len);
    let mut values = Vec::with_capacity(count);
    let mut idx = 0;
    for code in ctrl.view_bits::<Lsb0>().iter().by_vals().take(count) {
        let value = if code {
            let Some(bytes) = data.get(idx..idx + 2) else {
                return Err(CodecError::TruncatedPayload {
                    expected: count,
                    recovered: values.len(),
                });
            };
            idx += 2;
            u16::from_le_bytes([bytes[0], bytes[1]])
        } else {
            let Some(&byte) = data.get(idx) else {
                return Err(CodecError::TruncatedPayload {
                    expected: count,
                    recovered: values.len(),
                });
            };
            idx += 1;
            byte as u16
        };
        values.push(value);
    }
    if values.len() != count {
        return Err(CodecError::TruncatedPayload {
            expected: count,
            recovered: values.len(),
        });
    }
    Ok(values)
}

/// Compress a slice of signal samples.
///
/// `delta -> zig-zag -> streamvbyte -> zstd`. An empty slice encodes to
/// empty bytes.
pub fn encode(uncompressed: &[i16]) -> Result<Vec<u8>, CodecError> {
    if uncompressed.is_empty() {
        return Ok(Vec::new());
    }
    let residuals = uncompressed.iter().copied().deltas().map(ZigZag::encode);
    let svb = svb_encode(residuals, uncompressed.len());
    Ok(zstd::bulk::compress(&svb, ZSTD_LEVEL)?)
}

/// Decompress a single signal chunk into exactly `count` samples.
///
/// `zstd -> streamvbyte -> zig-zag -> delta`. Apply this to individual
/// signal rows; the compressed rows of one read cannot be concatenated
/// and decoded in one call because each row is its own zstd frame and
/// delta stream.
pub fn decode(compressed: &[u8], count: usize) -> Result<Vec<i16>, CodecError> {
    if count == 0 {
        return if compressed.is_empty() {
            Ok(Vec::new())
        } else {
            Err(CodecError::UnexpectedPayload(compressed.len()))
        };
    }
    let encoded = zstd::decode_all(compressed)?;
    let values = svb_decode(&encoded, count)?;
    Ok(values
        .into_iter()
        .map(ZigZag::decode)
        .original()
        .collect())
}

#[cfg(test)]
mod test {
    use proptest::{arbitrary::any, prelude::proptest, prop_assert_eq};

    use super::*;

    #[test]
    fn test_num_ctrl_bytes() {
        assert_eq!(num_ctrl_bytes(0), 0);
        assert_eq!(num_ctrl_bytes(5), 1);
        assert_eq!(num_ctrl_bytes(8), 1);
        assert_eq!(num_ctrl_bytes(9), 2);
        assert_eq!(num_ctrl_bytes(17), 3);
    }

    #[test]
    fn test_svb_decode() {
        let samples = 5;
        let answer = [10u16, 1234, 20, 2345, 30];

        // answer in streamvbyte form: ctrl 0b01010 (values 1 and 3 take
        // two bytes), then the data bytes
        let xs = [0b01010u8, 10, 0xd2, 0x04, 20, 0x29, 0x09, 30];
        let decoded = svb_decode(&xs, samples).unwrap();
        assert_eq!(decoded, answer);
    }

    #[test]
    fn test_svb_roundtrip_sizes() {
        let values = [1u16, 300, 2, 65535, 255, 256];
        let encoded = svb_encode(values.iter().copied(), values.len());
        assert_eq!(svb_decode(&encoded, values.len()).unwrap(), values);
    }

    #[test]
    fn test_roundtrip() {
        let nums = [10i16, 1234, 20, 2345, 30];
        assert_eq!(decode(&encode(&nums).unwrap(), nums.len()).unwrap(), nums);
    }

    #[test]
    fn test_empty_roundtrip() {
        let encoded = encode(&[]).unwrap();
        assert!(encoded.is_empty());
        assert_eq!(decode(&encoded, 0).unwrap(), Vec::<i16>::new());
    }

    #[test]
    fn test_count_mismatch_is_error() {
        let nums = [10i16, 1234, 20, 2345, 30];
        let compressed = encode(&nums).unwrap();
        assert!(decode(&compressed, nums.len() + 3).is_err());
    }

    #[test]
    fn test_payload_for_zero_samples_is_error() {
        let compressed = encode(&[1i16, 2, 3]).unwrap();
        assert!(matches!(
            decode(&compressed, 0),
            Err(CodecError::UnexpectedPayload(_))
        ));
    }

    #[test]
    fn test_max_compressed_size_is_a_bound() {
        for len in [0usize, 1, 7, 8, 9, 1000, 102_400] {
            let samples = (0..len).map(|i| (i % 4096) as i16 - 2048).collect::<Vec<_>>();
            let compressed = encode(&samples).unwrap();
            assert!(compressed.len() <= max_compressed_size(len));
        }
    }

    proptest! {
        #[test]
        fn proptest_round_trip(ref vec in any::<Vec<i16>>()) {
            let len = vec.len();
            let vec2 = decode(&encode(vec).unwrap(), len).unwrap();
            prop_assert_eq!(vec, &vec2);
        }
    }
}
