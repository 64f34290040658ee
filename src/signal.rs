//! Chunked signal compression helpers.
//!
//! A read's signal is split into fixed-size chunks before compression;
//! each chunk becomes one row of the signal table. Keeping chunks
//! bounded caps decode memory and lets partial-range access skip chunks
//! it does not need.

use crate::error::Pod5Error;

/// Number of samples per compressed chunk unless the writer overrides it.
pub const DEFAULT_SIGNAL_CHUNK_SIZE: usize = 102_400;

/// Compress one contiguous signal slice into a single chunk.
pub fn compress_signal(signal: &[i16]) -> Result<Vec<u8>, Pod5Error> {
    Ok(svb16::encode(signal)?)
}

/// Decompress one chunk, checking the recovered sample count.
pub fn decompress_signal(compressed: &[u8], sample_count: usize) -> Result<Vec<i16>, Pod5Error> {
    Ok(svb16::decode(compressed, sample_count)?)
}

/// Decompress one chunk into an existing buffer, whose length states
/// the expected sample count.
pub fn decompress_signal_into(compressed: &[u8], output: &mut [i16]) -> Result<(), Pod5Error> {
    let decoded = svb16::decode(compressed, output.len())?;
    output.copy_from_slice(&decoded);
    Ok(())
}

/// Split `signal` into chunks of at most `chunk_size` samples and
/// compress each. Returns the chunks and their uncompressed sample
/// counts; both are empty for an empty signal.
pub fn compress_signal_chunked(
    signal: &[i16],
    chunk_size: usize,
) -> Result<(Vec<Vec<u8>>, Vec<u32>), Pod5Error> {
    assert!(chunk_size > 0, "signal chunk size must be non-zero");
    let mut chunks = Vec::with_capacity(signal.len().div_ceil(chunk_size));
    let mut chunk_lengths = Vec::with_capacity(chunks.capacity());
    for slice in signal.chunks(chunk_size) {
        chunks.push(compress_signal(slice)?);
        chunk_lengths.push(slice.len() as u32);
    }
    Ok((chunks, chunk_lengths))
}

/// Decompress a sequence of chunks into one contiguous signal.
pub fn decompress_signal_chunked<C: AsRef<[u8]>>(
    chunks: &[C],
    sample_counts: &[u32],
) -> Result<Vec<i16>, Pod5Error> {
    if chunks.len() != sample_counts.len() {
        return Err(Pod5Error::CorruptSignal(format!(
            "inconsistent chunk counts: {} chunks, {} sample counts",
            chunks.len(),
            sample_counts.len()
        )));
    }
    let total = sample_counts.iter().map(|&n| n as usize).sum();
    let mut signal = Vec::with_capacity(total);
    for (chunk, &count) in chunks.iter().zip(sample_counts) {
        signal.extend(decompress_signal(chunk.as_ref(), count as usize)?);
    }
    Ok(signal)
}

#[cfg(test)]
mod test {
    use super::*;

    fn ramp(len: usize) -> Vec<i16> {
        (0..len).map(|i| (i % 3000) as i16 - 1500).collect()
    }

    #[test]
    fn test_chunked_roundtrip() -> eyre::Result<()> {
        for (len, chunk_size) in [
            (0usize, 4usize),
            (1, 4),
            (4, 4),
            (5, 4),
            (1024, 100),
            (250_000, DEFAULT_SIGNAL_CHUNK_SIZE),
        ] {
            let signal = ramp(len);
            let (chunks, counts) = compress_signal_chunked(&signal, chunk_size)?;
            assert_eq!(chunks.len(), len.div_ceil(chunk_size));
            assert_eq!(
                counts.iter().map(|&c| c as usize).sum::<usize>(),
                signal.len()
            );
            let roundtripped = decompress_signal_chunked(&chunks, &counts)?;
            assert_eq!(roundtripped, signal);
        }
        Ok(())
    }

    #[test]
    fn test_empty_signal() -> eyre::Result<()> {
        let (chunks, counts) = compress_signal_chunked(&[], DEFAULT_SIGNAL_CHUNK_SIZE)?;
        assert!(chunks.is_empty());
        assert!(counts.is_empty());
        assert_eq!(
            decompress_signal_chunked::<Vec<u8>>(&[], &[])?,
            Vec::<i16>::new()
        );
        Ok(())
    }

    #[test]
    fn test_decompress_into_buffer() -> eyre::Result<()> {
        let signal = ramp(512);
        let compressed = compress_signal(&signal)?;
        let mut output = vec![0i16; signal.len()];
        decompress_signal_into(&compressed, &mut output)?;
        assert_eq!(output, signal);
        Ok(())
    }

    #[test]
    fn test_mismatched_chunk_counts() {
        let (chunks, _) = compress_signal_chunked(&ramp(10), 4).unwrap();
        let err = decompress_signal_chunked(&chunks, &[4, 4]).unwrap_err();
        assert!(matches!(err, Pod5Error::CorruptSignal(_)));
    }
}
