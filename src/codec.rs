//! # Block Codec
//!
//! Compression and decompression of individual blocks.
//!
//! On the write side a block is encoded through the active codec and kept
//! only if it actually shrank; otherwise the raw bytes are stored verbatim.
//! An encoder failure also falls back to storing the block, so creation
//! never dies on codec trouble.
//!
//! On the read side the codec is detected per block from its leading bytes,
//! because the header names a single codec while any block may have been
//! stored:
//! - zlib: `78` followed by `01`, `5E`, `9C` or `DA`
//! - LZMA: the XZ stream magic `FD 37 7A 58 5A 00`
//! - anything else: stored, copied verbatim

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use xz2::stream::{Check, Stream};

use crate::common::Codec;
use crate::error::PsarcError;

/// Default zlib compression level.
pub const ZLIB_DEFAULT_LEVEL: u32 = 5;
/// Default LZMA preset.
pub const LZMA_DEFAULT_PRESET: u32 = 6;
/// liblzma's extreme-preset modifier bit.
const LZMA_PRESET_EXTREME: u32 = 1 << 31;

const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];

/// Codec selection plus its tuning, fixed for the lifetime of one create
/// operation.
#[derive(Debug, Clone, Copy)]
pub struct CodecParams {
    pub codec: Codec,
    pub level: u32,
    pub extreme: bool,
}

impl CodecParams {
    /// Resolves the level default per codec: 5 for zlib, preset 6 for LZMA.
    pub fn new(codec: Codec, level: Option<u32>, extreme: bool) -> Self {
        let level = level.unwrap_or(match codec {
            Codec::Lzma => LZMA_DEFAULT_PRESET,
            _ => ZLIB_DEFAULT_LEVEL,
        });
        CodecParams { codec, level, extreme }
    }

    fn preset(&self) -> u32 {
        self.level | if self.extreme { LZMA_PRESET_EXTREME } else { 0 }
    }
}

/// What the per-block signature check found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEncoding {
    Zlib,
    Lzma,
    Stored,
}

/// Encodes one block into `scratch`.
///
/// Returns `true` when `scratch` holds output that should be written in
/// place of the input. `false` means store the raw input: either the codec
/// is `Store`, the encoded form did not shrink, or the encoder failed.
pub fn encode_block(params: &CodecParams, input: &[u8], scratch: &mut Vec<u8>) -> bool {
    scratch.clear();
    let encoded = match params.codec {
        Codec::Store => false,
        Codec::Zlib => encode_zlib(input, params.level, scratch),
        Codec::Lzma => encode_lzma(input, params.preset(), scratch),
    };
    encoded && scratch.len() < input.len()
}

fn encode_zlib(input: &[u8], level: u32, out: &mut Vec<u8>) -> bool {
    let mut encoder = ZlibEncoder::new(out, Compression::new(level));
    if encoder.write_all(input).is_err() {
        return false;
    }
    encoder.finish().is_ok()
}

fn encode_lzma(input: &[u8], preset: u32, out: &mut Vec<u8>) -> bool {
    let stream = match Stream::new_easy_encoder(preset, Check::Crc64) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let mut encoder = xz2::write::XzEncoder::new_stream(out, stream);
    if encoder.write_all(input).is_err() {
        return false;
    }
    encoder.finish().is_ok()
}

/// Identifies the codec of a block payload by its leading bytes.
pub fn detect(payload: &[u8]) -> BlockEncoding {
    if payload.len() > 2
        && payload[0] == 0x78
        && matches!(payload[1], 0x01 | 0x5E | 0x9C | 0xDA)
    {
        BlockEncoding::Zlib
    } else if payload.len() > 6 && payload.starts_with(&XZ_MAGIC) {
        BlockEncoding::Lzma
    } else {
        BlockEncoding::Stored
    }
}

/// Decodes one block payload into `out`, which afterwards holds exactly
/// `natural` bytes (the block's position in the entry fixes that length).
pub fn decode_block(payload: &[u8], natural: usize, out: &mut Vec<u8>) -> Result<(), PsarcError> {
    out.clear();
    match detect(payload) {
        BlockEncoding::Stored => {
            out.extend_from_slice(payload);
        }
        BlockEncoding::Zlib => {
            let mut decoder = ZlibDecoder::new(payload);
            decoder
                .read_to_end(out)
                .map_err(|e| PsarcError::Decode(format!("zlib: {e}")))?;
        }
        BlockEncoding::Lzma => {
            let stream = Stream::new_stream_decoder(u64::MAX, 0)
                .map_err(|e| PsarcError::Decode(format!("lzma: {e}")))?;
            let mut decoder = xz2::read::XzDecoder::new_stream(payload, stream);
            decoder
                .read_to_end(out)
                .map_err(|e| PsarcError::Decode(format!("lzma: {e}")))?;
        }
    }
    if out.len() != natural {
        return Err(PsarcError::SizeMismatch {
            expected: natural as u64,
            actual: out.len() as u64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(codec: Codec) -> CodecParams {
        CodecParams::new(codec, None, false)
    }

    #[test]
    fn zlib_block_round_trip() {
        let input = b"the quick brown fox ".repeat(512);
        let mut scratch = Vec::new();
        assert!(encode_block(&params(Codec::Zlib), &input, &mut scratch));
        assert!(scratch.len() < input.len());
        assert_eq!(detect(&scratch), BlockEncoding::Zlib);

        let mut out = Vec::new();
        decode_block(&scratch, input.len(), &mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn lzma_block_round_trip() {
        let input = vec![0u8; 16384];
        let mut scratch = Vec::new();
        assert!(encode_block(&params(Codec::Lzma), &input, &mut scratch));
        assert_eq!(detect(&scratch), BlockEncoding::Lzma);

        let mut out = Vec::new();
        decode_block(&scratch, input.len(), &mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn store_never_encodes() {
        let mut scratch = Vec::new();
        assert!(!encode_block(&params(Codec::Store), b"anything at all", &mut scratch));
    }

    #[test]
    fn incompressible_input_falls_back_to_store() {
        // Ten bytes cost more than ten bytes once zlib wraps them.
        let input = b"xxxxxxxxxx";
        let mut scratch = Vec::new();
        assert!(!encode_block(&params(Codec::Zlib), input, &mut scratch));
    }

    #[test]
    fn stored_payload_is_copied_verbatim() {
        let payload = b"plain text, no signature";
        let mut out = Vec::new();
        decode_block(payload, payload.len(), &mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn stored_length_mismatch_is_rejected() {
        let mut out = Vec::new();
        let err = decode_block(b"12345", 9, &mut out).unwrap_err();
        assert!(matches!(err, PsarcError::SizeMismatch { expected: 9, actual: 5 }));
    }

    #[test]
    fn corrupt_zlib_payload_is_a_decode_error() {
        // Valid signature, garbage body.
        let payload = [0x78, 0x9C, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut out = Vec::new();
        assert!(matches!(
            decode_block(&payload, 100, &mut out),
            Err(PsarcError::Decode(_))
        ));
    }

    #[test]
    fn signature_detection() {
        assert_eq!(detect(&[0x78, 0x9C, 0x00]), BlockEncoding::Zlib);
        assert_eq!(detect(&[0x78, 0xDA, 0x00]), BlockEncoding::Zlib);
        assert_eq!(detect(&[0x78, 0x00, 0x00]), BlockEncoding::Stored);
        assert_eq!(detect(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00]), BlockEncoding::Lzma);
        // Too short to carry a signature.
        assert_eq!(detect(&[0x78, 0x9C]), BlockEncoding::Stored);
        assert_eq!(detect(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00]), BlockEncoding::Stored);
        assert_eq!(detect(b""), BlockEncoding::Stored);
    }
}
