//! Brick codec adapter (C2) — turns one padded cubic brick of voxels into an
//! ordered HEVC packet sequence and back.
//!
//! # Frame model
//! A brick of side `B` is treated as `B` sequentially stored `B×B` grayscale
//! frames. Only the Y (luma) plane carries data; chroma planes are left at
//! their allocation default since the source data has no chroma channel. The
//! encoder is stateful across the frames submitted within one
//! [`BrickCodec::encode`] call, but is fully flushed (a `send_eof` drains the
//! remaining packets) before `encode` returns.
//!
//! # Pixel format selection
//! `bits_per_sample` picks the plane format: 8 → `YUV420P`, 10 → `YUV420P10LE`,
//! 12 → `YUV420P12LE`. These are the only depths the core voxel kinds
//! (`u8·R`, `u16·R`) ever request.

use std::sync::Once;
use thiserror::Error;

use ffmpeg_the_third as ffmpeg;
use ffmpeg_the_third::format::Pixel;

/// One compressed NAL-unit-bearing packet emitted by the encoder.
pub type Packet = Vec<u8>;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("no HEVC encoder available in this FFmpeg build")]
    EncoderNotFound,
    #[error("no HEVC decoder available in this FFmpeg build")]
    DecoderNotFound,
    #[error("failed to open codec context: {0}")]
    OpenFailed(String),
    #[error("encode failed: {0}")]
    EncodeFailed(String),
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    #[error("unsupported bit depth {0} for brick codec")]
    UnsupportedBitDepth(u32),
}

static FFMPEG_INIT: Once = Once::new();

fn init_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        ffmpeg::init().expect("failed to initialize FFmpeg");
    });
}

fn pixel_format_for_bits(bits: u32) -> Result<Pixel, CodecError> {
    match bits {
        8 => Ok(Pixel::YUV420P),
        10 => Ok(Pixel::YUV420P10LE),
        12 => Ok(Pixel::YUV420P12LE),
        other => Err(CodecError::UnsupportedBitDepth(other)),
    }
}

/// Encodes and decodes one padded cubic brick at a time. Implementations are
/// expected to be re-resettable between encode and decode modes without
/// leaking the previously opened codec context.
pub trait BrickCodec {
    /// Encode `side` sequential `side × side` grayscale frames read from
    /// `src` (exactly `side^3 * bytes_per_sample` bytes) into an ordered
    /// packet list.
    fn encode(&mut self, side: u32, bits_per_sample: u32, src: &[u8]) -> Result<Vec<Packet>, CodecError>;

    /// Decode `packets` back into `side` concatenated `side × side` frames,
    /// writing into `dst`. Returns the number of bytes written.
    fn decode(&mut self, side: u32, bits_per_sample: u32, packets: &[Packet], dst: &mut [u8]) -> Result<usize, CodecError>;
}

/// HEVC-backed brick codec. Wraps `ffmpeg-the-third`'s libavcodec bindings.
///
/// Each [`encode`](BrickCodec::encode)/[`decode`](BrickCodec::decode) call
/// opens a fresh codec context sized for the brick at hand and tears it down
/// before returning: every brick is its own independent HEVC stream (see
/// C3), so there is no cross-brick state to preserve between calls.
pub struct HevcBrickCodec;

impl HevcBrickCodec {
    pub fn new() -> Self {
        init_ffmpeg();
        Self
    }

    fn build_encoder(side: u32, bits_per_sample: u32) -> Result<ffmpeg::encoder::video::Video, CodecError> {
        let pix_fmt = pixel_format_for_bits(bits_per_sample)?;
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::HEVC).ok_or(CodecError::EncoderNotFound)?;

        let context = ffmpeg::codec::context::Context::new_with_codec(codec);
        let mut video = context.encoder().video().map_err(|e| CodecError::OpenFailed(e.to_string()))?;

        video.set_width(side);
        video.set_height(side);
        video.set_format(pix_fmt);
        video.set_time_base(ffmpeg::Rational(1, 30));
        video.set_frame_rate(Some(ffmpeg::Rational(30, 1)));

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("preset", "medium");
        opts.set("tune", "fastdecode");

        video.open_as_with(codec, opts).map_err(|e| CodecError::OpenFailed(e.to_string()))
    }

    fn build_decoder(bits_per_sample: u32) -> Result<ffmpeg::decoder::video::Video, CodecError> {
        let _ = pixel_format_for_bits(bits_per_sample)?;
        let codec = ffmpeg::decoder::find(ffmpeg::codec::Id::HEVC).ok_or(CodecError::DecoderNotFound)?;

        let context = ffmpeg::codec::context::Context::new_with_codec(codec);
        context.decoder().video().map_err(|e| CodecError::OpenFailed(e.to_string()))
    }
}

impl Default for HevcBrickCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BrickCodec for HevcBrickCodec {
    fn encode(&mut self, side: u32, bits_per_sample: u32, src: &[u8]) -> Result<Vec<Packet>, CodecError> {
        let bytes_per_sample = ((bits_per_sample + 7) / 8) as usize;
        let frame_bytes = side as usize * side as usize * bytes_per_sample;
        if src.len() != frame_bytes * side as usize {
            return Err(CodecError::EncodeFailed(format!(
                "expected {} src bytes for a {side}^3 brick, got {}",
                frame_bytes * side as usize,
                src.len()
            )));
        }

        let pix_fmt = pixel_format_for_bits(bits_per_sample)?;
        let mut encoder = Self::build_encoder(side, bits_per_sample)?;
        let mut packets = Vec::new();
        let mut pts = 0i64;
        let row_bytes = side as usize * bytes_per_sample;

        for z in 0..side as usize {
            let mut frame = ffmpeg::util::frame::video::Video::new(pix_fmt, side, side);
            let stride = frame.stride(0);
            let slice = &src[z * frame_bytes..(z + 1) * frame_bytes];
            {
                let plane = frame.data_mut(0);
                for y in 0..side as usize {
                    let src_off = y * row_bytes;
                    let dst_off = y * stride;
                    plane[dst_off..dst_off + row_bytes].copy_from_slice(&slice[src_off..src_off + row_bytes]);
                }
            }
            frame.set_pts(Some(pts));
            pts += 1;

            encoder.send_frame(&frame).map_err(|e| CodecError::EncodeFailed(e.to_string()))?;
            drain_packets(&mut encoder, &mut packets)?;
        }

        encoder.send_eof().map_err(|e| CodecError::EncodeFailed(e.to_string()))?;
        drain_packets(&mut encoder, &mut packets)?;

        tracing::debug!(side, bits_per_sample, packets = packets.len(), "encoded brick");
        Ok(packets)
    }

    fn decode(&mut self, side: u32, bits_per_sample: u32, packets: &[Packet], dst: &mut [u8]) -> Result<usize, CodecError> {
        let bytes_per_sample = ((bits_per_sample + 7) / 8) as usize;
        let frame_bytes = side as usize * side as usize * bytes_per_sample;
        let mut decoder = Self::build_decoder(bits_per_sample)?;
        let mut written = 0usize;

        for data in packets {
            let pkt = ffmpeg::Packet::copy(data);
            decoder.send_packet(&pkt).map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
            written += drain_frames(&mut decoder, dst, written, frame_bytes, side, bytes_per_sample)?;
        }
        decoder.send_eof().map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
        written += drain_frames(&mut decoder, dst, written, frame_bytes, side, bytes_per_sample)?;

        tracing::debug!(side, bits_per_sample, packets = packets.len(), bytes_written = written, "decoded brick");
        Ok(written)
    }
}

fn drain_packets(encoder: &mut ffmpeg::encoder::video::Video, out: &mut Vec<Packet>) -> Result<(), CodecError> {
    let mut pkt = ffmpeg::Packet::empty();
    loop {
        match encoder.receive_packet(&mut pkt) {
            Ok(()) => out.push(pkt.data().unwrap_or(&[]).to_vec()),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => break,
            Err(ffmpeg::Error::Eof) => break,
            Err(e) => return Err(CodecError::EncodeFailed(e.to_string())),
        }
    }
    Ok(())
}

fn drain_frames(
    decoder: &mut ffmpeg::decoder::video::Video,
    dst: &mut [u8],
    written: usize,
    frame_bytes: usize,
    side: u32,
    bytes_per_sample: usize,
) -> Result<usize, CodecError> {
    let mut frame = ffmpeg::util::frame::video::Video::empty();
    let mut cursor = written;
    let start = written;
    let row_bytes = side as usize * bytes_per_sample;
    loop {
        match decoder.receive_frame(&mut frame) {
            Ok(()) => {
                if cursor + frame_bytes > dst.len() {
                    return Err(CodecError::DecodeFailed(
                        "decoded more brick frames than the destination buffer holds".into(),
                    ));
                }
                let stride = frame.stride(0);
                let plane = frame.data(0);
                for y in 0..side as usize {
                    let src_off = y * stride;
                    let dst_off = cursor + y * row_bytes;
                    dst[dst_off..dst_off + row_bytes].copy_from_slice(&plane[src_off..src_off + row_bytes]);
                }
                cursor += frame_bytes;
            }
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => break,
            Err(ffmpeg::Error::Eof) => break,
            Err(e) => return Err(CodecError::DecodeFailed(e.to_string())),
        }
    }
    Ok(cursor - start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_mapping() {
        assert_eq!(pixel_format_for_bits(8).unwrap(), Pixel::YUV420P);
        assert_eq!(pixel_format_for_bits(10).unwrap(), Pixel::YUV420P10LE);
        assert_eq!(pixel_format_for_bits(12).unwrap(), Pixel::YUV420P12LE);
        assert!(pixel_format_for_bits(24).is_err());
    }

    // Full encode/decode round-trips against the real HEVC codec require a
    // working FFmpeg install and live in tests/region_engine.rs alongside
    // the region engine they back, not here.
}
