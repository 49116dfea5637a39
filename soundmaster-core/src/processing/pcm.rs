//! 16-bit little-endian PCM conversion and level metering.

const SCALE: f32 = 32768.0;

/// Decode interleaved 16-bit LE PCM into f32 samples in `[-1.0, 1.0)`.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / SCALE)
        .collect()
}

/// Encode f32 samples as 16-bit LE PCM, appending to `out`.
///
/// Clamps out-of-range values. Decoding then encoding is lossless.
pub fn encode_pcm16(samples: &[f32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for &sample in samples {
        let scaled = (sample * SCALE).round().clamp(f32::from(i16::MIN), f32::from(i16::MAX));
        out.extend_from_slice(&(scaled as i16).to_le_bytes());
    }
}

/// RMS level of a PCM buffer (0.0–1.0).
pub fn rms_level(pcm: &[u8]) -> f32 {
    let samples = decode_pcm16(pcm);
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Peak absolute level of a PCM buffer.
pub fn peak_level(pcm: &[u8]) -> f32 {
    decode_pcm16(pcm).iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn decode_then_encode_is_lossless() {
        let bytes = pcm(&[0, 1, -1, i16::MAX, i16::MIN, 12345, -23456]);
        let mut out = Vec::new();
        encode_pcm16(&decode_pcm16(&bytes), &mut out);
        assert_eq!(out, bytes);
    }

    #[test]
    fn encode_clamps_out_of_range() {
        let mut out = Vec::new();
        encode_pcm16(&[2.0, -3.0], &mut out);
        assert_eq!(out, pcm(&[i16::MAX, i16::MIN]));
    }

    #[test]
    fn decode_ignores_trailing_byte() {
        assert_eq!(decode_pcm16(&[0, 0, 7]).len(), 1);
    }

    #[test]
    fn rms_level_silence() {
        assert_eq!(rms_level(&pcm(&[0, 0, 0])), 0.0);
        assert_eq!(rms_level(&[]), 0.0);
    }

    #[test]
    fn rms_level_half_scale() {
        let rms = rms_level(&pcm(&[16384, -16384, 16384, -16384]));
        assert_abs_diff_eq!(rms, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn peak_level_basic() {
        let peak = peak_level(&pcm(&[100, -16384, 8192]));
        assert_abs_diff_eq!(peak, 0.5, epsilon = 1e-6);
    }
}
