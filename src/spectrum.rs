//! Per-chunk spectral analysis.
//!
//! Turns an interleaved stereo PCM chunk into a fixed 20-bin magnitude
//! snapshot plus average per-channel levels. The frequency-domain transform
//! itself is an injected pure function; the default is a forward FFT.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::protocol::{SpectrumSnapshot, SPECTRUM_BINS};

/// Minimum number of frames a chunk must carry to be analyzed. Smaller
/// chunks are skipped and the previous snapshot stays valid.
pub const MIN_SPECTRUM_FRAMES: usize = 512;

/// Numeric encoding of the PCM samples in a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum SampleFormat {
    U8,
    I16,
    I32,
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::I16 => 2,
            SampleFormat::I32 => 4,
            SampleFormat::F32 => 4,
        }
    }
}

/// Pure transform from time-domain samples to magnitude spectrum.
pub type SpectrumTransform = Box<dyn Fn(&[f64]) -> Vec<f64> + Send>;

/// Result of analyzing one delivered chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedChunk {
    pub snapshot: SpectrumSnapshot,
    pub level_left: f64,
    pub level_right: f64,
}

/// Chunk analyzer owned by the audio pipeline.
pub struct SpectrumAnalyzer {
    transform: SpectrumTransform,
}

impl SpectrumAnalyzer {
    pub fn new(transform: SpectrumTransform) -> Self {
        Self { transform }
    }

    /// Analyzer backed by a forward FFT returning the magnitudes of the
    /// positive-frequency half of the transform.
    pub fn with_fft() -> Self {
        Self::new(Box::new(|samples: &[f64]| {
            let len = samples.len();
            if len == 0 {
                return Vec::new();
            }
            let fft = FftPlanner::new().plan_fft_forward(len);
            let mut buffer: Vec<Complex<f64>> =
                samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
            fft.process(&mut buffer);
            let norm = 1.0 / len as f64;
            buffer[..len / 2].iter().map(|c| c.norm() * norm).collect()
        }))
    }

    /// Analyzes one interleaved chunk. Returns `None` (no snapshot) when the
    /// chunk is shorter than [`MIN_SPECTRUM_FRAMES`] or not two-channel.
    pub fn analyze(
        &self,
        data: &[u8],
        format: SampleFormat,
        channels: u16,
    ) -> Option<AnalyzedChunk> {
        if channels != 2 {
            return None;
        }
        let bytes_per_frame = format.bytes_per_sample() * channels as usize;
        let frames = data.len() / bytes_per_frame;
        if frames < MIN_SPECTRUM_FRAMES {
            return None;
        }

        let mut samples = Vec::with_capacity(frames);
        let mut level_left = 0.0f64;
        let mut level_right = 0.0f64;
        for frame in 0..frames {
            let offset = frame * bytes_per_frame;
            let (left, right, peak) = decode_frame(data, offset, format);
            samples.push(left / peak);
            level_left += left;
            level_right += right;
        }

        let magnitudes = (self.transform)(&samples);
        if magnitudes.is_empty() {
            return None;
        }

        Some(AnalyzedChunk {
            snapshot: stride_reduce(&magnitudes),
            level_left: level_left / frames as f64,
            level_right: level_right / frames as f64,
        })
    }
}

/// Raw left/right sample values at `offset` plus the full-scale peak used
/// for normalization.
fn decode_frame(data: &[u8], offset: usize, format: SampleFormat) -> (f64, f64, f64) {
    match format {
        SampleFormat::U8 => {
            let left = data[offset] as f64 - 128.0;
            let right = data[offset + 1] as f64 - 128.0;
            (left, right, u8::MAX as f64 / 2.0)
        }
        SampleFormat::I16 => {
            let left = i16::from_le_bytes([data[offset], data[offset + 1]]) as f64;
            let right = i16::from_le_bytes([data[offset + 2], data[offset + 3]]) as f64;
            (left, right, i16::MAX as f64)
        }
        SampleFormat::I32 => {
            let left = i32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]) as f64;
            let right = i32::from_le_bytes([
                data[offset + 4],
                data[offset + 5],
                data[offset + 6],
                data[offset + 7],
            ]) as f64;
            (left, right, i32::MAX as f64)
        }
        SampleFormat::F32 => {
            let left = f32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]) as f64;
            let right = f32::from_le_bytes([
                data[offset + 4],
                data[offset + 5],
                data[offset + 6],
                data[offset + 7],
            ]) as f64;
            (left, right, 1.0)
        }
    }
}

/// Reduces a full transform output to [`SPECTRUM_BINS`] bins by taking every
/// `N/19`th magnitude. A deliberate cheap downsample kept for compatibility,
/// not a windowed reduction.
fn stride_reduce(magnitudes: &[f64]) -> SpectrumSnapshot {
    let n = magnitudes.len();
    let step = (n / (SPECTRUM_BINS - 1)).max(1);
    let mut bins = [0.0; SPECTRUM_BINS];
    for (j, bin) in bins.iter_mut().enumerate() {
        *bin = magnitudes[(j * step).min(n - 1)];
    }
    SpectrumSnapshot(bins)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_analyzer() -> SpectrumAnalyzer {
        SpectrumAnalyzer::new(Box::new(|samples: &[f64]| samples.to_vec()))
    }

    fn stereo_f32_chunk(frames: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(frames * 8);
        for i in 0..frames {
            let value = (i as f32) / (frames as f32);
            data.extend_from_slice(&value.to_le_bytes());
            data.extend_from_slice(&(-value).to_le_bytes());
        }
        data
    }

    #[test]
    fn test_snapshot_length_is_always_twenty() {
        let analyzer = identity_analyzer();
        for frames in [512, 513, 1024, 4096] {
            let chunk = stereo_f32_chunk(frames);
            let analyzed = analyzer
                .analyze(&chunk, SampleFormat::F32, 2)
                .expect("chunk should be analyzed");
            assert_eq!(analyzed.snapshot.0.len(), SPECTRUM_BINS);
        }
    }

    #[test]
    fn test_short_chunk_is_skipped() {
        let analyzer = identity_analyzer();
        let chunk = stereo_f32_chunk(511);
        assert!(analyzer.analyze(&chunk, SampleFormat::F32, 2).is_none());
    }

    #[test]
    fn test_non_stereo_chunk_is_skipped() {
        let analyzer = identity_analyzer();
        let chunk = stereo_f32_chunk(1024);
        assert!(analyzer.analyze(&chunk, SampleFormat::F32, 1).is_none());
        assert!(analyzer.analyze(&chunk, SampleFormat::F32, 6).is_none());
    }

    #[test]
    fn test_stride_sampling_takes_every_nineteenth_fraction() {
        // 950 magnitudes -> step 50: bin j carries magnitude j * 50.
        let magnitudes: Vec<f64> = (0..950).map(|i| i as f64).collect();
        let snapshot = stride_reduce(&magnitudes);
        assert_eq!(snapshot.0[0], 0.0);
        assert_eq!(snapshot.0[1], 50.0);
        assert_eq!(snapshot.0[19], 949.0); // clamped at the last index
    }

    #[test]
    fn test_i16_samples_normalize_to_unit_scale() {
        let mut chunk = Vec::new();
        for _ in 0..512 {
            chunk.extend_from_slice(&i16::MAX.to_le_bytes());
            chunk.extend_from_slice(&i16::MIN.to_le_bytes());
        }
        let captured = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let captured_clone = captured.clone();
        let analyzer = SpectrumAnalyzer::new(Box::new(move |samples: &[f64]| {
            *captured_clone.lock().unwrap() = samples.to_vec();
            samples.to_vec()
        }));
        let analyzed = analyzer
            .analyze(&chunk, SampleFormat::I16, 2)
            .expect("chunk should be analyzed");
        let samples = captured.lock().unwrap();
        assert!(samples.iter().all(|&s| (s - 1.0).abs() < 1e-9));
        assert!((analyzed.level_left - i16::MAX as f64).abs() < 1e-9);
        assert!((analyzed.level_right - i16::MIN as f64).abs() < 1e-9);
    }

    #[test]
    fn test_fft_transform_produces_snapshot() {
        let analyzer = SpectrumAnalyzer::with_fft();
        let mut chunk = Vec::new();
        for i in 0..1024u32 {
            let value = (i as f32 * 0.05).sin();
            chunk.extend_from_slice(&value.to_le_bytes());
            chunk.extend_from_slice(&value.to_le_bytes());
        }
        let analyzed = analyzer
            .analyze(&chunk, SampleFormat::F32, 2)
            .expect("chunk should be analyzed");
        assert_eq!(analyzed.snapshot.0.len(), SPECTRUM_BINS);
        assert!(analyzed.snapshot.0.iter().any(|&m| m > 0.0));
    }
}
