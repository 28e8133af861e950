//! Pitch-preserving time stretch for one channel.
//!
//! A phase vocoder: the input is analysed in Hann-windowed frames one
//! analysis hop apart, each bin's phase is advanced by its measured
//! frequency over a synthesis hop, and the frames are overlap-added. Playing
//! at rate `r` uses a synthesis hop of `ANALYSIS_HOP / r`, so time is
//! compressed or expanded while every partial keeps its frequency.
//!
//! FFT plans and buffers are created in [`TimeStretcher::new`]; nothing on
//! the processing path allocates.

use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

pub const FFT_SIZE: usize = 2048;
pub const ANALYSIS_HOP: usize = FFT_SIZE / 4;

const BINS: usize = FFT_SIZE / 2 + 1;
const INPUT_CAPACITY: usize = FFT_SIZE * 2;
const OUTPUT_CAPACITY: usize = FFT_SIZE * 4;

#[derive(Clone)]
pub struct TimeStretcher {
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    expected_advance: Vec<f32>,
    last_phase: Vec<f32>,
    phase_acc: Vec<f32>,
    primed: bool,

    input: Vec<f32>,
    input_write: usize,
    input_read: usize,
    output: Vec<f32>,
    output_write: usize,
    output_read: usize,
}

impl fmt::Debug for TimeStretcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeStretcher")
            .field("input_available", &self.input_available())
            .field("output_available", &self.output_available())
            .finish_non_exhaustive()
    }
}

impl TimeStretcher {
    pub fn new(planner: &mut FftPlanner<f32>) -> Self {
        let forward = planner.plan_fft_forward(FFT_SIZE);
        let inverse = planner.plan_fft_inverse(FFT_SIZE);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        let window = (0..FFT_SIZE)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / FFT_SIZE as f32).cos()))
            .collect();
        let expected_advance = (0..BINS)
            .map(|k| 2.0 * PI * k as f32 * ANALYSIS_HOP as f32 / FFT_SIZE as f32)
            .collect();

        Self {
            forward,
            inverse,
            window,
            spectrum: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            expected_advance,
            last_phase: vec![0.0; BINS],
            phase_acc: vec![0.0; BINS],
            primed: false,
            input: vec![0.0; INPUT_CAPACITY],
            input_write: 0,
            input_read: 0,
            output: vec![0.0; OUTPUT_CAPACITY],
            output_write: 0,
            output_read: 0,
        }
    }

    /// Forget all buffered audio. Used on seeks so old material does not
    /// bleed into the new position.
    pub fn reset(&mut self) {
        self.last_phase.fill(0.0);
        self.phase_acc.fill(0.0);
        self.primed = false;
        self.input.fill(0.0);
        self.output.fill(0.0);
        self.input_write = 0;
        self.input_read = 0;
        self.output_write = 0;
        self.output_read = 0;
    }

    pub fn input_available(&self) -> usize {
        self.input_write - self.input_read
    }

    pub fn output_available(&self) -> usize {
        self.output_write - self.output_read
    }

    /// Queue one input sample. Callers push at most one analysis hop between
    /// calls to [`process`](Self::process).
    pub fn push(&mut self, sample: f32) {
        self.input[self.input_write % INPUT_CAPACITY] = sample;
        self.input_write += 1;
    }

    pub fn pop(&mut self) -> Option<f32> {
        if self.output_available() == 0 {
            return None;
        }
        let sample = self.output[self.output_read % OUTPUT_CAPACITY];
        self.output_read += 1;
        Some(sample)
    }

    /// Turn every complete input frame into output played back `rate` times
    /// faster than it was recorded.
    pub fn process(&mut self, rate: f64) {
        let synthesis_hop = ((ANALYSIS_HOP as f64 / rate).round() as usize).clamp(1, FFT_SIZE);
        while self.input_available() >= FFT_SIZE {
            self.process_frame(synthesis_hop);
        }
    }

    fn process_frame(&mut self, synthesis_hop: usize) {
        for (i, bin) in self.spectrum.iter_mut().enumerate() {
            let sample = self.input[(self.input_read + i) % INPUT_CAPACITY];
            *bin = Complex::new(sample * self.window[i], 0.0);
        }
        self.input_read += ANALYSIS_HOP;

        self.forward.process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let hop_ratio = synthesis_hop as f32 / ANALYSIS_HOP as f32;
        for k in 0..BINS {
            let (magnitude, phase) = self.spectrum[k].to_polar();
            if self.primed {
                let deviation = wrap_phase(phase - self.last_phase[k] - self.expected_advance[k]);
                let advance = self.expected_advance[k] + deviation;
                self.phase_acc[k] = wrap_phase(self.phase_acc[k] + advance * hop_ratio);
            } else {
                self.phase_acc[k] = phase;
            }
            self.last_phase[k] = phase;
            self.spectrum[k] = Complex::from_polar(magnitude, self.phase_acc[k]);
        }
        self.primed = true;

        for k in 1..BINS - 1 {
            self.spectrum[FFT_SIZE - k] = self.spectrum[k].conj();
        }

        self.inverse.process_with_scratch(&mut self.spectrum, &mut self.scratch);

        // Hann analysis and synthesis windows overlap to 3N / 8H.
        let scale = 8.0 * synthesis_hop as f32 / (3.0 * FFT_SIZE as f32 * FFT_SIZE as f32);
        for (i, bin) in self.spectrum.iter().enumerate() {
            self.output[(self.output_write + i) % OUTPUT_CAPACITY] += bin.re * scale * self.window[i];
        }

        let clear_start = self.output_write + FFT_SIZE;
        for i in 0..synthesis_hop {
            self.output[(clear_start + i) % OUTPUT_CAPACITY] = 0.0;
        }
        self.output_write += synthesis_hop;
    }
}

fn wrap_phase(phase: f32) -> f32 {
    phase - 2.0 * PI * (phase / (2.0 * PI)).round()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stretcher() -> TimeStretcher {
        TimeStretcher::new(&mut FftPlanner::new())
    }

    fn sine(freq: f32, sample_rate: f32, index: usize) -> f32 {
        (2.0 * PI * freq * index as f32 / sample_rate).sin()
    }

    fn zero_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
            .count()
    }

    /// Feed `input_len` samples of a sine one hop at a time and collect
    /// everything that comes out.
    fn stretch_sine(rate: f64, input_len: usize) -> Vec<f32> {
        let mut stretcher = stretcher();
        let mut out = Vec::new();
        for block in 0..input_len / ANALYSIS_HOP {
            for i in 0..ANALYSIS_HOP {
                stretcher.push(sine(250.0, 8000.0, block * ANALYSIS_HOP + i));
            }
            stretcher.process(rate);
            while let Some(sample) = stretcher.pop() {
                out.push(sample);
            }
        }
        out
    }

    #[test]
    fn test_no_output_until_a_full_frame() {
        let mut stretcher = stretcher();
        for _ in 0..FFT_SIZE - 1 {
            stretcher.push(0.5);
        }
        stretcher.process(1.0);
        assert_eq!(stretcher.output_available(), 0);
        assert_eq!(stretcher.pop(), None);

        stretcher.push(0.5);
        stretcher.process(1.0);
        assert_eq!(stretcher.output_available(), ANALYSIS_HOP);
        assert_eq!(stretcher.input_available(), FFT_SIZE - ANALYSIS_HOP);
    }

    #[test]
    fn test_output_length_follows_rate() {
        let fast = stretch_sine(2.0, 32 * ANALYSIS_HOP);
        let slow = stretch_sine(0.5, 32 * ANALYSIS_HOP);
        // frames processed = blocks - 3 once the first window fills
        assert_eq!(fast.len(), 29 * ANALYSIS_HOP / 2);
        assert_eq!(slow.len(), 29 * ANALYSIS_HOP * 2);
    }

    #[test]
    fn test_stretch_keeps_frequency() {
        for rate in [0.5, 2.0] {
            let out = stretch_sine(rate, 64 * ANALYSIS_HOP);
            let settled = &out[FFT_SIZE..];
            // 250 Hz at 8 kHz crosses zero every 16 samples
            let expected = settled.len() as f32 / 16.0;
            let counted = zero_crossings(settled) as f32;
            assert!(
                (counted - expected).abs() < expected * 0.1,
                "rate {rate}: {counted} crossings, expected about {expected}"
            );
        }
    }

    #[test]
    fn test_unit_rate_preserves_amplitude() {
        let out = stretch_sine(1.0, 32 * ANALYSIS_HOP);
        let settled = &out[FFT_SIZE..];
        let peak = settled.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
        assert!((0.9..1.1).contains(&peak), "peak {peak}");
    }

    #[test]
    fn test_reset_discards_buffered_audio() {
        let mut stretcher = stretcher();
        for i in 0..FFT_SIZE {
            stretcher.push(sine(250.0, 8000.0, i));
        }
        stretcher.process(1.0);
        stretcher.reset();
        assert_eq!(stretcher.input_available(), 0);
        assert_eq!(stretcher.output_available(), 0);
    }
}
