use rustfft::FftPlanner;
use synced_transport::{Composition, MixSnapshot, PlaybackRate};

use crate::stretch::{ANALYSIS_HOP, FFT_SIZE, TimeStretcher};

/// Transport commands sent to the real-time side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Pause,
    /// `generation` is published back with the position so reports from
    /// before the seek can be told apart.
    Seek { frame: f64, generation: u16 },
    SetRate(PlaybackRate),
}

/// Mixes a composition into interleaved output frames.
///
/// The read position advances by `composition_rate / output_rate` frames per
/// output frame and wraps at the end of the composition. At any rate other
/// than 1.0 the mix runs through one [`TimeStretcher`] per output channel, so
/// tempo changes while pitch does not.
#[derive(Debug)]
pub struct Renderer {
    playing: bool,
    position: f64,
    rate: f64,
    frame_step: f64,
    channels: usize,
    length_frames: u64,
    generation: u16,
    stretchers: Vec<TimeStretcher>,
    /// Read position when the stretchers were last reset.
    stretch_origin: f64,
    /// Frames fed to the stretchers since then.
    stretch_fed: u64,
}

impl Renderer {
    /// Allocates the stretchers and FFT plans, so call this off the audio
    /// thread.
    pub fn new(output_rate: u32, composition_rate: u32, channels: usize, rate: PlaybackRate) -> Self {
        let channels = channels.max(1);
        let mut planner = FftPlanner::new();
        Self {
            playing: false,
            position: 0.0,
            rate: rate.get(),
            frame_step: composition_rate as f64 / output_rate.max(1) as f64,
            channels,
            length_frames: 0,
            generation: 0,
            stretchers: (0..channels).map(|_| TimeStretcher::new(&mut planner)).collect(),
            stretch_origin: 0.0,
            stretch_fed: 0,
        }
    }

    /// Audible position in composition frames.
    ///
    /// While stretching, the read head runs ahead of what is heard by the
    /// audio still buffered in the stretchers; that lead is taken off here.
    pub fn position_frames(&self) -> f64 {
        if !self.is_stretching() {
            return self.position;
        }
        let Some(stretcher) = self.stretchers.first() else {
            return self.position;
        };

        let lag = stretcher.input_available() as f64
            + stretcher.output_available() as f64 * self.rate
            + (self.rate - 1.0) * FFT_SIZE as f64 / 2.0;
        let fed = self.stretch_fed as f64;
        let heard = (fed - lag).clamp(0.0, fed);
        let position = self.stretch_origin + heard * self.frame_step;
        if self.length_frames > 0 {
            position % self.length_frames as f64
        } else {
            position
        }
    }

    /// Generation of the last applied seek.
    pub fn generation(&self) -> u16 {
        self.generation
    }

    pub fn apply(&mut self, command: Command, length_frames: u64) {
        self.length_frames = length_frames;
        match command {
            Command::Play => self.playing = true,
            Command::Pause => self.playing = false,
            Command::Seek { frame, generation } => {
                self.position = frame.clamp(0.0, length_frames as f64);
                self.generation = generation;
                self.wrap();
                self.reset_stretch();
            }
            Command::SetRate(rate) => {
                let was_stretching = self.is_stretching();
                let audible = self.position_frames();
                self.rate = rate.get();
                match (was_stretching, self.is_stretching()) {
                    (false, true) => self.reset_stretch(),
                    // continue from what was heard, not from the read head
                    (true, false) => self.position = audible,
                    _ => {}
                }
            }
        }
    }

    pub fn render(&mut self, composition: &Composition, mix: &MixSnapshot, out: &mut [f32]) {
        self.length_frames = composition.length_frames();
        let stretching = self.is_stretching();

        for frame in out.chunks_mut(self.channels) {
            if !self.playing || self.length_frames == 0 {
                frame.fill(0.0);
                continue;
            }

            if stretching {
                self.render_stretched(composition, mix, frame);
            } else {
                let read_frame = self.position as u64;
                for (ch, sample) in frame.iter_mut().enumerate() {
                    *sample = mix_sample(composition, mix, read_frame, ch);
                }
                self.advance();
            }
        }
    }

    fn render_stretched(&mut self, composition: &Composition, mix: &MixSnapshot, frame: &mut [f32]) {
        while self.stretchers[0].output_available() == 0 {
            for _ in 0..ANALYSIS_HOP {
                let read_frame = self.position as u64;
                for (ch, stretcher) in self.stretchers.iter_mut().enumerate() {
                    stretcher.push(mix_sample(composition, mix, read_frame, ch));
                }
                self.stretch_fed += 1;
                self.advance();
            }
            for stretcher in &mut self.stretchers {
                stretcher.process(self.rate);
            }
        }

        for (sample, stretcher) in frame.iter_mut().zip(&mut self.stretchers) {
            *sample = stretcher.pop().unwrap_or(0.0);
        }
    }

    fn is_stretching(&self) -> bool {
        self.rate != 1.0
    }

    fn reset_stretch(&mut self) {
        for stretcher in &mut self.stretchers {
            stretcher.reset();
        }
        self.stretch_origin = self.position;
        self.stretch_fed = 0;
    }

    fn advance(&mut self) {
        self.position += self.frame_step;
        self.wrap();
    }

    fn wrap(&mut self) {
        if self.length_frames > 0 && self.position >= self.length_frames as f64 {
            self.position %= self.length_frames as f64;
        }
    }
}

fn mix_sample(composition: &Composition, mix: &MixSnapshot, frame: u64, channel: usize) -> f32 {
    composition
        .tracks()
        .iter()
        .enumerate()
        .map(|(idx, track)| track.sample_at(frame, channel) * mix.gain_at(idx))
        .sum()
}
