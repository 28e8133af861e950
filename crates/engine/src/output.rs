use std::sync::Arc;
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle, Shared};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use log::{error, info, warn};
use synced_transport::{Composition, MixSnapshot, PlaybackRate};

use crate::position::{PositionCell, PositionTracker};
use crate::render::{Command, Renderer};
use crate::{AudioBackend, PlaybackSession};

type SharedComposition = Shared<Composition>;
type SharedMix = Shared<MixSnapshot>;

const COMMAND_CAPACITY: usize = 64;
const SWAP_CAPACITY: usize = 4;
const SWAP_RETRIES: usize = 50;

/// Plays through the host's default output device.
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn open_session(
        &mut self,
        composition: Composition,
        mix: MixSnapshot,
        rate: PlaybackRate,
    ) -> anyhow::Result<Box<dyn PlaybackSession>> {
        Ok(Box::new(CpalSession::start(composition, mix, rate)?))
    }
}

/// Control-side handle of a running output stream.
///
/// Compositions and mix snapshots cross into the audio callback as
/// `basedrop::Shared` values through ring buffers; the callback swaps them in
/// whole and old values are reclaimed here by the collector. The callback
/// publishes the playhead into a [`PositionCell`] after every buffer.
pub struct CpalSession {
    commands: rtrb::Producer<Command>,
    position: PositionTracker,
    compositions: rtrb::Producer<SharedComposition>,
    mixes: rtrb::Producer<SharedMix>,
    collector: Collector,
    handle: Handle,
    sample_rate: u32,
    length_frames: u64,
    _stream: cpal::Stream,
}

impl CpalSession {
    pub fn start(composition: Composition, mix: MixSnapshot, rate: PlaybackRate) -> anyhow::Result<Self> {
        let collector = Collector::new();
        let handle = collector.handle();

        let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(COMMAND_CAPACITY);
        let position = Arc::new(PositionCell::new());
        let (compositions_tx, compositions_rx) = rtrb::RingBuffer::<SharedComposition>::new(SWAP_CAPACITY);
        let (mixes_tx, mixes_rx) = rtrb::RingBuffer::<SharedMix>::new(SWAP_CAPACITY);

        let sample_rate = composition.sample_rate();
        let length_frames = composition.length_frames();

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no output device found"))?;
        let config = device.default_output_config()?;
        info!(
            "opening output stream on {:?} ({} Hz, {} channels)",
            device.name().ok(),
            config.sample_rate().0,
            config.channels()
        );

        let callback = CallbackState {
            renderer: Renderer::new(config.sample_rate().0, sample_rate, config.channels() as usize, rate),
            composition: Shared::new(&handle, composition),
            mix: Shared::new(&handle, mix),
            scratch: Vec::new(),
            commands: command_rx,
            position: Arc::clone(&position),
            compositions: compositions_rx,
            mixes: mixes_rx,
        };

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), callback)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), callback)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), callback)?,
            sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
        };

        stream.play()?;

        Ok(Self {
            commands: command_tx,
            position: PositionTracker::new(position),
            compositions: compositions_tx,
            mixes: mixes_tx,
            collector,
            handle,
            sample_rate,
            length_frames,
            _stream: stream,
        })
    }

    fn send(&mut self, command: Command) {
        if self.commands.push(command).is_err() {
            warn!("output command queue full, dropping {command:?}");
        }
    }

}

/// Push a value that must not be lost, waiting for the callback to drain the
/// queue if it is momentarily full.
fn push_swap<T: Send + 'static>(producer: &mut rtrb::Producer<Shared<T>>, value: Shared<T>, what: &str) {
    let mut value = value;
    for _ in 0..SWAP_RETRIES {
        match producer.push(value) {
            Ok(()) => return,
            Err(rtrb::PushError::Full(rejected)) => {
                value = rejected;
                thread::sleep(Duration::from_millis(1));
            }
        }
    }
    error!("output stream is not draining, {what} update lost");
}

impl PlaybackSession for CpalSession {
    fn play(&mut self) {
        self.send(Command::Play);
    }

    fn pause(&mut self) {
        self.send(Command::Pause);
    }

    fn seek(&mut self, seconds: f64) {
        let frame = (seconds * self.sample_rate as f64).clamp(0.0, self.length_frames as f64);
        let generation = self.position.seek(frame);
        self.send(Command::Seek { frame, generation });
    }

    fn set_rate(&mut self, rate: PlaybackRate) {
        self.send(Command::SetRate(rate));
    }

    fn set_mix(&mut self, mix: MixSnapshot) {
        let shared = Shared::new(&self.handle, mix);
        push_swap(&mut self.mixes, shared, "mix");
        self.collector.collect();
    }

    fn set_composition(&mut self, composition: Composition) {
        self.length_frames = composition.length_frames();
        let shared = Shared::new(&self.handle, composition);
        push_swap(&mut self.compositions, shared, "composition");
        self.collector.collect();
    }

    fn position(&mut self) -> f64 {
        self.collector.collect();
        self.position.frame() / self.sample_rate as f64
    }
}

struct CallbackState {
    renderer: Renderer,
    composition: SharedComposition,
    mix: SharedMix,
    scratch: Vec<f32>,
    commands: rtrb::Consumer<Command>,
    position: Arc<PositionCell>,
    compositions: rtrb::Consumer<SharedComposition>,
    mixes: rtrb::Consumer<SharedMix>,
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut state: CallbackState,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            // Swap in new timeline/mix if available (lock-free)
            while let Ok(composition) = state.compositions.pop() {
                state.composition = composition;
            }
            while let Ok(mix) = state.mixes.pop() {
                state.mix = mix;
            }

            let length = state.composition.length_frames();
            while let Ok(command) = state.commands.pop() {
                state.renderer.apply(command, length);
            }

            if state.scratch.len() < data.len() {
                state.scratch.resize(data.len(), 0.0);
            }
            let scratch = &mut state.scratch[..data.len()];
            state
                .renderer
                .render(&state.composition, &state.mix, scratch);

            for (sample, value) in data.iter_mut().zip(scratch.iter()) {
                *sample = T::from_sample(*value);
            }

            state
                .position
                .publish(state.renderer.position_frames(), state.renderer.generation());
        },
        |err| error!("output stream error: {err}"),
        None,
    )?;

    Ok(stream)
}
