use crate::audio_data::AudioData;
use crate::backend::{ChannelId, PlaybackBackend, stereo_gains};
use crate::config::PetalMixConfig;
use crate::error::{PetalMixError, Result};
use crate::math::DVec3;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Software mixing backend rendering to the default cpal output device.
///
/// Channels and the music queue live in a [`MixerState`] shared with the device
/// callback. The callback only ever `try_lock`s it and outputs silence when the
/// owning thread happens to hold the lock.
pub struct CpalBackend {
    sample_rate: u32,
    block_size: usize,
    channel_limit: usize,
    state: Arc<Mutex<MixerState>>,
    stream: Option<cpal::Stream>,
    frames_processed: Arc<AtomicUsize>,
}

impl CpalBackend {
    pub fn new(config: &PetalMixConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            channel_limit: config.max_sources,
            state: Arc::new(Mutex::new(MixerState::new())),
            stream: None,
            frames_processed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Number of output frames rendered since the stream opened.
    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    fn with_slot(&self, channel: ChannelId, f: impl FnOnce(&mut ChannelSlot)) {
        let mut state = self.state.lock();
        match state
            .channels
            .get_mut(channel.0 as usize)
            .and_then(Option::as_mut)
        {
            Some(slot) => f(slot),
            None => log::warn!("Ignoring call on unknown {}", channel),
        }
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;
        let state = self.state.clone();
        let frames_processed = self.frames_processed.clone();
        let mut scratch: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    scratch.clear();
                    scratch.resize(data.len(), 0.0);

                    if let Some(mut state) = state.try_lock() {
                        state.render(&mut scratch, channels);
                    }

                    for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(*sample);
                    }
                    frames_processed.fetch_add(data.len() / channels.max(1), Ordering::Relaxed);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| PetalMixError::AudioDevice(format!("Failed to build stream: {}", e)))
    }
}

impl PlaybackBackend for CpalBackend {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            PetalMixError::AudioDevice("No default output device available".into())
        })?;

        let default_config = device.default_output_config().map_err(|e| {
            PetalMixError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let config = cpal::StreamConfig {
            channels: default_config.channels().max(1),
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.block_size as u32),
        };

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config)?,
            other => {
                return Err(PetalMixError::AudioFormat(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| PetalMixError::AudioDevice(format!("Failed to start stream: {}", e)))?;

        log::info!(
            "Opened output stream ({} ch, {} Hz, block {})",
            config.channels,
            self.sample_rate,
            self.block_size
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            log::info!("Closed output stream");
        }
    }

    fn create_channel(&mut self) -> Result<ChannelId> {
        let mut state = self.state.lock();
        let live = state.channels.iter().filter(|c| c.is_some()).count();
        if live >= self.channel_limit {
            return Err(PetalMixError::Backend(format!(
                "Channel limit of {} reached",
                self.channel_limit
            )));
        }

        let free = state.channels.iter().position(Option::is_none);
        let id = match free {
            Some(free) => {
                state.channels[free] = Some(ChannelSlot::default());
                free
            }
            None => {
                state.channels.push(Some(ChannelSlot::default()));
                state.channels.len() - 1
            }
        };
        Ok(ChannelId(id as u32))
    }

    fn destroy_channel(&mut self, channel: ChannelId) {
        let mut state = self.state.lock();
        if let Some(slot) = state.channels.get_mut(channel.0 as usize) {
            *slot = None;
        }
    }

    fn bind(&mut self, channel: ChannelId, data: &AudioData, looping: bool) {
        self.with_slot(channel, |slot| {
            slot.data = Some(data.clone());
            slot.cursor = 0;
            slot.looping = looping;
            slot.playing = false;
        });
    }

    fn set_position(&mut self, channel: ChannelId, position: DVec3) {
        let gains = stereo_gains(position);
        self.with_slot(channel, |slot| slot.gains = gains);
    }

    fn play(&mut self, channel: ChannelId) {
        self.with_slot(channel, |slot| {
            slot.cursor = 0;
            slot.playing = slot.data.is_some();
        });
    }

    fn stop(&mut self, channel: ChannelId) {
        self.with_slot(channel, |slot| slot.playing = false);
    }

    fn is_finished(&self, channel: ChannelId) -> bool {
        let state = self.state.lock();
        state
            .channels
            .get(channel.0 as usize)
            .and_then(Option::as_ref)
            .is_none_or(|slot| !slot.playing)
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.state.lock().master_gain = gain;
    }

    fn processed_stream_buffers(&mut self) -> usize {
        std::mem::take(&mut self.state.lock().stream.processed)
    }

    fn queue_stream_buffer(&mut self, pcm: &[i16]) {
        self.state.lock().stream.buffers.push_back(pcm.to_vec());
    }

    fn ensure_stream_playing(&mut self) {
        let mut state = self.state.lock();
        if !state.stream.playing && !state.stream.buffers.is_empty() {
            log::debug!("Music stream ran dry, restarting");
            state.stream.playing = true;
        }
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug, Clone)]
struct ChannelSlot {
    data: Option<AudioData>,
    cursor: usize,
    looping: bool,
    playing: bool,
    gains: (f32, f32),
}

impl Default for ChannelSlot {
    fn default() -> Self {
        Self {
            data: None,
            cursor: 0,
            looping: false,
            playing: false,
            gains: (0.0, 0.0),
        }
    }
}

#[derive(Debug, Default)]
struct StreamQueue {
    buffers: VecDeque<Vec<i16>>,
    /// Read position inside the front buffer
    cursor: usize,
    processed: usize,
    playing: bool,
}

impl StreamQueue {
    /// Next stereo frame of music, if any is queued.
    fn next_frame(&mut self) -> Option<(f32, f32)> {
        if !self.playing {
            return None;
        }

        loop {
            let front = match self.buffers.front() {
                Some(front) => front,
                None => {
                    self.playing = false;
                    return None;
                }
            };

            if self.cursor + 1 < front.len() {
                let frame = (
                    front[self.cursor] as f32 / 32768.0,
                    front[self.cursor + 1] as f32 / 32768.0,
                );
                self.cursor += 2;
                return Some(frame);
            }

            self.buffers.pop_front();
            self.cursor = 0;
            self.processed += 1;
        }
    }
}

/// Everything the device callback renders from.
#[derive(Debug)]
struct MixerState {
    channels: Vec<Option<ChannelSlot>>,
    master_gain: f32,
    stream: StreamQueue,
}

impl MixerState {
    fn new() -> Self {
        Self {
            channels: Vec::new(),
            master_gain: 1.0,
            stream: StreamQueue {
                playing: true,
                ..Default::default()
            },
        }
    }

    /// Mixes all playing channels and the music queue into `out`.
    fn render(&mut self, out: &mut [f32], device_channels: usize) {
        if device_channels == 0 {
            return;
        }

        for frame in out.chunks_mut(device_channels) {
            let (mut left, mut right) = self.stream.next_frame().unwrap_or((0.0, 0.0));

            for slot in self.channels.iter_mut().flatten() {
                if !slot.playing {
                    continue;
                }
                let Some(data) = slot.data.as_ref() else {
                    slot.playing = false;
                    continue;
                };

                if slot.cursor >= data.total_frames() {
                    if slot.looping && data.total_frames() > 0 {
                        slot.cursor = 0;
                    } else {
                        slot.playing = false;
                        continue;
                    }
                }

                let (l, r) = if data.channels() == 1 {
                    let s = data.sample(slot.cursor, 0);
                    (s, s)
                } else {
                    (data.sample(slot.cursor, 0), data.sample(slot.cursor, 1))
                };
                left += l * slot.gains.0;
                right += r * slot.gains.1;
                slot.cursor += 1;
            }

            left *= self.master_gain;
            right *= self.master_gain;

            match frame.len() {
                1 => frame[0] = 0.5 * (left + right),
                _ => {
                    frame[0] = left;
                    frame[1] = right;
                    for extra in &mut frame[2..] {
                        *extra = 0.0;
                    }
                }
            }
        }
    }
}
