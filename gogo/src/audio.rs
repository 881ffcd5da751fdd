//! Player engine: a queue of sample-limited waveform jobs, pulled by a
//! `cpal` output stream's audio callback, with click-free termination —
//! each job's sample count is quantized to a whole number of waveform
//! periods by the caller (see [`crate::waveform::wavelength_in_samples`])
//! before it's enqueued here.
//!
//! A thread-owned `cpal::Stream` hands audio to a shared job queue; there
//! is no resampling or jitter buffer to manage, only discrete notes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::waveform::Generator;

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("no output audio device available")]
    NoDeviceAvailable,
    #[error("querying output stream configs: {0}")]
    StreamConfigs(#[from] cpal::SupportedStreamConfigsError),
    #[error("no supported stereo f32 output stream config")]
    NoSupportedStreamConfig,
    #[error("building output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("starting output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

struct Job {
    generator: Box<dyn Generator>,
    remaining: usize,
}

type Queue = Arc<Mutex<VecDeque<Job>>>;

/// An open audio output device accepting a queue of waveform notes.
pub struct Speaker {
    queue: Queue,
    sample_rate: u32,
    // Holds the cpal stream alive; dropping it stops playback.
    _stream: cpal::Stream,
}

impl Speaker {
    pub fn open() -> Result<Speaker, OpenError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or(OpenError::NoDeviceAvailable)?;

        let config = device
            .supported_output_configs()?
            .filter(|c| c.channels() == 2)
            .find_map(|c| c.try_with_sample_rate(cpal::SampleRate(48_000)))
            .map(Into::into)
            .unwrap_or(cpal::StreamConfig {
                channels: 2,
                sample_rate: device.default_output_config()
                    .map(|c| c.sample_rate())
                    .unwrap_or(cpal::SampleRate(48_000)),
                buffer_size: cpal::BufferSize::Default,
            });

        let sample_rate = config.sample_rate.0;
        let queue: Queue = Arc::new(Mutex::new(VecDeque::new()));

        let stream = device.build_output_stream(
            &config,
            {
                let queue = queue.clone();
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| fill(out, &queue)
            },
            |err| log::error!("output stream error: {err}"),
            None,
        )?;

        stream.play()?;

        Ok(Speaker { queue, sample_rate, _stream: stream })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Enqueues a generator to run for exactly `samples` frames.
    pub fn enqueue(&self, generator: Box<dyn Generator>, samples: usize) {
        self.queue.lock().unwrap().push_back(Job { generator, remaining: samples });
    }

    /// Discards anything queued or in progress.
    pub fn clear(&self) {
        self.queue.lock().unwrap().clear();
    }
}

fn fill(out: &mut [f32], queue: &Queue) {
    let mut queue = queue.lock().unwrap();

    for frame in out.chunks_mut(2) {
        let sample = loop {
            let Some(job) = queue.front_mut() else {
                break 0.0;
            };

            if job.remaining == 0 {
                queue.pop_front();
                continue;
            }

            let sample = job.generator.next_sample();
            job.remaining -= 1;

            if job.remaining == 0 {
                queue.pop_front();
            }

            break sample;
        };

        for channel in frame {
            *channel = sample;
        }
    }
}

/// Converts a duration to a frame count at `sample_rate`, rounding to the
/// nearest sample.
pub fn duration_to_samples(duration: std::time::Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f32);
    impl Generator for Constant {
        fn next_sample(&mut self) -> f32 {
            self.0
        }
    }

    #[test]
    fn fill_drains_jobs_in_order_and_respects_sample_count() {
        let queue: Queue = Arc::new(Mutex::new(VecDeque::new()));
        queue.lock().unwrap().push_back(Job { generator: Box::new(Constant(1.0)), remaining: 2 });
        queue.lock().unwrap().push_back(Job { generator: Box::new(Constant(2.0)), remaining: 2 });

        let mut out = [0f32; 8]; // 4 stereo frames
        fill(&mut out, &queue);

        assert_eq!(out, [1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
        assert!(queue.lock().unwrap().is_empty());
    }

    #[test]
    fn fill_emits_silence_once_queue_is_empty() {
        let queue: Queue = Arc::new(Mutex::new(VecDeque::new()));
        queue.lock().unwrap().push_back(Job { generator: Box::new(Constant(1.0)), remaining: 1 });

        let mut out = [0f32; 4]; // 2 stereo frames, only one frame of audio queued
        fill(&mut out, &queue);

        assert_eq!(out, [1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn fill_skips_a_zero_remaining_job_instead_of_underflowing() {
        let queue: Queue = Arc::new(Mutex::new(VecDeque::new()));
        queue.lock().unwrap().push_back(Job { generator: Box::new(Constant(1.0)), remaining: 0 });
        queue.lock().unwrap().push_back(Job { generator: Box::new(Constant(2.0)), remaining: 1 });

        let mut out = [0f32; 4]; // 2 stereo frames
        fill(&mut out, &queue);

        assert_eq!(out, [2.0, 2.0, 0.0, 0.0]);
        assert!(queue.lock().unwrap().is_empty());
    }

    #[test]
    fn duration_to_samples_rounds_to_nearest() {
        assert_eq!(duration_to_samples(std::time::Duration::from_secs(1), 48_000), 48_000);
        assert_eq!(duration_to_samples(std::time::Duration::from_millis(500), 48_000), 24_000);
    }
}
