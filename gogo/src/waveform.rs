//! Waveform generation for the player engine: four lazy, per-sample
//! oscillators selected by the `Play` packet's `voice_id`, plus the
//! amplitude/frequency math shared by both the dispatcher (which picks the
//! numbers) and the player (which renders them).
//!
//! Each waveform is a distinct type behind one shared trait rather than an
//! enum match, since every waveform performs the same one operation —
//! advance one sample.

/// Produces one sample (of a mono signal; the player duplicates it to both
/// stereo channels) per call.
pub trait Generator: Send {
    fn next_sample(&mut self) -> f32;
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("sample rate {sample_rate} must be more than twice the frequency {frequency_hz} (Nyquist)")]
pub struct NyquistViolation {
    pub sample_rate: u32,
    pub frequency_hz: u32,
}

/// Shared phase accumulator: `t` advances by `dt = freq / sample_rate` each
/// sample and is kept in `[0, 1)`.
struct Phase {
    dt: f64,
    t: f64,
}

impl Phase {
    fn new(sample_rate: u32, frequency_hz: u32) -> Result<Phase, NyquistViolation> {
        let dt = frequency_hz as f64 / sample_rate as f64;

        if dt >= 0.5 {
            return Err(NyquistViolation { sample_rate, frequency_hz });
        }

        Ok(Phase { dt, t: 0.0 })
    }

    /// Returns the current phase and advances to the next sample.
    fn advance(&mut self) -> f64 {
        let t = self.t;
        self.t = (self.t + self.dt).fract();
        t
    }
}

macro_rules! phase_generator {
    ($name:ident, $sample:expr) => {
        pub struct $name(Phase);

        impl $name {
            fn new(sample_rate: u32, frequency_hz: u32) -> Result<Self, NyquistViolation> {
                Ok($name(Phase::new(sample_rate, frequency_hz)?))
            }
        }

        impl Generator for $name {
            fn next_sample(&mut self) -> f32 {
                let t = self.0.advance();
                let f: fn(f64) -> f64 = $sample;
                f(t) as f32
            }
        }
    };
}

phase_generator!(Sine, |t| (2.0 * std::f64::consts::PI * t).sin());
phase_generator!(Square, |t| if t < 0.5 { 1.0 } else { -1.0 });
phase_generator!(Triangle, |t| 4.0 * (t - 0.5).abs() - 1.0);
phase_generator!(Sawtooth, |t| 2.0 * t - 1.0);

/// Multiplies the wrapped generator's samples by a fixed amplitude.
pub struct Amplitude<G> {
    inner: G,
    amplitude: f32,
}

impl<G: Generator> Amplitude<G> {
    pub fn new(inner: G, amplitude: f32) -> Self {
        Amplitude { inner, amplitude }
    }
}

impl<G: Generator> Generator for Amplitude<G> {
    fn next_sample(&mut self) -> f32 {
        self.inner.next_sample() * self.amplitude
    }
}

/// Selects a waveform generator by the `Play` packet's `voice_id`
/// (0=sine, 1=sawtooth, 2=square, 3=triangle), already wrapped with the
/// given amplitude.
pub fn make_generator(
    voice_id: u32,
    sample_rate: u32,
    frequency_hz: u32,
    amplitude: f32,
) -> Result<Box<dyn Generator>, NyquistViolation> {
    let generator: Box<dyn Generator> = match voice_id {
        1 => Box::new(Amplitude::new(Sawtooth::new(sample_rate, frequency_hz)?, amplitude)),
        2 => Box::new(Amplitude::new(Square::new(sample_rate, frequency_hz)?, amplitude)),
        3 => Box::new(Amplitude::new(Triangle::new(sample_rate, frequency_hz)?, amplitude)),
        _ => Box::new(Amplitude::new(Sine::new(sample_rate, frequency_hz)?, amplitude)),
    };

    Ok(generator)
}

/// `floor(2^(n/12) * 8.1758)`, yielding A4 = 440 Hz for MIDI key 69.
pub fn midi_note_to_freq(note: u8) -> u32 {
    (2f64.powf(note as f64 / 12.0) * 8.1758).floor() as u32
}

/// Perceptual square-root amplitude mapping with a fixed 0.5 headroom
/// factor, applied to a MIDI velocity in `0..=127`.
pub fn velocity_to_amplitude(velocity: u8) -> f32 {
    (velocity as f32 / 128.0).sqrt() / 2.0
}

/// `sample_rate / frequency`, rounded down: the whole-period quantum a note
/// must end on to avoid an audible pop. A zero frequency (never produced
/// by `midi_note_to_freq`, but not ruled out by the wire format) has no
/// period, so it quantizes to silence rather than dividing by zero.
pub fn wavelength_in_samples(sample_rate: u32, frequency_hz: u32) -> usize {
    if frequency_hz == 0 {
        return 0;
    }

    (sample_rate / frequency_hz) as usize
}
