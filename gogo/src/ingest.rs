//! Converts a Standard MIDI File into the flat, descending-`total_on_time`
//! voice list the merger consumes.
//!
//! The ingest context only knows about a `NoteOn`/`NoteOff` callback shape:
//! it owns its voice map and is dropped once [`IngestContext::finish`] is
//! called, rather than living behind process-level globals (a closure
//! carries the state a plain callback interface can't). SMF parsing itself,
//! wired up in [`parse_smf`], uses the `midly` crate so the conductor
//! binary has something real to read.

use std::collections::HashMap;
use std::time::Duration;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

/// One event in a voice's on/off timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceEvent {
    pub ticks: u64,
    pub real_time: Duration,
    pub is_on: bool,
    pub velocity: u8,
}

/// A per-`(track, channel, key)` note timeline reconstructed from SMF
/// events.
#[derive(Debug, Clone)]
pub struct Voice {
    pub track: i16,
    pub channel: u8,
    pub key: u8,
    pub events: Vec<VoiceEvent>,
    pub total_on_time: Duration,
    last_on: Duration,
}

impl Voice {
    fn new(track: i16, channel: u8, key: u8) -> Self {
        Voice {
            track,
            channel,
            key,
            events: Vec::new(),
            total_on_time: Duration::ZERO,
            last_on: Duration::ZERO,
        }
    }

    fn note_on(&mut self, ticks: u64, real_time: Duration, velocity: u8) {
        self.events.push(VoiceEvent { ticks, real_time, is_on: true, velocity });
        self.last_on = real_time;
    }

    fn note_off(&mut self, ticks: u64, real_time: Duration, velocity: u8) {
        self.events.push(VoiceEvent { ticks, real_time, is_on: false, velocity });
        self.total_on_time += real_time.saturating_sub(self.last_on);
    }
}

/// Owns the voice map while ingest is in progress; destroyed by
/// [`finish`](IngestContext::finish).
#[derive(Default)]
pub struct IngestContext {
    voices: HashMap<(i16, u8, u8), Voice>,
}

impl IngestContext {
    pub fn new() -> Self {
        IngestContext::default()
    }

    fn voice_mut(&mut self, track: i16, channel: u8, key: u8) -> &mut Voice {
        self.voices
            .entry((track, channel, key))
            .or_insert_with(|| Voice::new(track, channel, key))
    }

    pub fn note_on(&mut self, track: i16, channel: u8, key: u8, velocity: u8, ticks: u64, real_time: Duration) {
        self.voice_mut(track, channel, key).note_on(ticks, real_time, velocity);
    }

    pub fn note_off(&mut self, track: i16, channel: u8, key: u8, velocity: u8, ticks: u64, real_time: Duration) {
        self.voice_mut(track, channel, key).note_off(ticks, real_time, velocity);
    }

    /// Flattens the voice map into a list sorted descending by
    /// `total_on_time`, the merger's precondition.
    pub fn finish(self) -> Vec<Voice> {
        let mut voices: Vec<Voice> = self.voices.into_values().collect();
        voices.sort_by(|a, b| b.total_on_time.cmp(&a.total_on_time));
        voices
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("reading SMF file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing SMF file: {0}")]
    Parse(#[from] midly::Error),
    #[error("SMPTE-divided SMF files are not supported")]
    UnsupportedTimeFormat,
}

struct TempoMap {
    /// Breakpoints sorted by tick: (tick, real_time at that tick, tempo in
    /// effect starting at that tick, in microseconds per quarter note).
    breakpoints: Vec<(u64, Duration, u32)>,
    ticks_per_quarter: u32,
}

const DEFAULT_TEMPO_USEC: u32 = 500_000;

impl TempoMap {
    fn build(ticks_per_quarter: u32, mut changes: Vec<(u64, u32)>) -> Self {
        changes.sort_by_key(|(tick, _)| *tick);

        let mut breakpoints = vec![(0u64, Duration::ZERO, DEFAULT_TEMPO_USEC)];

        for (tick, tempo) in changes {
            let &(prev_tick, prev_rt, prev_tempo) = breakpoints.last().unwrap();

            if tick == prev_tick {
                // Replace a breakpoint at the same tick rather than
                // accumulating a zero-length segment.
                breakpoints.pop();
                breakpoints.push((tick, prev_rt, tempo));
                continue;
            }

            let rt = prev_rt + ticks_to_duration(tick - prev_tick, prev_tempo, ticks_per_quarter);
            breakpoints.push((tick, rt, tempo));
        }

        TempoMap { breakpoints, ticks_per_quarter }
    }

    fn real_time_at(&self, tick: u64) -> Duration {
        let idx = match self.breakpoints.binary_search_by_key(&tick, |(t, _, _)| *t) {
            Ok(idx) => idx,
            Err(0) => 0,
            Err(idx) => idx - 1,
        };

        let (seg_tick, seg_rt, seg_tempo) = self.breakpoints[idx];
        seg_rt + ticks_to_duration(tick.saturating_sub(seg_tick), seg_tempo, self.ticks_per_quarter)
    }
}

fn ticks_to_duration(ticks: u64, tempo_usec_per_quarter: u32, ticks_per_quarter: u32) -> Duration {
    let micros = (ticks as u128 * tempo_usec_per_quarter as u128) / ticks_per_quarter as u128;
    Duration::from_micros(micros.min(u64::MAX as u128) as u64)
}

/// Parses an SMF byte buffer and returns the flattened, merger-ready voice
/// list.
pub fn parse_smf(bytes: &[u8]) -> Result<Vec<Voice>, IngestError> {
    let smf = Smf::parse(bytes)?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int() as u32,
        Timing::Timecode(..) => return Err(IngestError::UnsupportedTimeFormat),
    };

    // Pass 1: gather tempo changes (tick, usec-per-quarter) from every
    // track, in that track's own chronological order.
    let mut tempo_changes = Vec::new();

    // Pass 2: gather raw note events, per track, in chronological order.
    // (track_index, tick, channel, key, velocity, is_on)
    let mut raw_notes: Vec<(i16, u64, u8, u8, u8, bool)> = Vec::new();

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut ticks: u64 = 0;

        for event in track {
            ticks += event.delta.as_int() as u64;

            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    tempo_changes.push((ticks, tempo.as_int()));
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();

                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            raw_notes.push((track_index as i16, ticks, channel, key.as_int(), vel.as_int(), true));
                        }
                        MidiMessage::NoteOn { key, vel } => {
                            // velocity-0 note-on is a note-off by convention
                            raw_notes.push((track_index as i16, ticks, channel, key.as_int(), vel.as_int(), false));
                        }
                        MidiMessage::NoteOff { key, vel } => {
                            raw_notes.push((track_index as i16, ticks, channel, key.as_int(), vel.as_int(), false));
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    let tempo_map = TempoMap::build(ticks_per_quarter, tempo_changes);

    let mut ctx = IngestContext::new();
    for (track, ticks, channel, key, velocity, is_on) in raw_notes {
        let real_time = tempo_map.real_time_at(ticks);
        if is_on {
            ctx.note_on(track, channel, key, velocity, ticks, real_time);
        } else {
            ctx.note_off(track, channel, key, velocity, ticks, real_time);
        }
    }

    Ok(ctx.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_voice_accumulates_total_on_time() {
        let mut ctx = IngestContext::new();
        ctx.note_on(0, 0, 69, 100, 0, Duration::from_secs(0));
        ctx.note_off(0, 0, 69, 100, 480, Duration::from_secs(1));

        let voices = ctx.finish();
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].total_on_time, Duration::from_secs(1));
        assert_eq!(voices[0].events.len(), 2);
    }

    #[test]
    fn distinct_keys_are_distinct_voices() {
        let mut ctx = IngestContext::new();
        ctx.note_on(0, 0, 60, 100, 0, Duration::ZERO);
        ctx.note_on(0, 0, 64, 100, 0, Duration::ZERO);
        ctx.note_off(0, 0, 60, 0, 480, Duration::from_millis(500));
        ctx.note_off(0, 0, 64, 0, 960, Duration::from_secs(1));

        let voices = ctx.finish();
        assert_eq!(voices.len(), 2);
        // descending total_on_time: key 64 (1s) before key 60 (0.5s)
        assert_eq!(voices[0].key, 64);
        assert_eq!(voices[1].key, 60);
    }

    #[test]
    fn tempo_map_converts_ticks_at_default_tempo() {
        // 480 ticks per quarter, default 500_000 usec/quarter => 1 tick = ~1.0417ms
        let map = TempoMap::build(480, vec![]);
        let rt = map.real_time_at(480);
        assert_eq!(rt, Duration::from_micros(500_000));
    }

    #[test]
    fn tempo_map_honors_a_tempo_change() {
        // Double tempo (250_000 usec/quarter = twice as fast) starting at tick 480.
        let map = TempoMap::build(480, vec![(480, 250_000)]);
        assert_eq!(map.real_time_at(480), Duration::from_micros(500_000));
        // next quarter note now takes half as long
        assert_eq!(map.real_time_at(960), Duration::from_micros(750_000));
    }
}
