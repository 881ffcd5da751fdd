//! Partitions a descending-`total_on_time`-sorted voice list into `n`
//! monophonic streams using Longest Processing Time (LPT) greedy
//! scheduling, balancing each stream's total active time.
//!
//! The union-of-events, non-decreasing-`rt`, and LPT 4/3-optimality
//! invariants are all exercised below.

use std::time::Duration;

use crate::ingest::Voice;

/// One note to play: a key, its velocity, how long it lasts, and when it
/// starts relative to performance start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamEvent {
    pub key: u8,
    pub velocity: u8,
    pub duration: Duration,
    pub real_time: Duration,
}

/// One partition of the merged output, assigned to one player.
#[derive(Debug, Clone, Default)]
pub struct Stream {
    pub events: Vec<StreamEvent>,
    pub total_on_time: Duration,
}

impl Stream {
    /// When this stream's last event finishes, relative to performance
    /// start — the wall-clock instant this stream goes silent for good.
    /// Unlike `total_on_time`, this accounts for rests between notes, so
    /// it's the right number for driving a total-performance-length
    /// progress bar.
    pub fn end_time(&self) -> Duration {
        self.events
            .iter()
            .map(|e| e.real_time + e.duration)
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

/// Converts one voice's on/off event pairs into a stream of `StreamEvent`s:
/// each `is_on` event's duration is bounded by the real time of the event
/// immediately following it.
fn voice_to_stream(voice: &Voice) -> Stream {
    let mut events = Vec::new();

    for pair in voice.events.windows(2) {
        let [current, next] = pair else { unreachable!("windows(2) yields pairs") };

        if current.is_on {
            events.push(StreamEvent {
                key: voice.key,
                velocity: current.velocity,
                duration: next.real_time.saturating_sub(current.real_time),
                real_time: current.real_time,
            });
        }
    }

    Stream { events, total_on_time: voice.total_on_time }
}

/// Partitions `voices` (assumed sorted descending by `total_on_time`, the
/// ingest layer's output order) into `n` load-balanced monophonic streams.
///
/// # Panics
///
/// Panics if `n == 0` — a programming error, not a runtime condition to
/// recover from.
pub fn merge(voices: &[Voice], n: usize) -> Vec<Stream> {
    assert!(n > 0, "merge: n must be > 0");

    let mut streams: Vec<Stream> = (0..n).map(|_| Stream::default()).collect();

    for voice in voices {
        let source = voice_to_stream(voice);

        let target = streams
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.total_on_time)
            .map(|(i, _)| i)
            .expect("n > 0 guarantees at least one stream");

        streams[target].total_on_time += source.total_on_time;
        streams[target].events.extend(source.events);
    }

    for stream in &mut streams {
        stream.events.sort_by_key(|event| event.real_time);
    }

    streams
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::IngestContext;

    /// Builds a single voice for `key` from a list of (on_ms, off_ms) spans,
    /// going through the same public ingest API the conductor binary uses.
    fn voice(key: u8, on_off_pairs: &[(u64, u64)]) -> Voice {
        let mut ctx = IngestContext::new();

        for &(on_ms, off_ms) in on_off_pairs {
            ctx.note_on(0, 0, key, 100, on_ms, Duration::from_millis(on_ms));
            ctx.note_off(0, 0, key, 100, off_ms, Duration::from_millis(off_ms));
        }

        ctx.finish().into_iter().next().expect("one voice per key")
    }

    #[test]
    fn single_voice_single_stream_preserves_events() {
        let voices = vec![voice(69, &[(0, 1000)])];
        let streams = merge(&voices, 1);

        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].events.len(), 1);
        assert_eq!(streams[0].events[0].duration, Duration::from_secs(1));
        assert_eq!(streams[0].events[0].real_time, Duration::ZERO);
    }

    #[test]
    fn end_time_accounts_for_trailing_rest_not_just_active_time() {
        // A single half-second note starting a second in: total_on_time is
        // 500ms, but the stream doesn't go quiet until t=1.5s.
        let voices = vec![voice(69, &[(1000, 1500)])];
        let streams = merge(&voices, 1);

        assert_eq!(streams[0].total_on_time, Duration::from_millis(500));
        assert_eq!(streams[0].end_time(), Duration::from_millis(1500));
    }

    #[test]
    fn more_streams_than_voices_leaves_extras_empty() {
        let voices = vec![voice(69, &[(0, 1000)])];
        let streams = merge(&voices, 3);

        assert_eq!(streams.len(), 3);
        let nonempty = streams.iter().filter(|s| !s.events.is_empty()).count();
        assert_eq!(nonempty, 1);
    }

    #[test]
    fn events_within_each_stream_are_time_ordered() {
        let voices = vec![
            voice(60, &[(500, 1000), (0, 200)]),
            voice(64, &[(100, 300)]),
        ];

        let streams = merge(&voices, 1);
        let times: Vec<_> = streams[0].events.iter().map(|e| e.real_time).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }

    #[test]
    fn union_of_events_is_preserved() {
        let voices = vec![
            voice(60, &[(0, 100), (200, 300)]),
            voice(64, &[(50, 150)]),
            voice(67, &[(400, 500)]),
        ];

        let total_input_events: usize = voices.iter().map(|v| v.events.len() / 2).sum();

        let streams = merge(&voices, 2);
        let total_output_events: usize = streams.iter().map(|s| s.events.len()).sum();

        assert_eq!(total_input_events, total_output_events);
    }

    #[test]
    fn lpt_balances_load_within_four_thirds_bound() {
        // Ten equal-length voices onto 3 streams.
        let voices: Vec<Voice> = (0..10)
            .map(|i| voice(60 + i as u8, &[(0, 1000)]))
            .collect();

        let streams = merge(&voices, 3);

        let total: Duration = streams.iter().map(|s| s.total_on_time).sum();
        let average = total.as_secs_f64() / 3.0;
        let max = streams.iter().map(|s| s.total_on_time.as_secs_f64()).fold(0.0, f64::max);

        assert!(max <= (4.0 / 3.0) * average + 1e-9);
    }
}
