//! Conductor-side progress bar: purely informational redraw of elapsed vs.
//! total performance time, on its own timer, never touching the dispatch
//! path's own clock.
//!
//! Redraws a single line in place with a carriage return and a line-kill
//! escape rather than appending to the terminal.

use std::io::Write;
use std::time::{Duration, Instant};

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// How often the bar redraws.
const TICK: Duration = Duration::from_millis(100);

/// Fixed characters around the bar: the `[`/`]` brackets plus the
/// ` NNN.Ns / NNN.Ns` time suffix.
const CHROME_WIDTH: usize = 2 + 16;

/// Bar length never drops below this even on a very narrow terminal.
const MIN_BAR_WIDTH: usize = 10;

/// Runs until `total` has elapsed since `start`, redrawing a bar against
/// `Instant::now() - start` every [`TICK`]. Intended to run on its own
/// thread alongside [`crate::dispatch::start`]'s workers. Terminal width is
/// read once at startup, not on every redraw, so the bar doesn't resize
/// mid-performance.
pub fn run(start: Instant, total: Duration) {
    let mut out = StandardStream::stdout(terminal_color_choice());
    let bar_width = bar_width_for(terminal_width());

    loop {
        let elapsed = Instant::now().saturating_duration_since(start).min(total);
        draw(&mut out, elapsed, total, bar_width);

        if elapsed >= total {
            let _ = writeln!(out);
            return;
        }

        std::thread::sleep(TICK);
    }
}

/// Derives the bar's fill length from the terminal's column count, leaving
/// room for the brackets and time suffix.
fn bar_width_for(terminal_width: usize) -> usize {
    terminal_width.saturating_sub(CHROME_WIDTH).max(MIN_BAR_WIDTH)
}

fn draw(out: &mut StandardStream, elapsed: Duration, total: Duration, bar_width: usize) {
    let fraction = if total.is_zero() { 1.0 } else { elapsed.as_secs_f64() / total.as_secs_f64() };
    let filled = ((fraction.clamp(0.0, 1.0)) * bar_width as f64).round() as usize;

    let _ = write!(out, "\r\x1b[2K");

    let mut bar = String::with_capacity(bar_width + 2);
    bar.push('[');
    bar.push_str(&"=".repeat(filled));
    bar.push_str(&" ".repeat(bar_width - filled));
    bar.push(']');

    let _ = out.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
    let _ = write!(out, "{bar}");
    let _ = out.reset();

    let line = format!(
        " {:>5.1}s / {:>5.1}s",
        elapsed.as_secs_f64(),
        total.as_secs_f64(),
    );
    let _ = write!(out, "{line}");
    let _ = out.flush();
}

fn terminal_color_choice() -> ColorChoice {
    if atty_stdout() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

fn atty_stdout() -> bool {
    crossterm::tty::IsTty::is_tty(&std::io::stdout())
}

fn terminal_width() -> usize {
    crossterm::terminal::size().map(|(cols, _)| cols as usize).unwrap_or(80)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_elapsed_renders_empty_bar() {
        let mut out = StandardStream::stdout(ColorChoice::Never);
        // smoke test: must not panic regardless of terminal state
        draw(&mut out, Duration::ZERO, Duration::from_secs(10), 40);
    }

    #[test]
    fn full_elapsed_renders_full_bar() {
        let mut out = StandardStream::stdout(ColorChoice::Never);
        draw(&mut out, Duration::from_secs(10), Duration::from_secs(10), 40);
    }

    #[test]
    fn zero_total_is_treated_as_already_complete() {
        let mut out = StandardStream::stdout(ColorChoice::Never);
        draw(&mut out, Duration::ZERO, Duration::ZERO, 40);
    }

    #[test]
    fn bar_width_scales_with_terminal_width() {
        assert_eq!(bar_width_for(18 + CHROME_WIDTH), 18);
        assert_eq!(bar_width_for(120), 120 - CHROME_WIDTH);
    }

    #[test]
    fn bar_width_never_drops_below_the_minimum_on_a_narrow_terminal() {
        assert_eq!(bar_width_for(5), MIN_BAR_WIDTH);
        assert_eq!(bar_width_for(0), MIN_BAR_WIDTH);
    }
}
