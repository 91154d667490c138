//! Busy indicators: spinner, shimmering status text, progress bar

use ratatui::style::{Modifier, Style};
use ratatui::text::Span;
use std::time::Duration;

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub fn spinner(frame: usize) -> &'static str {
    SPINNER_FRAMES[frame % SPINNER_FRAMES.len()]
}

/// Text with a highlight band sweeping across it every two seconds
pub fn shimmer_spans(text: &str, elapsed: Duration) -> Vec<Span<'static>> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let padding = 10usize;
    let period = chars.len() + padding * 2;
    let sweep_seconds = 2.0f32;
    let pos = ((elapsed.as_secs_f32() % sweep_seconds) / sweep_seconds * period as f32) as isize;
    let band_half_width = 5.0;

    chars
        .iter()
        .enumerate()
        .map(|(i, ch)| {
            let dist = (i as isize + padding as isize - pos).abs() as f32;
            let intensity = if dist <= band_half_width {
                let x = std::f32::consts::PI * (dist / band_half_width);
                0.5 * (1.0 + x.cos())
            } else {
                0.0
            };
            Span::styled(ch.to_string(), style_for_intensity(intensity))
        })
        .collect()
}

fn style_for_intensity(intensity: f32) -> Style {
    if intensity < 0.2 {
        Style::default().add_modifier(Modifier::DIM)
    } else if intensity < 0.6 {
        Style::default()
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    }
}

/// `percent` of `width` cells filled, with eighth-cell resolution
pub fn progress_bar(percent: u16, width: usize) -> String {
    const FULL: char = '█';
    const EMPTY: char = '░';
    const PARTIAL: [char; 8] = ['▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];

    let progress = f32::from(percent.min(100)) / 100.0;
    let exact = progress * width as f32;
    let filled = exact as usize;
    let partial_idx = ((exact - filled as f32) * 8.0) as usize;

    (0..width)
        .map(|i| {
            if i < filled {
                FULL
            } else if i == filled && partial_idx > 0 {
                PARTIAL[partial_idx.min(7)]
            } else {
                EMPTY
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_bounds() {
        assert_eq!(progress_bar(0, 4), "░░░░");
        assert_eq!(progress_bar(100, 4), "████");
        assert_eq!(progress_bar(50, 4), "██░░");
        assert_eq!(progress_bar(250, 2), "██");
    }

    #[test]
    fn test_spinner_cycles() {
        assert_eq!(spinner(0), spinner(SPINNER_FRAMES.len()));
    }

    #[test]
    fn test_shimmer_keeps_text() {
        let spans = shimmer_spans("Searching", Duration::from_millis(700));
        let text: String = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "Searching");
    }
}
