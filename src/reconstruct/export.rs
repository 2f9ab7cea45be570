//! Plain-text renderings of reconstructed segments, one block per window:
//!
//! ```text
//! 8 Jan 2026 at 9:00 AM
//! reconstructed text
//!
//! ```
//!
//! The refined variant has one block per segment and names the app under the header.

use std::fmt::Write;

use chrono::TimeZone;

use crate::utils::time::format_display;

use super::TextSegment;

fn header<Tz: TimeZone>(segment: &TextSegment, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format_display(&segment.start.with_timezone(tz))
}

/// Renders the raw export. Texts of apps sharing a window are joined by a newline.
pub fn render_raw<Tz: TimeZone>(segments: &[TextSegment], tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut output = String::new();
    for window in segments.chunk_by(|a, b| a.start == b.start) {
        let text = window
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        // Writing into a String can't fail.
        let _ = write!(output, "{}\n{}\n\n", header(&window[0], tz), text);
    }
    output
}

/// Renders the refined export. `refined` holds the refined text of every segment, in order.
pub fn render_refined<Tz: TimeZone>(segments: &[TextSegment], refined: &[String], tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut output = String::new();
    for (segment, text) in segments.iter().zip(refined) {
        if text.trim().is_empty() {
            continue;
        }
        let _ = write!(
            output,
            "{}\n[{}]\n{}\n\n",
            header(segment, tz),
            segment.app,
            text.trim()
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, FixedOffset, TimeZone, Utc};

    use crate::reconstruct::TextSegment;

    use super::{render_raw, render_refined};

    fn segment(hour: u32, app: &str, text: &str) -> TextSegment {
        let start = Utc.with_ymd_and_hms(2026, 1, 8, hour, 0, 0).unwrap();
        TextSegment {
            start,
            end: start + Duration::minutes(30),
            app: app.into(),
            text: text.into(),
        }
    }

    #[test]
    fn raw_export_has_one_block_per_window() {
        let segments = [
            segment(9, "editor", "fn main"),
            segment(9, "chat", "brb"),
            segment(13, "editor", "done"),
        ];

        assert_eq!(
            render_raw(&segments, &Utc),
            "8 Jan 2026 at 9:00 AM\nfn main\nbrb\n\n8 Jan 2026 at 1:00 PM\ndone\n\n"
        );
    }

    #[test]
    fn headers_use_the_given_timezone() {
        let tz = FixedOffset::east_opt(3600).unwrap();
        let rendered = render_raw(&[segment(23, "editor", "late")], &tz);
        assert!(rendered.starts_with("9 Jan 2026 at 12:00 AM\n"));
    }

    #[test]
    fn refined_export_names_the_app() {
        let segments = [segment(9, "editor", "teh cat"), segment(9, "chat", "   ")];
        let refined = vec!["The cat.".to_string(), " ".to_string()];

        assert_eq!(
            render_refined(&segments, &refined, &Utc),
            "8 Jan 2026 at 9:00 AM\n[editor]\nThe cat.\n\n"
        );
    }
}
