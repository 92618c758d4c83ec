//! Terminal summary of a finished run

use std::time::Duration;

use parade_common::{OutputTarget, RunSummary, UrlState};

/// Print the end-of-run summary to stdout.
pub fn print_summary(
    summary: &RunSummary,
    states: &[(String, UrlState)],
    outputs: &[OutputTarget],
    duration: Duration,
) {
    print!("{}", render_summary(summary, states, outputs, duration));
}

fn render_summary(
    summary: &RunSummary,
    states: &[(String, UrlState)],
    outputs: &[OutputTarget],
    duration: Duration,
) -> String {
    let mut out = String::new();
    if summary.is_empty() {
        out.push_str("\nNo pages were found.\n\n");
        return out;
    }

    let failures: Vec<_> = states
        .iter()
        .filter_map(|(url, state)| match state {
            UrlState::Failure(e) => Some((url.as_str(), e.to_string())),
            _ => None,
        })
        .collect();

    if !failures.is_empty() {
        out.push_str(&format!("\n{:-<100}\n", ""));
        out.push_str(&format!("{:<50} {:<49}\n", "FAILED URL", "ERROR"));
        out.push_str(&format!("{:-<100}\n", ""));
        for (url, error) in &failures {
            out.push_str(&format!("{:<50} {:<49}\n", truncate(url, 50), truncate(error, 49)));
        }
        out.push_str(&format!("{:-<100}\n", ""));
    }

    out.push_str("\n📊 Summary:\n");
    out.push_str(&format!("  Pages found: {}\n", summary.total));
    out.push_str(&format!("  ✓ Audited: {}\n", summary.succeeded));
    out.push_str(&format!("  ✗ Failed: {}\n", summary.failed));
    let unfinished = summary.pending + summary.in_progress;
    if unfinished > 0 {
        out.push_str(&format!("  … Unfinished: {unfinished}\n"));
    }
    out.push_str(&format!("  Success rate: {:.1}%\n", summary.success_rate()));
    out.push_str(&format!("  ⏱️  Duration: {}\n", format_duration(duration)));
    for output in outputs {
        out.push_str(&format!("  → {output}\n"));
    }
    out.push('\n');
    out
}

/// Shorten to `width` characters, marking the cut with "...".
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Format duration in a human-readable way
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs == 0 {
        format!("{}ms", millis)
    } else if total_secs < 60 {
        if millis > 0 {
            format!("{}.{:03}s", total_secs, millis)
        } else {
            format!("{}s", total_secs)
        }
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        format!("{}h {}m", total_secs / 3600, (total_secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parade_common::AuditError;

    #[test]
    fn test_render_summary_lists_failures() {
        let summary = RunSummary {
            total: 2,
            succeeded: 1,
            failed: 1,
            ..RunSummary::default()
        };
        let states = vec![
            ("https://a.example/".to_string(), UrlState::Success),
            (
                "https://b.example/".to_string(),
                UrlState::Failure(AuditError::Timeout(Duration::from_secs(120))),
            ),
        ];
        let outputs = [OutputTarget::Csv("report.csv".into())];

        let text = render_summary(&summary, &states, &outputs, Duration::from_secs(65));
        assert!(text.contains("FAILED URL"));
        assert!(text.contains("https://b.example/"));
        assert!(!text.contains("https://a.example/"));
        assert!(text.contains("Success rate: 50.0%"));
        assert!(text.contains("1m 5s"));
        assert!(text.contains("report.csv"));
    }

    #[test]
    fn test_render_empty_run() {
        let text = render_summary(&RunSummary::default(), &[], &[], Duration::ZERO);
        assert!(text.contains("No pages were found"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("https://a.example/very/long", 12), "https://a...");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_millis(5500)), "5.500s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
        assert_eq!(format_duration(Duration::from_secs(3720)), "1h 2m");
    }
}
