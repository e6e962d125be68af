//! # Report Rendering
//!
//! Plain-text rendering of [`EfficiencyReport`]s.

use crate::EfficiencyReport;
use crate::analyzer::ms_to_secs;

const UNAVAILABLE: &str = "insufficient data";

/// Render milliseconds as whole `XhYmZs` using floor division.
///
/// No unit rolls over into the next: `3_725_000` is `1h2m5s`, and a
/// remainder under one second is dropped. Negative values round toward zero,
/// so less than a second either way renders as `0h0m0s`.
#[must_use]
pub fn format_duration(ms: i64) -> String {
    let total_secs = ms.unsigned_abs() / 1000;
    let sign = if ms < 0 && total_secs > 0 { "-" } else { "" };
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{sign}{hours}h{minutes}m{seconds}s")
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| UNAVAILABLE.to_string(), |v| format!("{v:.2}%"))
}

fn number(value: Option<f64>) -> String {
    value.map_or_else(|| UNAVAILABLE.to_string(), |v| format!("{v:.2}"))
}

/// Multi-line summary of one stage.
#[must_use]
pub fn render_text(report: &EfficiencyReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Stage {}\n", report.stage_id));
    out.push_str(&format!(
        "  Ideal cycle time:  {:.3}s\n",
        ms_to_secs(report.ideal_cycle_time_ms)
    ));
    out.push_str(&format!(
        "  Avg cycle time:    {}\n",
        report
            .avg_cycle_time_ms
            .map_or_else(|| UNAVAILABLE.to_string(), |ms| format!("{:.3}s", ms_to_secs(ms)))
    ));
    out.push_str(&format!("  Cycles:            {}\n", report.cycle_count));
    out.push_str(&format!(
        "  Cycle efficiency:  {}\n",
        percent(report.cycle_efficiency)
    ));
    out.push_str(&format!(
        "  Time efficiency:   {}\n",
        percent(report.time_efficiency)
    ));
    out.push_str(&format!("  Ideal PPM:         {:.2}\n", report.ideal_ppm));
    out.push_str(&format!(
        "  Real PPM:          {} ({} of ideal)\n",
        number(report.real_ppm),
        percent(report.ratio_percent)
    ));
    out.push_str(&format!(
        "  Run duration:      {}\n",
        report
            .duration_ms
            .map_or_else(|| UNAVAILABLE.to_string(), format_duration)
    ));
    out.push_str(&format!(
        "  Wasted time:       {} ({})\n",
        report.wasted_time_ms.map_or_else(
            || UNAVAILABLE.to_string(),
            |ms| format_duration(ms.trunc() as i64)
        ),
        percent(report.wasted_percent)
    ));
    out
}

/// Summaries of several stages separated by blank lines.
#[must_use]
pub fn render_all(reports: &[EfficiencyReport]) -> String {
    reports
        .iter()
        .map(render_text)
        .collect::<Vec<_>>()
        .join("\n")
}
