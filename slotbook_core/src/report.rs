use crate::verify::{Classification, RtpReport};

fn group_thousands(value: u128) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn trim_number(value: f64) -> String {
    let text = format!("{value:.4}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn status_line(classification: &Classification) -> String {
    match classification {
        Classification::Within { label, threshold } => format!(
            "{} (within {}%)",
            label.to_uppercase(),
            trim_number(threshold * 100.0)
        ),
        Classification::NeedsAdjustment => classification.label().to_uppercase(),
    }
}

/// Human-readable verification block for one game mode.
pub fn render_report(mode: &str, report: &RtpReport) -> String {
    format!(
        "{} Mode:\n\
         \x20 Total Simulations: {}\n\
         \x20 Total Weight: {}\n\
         \x20 Weighted Payout: {}\n\
         \x20 RTP: {:.6} ({:.4}%)\n\
         \x20 Target: {:.4}%\n\
         \x20 Difference: {:+.4}%\n\
         \x20 Status: {}\n",
        mode.to_uppercase(),
        group_thousands(report.rows as u128),
        group_thousands(report.total_weight),
        group_thousands(report.weighted_payout.round().max(0.0) as u128),
        report.rtp,
        report.rtp * 100.0,
        report.target * 100.0,
        report.delta * 100.0,
        status_line(&report.classification),
    )
}

fn title_case(mode: &str) -> String {
    let mut chars = mode.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Cross-mode summary: one RTP line per mode, then the target.
pub fn render_summary<S: AsRef<str>>(reports: &[(S, RtpReport)], target: f64) -> String {
    let mut out = String::from("SUMMARY:\n");
    for (mode, report) in reports {
        out.push_str(&format!(
            "  {} RTP: {:.4}%\n",
            title_case(mode.as_ref()),
            report.rtp * 100.0
        ));
    }
    out.push_str(&format!("  Target RTP: {:.4}%\n", target * 100.0));
    out
}
