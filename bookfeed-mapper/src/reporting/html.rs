//! Self-contained HTML rendering of completeness reports
//!
//! Pages carry their own stylesheet and no scripts so they can be archived
//! next to the exported feed.

use super::report::{BatchSummary, CompletenessReport};
use crate::types::Severity;
use std::fmt::Write;

const STYLE: &str = r#"
        * {
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }
        body {
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background: #1a1a1a;
            color: #e0e0e0;
            padding: 30px;
        }
        h1 {
            font-size: 26px;
            color: #4a9eff;
            margin-bottom: 5px;
        }
        h2 {
            font-size: 18px;
            color: #4a9eff;
            margin: 25px 0 10px;
        }
        .subtitle {
            color: #888;
            font-size: 14px;
            font-family: 'Courier New', monospace;
        }
        .status {
            display: inline-block;
            padding: 3px 10px;
            border-radius: 10px;
            font-size: 13px;
            font-weight: 600;
            color: #fff;
        }
        .ready { background: #10b981; }
        .blocked { background: #ef4444; }
        table {
            border-collapse: collapse;
            width: 100%;
            max-width: 1100px;
        }
        th, td {
            text-align: left;
            padding: 6px 10px;
            border-bottom: 1px solid #3a3a3a;
            font-size: 14px;
        }
        th { color: #888; font-weight: 600; }
        .sev-critical { color: #ef4444; font-weight: 600; }
        .sev-error { color: #f97316; }
        .sev-warning { color: #f59e0b; }
        .sev-info { color: #888; }
        .bar {
            background: #2a2a2a;
            height: 12px;
            border-radius: 6px;
            max-width: 400px;
            margin: 8px 0;
        }
        .bar-fill {
            background: #4a9eff;
            height: 12px;
            border-radius: 6px;
        }
        ul { margin-left: 20px; }
        li { margin: 4px 0; }
"#;

/// Escape text for HTML element and attribute content
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn severity_class(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "sev-critical",
        Severity::Error => "sev-error",
        Severity::Warning => "sev-warning",
        Severity::Info => "sev-info",
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{}</title>
    <style>{}</style>
</head>
<body>
{}
</body>
</html>
"#,
        escape_html(title),
        STYLE,
        body
    )
}

pub fn render_report(report: &CompletenessReport) -> String {
    let mut body = String::new();
    let title = report.title.as_deref().unwrap_or("Untitled record");

    let _ = write!(
        body,
        r#"<h1>{} <span class="status {}">{}</span></h1>
<p class="subtitle">{} &middot; generated {}</p>
<h2>Completeness</h2>
<p>{} of {} fields populated ({:.1}%)</p>
<div class="bar"><div class="bar-fill" style="width: {:.0}%"></div></div>
"#,
        escape_html(title),
        if report.export_ready { "ready" } else { "blocked" },
        if report.export_ready {
            "Export ready"
        } else {
            "Not export ready"
        },
        report.record_id,
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.populated,
        report.total,
        report.completeness_percent(),
        report.completeness_percent()
    );

    body.push_str("<h2>Provenance</h2>\n<table>\n<tr><th>Source</th><th>Fields</th></tr>\n");
    for (provenance, count) in &report.by_provenance {
        let _ = writeln!(body, "<tr><td>{}</td><td>{}</td></tr>", provenance.as_str(), count);
    }
    body.push_str("</table>\n");

    if !report.fallback_fields.is_empty() || !report.generative_failures.is_empty() {
        body.push_str("<h2>Gaps</h2>\n<ul>\n");
        if !report.fallback_fields.is_empty() {
            let _ = writeln!(
                body,
                "<li>Fallback: {}</li>",
                escape_html(&report.fallback_fields.join(", "))
            );
        }
        if !report.generative_failures.is_empty() {
            let _ = writeln!(
                body,
                "<li>Generative failures: {}</li>",
                escape_html(&report.generative_failures.join(", "))
            );
        }
        body.push_str("</ul>\n");
    }

    if !report.flagged.is_empty() {
        body.push_str(
            "<h2>Flagged</h2>\n<table>\n<tr><th>Severity</th><th>Field</th><th>Rule</th><th>Message</th><th>Suggestion</th></tr>\n",
        );
        for result in &report.flagged {
            let _ = writeln!(
                body,
                r#"<tr><td class="{}">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
                severity_class(result.severity),
                result.severity,
                escape_html(&result.field),
                escape_html(&result.rule),
                escape_html(&result.message),
                result
                    .suggested_value
                    .as_ref()
                    .map(|v| escape_html(&v.render()))
                    .unwrap_or_default()
            );
        }
        body.push_str("</table>\n");
    }

    if !report.corrections.is_empty() {
        body.push_str("<h2>Auto-corrected</h2>\n<table>\n<tr><th>Field</th><th>From</th><th>To</th></tr>\n");
        for c in &report.corrections {
            let _ = writeln!(
                body,
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&c.field),
                escape_html(&c.from.render()),
                escape_html(&c.to.render())
            );
        }
        body.push_str("</table>\n");
    }

    if !report.recommendations.is_empty() {
        body.push_str("<h2>Recommendations</h2>\n<ul>\n");
        for r in &report.recommendations {
            let _ = writeln!(body, "<li>{}</li>", escape_html(r));
        }
        body.push_str("</ul>\n");
    }

    page(&format!("Catalog metadata report - {}", title), &body)
}

pub fn render_batch(summary: &BatchSummary, reports: &[CompletenessReport]) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        r#"<h1>Catalog metadata batch</h1>
<p class="subtitle">{} record(s) &middot; {} export-ready &middot; {} cancelled &middot; {} failed &middot; {} ms</p>
<h2>Records</h2>
<table>
<tr><th>Title</th><th>Completeness</th><th>Critical</th><th>Status</th></tr>
"#,
        summary.records, summary.export_ready, summary.cancelled, summary.failed, summary.elapsed_ms
    );
    for report in reports {
        let _ = writeln!(
            body,
            r#"<tr><td>{}</td><td>{}/{}</td><td class="sev-critical">{}</td><td><span class="status {}">{}</span></td></tr>"#,
            escape_html(report.title.as_deref().unwrap_or("Untitled record")),
            report.populated,
            report.total,
            report.flagged_with_severity(Severity::Critical),
            if report.export_ready { "ready" } else { "blocked" },
            if report.export_ready { "ready" } else { "blocked" }
        );
    }
    body.push_str("</table>\n");

    if !summary.recurring_fallbacks.is_empty() {
        body.push_str("<h2>Recurring fallbacks</h2>\n<ul>\n");
        for (field, count) in &summary.recurring_fallbacks {
            let _ = writeln!(body, "<li>{} ({} records)</li>", escape_html(field), count);
        }
        body.push_str("</ul>\n");
    }

    page("Catalog metadata batch", &body)
}
