//! Formatted output helpers for CLI commands.

use std::fmt::Write;

use ocisync_runtime::container::ContainerReport;

/// Renders a report as aligned `KEY  value` lines.
#[must_use]
pub fn format_report(report: &ContainerReport) -> String {
    let rows = [
        ("CONTAINER ID", report.id.to_string()),
        ("STATE", report.state.to_string()),
        ("BUNDLE", report.bundle.clone()),
        ("LOG", report.log.clone()),
        ("CREATED", or_dash(report.created_at.map(|t| t.to_rfc3339()))),
        ("STARTED", or_dash(report.started_at.map(|t| t.to_rfc3339()))),
        ("FINISHED", or_dash(report.finished_at.map(|t| t.to_rfc3339()))),
        ("EXIT CODE", or_dash(report.exit_code.map(|c| c.to_string()))),
        ("EXIT REASON", or_dash(report.exit_desc.clone())),
        ("ATTACH SOCKET", or_dash(report.attach_socket.clone())),
        ("CONTROL SOCKET", or_dash(report.control_socket.clone())),
    ];

    let mut out = String::new();
    for (key, value) in rows {
        let _ = writeln!(out, "{key:<16}{value}");
    }
    out.truncate(out.trim_end().len());
    out
}

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".into())
}
