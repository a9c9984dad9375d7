use crate::stats::Summary;

/// Scenario errors shown in full before the list is elided.
const ERROR_PRINT_LIMIT: usize = 10;

pub fn print_summary(summary: &Summary) {
    for line in summary_lines(summary) {
        println!("{}", line);
    }
}

#[must_use]
pub fn summary_lines(summary: &Summary) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(String::new());
    lines.push("Run summary".to_owned());
    lines.push(format!(
        "  duration: {:.1}s | users: {} started, {} finished | requests: {} | errors: {}",
        summary.duration.as_secs_f64(),
        summary.total_users,
        summary.finished_users,
        summary.total_requests,
        summary.total_errors,
    ));

    if !summary.endpoints.is_empty() {
        lines.push(String::new());
        let name_width = summary
            .endpoints
            .iter()
            .map(|endpoint| endpoint.endpoint.len())
            .max()
            .unwrap_or(8)
            .max(8);
        lines.push(format!(
            "  {:<width$} {:>8} {:>6} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
            "endpoint",
            "count",
            "err",
            "avg",
            "min",
            "max",
            "p50",
            "p90",
            "p95",
            "p99",
            width = name_width,
        ));
        for endpoint in &summary.endpoints {
            lines.push(format!(
                "  {:<width$} {:>8} {:>6} {:>9.1} {:>9.1} {:>9.1} {:>9.1} {:>9.1} {:>9.1} {:>9.1}",
                endpoint.endpoint,
                endpoint.count,
                endpoint.errors,
                endpoint.avg_ms,
                endpoint.min_ms,
                endpoint.max_ms,
                endpoint.p50_ms,
                endpoint.p90_ms,
                endpoint.p95_ms,
                endpoint.p99_ms,
                width = name_width,
            ));
        }
    }

    if !summary.scenario_errors.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "  scenario errors ({}):",
            summary.scenario_errors.len()
        ));
        for err in summary.scenario_errors.iter().take(ERROR_PRINT_LIMIT) {
            let screen = err.screen.as_deref().unwrap_or("-");
            lines.push(format!(
                "    user {} [{}]: {}",
                err.user_id, screen, err.message
            ));
        }
        if summary.scenario_errors.len() > ERROR_PRINT_LIMIT {
            lines.push(format!(
                "    ... and {} more",
                summary.scenario_errors.len() - ERROR_PRINT_LIMIT
            ));
        }
    }

    lines
}
