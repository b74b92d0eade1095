//! Plain-text rendering of a traffic report

use std::fmt::Write;

use super::{EndpointStats, TrafficReport};

/// Render a report as sectioned text
pub fn render_text(report: &TrafficReport) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut String, report: &TrafficReport) -> std::fmt::Result {
    writeln!(out, "=== TARGET API PATTERN ANALYSIS ===")?;
    writeln!(out, "Loaded {} requests", report.total_requests)?;
    writeln!(out, "Matched {} requests", report.matched_requests)?;

    if report.matched_requests == 0 {
        writeln!(
            out,
            "No matching requests found. Capture traffic from the target app and try again."
        )?;
        return Ok(());
    }

    section(out, "API HOST DISTRIBUTION")?;
    for (host, count) in &report.hosts {
        writeln!(out, "{}: {} requests", host, count)?;
    }

    section(out, "HTTP METHOD DISTRIBUTION")?;
    for (method, count) in &report.methods {
        writeln!(out, "{}: {} requests", method, count)?;
    }

    section(out, "STATUS CODE DISTRIBUTION")?;
    for (status, count) in &report.statuses {
        writeln!(out, "{}: {} responses", status, count)?;
    }

    section(out, "AUTHENTICATION ENDPOINTS")?;
    for (i, key) in report.auth_endpoints.iter().enumerate() {
        writeln!(out, "{}. {}", i + 1, key)?;
    }
    for prefix in &report.bearer_prefixes {
        writeln!(out, "  bearer token {}", prefix)?;
    }

    section(out, "ACTIVITY ENDPOINTS")?;
    write_stats(out, &report.activity_endpoints)?;

    section(out, "WORKOUT ENDPOINTS")?;
    write_stats(out, &report.workout_endpoints)?;

    if !report.query_params.is_empty() {
        section(out, "QUERY PARAMETERS")?;
        for (name, samples) in &report.query_params {
            writeln!(out, "{}:", name)?;
            for sample in samples {
                writeln!(out, "  - {}", sample)?;
            }
        }
    }

    if !report.body_fields.is_empty() {
        section(out, "REQUEST BODY FIELDS")?;
        for (name, types) in &report.body_fields {
            let types: Vec<&str> = types.iter().map(String::as_str).collect();
            writeln!(out, "{}: {}", name, types.join(", "))?;
        }
    }

    if !report.date_formats.is_empty() {
        section(out, "DATE FORMAT PATTERNS")?;
        for date in &report.date_formats {
            writeln!(out, "  {}", date)?;
        }
    }

    section(out, "SUGGESTED ENDPOINT CANDIDATES")?;
    if report.suggestions.is_empty() {
        writeln!(out, "No successful activity or workout endpoints observed.")?;
    } else {
        let groups = [
            ("find_strength_activities", &report.suggestions.find_strength_activities),
            ("list_workouts", &report.suggestions.list_workouts),
            ("create_workout", &report.suggestions.create_workout),
            ("link_workout", &report.suggestions.link_workout),
        ];
        for (name, candidates) in groups {
            if candidates.is_empty() {
                continue;
            }
            writeln!(out, "{}:", name)?;
            for candidate in candidates {
                writeln!(out, "  {} ({:?})", candidate.label(), candidate.shape)?;
            }
        }
        writeln!(out)?;
        writeln!(out, "Run with --yaml to print them as target.endpoints configuration.")?;
    }

    Ok(())
}

fn section(out: &mut String, title: &str) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "=== {} ===", title)
}

fn write_stats(out: &mut String, stats: &[EndpointStats]) -> std::fmt::Result {
    for (i, s) in stats.iter().enumerate() {
        writeln!(
            out,
            "{}. {} - {}/{} successful ({:.1}%)",
            i + 1,
            s.key,
            s.successful,
            s.total,
            s.success_rate()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::EndpointKey;

    // Test 1: Empty report explains itself
    #[test]
    fn test_render_empty() {
        let text = render_text(&TrafficReport {
            total_requests: 3,
            ..Default::default()
        });

        assert!(text.contains("Loaded 3 requests"));
        assert!(text.contains("No matching requests found"));
        assert!(!text.contains("ACTIVITY ENDPOINTS"));
    }

    // Test 2: Endpoint lines carry success rates
    #[test]
    fn test_render_stats() {
        let report = TrafficReport {
            total_requests: 4,
            matched_requests: 4,
            activity_endpoints: vec![EndpointStats {
                key: EndpointKey {
                    method: "GET".to_string(),
                    host: "api-7.whoop.com".to_string(),
                    path: "/activities".to_string(),
                },
                total: 4,
                successful: 3,
            }],
            ..Default::default()
        };

        let text = render_text(&report);

        assert!(text.contains("1. GET https://api-7.whoop.com/activities - 3/4 successful (75.0%)"));
        assert!(text.contains("No successful activity or workout endpoints observed."));
    }
}
