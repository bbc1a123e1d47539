use super::{Direction, Report};
use crate::Result;
use crate::metrics;
use core::fmt::Write;
use owo_colors::OwoColorize;

pub fn generate<W: Write>(report: &Report, top_k: usize, use_colors: bool, writer: &mut W) -> Result<()> {
    let heading = |text: &str| {
        if use_colors {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    };

    writeln!(writer, "Summarizing {} dependencies:", report.records.len())?;

    ranked_section(
        report,
        &heading("Oldest pinned versions"),
        metrics::VERSION_AGE_DAYS,
        Direction::Descending,
        top_k,
        "days old",
        writer,
    )?;

    if let Some(missing) = report.not_located.get("github")
        && !missing.is_empty()
    {
        writeln!(writer)?;
        writeln!(writer, "{}", heading("Not located on GitHub"))?;
        for id in missing {
            writeln!(writer, "  {id}")?;
        }
    }

    ranked_section(
        report,
        &heading("Fewest GitHub stars"),
        "github:stars",
        Direction::Ascending,
        top_k,
        "stars",
        writer,
    )?;

    ranked_section(
        report,
        &heading("Fewest recent downloads"),
        "pypi:downloads_last_month",
        Direction::Ascending,
        top_k,
        "downloads last month",
        writer,
    )?;

    if !report.warnings.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "{}", heading("Skipped input lines"))?;
        for warning in &report.warnings {
            writeln!(writer, "  line {}: {} ({})", warning.line, warning.content, warning.reason)?;
        }
    }

    if !report.failures.is_empty() {
        writeln!(writer)?;
        let label = format!("{} fetches failed", report.failures.len());
        let styled = if use_colors { label.red().to_string() } else { label };
        writeln!(writer, "{styled}")?;
        for failure in &report.failures {
            writeln!(writer, "  {} from {}: {}", failure.id, failure.source, failure.failure)?;
        }
    }

    Ok(())
}

/// Write one ranked worst-offender section, skipping it entirely when no
/// record carries the metric.
fn ranked_section<W: Write>(
    report: &Report,
    heading: &str,
    metric: &str,
    direction: Direction,
    top_k: usize,
    unit: &str,
    writer: &mut W,
) -> Result<()> {
    let ranked = report.ranking(metric, direction, top_k);
    if ranked.is_empty() {
        return Ok(());
    }

    writeln!(writer)?;
    writeln!(writer, "{heading}")?;
    for (record, _) in &ranked {
        // Display through the typed value so formatting stays consistent.
        if let Some(value) = record.metrics.get(metric) {
            writeln!(writer, "  {} ({value} {unit})", record.id)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchOutcome;
    use crate::identity::PackageId;
    use crate::metrics::MetricValue;
    use crate::report::aggregate;
    use crate::requirements::parse_str;
    use crate::sources::SourceRecord;
    use chrono::{TimeZone, Utc};

    fn sample_report() -> Report {
        let parsed = parse_str("flask==3.0.0\nleftpad==1.0.0\nnot-a-pin\n");
        let flask = PackageId::new("flask", "3.0.0");
        let leftpad = PackageId::new("leftpad", "1.0.0");

        let outcomes = vec![
            FetchOutcome {
                id: flask.clone(),
                source: "pypi",
                record: SourceRecord::Found(
                    [
                        (
                            "release_date".to_string(),
                            MetricValue::Timestamp(Utc.with_ymd_and_hms(2023, 9, 30, 0, 0, 0).unwrap()),
                        ),
                        ("downloads_last_month".to_string(), MetricValue::Count(90_000_000)),
                    ]
                    .into(),
                ),
            },
            FetchOutcome {
                id: flask,
                source: "github",
                record: SourceRecord::Found([("stars".to_string(), MetricValue::Count(65000))].into()),
            },
            FetchOutcome {
                id: leftpad.clone(),
                source: "pypi",
                record: SourceRecord::Found(
                    [(
                        "release_date".to_string(),
                        MetricValue::Timestamp(Utc.with_ymd_and_hms(2016, 3, 25, 0, 0, 0).unwrap()),
                    )]
                    .into(),
                ),
            },
            FetchOutcome {
                id: leftpad,
                source: "github",
                record: SourceRecord::NotFound,
            },
        ];

        aggregate(&parsed, &outcomes, Utc.with_ymd_and_hms(2026, 8, 24, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_console_sections() {
        let mut out = String::new();
        generate(&sample_report(), 3, false, &mut out).unwrap();

        assert!(out.starts_with("Summarizing 2 dependencies:"));
        assert!(out.contains("Oldest pinned versions"));
        assert!(out.contains("leftpad==1.0.0"));
        assert!(out.contains("Not located on GitHub"));
        assert!(out.contains("Fewest GitHub stars"));
        assert!(out.contains("flask==3.0.0 (65000 stars)"));
        assert!(out.contains("Skipped input lines"));
        assert!(out.contains("not-a-pin"));
        // No failures in this run, so no failure section.
        assert!(!out.contains("fetches failed"));
    }

    #[test]
    fn test_oldest_ranks_first() {
        let mut out = String::new();
        generate(&sample_report(), 1, false, &mut out).unwrap();

        let oldest_pos = out.find("leftpad==1.0.0").unwrap();
        assert!(out[..oldest_pos].contains("Oldest pinned versions"));
        // Top 1: flask must not appear under the oldest section.
        let section = &out[out.find("Oldest").unwrap()..out.find("Not located").unwrap()];
        assert!(!section.contains("flask"));
    }

    #[test]
    fn test_plain_output_has_no_ansi() {
        let mut out = String::new();
        generate(&sample_report(), 3, false, &mut out).unwrap();
        assert!(!out.contains('\x1b'));
    }
}
