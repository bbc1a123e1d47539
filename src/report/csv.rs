use super::Report;
use crate::Result;
use core::fmt::Write;
use std::borrow::Cow;
use std::collections::BTreeSet;

/// Write the full metric grid: one row per dependency, one column per metric
/// name seen anywhere in the report. Absent metrics become empty cells.
pub fn generate<W: Write>(report: &Report, writer: &mut W) -> Result<()> {
    // Sorted union of metric names across all records keeps the column set
    // stable no matter which packages happened to resolve.
    let columns: BTreeSet<&str> = report
        .records
        .iter()
        .flat_map(|record| record.metrics.keys().map(String::as_str))
        .collect();

    write!(writer, "name,version")?;
    for column in &columns {
        write!(writer, ",{}", escape_csv(column))?;
    }
    writeln!(writer)?;

    for record in &report.records {
        write!(writer, "{},{}", escape_csv(record.id.name()), escape_csv(record.id.version()))?;
        for column in &columns {
            match record.metrics.get(*column) {
                Some(value) => write!(writer, ",{}", escape_csv(&value.to_string()))?,
                None => write!(writer, ",")?,
            }
        }
        writeln!(writer)?;
    }

    Ok(())
}

/// Escape a value for RFC compliant CSV output.
///
/// Wraps the value in double quotes if it contains commas, newlines, or double quotes.
/// Internal double quotes are doubled per the RFC.
fn escape_csv(s: &str) -> Cow<'_, str> {
    if s.contains('"') {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else if s.contains(',') || s.contains('\n') || s.contains('\r') {
        Cow::Owned(format!("\"{s}\""))
    } else {
        Cow::Borrowed(s)
    }
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
        let parsed = parse_str("b==2.0\na==1.0\n");
        let a = PackageId::new("a", "1.0");
        let b = PackageId::new("b", "2.0");

        let outcomes = vec![
            FetchOutcome {
                id: a,
                source: "github",
                record: SourceRecord::Found([("stars".to_string(), MetricValue::Count(7))].into()),
            },
            FetchOutcome {
                id: b,
                source: "pypi",
                record: SourceRecord::Found([("downloads_last_month".to_string(), MetricValue::Count(60))].into()),
            },
        ];

        aggregate(&parsed, &outcomes, Utc.with_ymd_and_hms(2026, 8, 24, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_grid_shape_and_absent_cells() {
        let mut out = String::new();
        generate(&sample_report(), &mut out).unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "name,version,github:stars,pypi:avg_downloads_per_day,pypi:downloads_last_month");
        assert_eq!(lines[1], "a,1.0,7,,");
        assert_eq!(lines[2], "b,2.0,,2.0,60");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_empty_report() {
        let parsed = parse_str("");
        let report = aggregate(&parsed, &[], Utc::now());

        let mut out = String::new();
        generate(&report, &mut out).unwrap();
        assert_eq!(out, "name,version\n");
    }
}
