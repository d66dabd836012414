//! Tabular export of zonal statistics.

use std::collections::BTreeSet;

use crate::stats::{StatValue, ZonalStats};

/// Render results as CSV.
///
/// The header is the sorted union of every result's keys. Missing and null
/// values are written as empty fields.
pub fn stats_to_csv(results: &[ZonalStats]) -> String {
    let header: BTreeSet<String> = results.iter().flat_map(ZonalStats::keys).collect();
    if header.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    push_row(&mut out, header.iter().cloned());
    for stats in results {
        push_row(
            &mut out,
            header.iter().map(|key| match stats.get(key) {
                None | Some(StatValue::Null) => String::new(),
                Some(value) => value.to_string(),
            }),
        );
    }
    out
}

fn push_row(out: &mut String, fields: impl Iterator<Item = String>) {
    let row: Vec<String> = fields.map(|f| quote(&f)).collect();
    out.push_str(&row.join(","));
    out.push('\n');
}

/// Quote a field containing a delimiter, quote or line break.
fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_sorted_union() {
        let mut a = ZonalStats::new();
        a.insert_stat("min", 1.0);
        a.insert_stat("count", 2i64);
        let mut b = ZonalStats::new();
        b.insert_stat("max", 4.5);
        b.insert_stat("min", StatValue::Null);

        let csv = stats_to_csv(&[a, b]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["count,max,min", "2,,1", ",4.5,"]);
    }

    #[test]
    fn test_labels_are_quoted() {
        let mut stats = ZonalStats::new();
        stats.insert_stat("forest, mixed", 3i64);
        assert_eq!(stats_to_csv(&[stats]), "\"forest, mixed\"\n3\n");
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(stats_to_csv(&[]), "");
    }
}
