//! Tabular query engine (C11, §4.11): answers queries directly against
//! pipe-delimited blinded documents via structured extraction, so the
//! LLM is handed a pre-computed answer to phrase rather than raw rows to
//! parse itself.

use crate::chunker::{is_tabular, TABULAR_SEPARATOR};
use blinder_core::PSEUDONYM_PATTERN;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static PSEUDONYM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(PSEUDONYM_PATTERN).unwrap());

static COUNT_PATTERNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(how many|count|total number|number of)\b").unwrap());
static AVG_PATTERNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(average|mean|avg)\b").unwrap());
static SUM_PATTERNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(sum|total)\b").unwrap());
static EXTREMA_MAX_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(oldest|highest|maximum|max|most|largest|biggest|top)\b").unwrap()
});
static EXTREMA_MIN_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(youngest|lowest|minimum|min|least|smallest|bottom)\b").unwrap()
});
static COMPARE_PATTERNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(compare|difference between|versus|vs)\b").unwrap());
static FILTER_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(list all|show all|list everyone|show everyone|all .+ (with|in|from|over|under|above|below))\b",
    )
    .unwrap()
});
static NUMERIC_COLUMN_HINTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(age|salary|income|amount|balance|score|rating|count|total|price|cost|",
        r"weight|height|years?|months?|days?|number|quantity|rate|percentage|zip)\b",
    ))
    .unwrap()
});
static OVER_THRESHOLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(over|above|greater than|more than|>)\s*(\d+(?:\.\d+)?)").unwrap()
});
static UNDER_THRESHOLD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(under|below|less than|fewer than|<)\s*(\d+(?:\.\d+)?)").unwrap());

const MAX_FILTER_ROWS: usize = 20;

/// Parsed pipe-delimited blinded document.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularData {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularData {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

/// Result of a structured tabular query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub success: bool,
    pub context: String,
    pub query_type: String,
}

fn result(success: bool, context: String, query_type: &str) -> QueryResult {
    QueryResult {
        success,
        context,
        query_type: query_type.to_string(),
    }
}

/// Parse pipe-delimited blinded text into structured form. Rows are
/// padded or trimmed to the header's column count.
pub fn parse_tabular(text: &str) -> Option<TabularData> {
    let non_empty: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if non_empty.len() < 2 {
        return None;
    }

    let header: Vec<String> = non_empty[0]
        .split(TABULAR_SEPARATOR)
        .map(|c| c.trim().to_string())
        .collect();

    let rows = non_empty[1..]
        .iter()
        .map(|line| {
            let mut cells: Vec<String> = line.split(TABULAR_SEPARATOR).map(|c| c.trim().to_string()).collect();
            cells.resize(header.len(), String::new());
            cells.truncate(header.len());
            cells
        })
        .collect();

    Some(TabularData { header, rows })
}

/// Attempt to answer `blinded_query` via structured extraction over
/// `blinded_documents`. Returns `None` if no tabular document exists or
/// the query can't be handled structurally - the caller should fall back
/// to hybrid retrieval in that case (§4.11).
pub fn try_tabular_query(blinded_query: &str, blinded_documents: &[String]) -> Option<QueryResult> {
    let tables: Vec<TabularData> = blinded_documents
        .iter()
        .filter(|doc| is_tabular(doc))
        .filter_map(|doc| parse_tabular(doc))
        .filter(|t| t.num_rows() > 0)
        .collect();

    if tables.is_empty() {
        return None;
    }

    let pseudonyms: HashSet<String> = PSEUDONYM_RE
        .find_iter(blinded_query)
        .map(|m| m.as_str().to_string())
        .collect();

    if COMPARE_PATTERNS.is_match(blinded_query) && pseudonyms.len() >= 2 {
        return Some(handle_comparison(&tables, &pseudonyms));
    }

    if !pseudonyms.is_empty() {
        if pseudonyms.len() == 1 {
            let only = pseudonyms.iter().next().unwrap();
            return Some(handle_point_lookup(&tables, only));
        }
        return Some(handle_multi_lookup(&tables, &pseudonyms));
    }

    if COUNT_PATTERNS.is_match(blinded_query) {
        return Some(handle_count(blinded_query, &tables));
    }
    if AVG_PATTERNS.is_match(blinded_query) {
        return handle_average(blinded_query, &tables);
    }
    // "total number of ..." is a count, not a sum; the regex crate has no
    // negative lookahead, so the disambiguation is a plain substring check
    // rather than `(?!...)`.
    if SUM_PATTERNS.is_match(blinded_query) && !blinded_query.to_lowercase().contains("total number") {
        return handle_sum(blinded_query, &tables);
    }
    if EXTREMA_MAX_PATTERNS.is_match(blinded_query) {
        return handle_extrema(blinded_query, &tables, true);
    }
    if EXTREMA_MIN_PATTERNS.is_match(blinded_query) {
        return handle_extrema(blinded_query, &tables, false);
    }
    if FILTER_PATTERNS.is_match(blinded_query) {
        return handle_filter(blinded_query, &tables);
    }
    if PSEUDONYM_RE.is_match(blinded_query) {
        return Some(handle_reverse_lookup(blinded_query, &tables));
    }

    None
}

fn find_rows_with_value<'a>(tables: &'a [TabularData], value: &str) -> Vec<(&'a TabularData, &'a Vec<String>)> {
    tables
        .iter()
        .flat_map(|table| {
            table
                .rows
                .iter()
                .filter(move |row| row.iter().any(|cell| cell.contains(value)))
                .map(move |row| (table, row))
        })
        .collect()
}

fn format_row(header: &[String], row: &[String]) -> String {
    header
        .iter()
        .zip(row)
        .filter(|(_, val)| !val.trim().is_empty())
        .map(|(col, val)| format!("  - {col}: {val}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn find_column(header: &[String], query: &str) -> Option<usize> {
    let query_lower = query.to_lowercase();
    header.iter().position(|col| query_lower.contains(&col.to_lowercase()))
}

fn find_numeric_column(header: &[String], query: &str) -> Option<usize> {
    find_column(header, query).or_else(|| header.iter().position(|col| NUMERIC_COLUMN_HINTS.is_match(col)))
}

fn parse_numeric_cell(cell: &str) -> Option<f64> {
    cell.replace(',', "").replace('$', "").trim().parse().ok()
}

fn numeric_values<'a>(table: &'a TabularData, col_idx: usize) -> Vec<(f64, &'a Vec<String>)> {
    table
        .rows
        .iter()
        .filter_map(|row| row.get(col_idx).and_then(|c| parse_numeric_cell(c)).map(|v| (v, row)))
        .collect()
}

fn handle_point_lookup(tables: &[TabularData], pseudonym: &str) -> QueryResult {
    let matches = find_rows_with_value(tables, pseudonym);
    if matches.is_empty() {
        return result(
            false,
            format!("No data found for {pseudonym} in the documents."),
            "point_lookup",
        );
    }
    let context = matches
        .iter()
        .map(|(table, row)| format!("Data for {pseudonym}:\n{}", format_row(&table.header, row)))
        .collect::<Vec<_>>()
        .join("\n\n");
    result(true, context, "point_lookup")
}

fn handle_multi_lookup(tables: &[TabularData], pseudonyms: &HashSet<String>) -> QueryResult {
    let mut sorted: Vec<&String> = pseudonyms.iter().collect();
    sorted.sort();
    let parts: Vec<String> = sorted
        .into_iter()
        .map(|pseudo| {
            let matches = find_rows_with_value(tables, pseudo);
            if matches.is_empty() {
                format!("No data found for {pseudo}.")
            } else {
                matches
                    .iter()
                    .map(|(table, row)| format!("Data for {pseudo}:\n{}", format_row(&table.header, row)))
                    .collect::<Vec<_>>()
                    .join("\n\n")
            }
        })
        .collect();
    result(true, parts.join("\n\n"), "multi_lookup")
}

fn handle_comparison(tables: &[TabularData], pseudonyms: &HashSet<String>) -> QueryResult {
    let mut sorted: Vec<&String> = pseudonyms.iter().collect();
    sorted.sort();
    let mut parts = vec!["Comparison:".to_string()];
    for pseudo in sorted {
        let matches = find_rows_with_value(tables, pseudo);
        if let Some((table, row)) = matches.first() {
            parts.push(format!("\n{pseudo}:\n{}", format_row(&table.header, row)));
        } else {
            parts.push(format!("\n{pseudo}: No data found."));
        }
    }
    result(true, parts.join("\n"), "comparison")
}

fn handle_reverse_lookup(query: &str, tables: &[TabularData]) -> QueryResult {
    let parts: Vec<String> = PSEUDONYM_RE
        .find_iter(query)
        .flat_map(|m| {
            let full = m.as_str().to_string();
            find_rows_with_value(tables, &full)
                .into_iter()
                .map(move |(table, row)| format!("Row containing {full}:\n{}", format_row(&table.header, row)))
        })
        .collect();

    if parts.is_empty() {
        return result(false, "No matching rows found.".to_string(), "reverse_lookup");
    }
    result(true, parts.join("\n\n"), "reverse_lookup")
}

fn handle_count(query: &str, tables: &[TabularData]) -> QueryResult {
    let Some(table) = tables.first() else {
        return result(false, "No tabular data to count.".to_string(), "count");
    };

    let Some(col_idx) = find_numeric_column(&table.header, query) else {
        return result(
            true,
            format!("Total rows in the dataset: {}", table.num_rows()),
            "count",
        );
    };

    let col_name = &table.header[col_idx];
    let values = numeric_values(table, col_idx);

    if let Some(caps) = OVER_THRESHOLD.captures(query) {
        let threshold: f64 = caps[2].parse().unwrap();
        let count = values.iter().filter(|(v, _)| *v > threshold).count();
        return result(
            true,
            format!(
                "ANALYSIS METHOD: Scanned {} rows in the dataset. Parsed the '{col_name}' column as \
numeric values across {} valid rows (non-numeric entries excluded). Applied filter: {col_name} > {threshold}.\n\n\
RESULT: {count} out of {} rows have {col_name} greater than {threshold}.",
                table.num_rows(), values.len(), values.len()
            ),
            "count",
        );
    }
    if let Some(caps) = UNDER_THRESHOLD.captures(query) {
        let threshold: f64 = caps[2].parse().unwrap();
        let count = values.iter().filter(|(v, _)| *v < threshold).count();
        return result(
            true,
            format!(
                "ANALYSIS METHOD: Scanned {} rows in the dataset. Parsed the '{col_name}' column as \
numeric values across {} valid rows (non-numeric entries excluded). Applied filter: {col_name} < {threshold}.\n\n\
RESULT: {count} out of {} rows have {col_name} less than {threshold}.",
                table.num_rows(), values.len(), values.len()
            ),
            "count",
        );
    }

    result(
        true,
        format!(
            "ANALYSIS METHOD: Scanned {} rows in the dataset. Counted rows with valid '{col_name}' data.\n\n\
RESULT: {} rows have valid {col_name} data (out of {} total rows).",
            table.num_rows(), values.len(), table.num_rows()
        ),
        "count",
    )
}

fn handle_average(query: &str, tables: &[TabularData]) -> Option<QueryResult> {
    for table in tables {
        let Some(col_idx) = find_numeric_column(&table.header, query) else { continue };
        let values = numeric_values(table, col_idx);
        if values.is_empty() {
            continue;
        }
        let col_name = &table.header[col_idx];
        let nums: Vec<f64> = values.iter().map(|(v, _)| *v).collect();
        let avg = nums.iter().sum::<f64>() / nums.len() as f64;
        let min = nums.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = nums.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        return Some(result(
            true,
            format!(
                "ANALYSIS METHOD: Extracted numeric values from the '{col_name}' column across {} valid rows \
(out of {} total). Computed the arithmetic mean: sum of all values / count.\n\n\
RESULT: Average {col_name} = {avg:.2} (min: {min:.2}, max: {max:.2}, computed from {} rows).",
                nums.len(), table.num_rows(), nums.len()
            ),
            "average",
        ));
    }
    Some(result(
        false,
        "Could not find a numeric column to average.".to_string(),
        "average",
    ))
}

fn handle_sum(query: &str, tables: &[TabularData]) -> Option<QueryResult> {
    for table in tables {
        let Some(col_idx) = find_numeric_column(&table.header, query) else { continue };
        let values = numeric_values(table, col_idx);
        if values.is_empty() {
            continue;
        }
        let col_name = &table.header[col_idx];
        let total: f64 = values.iter().map(|(v, _)| *v).sum();
        return Some(result(
            true,
            format!(
                "ANALYSIS METHOD: Extracted numeric values from the '{col_name}' column across {} valid rows \
(out of {} total). Summed all values.\n\n\
RESULT: Sum of {col_name} = {total:.2} (from {} rows).",
                values.len(), table.num_rows(), values.len()
            ),
            "sum",
        ));
    }
    Some(result(false, "Could not find a numeric column to sum.".to_string(), "sum"))
}

fn handle_extrema(query: &str, tables: &[TabularData], max: bool) -> Option<QueryResult> {
    for table in tables {
        let Some(col_idx) = find_numeric_column(&table.header, query) else { continue };
        let values = numeric_values(table, col_idx);
        if values.is_empty() {
            continue;
        }
        let col_name = &table.header[col_idx];
        let (best_val, best_row) = if max {
            values
                .into_iter()
                .fold(None, |acc: Option<(f64, &Vec<String>)>, (v, r)| match acc {
                    Some((bv, _)) if bv >= v => acc,
                    _ => Some((v, r)),
                })
                .unwrap()
        } else {
            values
                .into_iter()
                .fold(None, |acc: Option<(f64, &Vec<String>)>, (v, r)| match acc {
                    Some((bv, _)) if bv <= v => acc,
                    _ => Some((v, r)),
                })
                .unwrap()
        };
        let label = if max { "highest" } else { "lowest" };
        return Some(result(
            true,
            format!(
                "ANALYSIS METHOD: Extracted numeric values from the '{col_name}' column across valid rows \
(out of {} total). Sorted by {col_name} to find the {label} value.\n\n\
RESULT: Row with {label} {col_name} ({best_val}):\n{}",
                table.num_rows(),
                format_row(&table.header, best_row)
            ),
            "extrema",
        ));
    }
    Some(result(false, "Could not find a numeric column.".to_string(), "extrema"))
}

fn handle_filter(query: &str, tables: &[TabularData]) -> Option<QueryResult> {
    for table in tables {
        let Some(col_idx) = find_numeric_column(&table.header, query) else { continue };
        let col_name = &table.header[col_idx];
        let values = numeric_values(table, col_idx);

        let matches: Vec<(f64, &Vec<String>)> = if let Some(caps) = OVER_THRESHOLD.captures(query) {
            let threshold: f64 = caps[2].parse().unwrap();
            values.into_iter().filter(|(v, _)| *v > threshold).collect()
        } else if let Some(caps) = UNDER_THRESHOLD.captures(query) {
            let threshold: f64 = caps[2].parse().unwrap();
            values.into_iter().filter(|(v, _)| *v < threshold).collect()
        } else {
            continue;
        };

        if matches.is_empty() {
            return Some(result(
                true,
                format!("No rows found matching the filter on {col_name}."),
                "filter",
            ));
        }

        let display: Vec<&(f64, &Vec<String>)> = matches.iter().take(MAX_FILTER_ROWS).collect();
        let mut parts = vec![format!(
            "ANALYSIS METHOD: Scanned {} rows in the dataset. Parsed the '{col_name}' column as numeric \
values. Applied filter to find matching rows.\n\nRESULT: Found {} rows matching filter on {col_name}:",
            table.num_rows(),
            matches.len()
        )];
        for (_, row) in display {
            parts.push(format_row(&table.header, row));
            parts.push(String::new());
        }
        if matches.len() > MAX_FILTER_ROWS {
            parts.push(format!("... and {} more rows.", matches.len() - MAX_FILTER_ROWS));
        }
        return Some(result(true, parts.join("\n"), "filter"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> String {
        "Name | Age | City\n[PERSON_1] | 30 | NYC\n[PERSON_2] | 45 | LA\n[PERSON_3] | 60 | SF".to_string()
    }

    #[test]
    fn parses_pipe_delimited_table() {
        let parsed = parse_tabular(&sample_table()).unwrap();
        assert_eq!(parsed.header, vec!["Name", "Age", "City"]);
        assert_eq!(parsed.num_rows(), 3);
    }

    #[test]
    fn point_lookup_finds_single_entity_row() {
        let docs = vec![sample_table()];
        let out = try_tabular_query("What is [PERSON_1]'s age?", &docs).unwrap();
        assert_eq!(out.query_type, "point_lookup");
        assert!(out.context.contains("Age: 30"));
    }

    #[test]
    fn comparison_dispatches_before_multi_lookup() {
        let docs = vec![sample_table()];
        let out = try_tabular_query("Compare [PERSON_1] and [PERSON_2]", &docs).unwrap();
        assert_eq!(out.query_type, "comparison");
    }

    #[test]
    fn multi_lookup_for_non_compare_multi_pseudonym_query() {
        let docs = vec![sample_table()];
        let out = try_tabular_query("Tell me about [PERSON_1] and [PERSON_2]", &docs).unwrap();
        assert_eq!(out.query_type, "multi_lookup");
    }

    #[test]
    fn count_with_threshold() {
        let docs = vec![sample_table()];
        let out = try_tabular_query("How many people are over 40?", &docs).unwrap();
        assert_eq!(out.query_type, "count");
        assert!(out.context.contains("2 out of 3"));
    }

    #[test]
    fn average_of_numeric_column() {
        let docs = vec![sample_table()];
        let out = try_tabular_query("What is the average age?", &docs).unwrap();
        assert_eq!(out.query_type, "average");
        assert!(out.context.contains("45.00"));
    }

    #[test]
    fn extrema_finds_oldest_row() {
        let docs = vec![sample_table()];
        let out = try_tabular_query("Who is the oldest?", &docs).unwrap();
        assert_eq!(out.query_type, "extrema");
        assert!(out.context.contains("[PERSON_3]"));
    }

    #[test]
    fn filter_caps_at_twenty_rows() {
        let mut text = String::from("Name | Age | City");
        for i in 0..30 {
            text.push_str(&format!("\n[PERSON_{i}] | {} | City{i}", 70 + i));
        }
        let docs = vec![text];
        let out = try_tabular_query("list everyone over 60", &docs).unwrap();
        assert_eq!(out.query_type, "filter");
        assert!(out.context.contains("more rows"));
    }

    #[test]
    fn reverse_lookup_for_non_entity_pseudonym() {
        let text = "Address | Tenant\n[ADDRESS_1] | [PERSON_1]";
        let docs = vec![text.to_string()];
        let out = try_tabular_query("Who lives at [ADDRESS_1]?", &docs).unwrap();
        assert_eq!(out.query_type, "reverse_lookup");
    }

    #[test]
    fn returns_none_for_non_tabular_documents() {
        let docs = vec!["Just a prose paragraph with no pipes at all.".to_string()];
        assert!(try_tabular_query("How many people?", &docs).is_none());
    }
}
