//! Plain-text rendering for the console
//!
//! Aligned tables for query results and catalog listings. Widths are
//! measured in terminal columns, so CJK text lines up.

use crate::db::types::QueryResult;
use crate::optimizer::{PerformanceAnalysis, QueryOptimizationSuggestion};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Widest a column may grow before cells are truncated
const MAX_COL_WIDTH: usize = 40;
/// Rows sampled when sizing columns
const WIDTH_SAMPLE_ROWS: usize = 100;

/// Render a result as a table, showing at most `row_limit` rows
pub fn render_result(result: &QueryResult, row_limit: usize) -> String {
    let rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .take(row_limit)
        .map(|row| row.iter().map(|c| c.display_string(MAX_COL_WIDTH)).collect())
        .collect();

    let mut out = render_table(&result.columns, &rows);
    let shown = rows.len();
    if shown < result.row_count {
        out.push_str(&format!(
            "({} of {} rows shown, {})\n",
            shown, result.row_count, result.duration
        ));
    } else {
        let noun = if result.row_count == 1 { "row" } else { "rows" };
        out.push_str(&format!("({} {}, {})\n", result.row_count, noun, result.duration));
    }
    out
}

/// Render string cells under `headers`
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let widths = compute_column_widths(headers, rows);
    let mut out = String::new();

    push_line(&mut out, headers.iter().map(String::as_str), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("-+-"));
    out.push('\n');
    for row in rows {
        push_line(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

/// Suggestions as a numbered list, rewrites indented beneath
pub fn render_suggestions(suggestions: &[QueryOptimizationSuggestion]) -> String {
    if suggestions.is_empty() {
        return "No suggestions.\n".to_string();
    }
    let mut out = String::new();
    for (i, s) in suggestions.iter().enumerate() {
        let priority = format!("{:?}", s.priority).to_lowercase();
        out.push_str(&format!("{}. [{}] {}\n", i + 1, priority, s.description));
        out.push_str(&format!("   {}\n", s.details));
        if let Some(after) = &s.after {
            for line in after.lines() {
                out.push_str(&format!("   > {}\n", line));
            }
        }
    }
    out
}

/// Summary of an analysis: score, figures, bottlenecks, then advice
pub fn render_analysis(analysis: &PerformanceAnalysis) -> String {
    let mut out = format!(
        "Score {}/100  size {}  tables {}  indexes {}  slow statements {}\n",
        analysis.overall_score,
        analysis.database_size,
        analysis.table_count,
        analysis.index_count,
        analysis.slow_query_count
    );
    if !analysis.bottlenecks.is_empty() {
        out.push_str("\nBottlenecks:\n");
        for b in &analysis.bottlenecks {
            out.push_str(&format!("  - {}\n", b));
        }
    }
    if !analysis.recommendations.is_empty() {
        out.push_str("\nRecommendations:\n");
        out.push_str(&render_suggestions(&analysis.recommendations));
    }
    if !analysis.index_suggestions.is_empty() {
        out.push_str("\nIndexes:\n");
        for s in &analysis.index_suggestions {
            out.push_str(&format!("  {}  ({}, ~{})\n", s.create_statement, s.impact, s.estimated_size));
        }
    }
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, w)| pad(&truncate_to_width(cell, *w), *w))
        .collect();
    out.push_str(padded.join(" | ").trim_end());
    out.push('\n');
}

/// Column widths from headers and a sample of rows, capped
fn compute_column_widths(headers: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.width()).collect();

    for row in rows.iter().take(WIDTH_SAMPLE_ROWS) {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.width());
            }
        }
    }

    for w in &mut widths {
        *w = (*w).clamp(1, MAX_COL_WIDTH);
    }
    widths
}

fn pad(s: &str, width: usize) -> String {
    let fill = width.saturating_sub(s.width());
    format!("{}{}", s, " ".repeat(fill))
}

/// Cut `s` to at most `max` columns, marking the cut with `...`
fn truncate_to_width(s: &str, max: usize) -> String {
    // Line breaks would wreck the grid
    let s = s.replace(['\n', '\r'], " ");
    if s.width() <= max {
        return s;
    }
    let budget = max.saturating_sub(3);
    let mut used = 0;
    let mut out = String::new();
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    if max >= 3 {
        out.push_str("...");
    }
    out
}
