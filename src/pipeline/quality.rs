//! Quality gate: decide whether the local partition is good enough to keep.
//!
//! Downstream consumers need complete tables, so one malformed or mostly
//! empty table condemns the whole local result. Rules, per table element:
//!
//! 1. At least one element must be a `Table`.
//! 2. Every table must carry HTML markup.
//! 3. Every table must have at least `min_rows` `<tr>` rows.
//! 4. If the table has `<td>` cells, the share of cells with no text after
//!    trimming must not exceed `max_empty_ratio`.
//!
//! The first failing rule, in element order, is reported. The gate is a
//! pure function of its inputs.

use crate::config::QualityThresholds;
use crate::element::ExtractionElement;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;

static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());

/// Outcome of the quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum QualityVerdict {
    Accepted,
    Rejected { reason: RejectReason },
}

impl QualityVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, QualityVerdict::Accepted)
    }
}

impl fmt::Display for QualityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityVerdict::Accepted => f.write_str("accepted"),
            QualityVerdict::Rejected { reason } => write!(f, "rejected: {}", reason),
        }
    }
}

/// Why a local result was rejected. `table` is the 0-based index among the
/// table elements only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    NoTables,
    MissingTableMarkup { table: usize },
    TooFewRows { table: usize, rows: usize },
    TooManyEmptyCells { table: usize, empty: usize, total: usize },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoTables => f.write_str("no table detected"),
            RejectReason::MissingTableMarkup { table } => {
                write!(f, "table {} has no HTML markup", table + 1)
            }
            RejectReason::TooFewRows { table, rows } => {
                write!(f, "table {} has only {} row(s)", table + 1, rows)
            }
            RejectReason::TooManyEmptyCells {
                table,
                empty,
                total,
            } => write!(f, "table {} has {}/{} empty cells", table + 1, empty, total),
        }
    }
}

/// Row and cell counts of one table's markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableShape {
    pub rows: usize,
    pub cells: usize,
    pub empty_cells: usize,
}

/// Parse table markup into row/cell counts.
///
/// Bare `<tr>`/`<td>` fragments are wrapped in `<table>` first; the HTML5
/// parser drops table-section tags found outside a table.
pub fn table_shape(html: &str) -> TableShape {
    let doc = if html.to_ascii_lowercase().contains("<table") {
        Html::parse_fragment(html)
    } else {
        Html::parse_fragment(&format!("<table>{html}</table>"))
    };
    let rows = doc.select(&ROW).count();

    let mut cells = 0;
    let mut empty_cells = 0;
    for cell in doc.select(&CELL) {
        cells += 1;
        if cell.text().all(|t| t.trim().is_empty()) {
            empty_cells += 1;
        }
    }

    TableShape {
        rows,
        cells,
        empty_cells,
    }
}

/// Run the gate over one image's elements.
pub fn evaluate(elements: &[ExtractionElement], thresholds: &QualityThresholds) -> QualityVerdict {
    let mut tables = elements.iter().filter(|el| el.is_table()).peekable();
    if tables.peek().is_none() {
        return QualityVerdict::Rejected {
            reason: RejectReason::NoTables,
        };
    }

    for (table, el) in tables.enumerate() {
        let html = match el.table_html.as_deref() {
            Some(h) if !h.is_empty() => h,
            _ => {
                return QualityVerdict::Rejected {
                    reason: RejectReason::MissingTableMarkup { table },
                }
            }
        };

        let shape = table_shape(html);
        if shape.rows < thresholds.min_rows {
            return QualityVerdict::Rejected {
                reason: RejectReason::TooFewRows {
                    table,
                    rows: shape.rows,
                },
            };
        }

        if shape.cells > 0 {
            let ratio = shape.empty_cells as f64 / shape.cells as f64;
            if ratio > thresholds.max_empty_ratio {
                return QualityVerdict::Rejected {
                    reason: RejectReason::TooManyEmptyCells {
                        table,
                        empty: shape.empty_cells,
                        total: shape.cells,
                    },
                };
            }
        }
    }

    QualityVerdict::Accepted
}
