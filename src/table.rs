//! Result table formatting.
//!
//! Each save call materializes one [`ResultTable`] as a list of tab-separated
//! lines. Rendering is a pure function of the table, the cage roster and a few
//! experiment constants ([`TableContext`]); the facade appends the lines to
//! the target file.
//!
//! Every data row starts with the cage's subject ID. Inactive cages produce no
//! row at all, so the column count of a row depends only on its own fields.
//!
//! | Table | Header | Version marker | Provenance | Rows |
//! |---|---|---|---|---|
//! | `Hourly` | - | - | - | one per active cage |
//! | `Total` | schema + date/time columns | optional | optional | one per active cage, with start stamp |
//! | `SingleTotal` | schema | optional | optional | exactly one, first cage's subject ID |
//! | `Bin` | `ID`, `bin1..binN` | optional | - | one per active cage |
//! | `Respective` | `TrialName`, `<label>1..<label>N` | optional | - | one per active cage |

use crate::error::{ResultsError, ResultsResult};
use crate::paths::OutputArea;
use crate::roster::CageRoster;
use crate::stamp::CaptureStamp;
use std::collections::VecDeque;
use std::fmt::{Display, Write as _};
use std::path::Path;

/// Columns appended to the total-result header for the start stamp.
pub const TOTAL_STAMP_COLUMNS: &str = "ExperimentDate(MMDDYY)\tExperimentTime(HH:MM:SS)";

/// Software identification written into version marker lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Crate version
    pub software: String,
    /// Imaging engine tag
    pub engine: String,
}

impl VersionInfo {
    /// Version info for this build and `engine`.
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            software: env!("CARGO_PKG_VERSION").to_string(),
            engine: engine.into(),
        }
    }

    /// `#Online, <software>, <engine>` or `#Offline, ...`
    pub fn marker(&self, area: OutputArea) -> String {
        format!("#{}, {}, {}", area.label(), self.software, self.engine)
    }
}

/// Optional leading sections of a total-result file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preamble {
    /// Header row
    pub header: bool,
    /// Version marker line
    pub version: bool,
    /// Provenance block
    pub provenance: bool,
}

impl Preamble {
    /// Header, version marker and provenance block.
    pub fn full() -> Self {
        Self {
            header: true,
            version: true,
            provenance: true,
        }
    }

    /// Data rows only.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Header of a respective-result table: `TrialName`, `<label>1` .. `<label><count>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespectiveHeader<'a> {
    /// Column label prefix
    pub label: &'a str,
    /// Number of columns after `TrialName`
    pub count: usize,
}

/// One table to be written by a single save call.
#[derive(Debug, Clone, Copy)]
pub enum ResultTable<'a> {
    /// Per-hour values, appended to a caller-chosen file. Cells are written
    /// with [`decimal_cell`].
    Hourly {
        /// Target file
        path: &'a Path,
        /// One row of values per cage
        rows: &'a [Vec<f64>],
    },
    /// Totals for every cage with its start stamp.
    Total {
        /// One row per cage
        rows: &'a [Vec<String>],
        /// One start stamp per cage
        stamps: &'a [CaptureStamp],
        /// Leading sections to write
        preamble: Preamble,
    },
    /// Totals of a single-subject (batch) analysis.
    SingleTotal {
        /// Fields after the subject ID
        row: &'a [String],
        /// Leading sections to write
        preamble: Preamble,
    },
    /// One column per bin.
    Bin {
        /// File name without extension
        name: &'a str,
        /// One row per cage
        rows: &'a [Vec<String>],
        /// Write the header row
        header: bool,
        /// Prefix header columns with `bin`
        bin_labels: bool,
        /// Write the version marker
        version: bool,
    },
    /// Free-form per-trial results.
    Respective {
        /// File name without extension
        name: &'a str,
        /// One row per cage
        rows: &'a [Vec<String>],
        /// Header row, if any
        header: Option<RespectiveHeader<'a>>,
        /// Write the version marker
        version: bool,
    },
}

/// Everything besides the table itself that rendering depends on.
#[derive(Debug, Clone, Copy)]
pub struct TableContext<'a> {
    /// Active cages and subject IDs
    pub roster: &'a CageRoster,
    /// Area named in the version marker
    pub area: OutputArea,
    /// Software identification
    pub version: &'a VersionInfo,
    /// Leading columns of the total-result header
    pub total_header: &'a [String],
    /// Columns in the bin-result header
    pub bin_count: usize,
    /// Pre-built provenance lines; only used when the preamble asks for them.
    pub provenance: &'a [String],
}

impl ResultTable<'_> {
    /// Short name for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResultTable::Hourly { .. } => "hourly",
            ResultTable::Total { .. } => "total",
            ResultTable::SingleTotal { .. } => "single-total",
            ResultTable::Bin { .. } => "bin",
            ResultTable::Respective { .. } => "respective",
        }
    }

    /// Whether rendering includes the provenance block.
    pub fn wants_provenance(&self) -> bool {
        match self {
            ResultTable::Total { preamble, .. } | ResultTable::SingleTotal { preamble, .. } => {
                preamble.provenance
            }
            _ => false,
        }
    }

    /// Render all lines of the table, preamble first.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a per-cage argument does not have one
    /// entry per cage, or when subject IDs have not been set.
    pub fn render(&self, ctx: &TableContext<'_>) -> ResultsResult<Vec<String>> {
        let mut lines = Vec::new();
        match *self {
            ResultTable::Hourly { rows, .. } => {
                ctx.roster.expect_per_cage("hourly result row", rows.len())?;
                for (cage, id) in ctx.roster.active_subjects()? {
                    lines.push(data_row(id, rows[cage].iter().map(|&v| decimal_cell(v))));
                }
            }
            ResultTable::Total {
                rows,
                stamps,
                preamble,
            } => {
                ctx.roster.expect_per_cage("total result row", rows.len())?;
                ctx.roster.expect_per_cage("start stamp", stamps.len())?;
                if preamble.header {
                    lines.push(format!(
                        "{}\t{}",
                        ctx.total_header.join("\t"),
                        TOTAL_STAMP_COLUMNS
                    ));
                }
                push_preamble_tail(&mut lines, ctx, preamble);
                for (cage, id) in ctx.roster.active_subjects()? {
                    let stamp = &stamps[cage];
                    let fields = rows[cage]
                        .iter()
                        .cloned()
                        .chain([stamp.date_field(), stamp.time_field()]);
                    lines.push(data_row(id, fields));
                }
            }
            ResultTable::SingleTotal { row, preamble } => {
                let id = ctx.roster.subject_id(0)?;
                if preamble.header {
                    lines.push(ctx.total_header.join("\t"));
                }
                push_preamble_tail(&mut lines, ctx, preamble);
                lines.push(data_row(id, row.iter()));
            }
            ResultTable::Bin {
                rows,
                header,
                bin_labels,
                version,
                ..
            } => {
                ctx.roster.expect_per_cage("bin result row", rows.len())?;
                if header {
                    lines.push(bin_header(ctx.bin_count, bin_labels));
                }
                if version {
                    lines.push(ctx.version.marker(ctx.area));
                }
                push_cage_rows(&mut lines, ctx.roster, |cage| rows[cage].iter())?;
            }
            ResultTable::Respective {
                rows,
                header,
                version,
                ..
            } => {
                ctx.roster.expect_per_cage("respective result row", rows.len())?;
                if let Some(header) = header {
                    lines.push(respective_header(header));
                }
                if version {
                    lines.push(ctx.version.marker(ctx.area));
                }
                push_cage_rows(&mut lines, ctx.roster, |cage| rows[cage].iter())?;
            }
        }
        Ok(lines)
    }
}

fn push_preamble_tail(lines: &mut Vec<String>, ctx: &TableContext<'_>, preamble: Preamble) {
    if preamble.version {
        lines.push(ctx.version.marker(ctx.area));
    }
    if preamble.provenance {
        lines.extend(ctx.provenance.iter().cloned());
    }
}

fn push_cage_rows<'r, I, T>(
    lines: &mut Vec<String>,
    roster: &CageRoster,
    fields: impl Fn(usize) -> I,
) -> ResultsResult<()>
where
    I: Iterator<Item = &'r T>,
    T: Display + 'r,
{
    for (cage, id) in roster.active_subjects()? {
        lines.push(data_row(id, fields(cage)));
    }
    Ok(())
}

/// `<id>\t<f1>\t<f2>...`
pub fn data_row<T: Display>(id: &str, fields: impl IntoIterator<Item = T>) -> String {
    let mut line = String::from(id);
    for field in fields {
        // Writing to a String cannot fail.
        let _ = write!(line, "\t{field}");
    }
    line
}

/// Decimal text for a numeric cell, in the form earlier result files use.
///
/// There is always at least one fractional digit (`1.0`, `0.0`). Magnitudes below
/// `1e-3` or from `1e7` up are written in `E` notation (`1.2345678E7`, `5.0E-4`).
/// Otherwise the shortest digits that read back to the same value are used.
pub fn decimal_cell(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let magnitude = value.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        let text = value.to_string();
        return if text.contains('.') { text } else { text + ".0" };
    }

    let text = format!("{value:e}");
    match text.split_once('e') {
        Some((mantissa, exponent)) if mantissa.contains('.') => format!("{mantissa}E{exponent}"),
        Some((mantissa, exponent)) => format!("{mantissa}.0E{exponent}"),
        None => text,
    }
}

/// `ID\tbin1\tbin2...`, or `ID\t1\t2...` without labels.
pub fn bin_header(bin_count: usize, bin_labels: bool) -> String {
    let prefix = if bin_labels { "bin" } else { "" };
    data_row("ID", (1..=bin_count).map(|bin| format!("{prefix}{bin}")))
}

/// `TrialName\t<label>1\t<label>2...`
pub fn respective_header(header: RespectiveHeader<'_>) -> String {
    data_row(
        "TrialName",
        (1..=header.count).map(|i| format!("{}{}", header.label, i)),
    )
}

/// Queue of trial results to be split into per-cage respective rows.
///
/// Taking rows consumes the queue front to back; once it is empty every
/// further row is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RespectiveQueue {
    items: VecDeque<String>,
}

impl RespectiveQueue {
    /// Queue holding `items` in order.
    pub fn new(items: impl IntoIterator<Item = String>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    /// Items left.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is drained.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove and return up to `n` items from the front.
    pub fn take_row(&mut self, n: usize) -> Vec<String> {
        let n = n.min(self.items.len());
        self.items.drain(..n).collect()
    }

    /// One row per cage: `per_row` items for each active cage in cage order,
    /// an empty row for each inactive cage.
    pub fn rows_for(&mut self, roster: &CageRoster, per_row: usize) -> Vec<Vec<String>> {
        (0..roster.cage_count())
            .map(|cage| {
                if roster.is_active(cage) {
                    self.take_row(per_row)
                } else {
                    Vec::new()
                }
            })
            .collect()
    }
}

impl Extend<String> for RespectiveQueue {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

/// Check a row count against the roster without rendering. Used by callers that
/// build rows incrementally.
pub fn check_rows<T>(roster: &CageRoster, what: &str, rows: &[T]) -> ResultsResult<()> {
    if rows.len() != roster.cage_count() {
        return Err(ResultsError::cardinality(what, roster.cage_count(), rows.len()));
    }
    Ok(())
}
