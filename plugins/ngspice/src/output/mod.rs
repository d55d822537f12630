//! Parser for the simulator's batch-mode console report.
//!
//! The report is line-oriented: a `Circuit:` line names the circuit, and
//! each result table opens with a line repeating that name, followed by a
//! fixed-offset header block (analysis title and date, dashed separator,
//! column names, dashed separator) and tab-separated data rows. Long runs
//! are paginated mid-table, repeating the dashed header block after a form
//! feed; those repetitions belong to the same table and must be absorbed,
//! not parsed as new tables.

use std::path::Path;

use chrono::NaiveDateTime;
use thiserror::Error;

use wavescope::simulation::{AnalysisKind, DataSeries, Datum, SeriesError, SimulationData};


const CIRCUIT_MARKER: &str = "Circuit: ";
const ERROR_PREFIX: &str = "Error";
/// asctime layout of the date printed beside the analysis title.
const DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no `Circuit:` marker found in simulator output")]
    MissingCircuit,

    #[error("simulator output contains no data tables")]
    NoData,

    #[error("simulator reported an error: {0}")]
    SimulatorError(String),

    #[error("unsupported analysis `{0}`")]
    UnsupportedAnalysis(String),

    #[error("table at line {0} is truncated")]
    TruncatedTable(usize),

    #[error("expected a dashed separator at line {0}")]
    MissingSeparator(usize),

    #[error("row at line {line} has {found} fields, expected {expected}")]
    RaggedRow {
        line: usize,
        found: usize,
        expected: usize,
    },

    #[error("cannot parse analysis timestamp `{0}`")]
    BadTimestamp(String),

    #[error("expected exactly one sweep column, found {0}")]
    SweepColumns(usize),

    #[error(transparent)]
    Series(#[from] SeriesError),
}

impl From<OutputError> for wavescope::error::WavescopeError {
    fn from(value: OutputError) -> Self {
        wavescope::error::ErrorSource::Other(Box::new(value)).into()
    }
}

/// Parses a batch-mode report into a single [`SimulationData`].
///
/// The analysis kind of the first table fixes the kind of the whole record;
/// later tables of the same kind contribute their dependent columns (the
/// continuation of a paged or repeated run), and tables of a different kind
/// are skipped with a warning.
pub fn parse(raw: &str) -> Result<SimulationData, OutputError> {
    let mut cursor = Lines::new(raw);
    let mut circuit_name: Option<String> = None;
    let mut data: Option<SimulationData> = None;

    while let Some(line) = cursor.peek() {
        let stripped = line.trim();

        if let Some(name) = stripped.strip_prefix(CIRCUIT_MARKER) {
            circuit_name = Some(name.to_string());
            cursor.advance(1);
            continue;
        }
        if stripped.starts_with(ERROR_PREFIX) {
            return Err(OutputError::SimulatorError(stripped.to_string()));
        }
        if let Some(name) = &circuit_name {
            if !name.is_empty() && stripped.starts_with(name.as_str()) {
                let table = parse_table(&mut cursor)?;
                merge(&mut data, table, name)?;
                continue;
            }
        }
        cursor.advance(1);
    }

    match data {
        Some(data) => Ok(data),
        None => match circuit_name {
            Some(_) => Err(OutputError::NoData),
            None => Err(OutputError::MissingCircuit),
        },
    }
}

/// Reads and parses the report file a simulator run left behind.
pub fn parse_file(path: impl AsRef<Path>) -> wavescope::error::Result<SimulationData> {
    let raw = wavescope::io::read_to_string(path)?;
    Ok(parse(&raw)?)
}

/// Bounds-checked cursor over the report's lines.
struct Lines<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.split('\n').collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a str> {
        self.lines.get(self.pos + offset).copied()
    }

    fn next(&mut self) -> Option<&'a str> {
        let line = self.peek();
        if line.is_some() {
            self.pos += 1;
        }
        line
    }

    fn advance(&mut self, count: usize) {
        self.pos = (self.pos + count).min(self.lines.len());
    }

    /// 1-based number of the current line, for error reporting.
    fn line_number(&self) -> usize {
        self.pos + 1
    }
}

fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c == '-')
}

fn is_page_break(line: &str) -> bool {
    line.starts_with('\x0c') || line.trim().is_empty()
}

struct Table {
    label: String,
    kind: Option<AnalysisKind>,
    timestamp: NaiveDateTime,
    series: Vec<DataSeries>,
}

/// Parses one table; the cursor sits on the line repeating the circuit name.
fn parse_table(cursor: &mut Lines) -> Result<Table, OutputError> {
    cursor.next();

    let analysis_line = cursor
        .next()
        .ok_or_else(|| OutputError::TruncatedTable(cursor.line_number()))?;
    let (label, timestamp) = parse_analysis_header(analysis_line)?;
    let kind = AnalysisKind::from_label(&label);

    expect_separator(cursor)?;
    let header_line = cursor
        .next()
        .ok_or_else(|| OutputError::TruncatedTable(cursor.line_number()))?;
    let headers: Vec<&str> = header_line.split_whitespace().collect();
    expect_separator(cursor)?;

    let mut columns: Vec<Vec<Datum>> = vec![Vec::new(); headers.len()];
    loop {
        let line = match cursor.peek() {
            Some(line) => line,
            None => break,
        };
        if is_page_break(line) {
            let after_form_feed = line.starts_with('\x0c');
            cursor.advance(1);
            if !absorb_page_header(cursor, &headers, after_form_feed) {
                break;
            }
            continue;
        }

        let row_number = cursor.line_number();
        let fields: Vec<&str> = line
            .split('\t')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .collect();
        if fields.len() != headers.len() {
            return Err(OutputError::RaggedRow {
                line: row_number,
                found: fields.len(),
                expected: headers.len(),
            });
        }
        for (column, field) in columns.iter_mut().zip(&fields) {
            column.push(Datum::from_token(field));
        }
        cursor.advance(1);
    }

    // The Index column is bookkeeping, not data.
    let series = headers
        .iter()
        .zip(columns)
        .filter(|(name, _)| **name != "Index")
        .map(|(name, column)| DataSeries::new(*name, column))
        .collect();

    Ok(Table {
        label,
        kind,
        timestamp,
        series,
    })
}

fn expect_separator(cursor: &mut Lines) -> Result<(), OutputError> {
    let number = cursor.line_number();
    match cursor.next() {
        Some(line) if is_separator(line) => Ok(()),
        _ => Err(OutputError::MissingSeparator(number)),
    }
}

/// Absorbs the header block the pager repeats after a page break.
///
/// After a form feed the simulator reprints the page banner (circuit title
/// and analysis line) before the dashed header block; after a plain blank
/// line only a dashed block can continue the table. Consumes nothing and
/// returns `false` when the table has in fact ended.
fn absorb_page_header(cursor: &mut Lines, headers: &[&str], after_form_feed: bool) -> bool {
    let mut offset = 0;

    if after_form_feed {
        while offset < 2 {
            match cursor.peek_at(offset) {
                Some(line) if !is_separator(line) && !line.trim().is_empty() => offset += 1,
                _ => break,
            }
        }
    }

    match cursor.peek_at(offset) {
        Some(line) if is_separator(line) => offset += 1,
        _ => return false,
    }

    if let Some(line) = cursor.peek_at(offset) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens == headers {
            offset += 1;
            if matches!(cursor.peek_at(offset), Some(line) if is_separator(line)) {
                offset += 1;
            }
        } else if is_separator(line) {
            offset += 1;
        }
    }

    cursor.advance(offset);
    true
}

/// Splits `"<analysis title>  <date>"` at its first double space.
fn parse_analysis_header(line: &str) -> Result<(String, NaiveDateTime), OutputError> {
    let trimmed = line.trim();
    let split = trimmed
        .find("  ")
        .ok_or_else(|| OutputError::BadTimestamp(trimmed.to_string()))?;
    let label = trimmed[..split].to_string();
    let raw_date = trimmed[split..].trim();

    // Single-digit days are space-padded; collapse before parsing.
    let collapsed = raw_date.split_whitespace().collect::<Vec<_>>().join(" ");
    let timestamp = NaiveDateTime::parse_from_str(&collapsed, DATE_FORMAT)
        .map_err(|_| OutputError::BadTimestamp(raw_date.to_string()))?;
    Ok((label, timestamp))
}

fn merge(
    data: &mut Option<SimulationData>,
    table: Table,
    circuit_name: &str,
) -> Result<(), OutputError> {
    match data {
        None => {
            let kind = match table.kind {
                Some(kind) => kind,
                None => return Err(OutputError::UnsupportedAnalysis(table.label)),
            };
            let sweeps = table.series.iter().filter(|s| s.is_independent()).count();
            if sweeps != 1 {
                return Err(OutputError::SweepColumns(sweeps));
            }
            *data = Some(SimulationData {
                circuit_name: circuit_name.to_string(),
                analysis: kind,
                analysis_label: table.label,
                timestamp: table.timestamp,
                series: table.series,
            });
        }
        Some(existing) => {
            if table.kind != Some(existing.analysis) {
                log::warn!(
                    "ignoring `{}` table: this output already holds a `{}` analysis",
                    table.label,
                    existing.analysis_label
                );
                return Ok(());
            }
            for series in table.series {
                if series.is_independent() {
                    continue;
                }
                match existing
                    .series
                    .iter_mut()
                    .find(|s| s.name() == series.name())
                {
                    Some(target) => target.extend(series)?,
                    None => log::warn!(
                        "dropping series `{}` absent from the first `{}` table",
                        series.name(),
                        existing.analysis_label
                    ),
                }
            }
        }
    }
    Ok(())
}
