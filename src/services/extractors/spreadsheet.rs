use super::ooxml::{self, Package, XmlEvent};
use super::{DocumentFormat, ExtractionError};
use crate::models::ExtractedContent;
use chrono::{SecondsFormat, Utc};
use quick_xml::events::BytesStart;
use serde_json::{Map, Number, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const DEFAULT_SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Excel's column limit (`XFD`)
pub const MAX_COLUMNS: usize = 16_384;

/// Failure detail reported when every sheet of a workbook is empty
pub const NO_DATA_MESSAGE: &str = "No valid data found in Excel";

pub const SOURCE_SHEET_COLUMN: &str = "source_sheet";
pub const PROCESSED_AT_COLUMN: &str = "processed_at";

/// Reads every worksheet as header row + records, dropping empty sheets.
pub fn extract(path: &Path) -> Result<ExtractedContent, ExtractionError> {
    let mut package = ooxml::open_package(path, DocumentFormat::Tabular)?;
    let workbook_rels = ooxml::relationships(&mut package, WORKBOOK_PART)?;
    let sheets = read_sheet_list(&mut package, &workbook_rels)?;

    let shared_part = workbook_rels
        .values()
        .find(|target| target.ends_with("sharedStrings.xml"))
        .cloned()
        .unwrap_or_else(|| DEFAULT_SHARED_STRINGS_PART.to_string());
    let shared_strings = read_shared_strings(&mut package, &shared_part)?;

    let mut tables = Vec::new();
    for (name, part) in sheets {
        let rows = read_rows(&mut package, &part, &shared_strings)?;
        let table = SheetTable::from_rows(name, rows);
        if table.records.is_empty() {
            tracing::debug!("Skipping empty sheet '{}'", table.name);
            continue;
        }
        tables.push(table);
    }

    if tables.is_empty() {
        return Err(ExtractionError::NoUsableContent(NO_DATA_MESSAGE.to_string()));
    }

    let processed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    Ok(ExtractedContent::Tabular(combine(tables, &processed_at)))
}

/// Sheet names paired with their part names, in workbook order.
fn read_sheet_list(
    package: &mut Package,
    rels: &HashMap<String, String>,
) -> Result<Vec<(String, String)>, ExtractionError> {
    let mut declared = Vec::new();
    let reader = ooxml::part_reader(package, WORKBOOK_PART)?;
    ooxml::walk(reader, WORKBOOK_PART, |event, stack| {
        if let XmlEvent::Start(e) | XmlEvent::Empty(e) = event
            && e.local_name().as_ref() == b"sheet"
            && stack.last().map(Vec::as_slice) == Some(&b"sheets"[..])
        {
            let name = ooxml::attr(&e, b"name").unwrap_or_default();
            declared.push((name, ooxml::relationship_id(&e)));
        }
        Ok(())
    })?;

    declared
        .into_iter()
        .map(|(name, rel_id)| {
            let part = rel_id
                .as_ref()
                .and_then(|id| rels.get(id))
                .cloned()
                .ok_or_else(|| {
                    ExtractionError::MissingPart(format!("worksheet for sheet '{name}'"))
                })?;
            Ok::<_, ExtractionError>((name, part))
        })
        .collect()
}

fn read_shared_strings(
    package: &mut Package,
    part: &str,
) -> Result<Vec<String>, ExtractionError> {
    let mut strings = Vec::new();
    if !ooxml::has_part(package, part) {
        return Ok(strings);
    }

    let mut current = String::new();
    let reader = ooxml::part_reader(package, part)?;
    ooxml::walk(reader, part, |event, stack| {
        match event {
            XmlEvent::Text(text)
                if stack.last().map(Vec::as_slice) == Some(&b"t"[..])
                    && stack.iter().any(|n| n.as_slice() == b"si")
                    && !stack.iter().any(|n| n.as_slice() == b"rPh") =>
            {
                current.push_str(&text);
            }
            XmlEvent::End(name) if name == b"si" => strings.push(std::mem::take(&mut current)),
            XmlEvent::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            _ => {}
        }
        Ok(())
    })?;
    Ok(strings)
}

/// Cell values per non-empty row, as (column index, value) pairs.
type Row = Vec<(usize, Value)>;

#[derive(Default)]
struct CellState {
    column: usize,
    kind: Option<String>,
    raw: String,
    has_value: bool,
}

fn read_rows(
    package: &mut Package,
    part: &str,
    shared_strings: &[String],
) -> Result<Vec<Row>, ExtractionError> {
    let mut rows = Vec::new();
    let mut current: Row = Vec::new();
    let mut next_column = 0usize;
    let mut cell = CellState::default();

    let reader = ooxml::part_reader(package, part)?;
    ooxml::walk(reader, part, |event, stack| {
        match event {
            XmlEvent::Start(e) if e.local_name().as_ref() == b"row" => {
                current.clear();
                next_column = 0;
            }
            XmlEvent::Start(e) if e.local_name().as_ref() == b"c" => {
                let column = cell_column(&e, next_column, part)?;
                next_column = column + 1;
                cell = CellState {
                    column,
                    kind: ooxml::attr(&e, b"t"),
                    ..CellState::default()
                };
            }
            XmlEvent::Empty(e) if e.local_name().as_ref() == b"c" => {
                next_column = cell_column(&e, next_column, part)? + 1;
            }
            XmlEvent::Text(text)
                if stack.iter().any(|n| n.as_slice() == b"c")
                    && matches!(stack.last().map(Vec::as_slice), Some(b"v") | Some(b"t")) =>
            {
                cell.raw.push_str(&text);
                cell.has_value = true;
            }
            XmlEvent::Empty(e)
                if matches!(e.local_name().as_ref(), b"v" | b"t")
                    && stack.iter().any(|n| n.as_slice() == b"c") =>
            {
                cell.has_value = true;
            }
            XmlEvent::End(name) if name == b"c" => {
                let finished = std::mem::take(&mut cell);
                if finished.has_value
                    && let Some(value) = cell_value(&finished, shared_strings)
                {
                    current.push((finished.column, value));
                }
            }
            XmlEvent::End(name) if name == b"row" => {
                if !current.is_empty() {
                    rows.push(std::mem::take(&mut current));
                }
            }
            _ => {}
        }
        Ok(())
    })?;
    Ok(rows)
}

fn cell_value(cell: &CellState, shared_strings: &[String]) -> Option<Value> {
    let value = match cell.kind.as_deref() {
        Some("s") => {
            let index: usize = cell.raw.trim().parse().ok()?;
            Value::String(shared_strings.get(index)?.clone())
        }
        Some("b") => Value::Bool(cell.raw.trim() == "1"),
        Some("str") | Some("inlineStr") | Some("e") | Some("d") => {
            Value::String(cell.raw.clone())
        }
        _ => number_value(&cell.raw),
    };

    match &value {
        Value::String(s) if s.is_empty() => None,
        _ => Some(value),
    }
}

fn number_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    match trimmed.parse::<f64>() {
        Ok(float) if float.fract() == 0.0 && float.abs() < 9.0e15 => Value::from(float as i64),
        Ok(float) => Number::from_f64(float)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Err(_) => Value::String(raw.to_string()),
    }
}

/// Zero-based column index of a cell reference such as `B7` or `AA10`.
///
/// `None` when the reference has no column letters or lies past `XFD`.
pub fn column_index(reference: &str) -> Option<usize> {
    let letters = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| (b.to_ascii_uppercase() - b'A') as usize + 1);

    let mut number = 0usize;
    let mut seen = false;
    for digit in letters {
        number = number.checked_mul(26)?.checked_add(digit)?;
        if number > MAX_COLUMNS {
            return None;
        }
        seen = true;
    }
    seen.then(|| number - 1)
}

/// Column of a `c` element: its `r` reference, or the slot after the
/// previous cell when the reference is absent.
fn cell_column(
    e: &BytesStart<'_>,
    next_column: usize,
    part: &str,
) -> Result<usize, ExtractionError> {
    let reference = ooxml::attr(e, b"r");
    let column = match reference.as_deref() {
        Some(r) if r.starts_with(|c: char| c.is_ascii_alphabetic()) => column_index(r),
        _ => Some(next_column),
    };
    column
        .filter(|c| *c < MAX_COLUMNS)
        .ok_or_else(|| ExtractionError::Xml {
            part: part.to_string(),
            message: format!(
                "cell {} lies beyond the last column (XFD)",
                reference.as_deref().unwrap_or("without reference")
            ),
        })
}

/// A sheet after applying the header row.
struct SheetTable {
    name: String,
    columns: Vec<String>,
    records: Vec<Vec<Value>>,
}

impl SheetTable {
    fn from_rows(name: String, rows: Vec<Row>) -> Self {
        let width = rows
            .iter()
            .flat_map(|row| row.iter().map(|(col, _)| col + 1))
            .max()
            .unwrap_or(0);

        let mut rows = rows.into_iter();
        let header = rows.next().unwrap_or_default();
        let columns = header_names(&header, width);

        let records = rows
            .map(|row| {
                let mut values = vec![Value::Null; width];
                for (col, value) in row {
                    values[col] = value;
                }
                values
            })
            .collect();

        Self {
            name,
            columns,
            records,
        }
    }
}

/// Column labels from the header row: blanks become `Unnamed: <i>`,
/// repeats get `.1`, `.2`, … suffixes.
fn header_names(header: &Row, width: usize) -> Vec<String> {
    let mut labels: Vec<Option<String>> = vec![None; width];
    for (col, value) in header {
        let label = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        if !label.trim().is_empty() {
            labels[*col] = Some(label);
        }
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    labels
        .into_iter()
        .enumerate()
        .map(|(i, label)| {
            let base = label.unwrap_or_else(|| format!("Unnamed: {i}"));
            let mut name = base.clone();
            while seen.contains(&name) {
                let count = counts.entry(base.clone()).or_insert(0);
                *count += 1;
                name = format!("{base}.{count}");
            }
            seen.insert(name.clone());
            name
        })
        .collect()
}

/// Concatenates sheets into one record list over the union of their columns.
fn combine(tables: Vec<SheetTable>, processed_at: &str) -> Vec<Map<String, Value>> {
    let mut union: Vec<String> = Vec::new();
    let mut known: HashSet<String> = HashSet::new();
    let tail = [SOURCE_SHEET_COLUMN.to_string()];
    for table in &tables {
        for column in table.columns.iter().chain(tail.iter()) {
            if known.insert(column.clone()) {
                union.push(column.clone());
            }
        }
    }
    if known.insert(PROCESSED_AT_COLUMN.to_string()) {
        union.push(PROCESSED_AT_COLUMN.to_string());
    }

    let mut records = Vec::new();
    for table in tables {
        for values in table.records {
            let mut record: Map<String, Value> = union
                .iter()
                .map(|column| (column.clone(), Value::Null))
                .collect();
            for (column, value) in table.columns.iter().zip(values) {
                record.insert(column.clone(), value);
            }
            record.insert(
                SOURCE_SHEET_COLUMN.to_string(),
                Value::String(table.name.clone()),
            );
            record.insert(
                PROCESSED_AT_COLUMN.to_string(),
                Value::String(processed_at.to_string()),
            );
            records.push(record);
        }
    }
    records
}
