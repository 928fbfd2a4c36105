use super::ooxml::{self, XmlEvent};
use quick_xml::events::BytesStart;
use super::{DocumentFormat, ExtractionError};
use crate::models::{DocumentBlock, ExtractedContent};
use std::path::Path;

const DOCUMENT_PART: &str = "word/document.xml";

// Depths in the ancestor stack: document(0) > body(1) > p | tbl(2) > tr(3) > tc(4) > p(5)
const BODY_DEPTH: usize = 1;
const BODY_CHILD_DEPTH: usize = 2;
const CELL_DEPTH: usize = 4;
const CELL_PARAGRAPH_DEPTH: usize = 5;
const CELL_PROPERTY_DEPTH: usize = 6;

/// Upper bound on `gridSpan`; Word itself allows 63 grid columns.
const MAX_GRID_SPAN: usize = 64;

/// Body-level paragraphs and tables of a `.docx`.
///
/// Non-blank paragraphs come first, tagged with their ordinal among all
/// body paragraphs; tables follow, indexed past the paragraph count.
pub fn extract(path: &Path) -> Result<ExtractedContent, ExtractionError> {
    let mut package = ooxml::open_package(path, DocumentFormat::WordProcessing)?;
    let reader = ooxml::part_reader(&mut package, DOCUMENT_PART)?;

    let mut body = BodyCollector::default();
    ooxml::walk(reader, DOCUMENT_PART, |event, stack| {
        body.visit(event, stack);
        Ok(())
    })?;

    Ok(ExtractedContent::WordProcessing(body.into_blocks()))
}

#[derive(Default)]
struct BodyCollector {
    paragraphs: Vec<(usize, String)>,
    paragraph_count: usize,
    tables: Vec<Vec<Vec<String>>>,

    paragraph: String,
    rows: Vec<Vec<String>>,
    cells: Vec<String>,
    cell_paragraphs: Vec<String>,
    cell_span: usize,
    cell_continues_merge: bool,
}

impl BodyCollector {
    fn visit(&mut self, event: XmlEvent<'_>, stack: &[Vec<u8>]) {
        match event {
            XmlEvent::Text(text) if is_last(stack, b"t") => {
                if let Some(target) = self.run_target(stack) {
                    target.push_str(&text);
                }
            }
            XmlEvent::Empty(e) if is_last(stack, b"r") => {
                let replacement = match e.local_name().as_ref() {
                    b"tab" => "\t",
                    b"br" | b"cr" => "\n",
                    _ => return,
                };
                if let Some(target) = self.run_target(stack) {
                    target.push_str(replacement);
                }
            }
            XmlEvent::Start(e) => self.open(&e, stack, false),
            XmlEvent::Empty(e) => self.open(&e, stack, true),
            XmlEvent::End(name) => self.close(name, stack),
            _ => {}
        }
    }

    fn open(&mut self, e: &BytesStart<'_>, stack: &[Vec<u8>], empty: bool) {
        let in_body_table = ooxml::innermost_is(stack, b"tbl", BODY_CHILD_DEPTH) && in_body(stack);
        match (e.local_name().as_ref(), stack.len()) {
            (b"p", BODY_CHILD_DEPTH) if is_last(stack, b"body") => {
                if empty {
                    self.paragraph_count += 1;
                } else {
                    self.paragraph.clear();
                }
            }
            (b"tbl", BODY_CHILD_DEPTH) if is_last(stack, b"body") => self.rows.clear(),
            (b"tc", CELL_DEPTH) if in_body_table => {
                self.cell_span = 1;
                self.cell_continues_merge = false;
            }
            (b"p", CELL_PARAGRAPH_DEPTH) if is_last(stack, b"tc") && in_body_table => {
                self.cell_paragraphs.push(String::new());
            }
            (b"gridSpan", CELL_PROPERTY_DEPTH) if is_last(stack, b"tcPr") && in_body_table => {
                self.cell_span = ooxml::attr(e, b"val")
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(1)
                    .clamp(1, MAX_GRID_SPAN);
            }
            // A bare `vMerge` continues the merge started above; `restart` opens one.
            (b"vMerge", CELL_PROPERTY_DEPTH) if is_last(stack, b"tcPr") && in_body_table => {
                self.cell_continues_merge = ooxml::attr(e, b"val").as_deref() != Some("restart");
            }
            _ => {}
        }
    }

    /// Buffer receiving run text at this position, if it belongs to a
    /// body paragraph or a paragraph directly inside a body table cell.
    fn run_target(&mut self, stack: &[Vec<u8>]) -> Option<&mut String> {
        if ooxml::innermost_is(stack, b"p", BODY_CHILD_DEPTH) && in_body(stack) {
            Some(&mut self.paragraph)
        } else if ooxml::innermost_is(stack, b"p", CELL_PARAGRAPH_DEPTH)
            && ooxml::innermost_is(stack, b"tbl", BODY_CHILD_DEPTH)
            && in_body(stack)
        {
            self.cell_paragraphs.last_mut()
        } else {
            None
        }
    }

    fn close(&mut self, name: &[u8], stack: &[Vec<u8>]) {
        let in_body_table = ooxml::innermost_is(stack, b"tbl", BODY_CHILD_DEPTH) && in_body(stack);
        match (name, stack.len()) {
            (b"p", BODY_CHILD_DEPTH) if in_body(stack) => {
                let text = std::mem::take(&mut self.paragraph);
                if !text.trim().is_empty() {
                    self.paragraphs.push((self.paragraph_count, text));
                }
                self.paragraph_count += 1;
            }
            (b"tbl", BODY_CHILD_DEPTH) if in_body(stack) => {
                self.tables.push(std::mem::take(&mut self.rows));
            }
            (b"tr", 3) if in_body_table => {
                self.rows.push(std::mem::take(&mut self.cells));
            }
            (b"tc", CELL_DEPTH) if in_body_table => {
                let mut text = std::mem::take(&mut self.cell_paragraphs).join("\n");
                if std::mem::take(&mut self.cell_continues_merge)
                    && let Some(above) = self.rows.last().and_then(|row| row.get(self.cells.len()))
                {
                    text = above.clone();
                }
                let span = std::mem::take(&mut self.cell_span).max(1);
                self.cells.extend(std::iter::repeat_n(text, span));
            }
            _ => {}
        }
    }

    fn into_blocks(self) -> Vec<DocumentBlock> {
        let offset = self.paragraph_count;
        let paragraphs = self
            .paragraphs
            .into_iter()
            .map(|(index, text)| DocumentBlock::Paragraph { text, index });
        let tables = self
            .tables
            .into_iter()
            .enumerate()
            .map(|(i, data)| DocumentBlock::Table {
                data,
                index: i + offset,
            });
        paragraphs.chain(tables).collect()
    }
}

fn is_last(stack: &[Vec<u8>], name: &[u8]) -> bool {
    stack.last().map(Vec::as_slice) == Some(name)
}

fn in_body(stack: &[Vec<u8>]) -> bool {
    stack.get(BODY_DEPTH).map(Vec::as_slice) == Some(&b"body"[..])
}
