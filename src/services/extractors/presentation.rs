use super::ooxml::{self, Package, XmlEvent};
use super::{DocumentFormat, ExtractionError};
use crate::models::{ExtractedContent, SlideContent, SlideElement};
use std::path::Path;

const PRESENTATION_PART: &str = "ppt/presentation.xml";

// sld(0) > cSld(1) > spTree(2) > shape(3)
const SHAPE_DEPTH: usize = 3;
// sp(3) > txBody(4) > p(5)
const SHAPE_PARAGRAPH_DEPTH: usize = 5;
// graphicFrame(3) > graphic(4) > graphicData(5) > tbl(6) > tr(7) > tc(8) > txBody(9) > p(10)
const TABLE_DEPTH: usize = 6;
const ROW_DEPTH: usize = 7;
const CELL_DEPTH: usize = 8;
const CELL_PARAGRAPH_DEPTH: usize = 10;

/// What `a:br` contributes to paragraph text
const LINE_BREAK: char = '\u{b}';

/// Text paragraphs and tables of each slide's top-level shapes.
///
/// Slide numbers follow deck order starting at 1; slides with nothing to
/// report are left out without renumbering the rest.
pub fn extract(path: &Path) -> Result<ExtractedContent, ExtractionError> {
    let mut package = ooxml::open_package(path, DocumentFormat::Presentation)?;
    let slide_parts = read_slide_list(&mut package)?;

    let mut slides = Vec::new();
    for (i, part) in slide_parts.iter().enumerate() {
        let elements = read_slide(&mut package, part)?;
        if elements.is_empty() {
            tracing::debug!("Slide {} has no text or tables", i + 1);
            continue;
        }
        slides.push(SlideContent {
            slide_number: i + 1,
            elements,
        });
    }

    Ok(ExtractedContent::Presentation(slides))
}

fn read_slide_list(package: &mut Package) -> Result<Vec<String>, ExtractionError> {
    let rels = ooxml::relationships(package, PRESENTATION_PART)?;

    let mut rel_ids = Vec::new();
    let reader = ooxml::part_reader(package, PRESENTATION_PART)?;
    ooxml::walk(reader, PRESENTATION_PART, |event, stack| {
        if let XmlEvent::Start(e) | XmlEvent::Empty(e) = event
            && e.local_name().as_ref() == b"sldId"
            && is_last(stack, b"sldIdLst")
        {
            rel_ids.push(ooxml::relationship_id(&e));
        }
        Ok(())
    })?;

    rel_ids
        .into_iter()
        .enumerate()
        .map(|(i, rel_id)| {
            rel_id
                .and_then(|id| rels.get(&id).cloned())
                .ok_or_else(|| ExtractionError::MissingPart(format!("slide {}", i + 1)))
        })
        .collect()
}

fn read_slide(package: &mut Package, part: &str) -> Result<Vec<SlideElement>, ExtractionError> {
    let reader = ooxml::part_reader(package, part)?;
    let mut slide = SlideCollector::default();
    ooxml::walk(reader, part, |event, stack| {
        slide.visit(event, stack);
        Ok(())
    })?;
    Ok(slide.elements)
}

#[derive(Default)]
struct SlideCollector {
    elements: Vec<SlideElement>,

    paragraph: String,
    rows: Vec<Vec<String>>,
    cells: Vec<String>,
    cell_paragraphs: Vec<String>,
}

impl SlideCollector {
    fn visit(&mut self, event: XmlEvent<'_>, stack: &[Vec<u8>]) {
        match event {
            XmlEvent::Text(text) if is_last(stack, b"t") => {
                if let Some(target) = self.text_target(stack) {
                    target.push_str(&text);
                }
            }
            // Soft line breaks read as a vertical tab, keeping `\n` for paragraph joins.
            XmlEvent::Start(e) | XmlEvent::Empty(e) if e.local_name().as_ref() == b"br" => {
                if let Some(target) = self.text_target(stack) {
                    target.push(LINE_BREAK);
                }
            }
            XmlEvent::Start(e) | XmlEvent::Empty(e) => self.open(e.local_name().as_ref(), stack),
            XmlEvent::End(name) => self.close(name, stack),
            _ => {}
        }
    }

    fn open(&mut self, name: &[u8], stack: &[Vec<u8>]) {
        match (name, stack.len()) {
            (b"p", SHAPE_PARAGRAPH_DEPTH) if in_text_shape(stack) => self.paragraph.clear(),
            (b"tbl", TABLE_DEPTH) if in_table_frame(stack) => self.rows.clear(),
            (b"p", CELL_PARAGRAPH_DEPTH) if in_table_frame(stack) && is_last(stack, b"txBody") => {
                self.cell_paragraphs.push(String::new());
            }
            _ => {}
        }
    }

    fn text_target(&mut self, stack: &[Vec<u8>]) -> Option<&mut String> {
        if in_text_shape(stack) && ooxml::innermost_is(stack, b"p", SHAPE_PARAGRAPH_DEPTH) {
            Some(&mut self.paragraph)
        } else if in_table_frame(stack)
            && ooxml::innermost_is(stack, b"p", CELL_PARAGRAPH_DEPTH)
        {
            self.cell_paragraphs.last_mut()
        } else {
            None
        }
    }

    fn close(&mut self, name: &[u8], stack: &[Vec<u8>]) {
        match (name, stack.len()) {
            (b"p", SHAPE_PARAGRAPH_DEPTH) if in_text_shape(stack) => {
                let text = std::mem::take(&mut self.paragraph);
                if !text.trim().is_empty() {
                    self.elements.push(SlideElement::Paragraph { text });
                }
            }
            (b"tbl", TABLE_DEPTH) if in_table_frame(stack) => {
                let data = std::mem::take(&mut self.rows);
                self.elements.push(SlideElement::Table { data });
            }
            (b"tr", ROW_DEPTH) if in_table_frame(stack) => {
                self.rows.push(std::mem::take(&mut self.cells));
            }
            (b"tc", CELL_DEPTH) if in_table_frame(stack) => {
                let text = std::mem::take(&mut self.cell_paragraphs).join("\n");
                self.cells.push(text);
            }
            _ => {}
        }
    }
}

fn is_last(stack: &[Vec<u8>], name: &[u8]) -> bool {
    stack.last().map(Vec::as_slice) == Some(name)
}

fn shape_kind(stack: &[Vec<u8>]) -> Option<&[u8]> {
    let top_level = stack.get(SHAPE_DEPTH - 1).map(Vec::as_slice) == Some(&b"spTree"[..])
        && stack.get(SHAPE_DEPTH - 2).map(Vec::as_slice) == Some(&b"cSld"[..]);
    if top_level {
        stack.get(SHAPE_DEPTH).map(Vec::as_slice)
    } else {
        None
    }
}

/// Inside the text body of a top-level `sp` shape.
fn in_text_shape(stack: &[Vec<u8>]) -> bool {
    shape_kind(stack) == Some(&b"sp"[..])
        && stack.get(SHAPE_DEPTH + 1).map(Vec::as_slice) == Some(&b"txBody"[..])
}

/// Inside the table of a top-level graphic frame.
fn in_table_frame(stack: &[Vec<u8>]) -> bool {
    shape_kind(stack) == Some(&b"graphicFrame"[..])
        && stack.get(TABLE_DEPTH - 1).map(Vec::as_slice) == Some(&b"graphicData"[..])
        && (stack.len() == TABLE_DEPTH || ooxml::innermost_is(stack, b"tbl", TABLE_DEPTH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::reader::Reader;

    fn collect(xml: &str) -> Vec<SlideElement> {
        let mut slide = SlideCollector::default();
        ooxml::walk(Reader::from_reader(xml.as_bytes()), "slide.xml", |event, stack| {
            slide.visit(event, stack);
            Ok(())
        })
        .unwrap();
        slide.elements
    }

    #[test]
    fn test_text_shapes_yield_non_blank_paragraphs() {
        let elements = collect(
            r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree>
                <p:nvGrpSpPr/>
                <p:sp><p:txBody><a:bodyPr/>
                  <a:p><a:r><a:t>Title</a:t></a:r></a:p>
                  <a:p><a:endParaRPr/></a:p>
                  <a:p><a:r><a:t>line one</a:t></a:r><a:br><a:rPr/></a:br><a:r><a:t>line two</a:t></a:r></a:p>
                </p:txBody></p:sp>
                <p:grpSp><p:sp><p:txBody><a:p><a:r><a:t>grouped</a:t></a:r></a:p></p:txBody></p:sp></p:grpSp>
            </p:spTree></p:cSld></p:sld>"#,
        );

        assert_eq!(
            elements,
            vec![
                SlideElement::Paragraph {
                    text: "Title".to_string()
                },
                SlideElement::Paragraph {
                    text: "line one\u{b}line two".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_table_frame_yields_cell_grid() {
        let elements = collect(
            r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree>
                <p:graphicFrame><a:graphic><a:graphicData><a:tbl>
                  <a:tblGrid/>
                  <a:tr>
                    <a:tc><a:txBody><a:p><a:r><a:t>h1</a:t></a:r></a:p></a:txBody></a:tc>
                    <a:tc><a:txBody><a:p><a:r><a:t>h2</a:t></a:r></a:p><a:p><a:r><a:t>more</a:t></a:r></a:p></a:txBody></a:tc>
                  </a:tr>
                  <a:tr>
                    <a:tc><a:txBody><a:p/></a:txBody></a:tc>
                    <a:tc><a:txBody><a:p><a:r><a:t>v</a:t></a:r></a:p></a:txBody></a:tc>
                  </a:tr>
                </a:tbl></a:graphicData></a:graphic></p:graphicFrame>
            </p:spTree></p:cSld></p:sld>"#,
        );

        assert_eq!(
            elements,
            vec![SlideElement::Table {
                data: vec![
                    vec!["h1".to_string(), "h2\nmore".to_string()],
                    vec![String::new(), "v".to_string()],
                ]
            }]
        );
    }
}
