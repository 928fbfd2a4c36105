//! Plumbing shared by the Office Open XML extractors: opening the zip
//! package, resolving relationships and walking part XML with the
//! ancestor stack at hand.

use super::{DocumentFormat, ExtractionError};
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek};
use std::path::Path;
use zip::ZipArchive;
use zip::read::ZipFile;

/// Compound File Binary signature used by pre-2007 Office documents
const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const LEGACY_MIME_TYPES: [&str; 3] = [
    "application/msword",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
];

pub type Package = ZipArchive<File>;

/// Opens `path` as an OOXML package, rejecting legacy binary documents up front.
pub fn open_package(path: &Path, format: DocumentFormat) -> Result<Package, ExtractionError> {
    let io_err = |source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    let mut header = Vec::with_capacity(8192);
    file.by_ref()
        .take(8192)
        .read_to_end(&mut header)
        .map_err(io_err)?;

    let legacy_kind = infer::get(&header)
        .map(|kind| LEGACY_MIME_TYPES.contains(&kind.mime_type()))
        .unwrap_or(false);
    if legacy_kind || header.starts_with(&CFB_SIGNATURE) {
        return Err(ExtractionError::LegacyFormat {
            format: format.label(),
            modern_extension: format.extensions()[0],
        });
    }

    file.rewind().map_err(io_err)?;
    Ok(ZipArchive::new(file)?)
}

/// Streams a required part of the package.
pub fn part_reader<'a>(
    package: &'a mut Package,
    name: &str,
) -> Result<Reader<BufReader<ZipFile<'a>>>, ExtractionError> {
    match package.by_name(name) {
        Ok(file) => Ok(Reader::from_reader(BufReader::new(file))),
        Err(zip::result::ZipError::FileNotFound) => {
            Err(ExtractionError::MissingPart(name.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn has_part(package: &mut Package, name: &str) -> bool {
    package.by_name(name).is_ok()
}

/// Relationship id → absolute part name, for the `.rels` part belonging to `owner`.
///
/// `owner` is a part name such as `xl/workbook.xml`; targets are resolved
/// against its directory.
pub fn relationships(
    package: &mut Package,
    owner: &str,
) -> Result<HashMap<String, String>, ExtractionError> {
    let (dir, file_name) = match owner.rsplit_once('/') {
        Some((dir, file_name)) => (dir, file_name),
        None => ("", owner),
    };
    let rels_name = if dir.is_empty() {
        format!("_rels/{file_name}.rels")
    } else {
        format!("{dir}/_rels/{file_name}.rels")
    };

    let mut targets = HashMap::new();
    if !has_part(package, &rels_name) {
        return Ok(targets);
    }

    let reader = part_reader(package, &rels_name)?;
    walk(reader, &rels_name, |event, _| {
        if let XmlEvent::Start(e) | XmlEvent::Empty(e) = event
            && e.local_name().as_ref() == b"Relationship"
            && attr(&e, b"TargetMode").as_deref() != Some("External")
            && let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target"))
        {
            targets.insert(id, resolve_target(dir, &target));
        }
        Ok(())
    })?;
    Ok(targets)
}

/// Joins a relationship target onto the owning part's directory.
pub fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize(absolute.split('/'));
    }
    normalize(base_dir.split('/').chain(target.split('/')))
}

fn normalize<'a>(segments: impl Iterator<Item = &'a str>) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in segments {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

/// One step of a part walk. `Start`/`Empty` carry the element, `End` its local name.
pub enum XmlEvent<'a> {
    Start(BytesStart<'a>),
    Empty(BytesStart<'a>),
    End(&'a [u8]),
    Text(Cow<'a, str>),
}

/// Drives `reader` to the end, handing each event to `visit` together with
/// the local names of the enclosing elements (outermost first).
///
/// For `Start`/`Empty`/`End` the stack holds the element's ancestors; for
/// `Text` it ends with the element containing the text. Entity and character
/// references arrive as `Text`.
pub fn walk<R, F>(mut reader: Reader<R>, part: &str, mut visit: F) -> Result<(), ExtractionError>
where
    R: BufRead,
    F: FnMut(XmlEvent<'_>, &[Vec<u8>]) -> Result<(), ExtractionError>,
{
    let xml_err = |e: quick_xml::Error| ExtractionError::Xml {
        part: part.to_string(),
        message: e.to_string(),
    };

    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                visit(XmlEvent::Start(e), &stack)?;
                stack.push(name);
            }
            Event::Empty(e) => visit(XmlEvent::Empty(e), &stack)?,
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                visit(XmlEvent::End(&name), &stack)?;
            }
            Event::Text(e) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                visit(XmlEvent::Text(Cow::Owned(text)), &stack)?;
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                visit(XmlEvent::Text(Cow::Owned(text)), &stack)?;
            }
            Event::GeneralRef(r) => {
                let resolved = match r.resolve_char_ref().map_err(xml_err)? {
                    Some(c) => Some(c.to_string()),
                    None => {
                        let name = r.decode().map_err(|e| ExtractionError::Xml {
                            part: part.to_string(),
                            message: e.to_string(),
                        })?;
                        resolve_predefined_entity(&name).map(str::to_string)
                    }
                };
                if let Some(text) = resolved {
                    visit(XmlEvent::Text(Cow::Owned(text)), &stack)?;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

/// Unescaped value of the attribute whose local name is `local`.
pub fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .map(|a| attribute_value(&a))
}

/// The prefixed `r:id` attribute, kept apart from a plain `id`.
pub fn relationship_id(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id")
        .map(|a| attribute_value(&a))
}

/// Whether the innermost element named `name` in `stack` sits at `depth`.
pub fn innermost_is(stack: &[Vec<u8>], name: &[u8], depth: usize) -> bool {
    stack.iter().rposition(|n| n.as_slice() == name) == Some(depth)
}

/// Attribute value with entity and character references resolved; the raw
/// text is kept when it does not unescape.
fn attribute_value(a: &Attribute<'_>) -> String {
    let raw = String::from_utf8_lossy(&a.value);
    match unescape(&raw) {
        Ok(value) => value.into_owned(),
        Err(_) => raw.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_target() {
        assert_eq!(
            resolve_target("xl", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("ppt/slides", "../media/image1.png"),
            "ppt/media/image1.png"
        );
        assert_eq!(
            resolve_target("xl", "/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
    }

    #[test]
    fn test_attr_resolves_references() {
        let xml = r#"<sheet name="Q&amp;A &#x42;" r:id="rId&#55;" id="9"/>"#;
        let mut reader = Reader::from_reader(xml.as_bytes());
        let mut buf = Vec::new();
        let Ok(Event::Empty(e)) = reader.read_event_into(&mut buf) else {
            panic!("expected an empty element");
        };

        assert_eq!(attr(&e, b"name").as_deref(), Some("Q&A B"));
        assert_eq!(relationship_id(&e).as_deref(), Some("rId7"));
        assert_eq!(attr(&e, b"missing"), None);
    }

    #[test]
    fn test_walk_tracks_ancestors_and_references() {
        let xml = r#"<root><a x="1"><b>Tom &amp; Jerry &#33;</b><c/></a></root>"#;
        let reader = Reader::from_reader(xml.as_bytes());
        let mut texts = Vec::new();
        let mut empties = Vec::new();

        walk(reader, "test.xml", |event, stack| {
            match event {
                XmlEvent::Text(t) => {
                    assert_eq!(stack.last().map(Vec::as_slice), Some(&b"b"[..]));
                    texts.push(t.into_owned());
                }
                XmlEvent::Empty(e) => {
                    empties.push((e.local_name().as_ref().to_vec(), stack.len()));
                }
                _ => {}
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(texts.concat(), "Tom & Jerry !");
        assert_eq!(empties, vec![(b"c".to_vec(), 2)]);
    }

    #[test]
    fn test_innermost_is() {
        let stack: Vec<Vec<u8>> = vec![b"body".to_vec(), b"p".to_vec(), b"r".to_vec()];
        assert!(innermost_is(&stack, b"p", 1));
        assert!(!innermost_is(&stack, b"p", 0));
        assert!(!innermost_is(&stack, b"tbl", 0));
    }
}
