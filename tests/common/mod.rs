#![allow(dead_code)]

use rust_doc_converter::AppState;
use rust_doc_converter::config::ServiceConfig;
use rust_doc_converter::infrastructure::storage::setup_storage;
use rust_doc_converter::models::{TaskRecord, TaskStatus};
use rust_doc_converter::services::task_registry::TaskRegistry;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use zip::ZipWriter;
use zip::write::FileOptions;

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const PRES_NS: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const DRAWING_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

pub async fn test_state(root: &Path) -> AppState {
    let mut config = ServiceConfig::with_root(root);
    config.chunk_size = 64;
    setup_storage(&config).await.unwrap();
    AppState::new(config)
}

fn write_package(path: &Path, parts: &[(String, String)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, body) in parts {
        zip.start_file(name.as_str(), FileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn relationships(targets: &[(String, String)]) -> String {
    let mut xml = format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_REL_NS}">"#);
    for (id, target) in targets {
        xml.push_str(&format!(
            r#"<Relationship Id="{id}" Type="{REL_NS}/x" Target="{target}"/>"#
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

fn column_letter(i: usize) -> char {
    (b'A' + i as u8) as char
}

/// Writes a workbook; numeric-looking cells become numbers, other non-empty
/// cells shared strings, empty cells are left out.
pub fn write_xlsx(path: &Path, sheets: &[(&str, Vec<Vec<&str>>)]) {
    let mut shared: Vec<String> = Vec::new();
    let mut parts = Vec::new();
    let mut workbook = format!(r#"<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets>"#);
    let mut rels = Vec::new();

    for (n, (name, rows)) in sheets.iter().enumerate() {
        let id = n + 1;
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{id}" r:id="rId{id}"/>"#,
            escape(name)
        ));
        rels.push((format!("rId{id}"), format!("worksheets/sheet{id}.xml")));

        let mut sheet = format!(r#"<worksheet xmlns="{MAIN_NS}"><sheetData>"#);
        for (r, row) in rows.iter().enumerate() {
            sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let cell_ref = format!("{}{}", column_letter(c), r + 1);
                if value.parse::<f64>().is_ok() {
                    sheet.push_str(&format!(r#"<c r="{cell_ref}"><v>{value}</v></c>"#));
                } else {
                    shared.push(value.to_string());
                    sheet.push_str(&format!(
                        r#"<c r="{cell_ref}" t="s"><v>{}</v></c>"#,
                        shared.len() - 1
                    ));
                }
            }
            sheet.push_str("</row>");
        }
        sheet.push_str("</sheetData></worksheet>");
        parts.push((format!("xl/worksheets/sheet{id}.xml"), sheet));
    }
    workbook.push_str("</sheets></workbook>");

    rels.push(("rIdStrings".to_string(), "sharedStrings.xml".to_string()));
    let mut sst = format!(r#"<sst xmlns="{MAIN_NS}" count="{0}" uniqueCount="{0}">"#, shared.len());
    for s in &shared {
        sst.push_str(&format!("<si><t>{}</t></si>", escape(s)));
    }
    sst.push_str("</sst>");

    parts.push(("xl/workbook.xml".to_string(), workbook));
    parts.push(("xl/_rels/workbook.xml.rels".to_string(), relationships(&rels)));
    parts.push(("xl/sharedStrings.xml".to_string(), sst));
    write_package(path, &parts);
}

/// Single-sheet workbook whose `sheetData` is taken verbatim, with inline strings only.
pub fn write_xlsx_sheet_data(path: &Path, sheet_data: &str) {
    let workbook = format!(
        r#"<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#
    );
    let sheet = format!(r#"<worksheet xmlns="{MAIN_NS}"><sheetData>{sheet_data}</sheetData></worksheet>"#);
    write_package(
        path,
        &[
            ("xl/workbook.xml".to_string(), workbook),
            (
                "xl/_rels/workbook.xml.rels".to_string(),
                relationships(&[("rId1".to_string(), "worksheets/sheet1.xml".to_string())]),
            ),
            ("xl/worksheets/sheet1.xml".to_string(), sheet),
        ],
    );
}

pub fn docx_paragraph(text: &str) -> String {
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, escape(text))
}

pub fn docx_table(rows: &[&[&str]]) -> String {
    let mut xml = String::from("<w:tbl><w:tblPr/>");
    for row in rows {
        xml.push_str("<w:tr>");
        for cell in row.iter() {
            xml.push_str(&format!("<w:tc>{}</w:tc>", docx_paragraph(cell)));
        }
        xml.push_str("</w:tr>");
    }
    xml.push_str("</w:tbl>");
    xml
}

/// Writes a document whose body is the given block markup, in order.
pub fn write_docx(path: &Path, blocks: &[String]) {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{WORD_NS}"><w:body>{}<w:sectPr/></w:body></w:document>"#,
        blocks.concat()
    );
    write_package(path, &[("word/document.xml".to_string(), document)]);
}

pub fn pptx_text_shape(paragraphs: &[&str]) -> String {
    let mut xml = String::from("<p:sp><p:nvSpPr/><p:spPr/><p:txBody><a:bodyPr/>");
    for text in paragraphs {
        xml.push_str(&format!("<a:p><a:r><a:t>{}</a:t></a:r></a:p>", escape(text)));
    }
    xml.push_str("</p:txBody></p:sp>");
    xml
}

pub fn pptx_table(rows: &[&[&str]]) -> String {
    let mut xml = String::from("<p:graphicFrame><p:nvGraphicFramePr/><a:graphic><a:graphicData><a:tbl><a:tblGrid/>");
    for row in rows {
        xml.push_str("<a:tr>");
        for cell in row.iter() {
            xml.push_str(&format!(
                "<a:tc><a:txBody><a:bodyPr/><a:p><a:r><a:t>{}</a:t></a:r></a:p></a:txBody></a:tc>",
                escape(cell)
            ));
        }
        xml.push_str("</a:tr>");
    }
    xml.push_str("</a:tbl></a:graphicData></a:graphic></p:graphicFrame>");
    xml
}

/// Writes a deck; each entry is the shape markup of one slide's tree.
pub fn write_pptx(path: &Path, slides: &[String]) {
    let mut parts = Vec::new();
    let mut presentation = format!(r#"<p:presentation xmlns:p="{PRES_NS}" xmlns:r="{REL_NS}"><p:sldIdLst>"#);
    let mut rels = Vec::new();

    for (n, shapes) in slides.iter().enumerate() {
        let id = n + 1;
        presentation.push_str(&format!(r#"<p:sldId id="{}" r:id="rId{id}"/>"#, 255 + id));
        rels.push((format!("rId{id}"), format!("slides/slide{id}.xml")));
        parts.push((
            format!("ppt/slides/slide{id}.xml"),
            format!(
                r#"<p:sld xmlns:p="{PRES_NS}" xmlns:a="{DRAWING_NS}"><p:cSld><p:spTree><p:nvGrpSpPr/><p:grpSpPr/>{shapes}</p:spTree></p:cSld></p:sld>"#
            ),
        ));
    }
    presentation.push_str("</p:sldIdLst></p:presentation>");

    parts.push(("ppt/presentation.xml".to_string(), presentation));
    parts.push(("ppt/_rels/presentation.xml.rels".to_string(), relationships(&rels)));
    write_package(path, &parts);
}

pub fn fixture_bytes(write: impl FnOnce(&Path)) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture");
    write(&path);
    std::fs::read(&path).unwrap()
}

pub fn multipart_body(filename: Option<&str>, content: &[u8]) -> Vec<u8> {
    let disposition = match filename {
        Some(name) => format!(r#"form-data; name="file"; filename="{name}""#),
        None => r#"form-data; name="file""#.to_string(),
    };
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: {disposition}\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Polls until the task reaches a terminal status, returning every distinct
/// status seen on the way.
pub async fn wait_for_terminal(registry: &TaskRegistry, task_id: &str) -> (TaskRecord, Vec<TaskStatus>) {
    let mut seen: Vec<TaskStatus> = Vec::new();
    for _ in 0..1000 {
        let record = registry.get(task_id).unwrap();
        if seen.last() != Some(&record.status) {
            seen.push(record.status);
        }
        if record.status.is_terminal() {
            return (record, seen);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {task_id} did not finish");
}
