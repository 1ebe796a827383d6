use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::info;

use crate::error::Result;

pub const DEFAULT_PDF_PATH: &str = "/tmp/report.pdf";

// A4 in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const LEFT_MARGIN: i64 = 50;
const FIRST_BASELINE: i64 = 800;
const FONT_SIZE: i64 = 12;
const LEADING: i64 = 18;

/// One `"<key>: <value>"` line per entry, in insertion order.
pub fn report_lines(entries: &IndexMap<String, String>) -> Vec<String> {
    entries
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect()
}

/// Renders `entries` onto a single A4 page.
///
/// Lines are neither wrapped nor paginated; long values run off the page.
/// The built-in Helvetica font covers WinAnsi only.
pub fn render_pdf(entries: &IndexMap<String, String>) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
        Operation::new("TL", vec![LEADING.into()]),
        Operation::new("Td", vec![LEFT_MARGIN.into(), FIRST_BASELINE.into()]),
    ];
    for line in report_lines(entries) {
        operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf)?;
    Ok(buf)
}

/// Writes the rendered report to `path` and returns it.
pub fn export_pdf(entries: &IndexMap<String, String>, path: &Path) -> Result<PathBuf> {
    let bytes = render_pdf(entries)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, &bytes)?;
    info!(path = %path.display(), entries = entries.len(), "report pdf written");
    Ok(path.to_path_buf())
}
