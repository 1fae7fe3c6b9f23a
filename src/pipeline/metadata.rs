//! Metadata extraction from the DOCX's `word/document.xml` part.
//!
//! Only a narrow slice of the document is read:
//!
//! * the namespace declarations, to find out which URI the `wp` prefix
//!   (WordprocessingML drawing) is bound to, and
//! * every `<wp:docPr name="…" descr="…">` element, which is where Word
//!   stores the alternate text an author typed for an image.
//!
//! Both extractions fail soft. A broken archive or malformed XML yields an
//! empty table/index and the page is still produced, just with default alt
//! text.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::{NsReader, Reader};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// The archive part holding the document body.
pub const DOCUMENT_PART: &str = "word/document.xml";

/// Prefix Word uses for the drawing namespace.
pub const DRAWING_PREFIX: &str = "wp";

/// URI used when the document does not declare the `wp` prefix.
pub const DEFAULT_DRAWING_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";

/// Why metadata could not be read. Never fatal for a conversion.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Namespace prefix → URI, as declared in `word/document.xml`.
///
/// The default namespace (`xmlns="…"`) is stored under the empty prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceTable {
    prefixes: BTreeMap<String, String>,
}

impl NamespaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declaration; a later declaration of the same prefix wins.
    pub fn insert(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.prefixes.insert(prefix.into(), uri.into());
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// URI bound to `prefix`, or `default` when it was never declared.
    pub fn resolve_or<'a>(&'a self, prefix: &str, default: &'a str) -> &'a str {
        self.get(prefix).unwrap_or(default)
    }

    /// URI of the WordprocessingML drawing namespace for this document.
    pub fn drawing_namespace(&self) -> &str {
        self.resolve_or(DRAWING_PREFIX, DEFAULT_DRAWING_NAMESPACE)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }
}

/// Image name (the `docPr/@name`, e.g. `Picture 3`) → authored description.
///
/// Only entries whose name and description are both non-blank are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AltTextIndex {
    entries: HashMap<String, String>,
}

impl AltTextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a trimmed `name → description` pair.
    ///
    /// Returns `false` (and stores nothing) when either side is blank.
    pub fn insert(&mut self, name: &str, description: &str) -> bool {
        let name = name.trim();
        let description = description.trim();
        if name.is_empty() || description.is_empty() {
            return false;
        }
        self.entries.insert(name.to_string(), description.to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: AsRef<str>, D: AsRef<str>> FromIterator<(N, D)> for AltTextIndex {
    fn from_iter<I: IntoIterator<Item = (N, D)>>(iter: I) -> Self {
        let mut index = AltTextIndex::new();
        for (name, description) in iter {
            index.insert(name.as_ref(), description.as_ref());
        }
        index
    }
}

// ── Public entry points ──────────────────────────────────────────────────────

/// Collect every namespace declaration in the document XML.
///
/// Returns an empty table on any error; callers supply their own defaults.
pub fn extract_namespaces(document: &Path) -> NamespaceTable {
    match try_extract_namespaces(document) {
        Ok(table) => table,
        Err(e) => {
            warn!("Could not extract namespaces from {}: {}", document.display(), e);
            NamespaceTable::new()
        }
    }
}

/// Fallible variant of [`extract_namespaces`].
pub fn try_extract_namespaces(document: &Path) -> Result<NamespaceTable, MetadataError> {
    let xml = read_document_xml(document)?;
    let table = parse_namespaces(&xml)?;
    debug!("Found {} namespace declarations", table.len());
    Ok(table)
}

/// Build the alt-text index for the document.
///
/// Returns an empty index on any error; images then get the default
/// description at rewrite time.
pub fn extract_alt_text(document: &Path) -> AltTextIndex {
    let namespaces = extract_namespaces(document);
    match try_extract_alt_text(document, &namespaces) {
        Ok(index) => index,
        Err(e) => {
            warn!("Failed to extract alt text from {}: {}", document.display(), e);
            AltTextIndex::new()
        }
    }
}

/// Fallible variant of [`extract_alt_text`] reusing an already-built
/// namespace table.
pub fn try_extract_alt_text(
    document: &Path,
    namespaces: &NamespaceTable,
) -> Result<AltTextIndex, MetadataError> {
    let xml = read_document_xml(document)?;
    let index = parse_alt_text(&xml, namespaces.drawing_namespace())?;
    if index.is_empty() {
        info!("No alt texts found in {}", document.display());
    } else {
        info!("Extracted {} alt texts", index.len());
    }
    Ok(index)
}

// ── XML parsing ──────────────────────────────────────────────────────────────

/// Read `word/document.xml` fully into memory.
fn read_document_xml(document: &Path) -> Result<Vec<u8>, MetadataError> {
    let file = File::open(document)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let mut part = archive.by_name(DOCUMENT_PART)?;
    let mut xml = Vec::with_capacity(part.size() as usize);
    part.read_to_end(&mut xml)?;
    Ok(xml)
}

/// Collect `xmlns` / `xmlns:prefix` attributes from every element.
pub fn parse_namespaces(xml: &[u8]) -> Result<NamespaceTable, MetadataError> {
    let mut reader = Reader::from_reader(xml);
    let mut table = NamespaceTable::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => collect_declarations(e, &mut table),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(table)
}

fn collect_declarations(element: &BytesStart<'_>, table: &mut NamespaceTable) {
    for attr in element.attributes().flatten() {
        let key = attr.key.as_ref();
        let prefix = if key == b"xmlns" {
            ""
        } else if let Some(rest) = key.strip_prefix(b"xmlns:") {
            match std::str::from_utf8(rest) {
                Ok(p) => p,
                Err(_) => continue,
            }
        } else {
            continue;
        };
        let uri = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        table.insert(prefix, uri);
    }
}

/// Map `docPr/@name` → `docPr/@descr` for `docPr` elements bound to
/// `drawing_ns`.
pub fn parse_alt_text(xml: &[u8], drawing_ns: &str) -> Result<AltTextIndex, MetadataError> {
    let mut reader = NsReader::from_reader(xml);
    let mut index = AltTextIndex::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_resolved_event_into(&mut buf)? {
            (ResolveResult::Bound(Namespace(ns)), Event::Start(e) | Event::Empty(e))
                if ns == drawing_ns.as_bytes() && e.local_name().as_ref() == b"docPr" =>
            {
                let name = attribute_value(&e, b"name").unwrap_or_default();
                let descr = attribute_value(&e, b"descr").unwrap_or_default();
                if index.insert(&name, &descr) {
                    debug!("Mapped '{}' → '{}'", name.trim(), descr.trim());
                } else {
                    debug!("Skipping docPr without name or description (name={:?})", name);
                }
            }
            (_, Event::Eof) => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(index)
}

fn attribute_value(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| match a.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
        })
}
