//! Markup rewriting: turn LibreOffice's HTML export into a responsive,
//! accessible page.
//!
//! LibreOffice writes pixel-exact HTML: fixed `width`/`height` on images and
//! tables, a `<head>` full of page-geometry CSS, and `<img>` tags whose
//! `alt` is empty or missing even when the author described the image in
//! Word. This module applies six deterministic passes over the markup.
//!
//! The passes are pattern-based on purpose: the converter's output is not
//! guaranteed to be well-formed, and a parser round-trip would reformat the
//! whole document. Every pass tolerates attribute-order variance, any tag
//! case, extra attributes and single/double/unquoted attribute values.
//!
//! ## Pass Order
//!
//! The head goes first so later passes never touch the converter's CSS;
//! dimensions are stripped before images are rewritten so the rebuilt
//! `<img>` tags come out clean; the footer goes last so it is never wrapped
//! or rewritten itself.

use crate::config::RewriteOptions;
use crate::error::Docx2HtmlError;
use crate::pipeline::assets::src_basename;
use crate::pipeline::metadata::AltTextIndex;
use crate::template::{self, escape_html};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use serde::Serialize;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info};

/// What the rewriter changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteReport {
    /// `<img>` tags rewritten.
    pub images: usize,
    /// Images whose alt text came from the document.
    pub described: usize,
    /// Images tagged with the line-shape class.
    pub line_shapes: usize,
    /// Top-level tables wrapped in a scroll container.
    pub tables_wrapped: usize,
}

/// Rewrite the HTML file at `html_path` in place.
///
/// # Errors
/// * [`Docx2HtmlError::NotHtml`] if the file does not end in `.html`/`.htm`
/// * [`Docx2HtmlError::RewriteFailed`] if reading or writing fails
pub fn rewrite(
    html_path: &Path,
    alt_texts: &AltTextIndex,
    options: &RewriteOptions,
) -> Result<RewriteReport, Docx2HtmlError> {
    if !is_html_path(html_path) {
        return Err(Docx2HtmlError::NotHtml {
            path: html_path.to_path_buf(),
        });
    }

    let raw = std::fs::read(html_path).map_err(|e| Docx2HtmlError::RewriteFailed {
        path: html_path.to_path_buf(),
        source: e,
    })?;
    let html = String::from_utf8_lossy(&raw);

    let (rewritten, report) = rewrite_markup(&html, alt_texts, options);

    std::fs::write(html_path, rewritten).map_err(|e| Docx2HtmlError::RewriteFailed {
        path: html_path.to_path_buf(),
        source: e,
    })?;

    info!(
        "Rewrote {}: {} images ({} described), {} tables wrapped",
        html_path.display(),
        report.images,
        report.described,
        report.tables_wrapped
    );
    Ok(report)
}

/// Apply every pass to an in-memory document.
///
/// Passes (applied in order):
/// 1. Replace the `<head>` with the fixed responsive head
/// 2. Ensure `<body>` carries the layout class
/// 3. Strip `width`/`height` attributes from every tag
/// 4. Rewrite `<img>` tags: alt text + responsive classes
/// 5. Wrap each top-level `<table>` in a scroll container
/// 6. Insert the footer before `</body>`
pub fn rewrite_markup(
    html: &str,
    alt_texts: &AltTextIndex,
    options: &RewriteOptions,
) -> (String, RewriteReport) {
    let mut report = RewriteReport::default();

    let s = replace_head(html, &template::responsive_head(options));
    let s = ensure_body_class(&s, &options.body_class);
    let s = strip_dimensions(&s);
    let s = rewrite_images(&s, alt_texts, options, &mut report);
    let (s, wrapped) = wrap_tables(&s, &options.table_wrapper_class);
    report.tables_wrapped = wrapped;
    let s = insert_footer(&s, &template::footer(options));

    (s, report)
}

fn is_html_path(path: &Path) -> bool {
    path.extension()
        .map(|e| {
            let e = e.to_string_lossy();
            e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm")
        })
        .unwrap_or(false)
}

// ── Attribute scanning ───────────────────────────────────────────────────────

/// `name = value` with double-, single- or unquoted values, including the
/// whitespace before the name so removing a match leaves no gap.
///
/// Matches are consumed left to right, so text inside a quoted value is
/// never mistaken for an attribute. An unquoted value stops before a
/// trailing `/` to keep `/>` intact.
static RE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\s*([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|(/*[^\s"'=<>`/]+(?:/+[^\s"'=<>`/]+)*))"#,
    )
    .unwrap()
});

pub(crate) struct Attr {
    /// Lowercased attribute name.
    pub(crate) name: String,
    /// Value with character references resolved.
    pub(crate) value: String,
    /// Whole attribute including leading whitespace.
    pub(crate) span: Range<usize>,
    /// Raw value without its quotes.
    pub(crate) value_span: Range<usize>,
}

/// Length of `<tagname` at the start of `tag`.
pub(crate) fn tag_name_len(tag: &str) -> usize {
    tag.char_indices()
        .skip(1)
        .find(|&(_, c)| c.is_ascii_whitespace() || c == '>' || c == '/')
        .map_or(tag.len(), |(i, _)| i)
}

/// Attributes of a start tag, spans relative to `tag`.
///
/// `name_len` is the length of `<tagname`; scanning starts right after it.
pub(crate) fn attributes(tag: &str, name_len: usize) -> Vec<Attr> {
    let body = &tag[name_len..];
    RE_ATTR
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let raw = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))?;
            Some(Attr {
                name: caps[1].to_ascii_lowercase(),
                value: unescape_attr(raw.as_str()),
                span: (whole.start() + name_len)..(whole.end() + name_len),
                value_span: (raw.start() + name_len)..(raw.end() + name_len),
            })
        })
        .collect()
}

/// Rebuild a start tag: drop the attributes named in `remove`, then insert
/// `insert` right after `<tagname`.
fn rebuild_tag(tag: &str, name_len: usize, attrs: &[Attr], remove: &[&str], insert: &str) -> String {
    let mut out = String::with_capacity(tag.len() + insert.len());
    out.push_str(&tag[..name_len]);
    out.push_str(insert);
    let mut cursor = name_len;
    for attr in attrs.iter().filter(|a| remove.contains(&a.name.as_str())) {
        out.push_str(&tag[cursor..attr.span.start]);
        cursor = attr.span.end;
    }
    out.push_str(&tag[cursor..]);
    out
}

fn unescape_attr(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Existing class tokens plus `add`, without duplicates.
fn merged_classes(existing: Option<&str>, add: &[&str]) -> Vec<String> {
    let mut classes: Vec<String> = existing
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    for class in add {
        if !classes.iter().any(|c| c == class) {
            classes.push((*class).to_string());
        }
    }
    classes
}

// ── Pass 1: Replace the head ─────────────────────────────────────────────────

static RE_HEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<head\b[^>]*>.*?</head\s*>").unwrap());

static RE_HTML_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<html\b[^>]*>").unwrap());

fn replace_head(input: &str, head: &str) -> String {
    if RE_HEAD.is_match(input) {
        return RE_HEAD.replacen(input, 1, NoExpand(head)).into_owned();
    }
    // No head at all: give the document one.
    match RE_HTML_OPEN.find(input) {
        Some(m) => format!("{}\n{}{}", &input[..m.end()], head, &input[m.end()..]),
        None => format!("{head}\n{input}"),
    }
}

// ── Pass 2: Body layout class ────────────────────────────────────────────────

static RE_BODY_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<body\b[^>]*>").unwrap());

fn ensure_body_class(input: &str, class: &str) -> String {
    let Some(m) = RE_BODY_OPEN.find(input) else {
        return input.to_string();
    };
    let tag = m.as_str();
    let attrs = attributes(tag, "<body".len());
    let existing = attrs.iter().find(|a| a.name == "class").map(|a| a.value.as_str());

    if existing.is_some_and(|v| v.split_whitespace().any(|c| c == class)) {
        return input.to_string();
    }

    let classes = merged_classes(existing, &[class]);
    let insert = format!(" class=\"{}\"", escape_html(&classes.join(" ")));
    let new_tag = rebuild_tag(tag, "<body".len(), &attrs, &["class"], &insert);
    format!("{}{}{}", &input[..m.start()], new_tag, &input[m.end()..])
}

// ── Pass 3: Strip fixed dimensions ───────────────────────────────────────────

pub(crate) static RE_START_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[A-Za-z][^>]*>").unwrap());

fn strip_dimensions(input: &str) -> String {
    RE_START_TAG
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let tag = &caps[0];
            let name_len = tag_name_len(tag);
            let attrs = attributes(tag, name_len);
            if !attrs.iter().any(|a| a.name == "width" || a.name == "height") {
                return tag.to_string();
            }
            rebuild_tag(tag, name_len, &attrs, &["width", "height"], "")
        })
        .into_owned()
}

// ── Pass 4: Image alt text and classes ───────────────────────────────────────

static RE_IMG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img\b[^>]*>").unwrap());

fn rewrite_images(
    input: &str,
    alt_texts: &AltTextIndex,
    options: &RewriteOptions,
    report: &mut RewriteReport,
) -> String {
    RE_IMG
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let tag = &caps[0];
            let attrs = attributes(tag, "<img".len());
            let value = |name: &str| {
                attrs
                    .iter()
                    .find(|a| a.name == name)
                    .map(|a| a.value.as_str())
            };
            let name = value("name").map(str::trim).filter(|n| !n.is_empty());
            let src = value("src");

            let described = name
                .and_then(|n| alt_texts.get(n))
                .or_else(|| src.and_then(|s| alt_texts.get(&src_basename(s))));
            let description = described.unwrap_or(&options.default_alt_text);

            let is_line = name.is_some_and(|n| {
                n.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("shape"))
            });
            let mut add: Vec<&str> = Vec::with_capacity(2);
            if is_line {
                add.push(&options.line_shape_class);
            }
            add.push(&options.fluid_image_class);
            let classes = merged_classes(value("class"), &add);

            report.images += 1;
            if described.is_some() {
                report.described += 1;
            }
            if is_line {
                report.line_shapes += 1;
            }
            debug!(
                "img name={:?} src={:?} → alt={:?} line={}",
                name, src, description, is_line
            );

            let insert = format!(
                " alt=\"{}\" class=\"{}\"",
                escape_html(description),
                escape_html(&classes.join(" "))
            );
            rebuild_tag(tag, "<img".len(), &attrs, &["alt", "class"], &insert)
        })
        .into_owned()
}

// ── Pass 5: Responsive tables ────────────────────────────────────────────────

static RE_TABLE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<table\b[^>]*>|</table\s*>").unwrap());

/// Wrap every top-level table; nested tables ride inside their parent's
/// wrapper. Unclosed tables are left alone.
fn wrap_tables(input: &str, class: &str) -> (String, usize) {
    let mut blocks: Vec<Range<usize>> = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for m in RE_TABLE_TOKEN.find_iter(input) {
        let is_close = m.as_str().starts_with("</");
        if is_close {
            if depth == 0 {
                continue; // stray close tag
            }
            depth -= 1;
            if depth == 0 {
                blocks.push(start..m.end());
            }
        } else {
            if depth == 0 {
                start = m.start();
            }
            depth += 1;
        }
    }

    if blocks.is_empty() {
        return (input.to_string(), 0);
    }

    let open = format!("<div class=\"{}\">", escape_html(class));
    let mut out = String::with_capacity(input.len() + blocks.len() * (open.len() + 6));
    let mut cursor = 0;
    for block in &blocks {
        out.push_str(&input[cursor..block.start]);
        out.push_str(&open);
        out.push_str(&input[block.clone()]);
        out.push_str("</div>");
        cursor = block.end;
    }
    out.push_str(&input[cursor..]);
    (out, blocks.len())
}

// ── Pass 6: Footer ───────────────────────────────────────────────────────────

static RE_BODY_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</body\s*>").unwrap());

fn insert_footer(input: &str, footer: &str) -> String {
    match RE_BODY_CLOSE.find_iter(input).last() {
        Some(m) => format!("{}{}{}", &input[..m.start()], footer, &input[m.start()..]),
        None => format!("{input}{footer}"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> RewriteOptions {
        RewriteOptions::default()
    }

    fn rewrite_one(tag: &str, index: &AltTextIndex) -> String {
        let mut report = RewriteReport::default();
        rewrite_images(tag, index, &options(), &mut report)
    }

    #[test]
    fn head_is_replaced_wholesale() {
        let input = "<html><HEAD lang=\"en\"><title>x</title><style>p{width:3in}</style></HEAD><body></body></html>";
        let result = replace_head(input, "<head>NEW</head>");
        assert_eq!(result, "<html><head>NEW</head><body></body></html>");
    }

    #[test]
    fn header_element_is_not_a_head() {
        let input = "<html><head></head><body><header>keep</header></body></html>";
        let result = replace_head(input, "<head>NEW</head>");
        assert!(result.contains("<header>keep</header>"));
    }

    #[test]
    fn missing_head_is_inserted_after_html() {
        let result = replace_head("<html lang=\"en\"><body></body></html>", "<head>NEW</head>");
        assert_eq!(result, "<html lang=\"en\">\n<head>NEW</head><body></body></html>");
    }

    #[test]
    fn body_gets_container_class() {
        let result = ensure_body_class("<body lang=\"en-US\" dir=\"ltr\">", "container");
        assert_eq!(result, "<body class=\"container\" lang=\"en-US\" dir=\"ltr\">");
    }

    #[test]
    fn body_class_is_merged_not_duplicated() {
        let result = ensure_body_class("<BODY class='page'>", "container");
        assert_eq!(result, "<BODY class=\"page container\">");
        let untouched = ensure_body_class("<body class=\"x container\">", "container");
        assert_eq!(untouched, "<body class=\"x container\">");
    }

    #[test]
    fn dimensions_stripped_from_all_tags() {
        let input = r#"<img src="a.png" width="320" HEIGHT='240'><table width=100%><td height="5">width="9"</td></table>"#;
        let result = strip_dimensions(input);
        assert_eq!(
            result,
            r#"<img src="a.png"><table><td>width="9"</td></table>"#
        );
    }

    #[test]
    fn dimension_strip_keeps_data_attributes_and_self_closing() {
        let result = strip_dimensions(r#"<img data-width="3" width=10/>"#);
        assert_eq!(result, r#"<img data-width="3"/>"#);
    }

    #[test]
    fn dimension_text_inside_values_is_kept() {
        let input = r#"<img alt="Chart, width=300 height=200" title='a height="1"' width="300">"#;
        let result = strip_dimensions(input);
        assert_eq!(
            result,
            r#"<img alt="Chart, width=300 height=200" title='a height="1"'>"#
        );
    }

    #[test]
    fn attribute_scan_reports_raw_value_span() {
        let tag = r#"<IMG alt="x src=y" SRC='a.png'>"#;
        let name_len = tag_name_len(tag);
        assert_eq!(name_len, 4);
        let attrs = attributes(tag, name_len);
        let names: Vec<&str> = attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["alt", "src"]);
        assert_eq!(&tag[attrs[1].value_span.clone()], "a.png");
    }

    #[test]
    fn described_image_gets_authored_alt() {
        let index: AltTextIndex = [("Picture1", "A red circle")].into_iter().collect();
        let result = rewrite_one(r#"<img src="x.png" name="Picture1" alt="">"#, &index);
        assert_eq!(
            result,
            r#"<img alt="A red circle" class="img-fluid" src="x.png" name="Picture1">"#
        );
    }

    #[test]
    fn src_basename_is_secondary_key() {
        let index: AltTextIndex = [("image3.png", "Logo")].into_iter().collect();
        let result = rewrite_one(r#"<img src="media/image3.png" name="Graphic 9">"#, &index);
        assert!(result.contains(r#"alt="Logo""#), "got: {result}");
    }

    #[test]
    fn percent_encoded_src_matches_decoded_name() {
        let index: AltTextIndex = [("My Doc_html_1a2b.png", "Team photo")].into_iter().collect();
        let result = rewrite_one(r#"<img src="images/My%20Doc_html_1a2b.png">"#, &index);
        assert!(result.contains(r#"alt="Team photo""#), "{result}");
    }

    #[test]
    fn unknown_image_gets_default_alt() {
        let result = rewrite_one(r#"<img src="x.png">"#, &AltTextIndex::new());
        assert!(result.contains(r#"alt="Illustration from the document""#));
    }

    #[test]
    fn shape_gets_line_and_fluid_class_once() {
        let result = rewrite_one(
            r#"<img class="img-fluid" name="SHAPE2" src="s.gif"/>"#,
            &AltTextIndex::new(),
        );
        assert_eq!(
            result,
            r#"<img alt="Illustration from the document" class="img-fluid img-line" name="SHAPE2" src="s.gif"/>"#
        );
    }

    #[test]
    fn alt_text_is_escaped() {
        let index: AltTextIndex = [("P", r#"A "quoted" <b> & co"#)].into_iter().collect();
        let result = rewrite_one(r#"<img name="P">"#, &index);
        assert!(result.contains(r#"alt="A &quot;quoted&quot; &lt;b&gt; &amp; co""#));
    }

    #[test]
    fn entity_encoded_name_matches_index() {
        let index: AltTextIndex = [("R&D chart", "Budget")].into_iter().collect();
        let result = rewrite_one(r#"<img name="R&amp;D chart">"#, &index);
        assert!(result.contains(r#"alt="Budget""#));
    }

    #[test]
    fn report_counts_images() {
        let index: AltTextIndex = [("Picture1", "desc")].into_iter().collect();
        let mut report = RewriteReport::default();
        rewrite_images(
            r#"<img name="Picture1"><img name="Shape2"><img src="z.png">"#,
            &index,
            &options(),
            &mut report,
        );
        assert_eq!(report.images, 3);
        assert_eq!(report.described, 1);
        assert_eq!(report.line_shapes, 1);
    }

    #[test]
    fn sequential_tables_wrapped_individually() {
        let input = "<table><tr><td>1</td></tr></table><p>x</p><TABLE border=1><tr><td>2</td></tr></TABLE>";
        let (result, n) = wrap_tables(input, "table-responsive");
        assert_eq!(n, 2);
        assert_eq!(
            result,
            "<div class=\"table-responsive\"><table><tr><td>1</td></tr></table></div><p>x</p>\
             <div class=\"table-responsive\"><TABLE border=1><tr><td>2</td></tr></TABLE></div>"
        );
    }

    #[test]
    fn nested_tables_do_not_mispair() {
        let input = "<table><tr><td><table><tr><td>in</td></tr></table></td></tr></table>";
        let (result, n) = wrap_tables(input, "table-responsive");
        assert_eq!(n, 1);
        assert!(result.starts_with("<div class=\"table-responsive\"><table>"));
        assert!(result.ends_with("</table></td></tr></table></div>"));
    }

    #[test]
    fn unclosed_table_left_alone() {
        let (result, n) = wrap_tables("<table><tr><td>x", "t");
        assert_eq!(n, 0);
        assert_eq!(result, "<table><tr><td>x");
    }

    #[test]
    fn tablet_tag_is_not_a_table() {
        let (_, n) = wrap_tables("<tablet></tablet>", "t");
        assert_eq!(n, 0);
    }

    #[test]
    fn footer_goes_before_last_body_close() {
        let result = insert_footer("<body><p>x</p></BODY></html>", "<footer/>");
        assert_eq!(result, "<body><p>x</p><footer/></BODY></html>");
    }

    #[test]
    fn footer_appended_without_body_close() {
        assert_eq!(insert_footer("<p>x</p>", "<footer/>"), "<p>x</p><footer/>");
    }

    #[test]
    fn full_pipeline_on_converter_output() {
        let input = r#"<!DOCTYPE html>
<html><head><meta http-equiv="content-type" content="text/html; charset=utf-8"/>
<style type="text/css">@page { size: 8.5in 11in }</style></head>
<body lang="en-US" dir="ltr"><p><img src="doc_html_1.png" name="Picture1" align="bottom" width="320" height="240" border="0"/></p>
<table width="602" cellpadding="7"><tr><td width="286">a</td></tr></table></body></html>"#;
        let index: AltTextIndex = [("Picture1", "A red circle")].into_iter().collect();
        let (html, report) = rewrite_markup(input, &index, &options());

        assert!(!html.contains("@page"));
        assert!(html.contains("<body class=\"container\""));
        assert!(!html.contains("width=\"320\""));
        assert!(!html.contains("width=\"602\""));
        assert!(html.contains(r#"alt="A red circle""#));
        assert!(html.contains("<div class=\"table-responsive\"><table cellpadding=\"7\">"));
        assert!(html.contains("© 2025 www.latest2all.com"));
        assert_eq!(report.images, 1);
        assert_eq!(report.tables_wrapped, 1);
    }

    #[test]
    fn non_html_path_rejected() {
        let err = rewrite(Path::new("doc.txt"), &AltTextIndex::new(), &options()).unwrap_err();
        assert!(matches!(err, Docx2HtmlError::NotHtml { .. }));
    }

    #[test]
    fn missing_file_is_rewrite_error() {
        let err = rewrite(
            Path::new("/no/such/dir/doc.html"),
            &AltTextIndex::new(),
            &options(),
        )
        .unwrap_err();
        assert!(matches!(err, Docx2HtmlError::RewriteFailed { .. }));
    }

    #[test]
    fn file_rewritten_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.HTML");
        std::fs::write(&path, "<html><head></head><body><img src=\"a.png\"></body></html>").unwrap();
        let report = rewrite(&path, &AltTextIndex::new(), &options()).unwrap();
        assert_eq!(report.images, 1);
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("viewport"));
        assert!(html.contains("<footer>"));
    }
}
