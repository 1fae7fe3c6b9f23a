//! Fixed markup injected into every converted page.
//!
//! Centralising the replacement `<head>` and the footer here means changing
//! the page's look requires editing exactly one place, and tests can inspect
//! the generated blocks without running a conversion.
//!
//! The variable parts (stylesheet URL, analytics id, footer text, class
//! names) come from [`crate::config::RewriteOptions`].

use crate::config::RewriteOptions;

/// Embedded style rules: fluid typography scaled with `clamp()`, plus the
/// image and table rules the rewriter's classes rely on.
///
/// `{line}`, `{table}` are substituted with the configured class names.
const RESPONSIVE_STYLE: &str = r#"    :root {
      --font-base: clamp(0.75rem, 1vw + 0.75rem, 1.25rem);
      --font-headline: clamp(1.75rem, 4vw, 2.5rem);
      --spacing-base: clamp(0.5rem, 1vw, 2rem);
      --line-height-base: 1.5;
      --vertical-spacing: clamp(1.3, 1vw + 1.3, 1.7);
      --font-primary: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
      --font-secondary: "Segoe UI Black", -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
    }
    html { font-size: 100%; line-height: var(--line-height-base); font-family: var(--font-primary); }
    header {
      background: rgba(255, 255, 255, 0.85);
      -webkit-backdrop-filter: blur(10px);
      backdrop-filter: blur(10px);
      border-bottom: 1px solid rgba(0, 0, 0, 0.1);
      padding: calc(var(--spacing-base) * 1.5);
      text-align: center;
      box-shadow: 0 1px 2px rgba(0, 0, 0, 0.05);
    }
    header h1 { margin: 0; font-family: var(--font-secondary); font-size: var(--font-headline); font-weight: 900; letter-spacing: -0.5pt; line-height: 1.3; }
    h1 { font-size: var(--font-headline); line-height: 1.3; }
    h2 { font-size: clamp(1.5rem, 3.5vw, 2rem); margin-bottom: var(--spacing-base); line-height: var(--vertical-spacing); }
    h3 { font-size: clamp(1.25rem, 3vw, 1.75rem); margin-bottom: var(--spacing-base); line-height: var(--vertical-spacing); }
    h4 { font-size: clamp(1.1rem, 2.5vw, 1.5rem); margin-bottom: var(--spacing-base); line-height: var(--vertical-spacing); }
    h5 { font-size: clamp(1rem, 2vw, 1.25rem); margin-bottom: var(--spacing-base); line-height: var(--vertical-spacing); }
    h6 { font-size: clamp(0.9rem, 1.5vw, 1rem); margin-bottom: var(--spacing-base); line-height: var(--vertical-spacing); }
    p  { font-size: var(--font-base); margin-bottom: var(--spacing-base); line-height: var(--vertical-spacing); }
    img { max-width: 100% !important; height: auto !important; display: block; }
    .{line} { width: 100% !important; height: auto !important; }
    body { padding: var(--spacing-base); }
    @media (max-width: 576px) { body { padding: calc(var(--spacing-base) / 2); } }
    .{table} { overflow-x: auto; }
    .{table} table { width: 100%; }
    footer {
      margin-top: var(--spacing-base);
      padding: var(--spacing-base);
      background-color: #f8f9fa;
      text-align: center;
      font-size: clamp(0.75rem, 1vw, 1rem);
    }
    @media (max-width: 400px) {
      :root { --spacing-base: 0.5rem; }
      header { padding: calc(var(--spacing-base) * 1.2); }
    }
    @media (min-width: 2000px) {
      :root { --spacing-base: 2rem; }
      header { padding: calc(var(--spacing-base) * 1.5); }
    }
"#;

/// Build the `<head>` block that replaces whatever the converter emitted.
pub fn responsive_head(options: &RewriteOptions) -> String {
    let style = RESPONSIVE_STYLE
        .replace("{line}", &options.line_shape_class)
        .replace("{table}", &options.table_wrapper_class);

    let mut head = String::with_capacity(style.len() + 1024);
    head.push_str("<head>\n");
    head.push_str("  <meta charset=\"UTF-8\">\n");
    head.push_str(
        "  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1, shrink-to-fit=no\">\n",
    );
    head.push_str(&format!(
        "  <link rel=\"stylesheet\" href=\"{}\">\n",
        escape_html(&options.stylesheet_href)
    ));
    head.push_str("  <style>\n");
    head.push_str(&style);
    head.push_str("  </style>\n");
    if let Some(id) = options.analytics_id.as_deref().filter(|id| !id.is_empty()) {
        head.push_str(&analytics_snippet(id));
    }
    head.push_str("</head>");
    head
}

/// Google tag (gtag.js) loader for the given measurement id.
fn analytics_snippet(id: &str) -> String {
    let id = escape_js(id);
    format!(
        "  <script async src=\"https://www.googletagmanager.com/gtag/js?id={id}\"></script>\n\
         \x20 <script defer>\n\
         \x20   window.dataLayer = window.dataLayer || [];\n\
         \x20   function gtag(){{dataLayer.push(arguments);}}\n\
         \x20   gtag('js', new Date());\n\
         \x20   gtag('config', '{id}');\n\
         \x20 </script>\n"
    )
}

/// Footer banner inserted right before `</body>`.
pub fn footer(options: &RewriteOptions) -> String {
    format!(
        "\n<footer>\n  <hr>\n  <p>{}</p>\n</footer>\n",
        escape_html(&options.footer_text)
    )
}

/// Escape text for use inside a double-quoted HTML attribute or element body.
pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// Measurement ids are alphanumeric; drop anything that could break out of
/// the script string.
fn escape_js(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}
