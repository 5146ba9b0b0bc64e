//! Plain-text field cleanup.
//!
//! Titles, excerpts and term names are stored as text, never as markup.
//! [`sanitize_text`] strips tags and control characters and collapses
//! whitespace; [`decode_entities`] resolves the character references that
//! editors' tooling tends to leave in term names.

use std::collections::HashSet;

use ammonia::Builder;

/// Collapses repeated whitespace and trims edges.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip markup and control characters, then collapse whitespace.
///
/// Tags are removed by parsing the text as an HTML fragment, so a `<` that
/// does not open a tag survives as text. `script` and `style` lose their
/// content. Character references are decoded in the result.
///
/// ```
/// use canonical::sanitize_text;
///
/// assert_eq!(sanitize_text("  <b>Hello</b>\u{7}   world "), "Hello world");
/// assert_eq!(sanitize_text("5 < 10 reasons"), "5 < 10 reasons");
/// ```
pub fn sanitize_text(text: &str) -> String {
    let printable: String = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();
    if !printable.contains(['<', '&']) {
        return collapse_whitespace(&printable);
    }
    let mut builder = Builder::empty();
    builder
        .clean_content_tags(HashSet::from(["script", "style"]))
        .strip_comments(true);
    let stripped = builder.clean(&printable).to_string();
    collapse_whitespace(&decode_entities(&stripped))
}

/// Decode named and numeric HTML character references.
///
/// Text that is not a valid reference is left untouched.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    html_escape::decode_html_entities(text).into_owned()
}
