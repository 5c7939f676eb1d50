//! Markup normalization for engine payloads.
//!
//! The engine (and some legacy host renderers) is case-sensitive on tag
//! names and silently fails to render uppercase-tagged markup, so authored
//! MathML is lower-cased before it is handed over.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static OPEN_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([A-Za-z0-9_-]+)\s*(| [^>]+)>").expect("open tag pattern"));

static CLOSE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*/\s*([A-Za-z0-9_-]+)\s*>").expect("close tag pattern"));

/// Lower-case every begin and end tag name, leaving attributes and text
/// content untouched.
pub fn lowercase_tag_names(markup: &str) -> String {
    let opened = OPEN_TAG_RE.replace_all(markup, |caps: &Captures<'_>| {
        format!("<{}{}>", caps[1].to_lowercase(), &caps[2])
    });
    CLOSE_TAG_RE
        .replace_all(&opened, |caps: &Captures<'_>| {
            format!("</{}>", caps[1].to_lowercase())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_are_lowercased() {
        assert_eq!(
            lowercase_tag_names("<MATH><MI>x</MI></MATH>"),
            "<math><mi>x</mi></math>"
        );
    }

    #[test]
    fn attributes_and_text_keep_their_case() {
        assert_eq!(
            lowercase_tag_names(r#"<MATH Display="Block"><MI>X</MI></ MATH >"#),
            r#"<math Display="Block"><mi>X</mi></math>"#
        );
    }

    #[test]
    fn lowercase_markup_is_unchanged() {
        let markup = "<math><mrow><mi>x</mi></mrow></math>";
        assert_eq!(lowercase_tag_names(markup), markup);
    }
}
