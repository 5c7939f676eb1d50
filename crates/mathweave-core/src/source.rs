//! Source elements: alternate representations of one equation.
//!
//! A math item owns zero or more source children, each tagged with a media
//! type and a usage flag. The usage flag spans two independent eligibility
//! axes (render x markup):
//!
//! ```text
//! render  markup  usage attribute
//! -       -       "preview"
//! +       -       "nomarkup"
//! -       +       "norender"
//! +       +       (absent)
//! ```

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::dom::{Document, NodeId};

/// Container element tag for one equation occurrence.
pub const MATH_ITEM_TAG: &str = "math-item";
/// Child element tag carrying one alternate representation.
pub const MATH_SOURCE_TAG: &str = "math-source";

pub const TYPE_PLAIN: &str = "text/plain";
pub const TYPE_HTML: &str = "text/html";
pub const TYPE_TEX: &str = "application/x-tex";
pub const TYPE_MATHML: &str = "application/mathml+xml";

/// Eligibility category of a source element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SourceUsage {
    /// Participates in rendering and markup export.
    #[default]
    Default,
    /// Participates in neither; revealed only during the first-pass preview.
    Preview,
    /// Rendering only.
    NoMarkup,
    /// Markup export only.
    NoRender,
}

impl SourceUsage {
    pub fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("preview") => Self::Preview,
            Some("nomarkup") => Self::NoMarkup,
            Some("norender") => Self::NoRender,
            _ => Self::Default,
        }
    }

    pub fn as_attr(&self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::Preview => Some("preview"),
            Self::NoMarkup => Some("nomarkup"),
            Self::NoRender => Some("norender"),
        }
    }

    pub fn render_eligible(&self) -> bool {
        !matches!(self, Self::Preview | Self::NoRender)
    }

    pub fn markup_eligible(&self) -> bool {
        !matches!(self, Self::Preview | Self::NoMarkup)
    }
}

/// Filtering query over an item's source sequence.
///
/// An unset axis matches everything; a set axis must equal the source's
/// eligibility on that axis; a set type must equal the source's media type.
#[derive(Clone, Debug, Default)]
pub struct SourceFilter {
    pub render: Option<bool>,
    pub markup: Option<bool>,
    pub source_type: Option<SmolStr>,
}

impl SourceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_render(mut self, render: bool) -> Self {
        self.render = Some(render);
        self
    }

    pub fn with_markup(mut self, markup: bool) -> Self {
        self.markup = Some(markup);
        self
    }

    pub fn with_type(mut self, source_type: impl Into<SmolStr>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    pub fn matches(&self, usage: SourceUsage, source_type: &str) -> bool {
        if let Some(want) = self.render {
            if want != usage.render_eligible() {
                return false;
            }
        }
        if let Some(want) = self.markup {
            if want != usage.markup_eligible() {
                return false;
            }
        }
        if let Some(want) = &self.source_type {
            if want != source_type {
                return false;
            }
        }
        true
    }
}

/// One representation produced by a handler, keyed by a display kind
/// ("MathML", "TeX", ...) rather than a media type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceData {
    pub kind: SmolStr,
    pub subtype: Option<SmolStr>,
    pub markup: String,
}

/// Whether the node is a source element.
pub fn is_source_element(doc: &Document, node: NodeId) -> bool {
    doc.tag(node) == Some(MATH_SOURCE_TAG)
}

/// Media type of a source element; absent attribute means HTML.
pub fn source_type(doc: &Document, el: NodeId) -> SmolStr {
    doc.attr(el, "type")
        .map(SmolStr::new)
        .unwrap_or_else(|| SmolStr::new_static(TYPE_HTML))
}

pub fn source_usage(doc: &Document, el: NodeId) -> SourceUsage {
    SourceUsage::from_attr(doc.attr(el, "usage"))
}

/// Raw textual payload of a source element: the sole text child when there is
/// one, otherwise the serialized children. Trimmed.
pub fn source_markup(doc: &Document, el: NodeId) -> String {
    let children = doc.children(el);
    if children.len() == 1 {
        if let Some(text) = doc.text(children[0]) {
            return text.trim().to_string();
        }
    }
    doc.inner_markup(el).trim().to_string()
}

/// Direct source children of an item, document order.
pub fn source_elements(doc: &Document, item: NodeId) -> Vec<NodeId> {
    doc.children(item)
        .iter()
        .copied()
        .filter(|&c| is_source_element(doc, c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_attr_round_trips() {
        for usage in [
            SourceUsage::Default,
            SourceUsage::Preview,
            SourceUsage::NoMarkup,
            SourceUsage::NoRender,
        ] {
            assert_eq!(SourceUsage::from_attr(usage.as_attr()), usage);
        }
        assert_eq!(SourceUsage::from_attr(Some("bogus")), SourceUsage::Default);
    }

    #[test]
    fn eligibility_axes_partition_the_four_usages() {
        let table = [
            (SourceUsage::Default, true, true),
            (SourceUsage::Preview, false, false),
            (SourceUsage::NoMarkup, true, false),
            (SourceUsage::NoRender, false, true),
        ];
        for (usage, render, markup) in table {
            assert_eq!(usage.render_eligible(), render, "{usage:?}");
            assert_eq!(usage.markup_eligible(), markup, "{usage:?}");
        }
    }

    #[test]
    fn filter_matches_the_quantified_formula() {
        let usages = [
            SourceUsage::Default,
            SourceUsage::Preview,
            SourceUsage::NoMarkup,
            SourceUsage::NoRender,
        ];
        let axis = [None, Some(true), Some(false)];
        for usage in usages {
            for render in axis {
                for markup in axis {
                    let filter = SourceFilter {
                        render,
                        markup,
                        source_type: None,
                    };
                    let expect = render.map(|w| w == usage.render_eligible()).unwrap_or(true)
                        && markup.map(|w| w == usage.markup_eligible()).unwrap_or(true);
                    assert_eq!(filter.matches(usage, TYPE_HTML), expect);
                }
            }
        }
    }

    #[test]
    fn source_markup_prefers_the_sole_text_child() {
        let doc = Document::from_fragment(
            "<math-item><math-source>  x^2  </math-source><math-source><math><mi>x</mi></math></math-source></math-item>",
        )
        .expect("parse failed");
        let item = doc.elements_by_tag(MATH_ITEM_TAG)[0];
        let sources = source_elements(&doc, item);
        assert_eq!(source_markup(&doc, sources[0]), "x^2");
        assert_eq!(source_markup(&doc, sources[1]), "<math><mi>x</mi></math>");
    }

    #[test]
    fn missing_type_attr_defaults_to_html() {
        let doc = Document::from_fragment("<math-source>hi</math-source>").expect("parse failed");
        let src = doc.elements_by_tag(MATH_SOURCE_TAG)[0];
        assert_eq!(source_type(&doc, src).as_str(), TYPE_HTML);
    }
}
