//! # Style Resolver
//!
//! Flattens CSS onto elements as presentation attributes so the output renders
//! the same without depending on a style cascade at display time.
//!
//! This is not a CSS engine. Only flat class rules (`.name { ... }`) are
//! understood, and only one precedence rule is enforced when flattening:
//!
//! 1. an attribute already on the element always wins
//! 2. then declarations from the element's inline `style`
//! 3. then class rules, first class in the `class` attribute first
//!
//! Values are copied verbatim. A `fill="url(#grad)"` stays a reference to the
//! gradient; it is never replaced by a resolved flat color.

pub mod color;
pub mod css;

use indexmap::IndexMap;
use tracing::debug;

use crate::model::{Document, Element};

/// Property → value for one class. Later definitions replace earlier ones.
pub type Declarations = IndexMap<String, String>;

/// SVG properties that have a presentation-attribute form.
///
/// Inline `style` declarations are flattened only for these; anything else
/// stays inside the `style` attribute.
pub const PRESENTATION_ATTRIBUTES: &[&str] = &[
    "clip-path",
    "clip-rule",
    "color",
    "display",
    "fill",
    "fill-opacity",
    "fill-rule",
    "filter",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "letter-spacing",
    "mask",
    "opacity",
    "paint-order",
    "stop-color",
    "stop-opacity",
    "stroke",
    "stroke-dasharray",
    "stroke-dashoffset",
    "stroke-linecap",
    "stroke-linejoin",
    "stroke-miterlimit",
    "stroke-opacity",
    "stroke-width",
    "text-anchor",
    "transform",
    "vector-effect",
    "visibility",
];

/// Class name → declarations, extracted from every `<style>` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleRules {
    by_class: IndexMap<String, Declarations>,
}

impl StyleRules {
    pub fn get(&self, class: &str) -> Option<&Declarations> {
        self.by_class.get(class)
    }

    pub fn len(&self) -> usize {
        self.by_class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_class.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Declarations)> {
        self.by_class.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn add(&mut self, class: &str, declarations: &[css::Declaration]) {
        let entry = self.by_class.entry(class.to_string()).or_default();
        for decl in declarations {
            entry.insert(decl.property.clone(), decl.value.clone());
        }
    }
}

/// Collect flat class rules from every `<style>` element in the document.
///
/// Rules with combinators, pseudo-classes, type or id selectors are ignored,
/// as are at-rules. A selector group contributes each of its simple-class
/// members.
pub fn extract_rules(doc: &Document) -> StyleRules {
    let mut rules = StyleRules::default();
    let sheets = std::iter::once(&doc.root)
        .chain(doc.root.descendants())
        .filter(|el| el.is("style") && is_css(el));
    for sheet in sheets {
        for rule in css::parse_stylesheet(&sheet.text_content()) {
            for selector in &rule.selectors {
                if let Some(class) = css::simple_class(selector) {
                    rules.add(class, &rule.declarations);
                }
            }
        }
    }
    rules
}

fn is_css(style: &Element) -> bool {
    style
        .attr("type")
        .map_or(true, |t| t.trim().eq_ignore_ascii_case("text/css"))
}

/// Set class-rule properties as attributes on `el` and its descendants,
/// never replacing an attribute that is already present.
pub fn apply_rules(el: &mut Element, rules: &StyleRules) {
    if rules.is_empty() {
        return;
    }
    el.walk_mut(&mut |el| {
        let classes: Vec<String> = el.class_names().map(str::to_string).collect();
        for class in classes {
            let Some(declarations) = rules.get(&class) else {
                continue;
            };
            for (property, value) in declarations {
                if !el.has_attr(property) {
                    el.set_attr(property.clone(), value.clone());
                }
            }
        }
    });
}

/// Copy inline `style` declarations for presentation properties onto
/// attributes of `el` and its descendants, never replacing existing ones.
///
/// The `style` attribute itself is left in place.
pub fn inline_styles(el: &mut Element) {
    el.walk_mut(&mut |el| {
        let Some(style) = el.attr("style") else {
            return;
        };
        for decl in css::parse_declarations(style) {
            if PRESENTATION_ATTRIBUTES.contains(&decl.property.as_str()) && !el.has_attr(&decl.property) {
                el.set_attr(decl.property, decl.value);
            }
        }
    });
}

/// Run the whole resolver over a document: inline declarations first, then
/// class rules. Returns the rules that were found.
pub fn resolve(doc: &mut Document) -> StyleRules {
    let rules = extract_rules(doc);
    inline_styles(&mut doc.root);
    apply_rules(&mut doc.root, &rules);
    debug!(classes = rules.len(), "resolved styles");
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse;

    fn resolved(markup: &str) -> Document {
        let mut doc = parse(markup).unwrap();
        resolve(&mut doc);
        doc
    }

    fn first_shape(doc: &Document) -> &Element {
        doc.root
            .descendants()
            .find(|e| !e.is("style") && !e.is("g") && !e.is("defs"))
            .unwrap()
    }

    #[test]
    fn test_extract_rules_from_style_blocks() {
        let doc = parse(
            "<svg><style>.a { fill: red } g .b { fill: blue } .c, .d { stroke: #000 }</style></svg>",
        )
        .unwrap();
        let rules = extract_rules(&doc);
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.get("a").unwrap().get("fill").map(String::as_str), Some("red"));
        assert!(rules.get("b").is_none());
        assert!(rules.get("d").unwrap().contains_key("stroke"));
    }

    #[test]
    fn test_later_definition_of_same_class_wins() {
        let doc = parse("<svg><style>.a { fill: red }</style><style>.a { fill: green; opacity: .5 }</style></svg>")
            .unwrap();
        let rules = extract_rules(&doc);
        let a = rules.get("a").unwrap();
        assert_eq!(a.get("fill").map(String::as_str), Some("green"));
        assert_eq!(a.get("opacity").map(String::as_str), Some(".5"));
    }

    #[test]
    fn test_non_css_style_blocks_are_ignored() {
        let doc = parse(r#"<svg><style type="text/less">.a { fill: red }</style></svg>"#).unwrap();
        assert!(extract_rules(&doc).is_empty());
    }

    #[test]
    fn test_explicit_attribute_beats_class_rule() {
        let doc = resolved(r#"<svg><style>.a { fill: red; stroke: black }</style><rect class="a" fill="blue"/></svg>"#);
        let rect = first_shape(&doc);
        assert_eq!(rect.attr("fill"), Some("blue"));
        assert_eq!(rect.attr("stroke"), Some("black"));
    }

    #[test]
    fn test_first_class_wins() {
        let doc = resolved(r#"<svg><style>.a { fill: red } .b { fill: green; opacity: 0.5 }</style><rect class="a b"/></svg>"#);
        let rect = first_shape(&doc);
        assert_eq!(rect.attr("fill"), Some("red"));
        assert_eq!(rect.attr("opacity"), Some("0.5"));
    }

    #[test]
    fn test_inline_style_beats_class_rule() {
        let doc = resolved(r#"<svg><style>.a { fill: red }</style><rect class="a" style="fill:#00ff00;cursor:pointer"/></svg>"#);
        let rect = first_shape(&doc);
        assert_eq!(rect.attr("fill"), Some("#00ff00"));
        assert!(!rect.has_attr("cursor"));
        assert_eq!(rect.attr("style"), Some("fill:#00ff00;cursor:pointer"));
    }

    #[test]
    fn test_inline_style_does_not_overwrite_attribute() {
        let doc = resolved(r#"<svg><rect fill="blue" style="fill: red"/></svg>"#);
        assert_eq!(first_shape(&doc).attr("fill"), Some("blue"));
    }

    #[test]
    fn test_paint_server_reference_is_preserved() {
        let doc = resolved(
            r##"<svg><defs><linearGradient id="g"/></defs><style>.a { fill: url(#g) }</style><path class="a" d="M0 0"/><circle style="stroke:url(&quot;#g&quot;)"/></svg>"##,
        );
        let path = doc.root.descendants().find(|e| e.is("path")).unwrap();
        assert_eq!(path.attr("fill"), Some("url(#g)"));
        let circle = doc.root.descendants().find(|e| e.is("circle")).unwrap();
        assert_eq!(circle.attr("stroke"), Some(r##"url("#g")"##));
    }

    #[test]
    fn test_unrecognized_class_properties_copied_through() {
        let doc = resolved(r#"<svg><style>.a { mix-blend-mode: multiply }</style><rect class="a"/></svg>"#);
        assert_eq!(first_shape(&doc).attr("mix-blend-mode"), Some("multiply"));
    }

    #[test]
    fn test_rules_apply_to_nested_elements() {
        let doc = resolved(r#"<svg><style>.st0{fill:#E30613;}</style><g><g><path class="st0" d="M0 0"/></g></g></svg>"#);
        let path = doc.root.descendants().find(|e| e.is("path")).unwrap();
        assert_eq!(path.attr("fill"), Some("#E30613"));
    }
}
