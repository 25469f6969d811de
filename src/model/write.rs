//! [`Document`] → markup.
//!
//! Output is an XML declaration followed by the root element. Elements whose
//! children are all elements are indented two spaces per level. Elements with
//! any text child, and text-bearing elements such as `<text>`, are written
//! inline along with their whole subtree so no whitespace is injected into
//! text content. Because [`parse`](super::parse) drops exactly the whitespace this
//! writer adds, `serialize(parse(serialize(d))) == serialize(d)`.

use quick_xml::escape::{escape, partial_escape};

use super::parse::TEXT_BEARING;
use super::{Document, Element, Node};

/// Serialize a document to a UTF-8 markup string.
pub fn serialize(doc: &Document) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_element(&doc.root, 0, true, &mut out);
    out.push('\n');
    out
}

/// Serialize a single element subtree without a declaration.
pub fn serialize_element(el: &Element) -> String {
    let mut out = String::new();
    write_element(el, 0, false, &mut out);
    out
}

fn write_element(el: &Element, depth: usize, pretty: bool, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (key, value) in &el.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }

    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');

    // Whitespace inside text-bearing elements survives a re-parse, so their
    // whole subtree is written inline.
    let indent_children = pretty
        && !TEXT_BEARING.contains(&el.local_name())
        && el.children.iter().all(|c| !matches!(c, Node::Text(_)));
    for child in &el.children {
        if indent_children {
            newline(depth + 1, out);
        }
        match child {
            Node::Element(e) => write_element(e, depth + 1, indent_children, out),
            Node::Text(t) => out.push_str(&partial_escape(t.as_str())),
            Node::Comment(c) => {
                out.push_str("<!--");
                // "--" may not appear inside a comment.
                out.push_str(&c.replace("--", "- -"));
                out.push_str("-->");
            }
        }
    }
    if indent_children {
        newline(depth, out);
    }

    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

fn newline(depth: usize, out: &mut String) {
    out.push('\n');
    for _ in 0..depth {
        out.push_str("  ");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse;

    #[test]
    fn test_serialize_empty_element() {
        let el = Element::new("rect").with_attr("width", "10");
        assert_eq!(serialize_element(&el), r#"<rect width="10"/>"#);
    }

    #[test]
    fn test_serialize_escapes_attributes_and_text() {
        let el = Element::new("text")
            .with_attr("data-x", "a\"b<c&")
            .with_child(Node::Text("1 < 2 & 3".to_string()));
        assert_eq!(
            serialize_element(&el),
            r#"<text data-x="a&quot;b&lt;c&amp;">1 &lt; 2 &amp; 3</text>"#
        );
    }

    #[test]
    fn test_serialize_indents_element_children() {
        let doc = Document::new(
            Element::new("svg").with_child(Node::Element(
                Element::new("g").with_child(Node::Element(Element::new("rect"))),
            )),
        );
        let out = serialize(&doc);
        assert!(out.starts_with("<?xml"));
        assert!(out.contains("<svg>\n  <g>\n    <rect/>\n  </g>\n</svg>"));
    }

    #[test]
    fn test_serialize_keeps_text_inline() {
        let doc = Document::new(Element::new("svg").with_child(Node::Element(
            Element::new("text")
                .with_child(Node::Element(
                    Element::new("tspan").with_child(Node::Text("A".to_string())),
                ))
                .with_child(Node::Text(" ".to_string()))
                .with_child(Node::Element(
                    Element::new("tspan").with_child(Node::Text("B".to_string())),
                )),
        )));
        let out = serialize(&doc);
        assert!(out.contains("<text><tspan>A</tspan> <tspan>B</tspan></text>"));
    }

    #[test]
    fn test_adjacent_tspans_stay_inline() {
        let doc = parse(r#"<svg><text x="1"><tspan>A</tspan><tspan><tspan>B</tspan></tspan></text></svg>"#).unwrap();
        let out = serialize(&doc);
        assert!(out.contains(r#"<text x="1"><tspan>A</tspan><tspan><tspan>B</tspan></tspan></text>"#));
        let text = parse(&out).unwrap();
        let text = text.root.child_elements().next().unwrap();
        assert_eq!(text.text_content(), "AB");
    }

    #[test]
    fn test_round_trip_is_stable() {
        let markup = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10">
            <defs><linearGradient id="g"><stop offset="0" stop-color="#fff"/></linearGradient></defs>
            <style>.a { fill: url(#g) }</style>
            <!-- keep me -->
            <g class="a" transform="translate(1 2)"><text x="1">Brand &amp; Co</text></g>
        </svg>"##;
        let once = serialize(&parse(markup).unwrap());
        let twice = serialize(&parse(&once).unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_comment_double_dash_is_neutralized() {
        let el = Element::new("g").with_child(Node::Comment("a--b".to_string()));
        assert_eq!(serialize_element(&el), "<g><!--a- -b--></g>");
    }
}
