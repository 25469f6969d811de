//! Markup → [`Document`], on top of `quick-xml`'s pull reader.
//!
//! The reader does the XML well-formedness work (tag balance, attribute
//! syntax, duplicate attributes). This layer builds the owned tree and
//! applies the few normalizations the rest of the pipeline relies on:
//!
//! - the XML declaration, DOCTYPE and processing instructions are dropped
//! - entities declared in the DOCTYPE internal subset are expanded
//! - CDATA sections become ordinary text
//! - whitespace-only text is dropped unless the parent carries text

use std::borrow::Cow;
use std::collections::HashMap;

use quick_xml::escape::unescape_with;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{local_name, Attributes, Document, Element, Node, MAX_DEPTH};
use crate::error::ParseError;

/// Elements whose whitespace-only text is content, not formatting.
pub(crate) const TEXT_BEARING: &[&str] = &["text", "tspan", "textPath", "title", "desc", "style", "script"];

/// Parse SVG markup into a document.
///
/// Fails when the markup is not well-formed XML, has no root element, or the
/// root element is not `<svg>`.
pub fn parse(markup: &str) -> Result<Document, ParseError> {
    let mut reader = Reader::from_str(markup);
    let mut entities: HashMap<String, String> = HashMap::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| ParseError::Malformed {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                check_depth(&stack)?;
                let el = start_element(&e, &entities, &reader)?;
                if root.is_some() && stack.is_empty() {
                    return Err(ParseError::MultipleRoots);
                }
                stack.push(el);
            }
            Event::Empty(e) => {
                check_depth(&stack)?;
                let el = start_element(&e, &entities, &reader)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(_) => {
                // quick-xml already verified the end name matches.
                if let Some(el) = stack.pop() {
                    attach(&mut stack, &mut root, el)?;
                }
            }
            Event::Text(t) => {
                let raw = utf8(&t, &reader)?;
                let text = unescape(raw, &entities, &reader)?;
                push_text(&mut stack, text.into_owned());
            }
            Event::CData(c) => {
                let raw = utf8(&c, &reader)?;
                push_text(&mut stack, raw.to_string());
            }
            Event::Comment(c) => {
                if let Some(parent) = stack.last_mut() {
                    let raw = utf8(&c, &reader)?;
                    parent.children.push(Node::Comment(raw.to_string()));
                }
            }
            Event::DocType(d) => {
                let raw = utf8(&d, &reader)?;
                entities.extend(internal_entities(raw));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(ParseError::Unclosed { name: open.name });
    }

    let root = root.ok_or(ParseError::MissingRoot)?;
    if local_name(&root.name) != "svg" {
        return Err(ParseError::NotSvg { found: root.name });
    }
    Ok(Document::new(root))
}

/// Every later pass walks the tree recursively, so nesting is capped here.
fn check_depth(stack: &[Element]) -> Result<(), ParseError> {
    if stack.len() >= MAX_DEPTH {
        return Err(ParseError::TooDeep { limit: MAX_DEPTH });
    }
    Ok(())
}

fn start_element<'r>(
    e: &BytesStart<'_>,
    entities: &HashMap<String, String>,
    reader: &Reader<&'r [u8]>,
) -> Result<Element, ParseError> {
    let name = utf8(e.name().as_ref(), reader)?.to_string();
    let mut attributes = Attributes::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::Malformed {
            position: reader.buffer_position() as u64,
            message: err.to_string(),
        })?;
        let key = utf8(attr.key.as_ref(), reader)?.to_string();
        let raw = utf8(&attr.value, reader)?;
        let value = unescape(raw, entities, reader)?;
        attributes.insert(key, value.into_owned());
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None if root.is_some() => return Err(ParseError::MultipleRoots),
        None => *root = Some(el),
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: String) {
    // Text outside the root element is ignored.
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if text.trim().is_empty() && !TEXT_BEARING.contains(&parent.local_name()) {
        return;
    }
    if let Some(Node::Text(prev)) = parent.children.last_mut() {
        prev.push_str(&text);
    } else {
        parent.children.push(Node::Text(text));
    }
}

fn utf8<'a>(bytes: &'a [u8], reader: &Reader<&[u8]>) -> Result<&'a str, ParseError> {
    std::str::from_utf8(bytes).map_err(|e| ParseError::Malformed {
        position: reader.buffer_position() as u64,
        message: e.to_string(),
    })
}

fn unescape<'a>(
    raw: &'a str,
    entities: &HashMap<String, String>,
    reader: &Reader<&[u8]>,
) -> Result<Cow<'a, str>, ParseError> {
    unescape_with(raw, |name| {
        predefined_entity(name).or_else(|| entities.get(name).map(String::as_str))
    })
    .map_err(|e| ParseError::Malformed {
        position: reader.buffer_position() as u64,
        message: e.to_string(),
    })
}

fn predefined_entity(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}

/// Collect `<!ENTITY name "value">` declarations from a DOCTYPE body.
///
/// Illustrator exports declare namespace URIs this way and then reference them
/// as `xmlns:x="&ns_extend;"`. Parameter entities (`<!ENTITY % ...>`) and
/// external entities (`SYSTEM`/`PUBLIC`) are ignored; nothing is ever fetched.
fn internal_entities(doctype: &str) -> Vec<(String, String)> {
    let mut found = Vec::new();
    let mut rest = doctype;
    while let Some(start) = rest.find("<!ENTITY") {
        rest = &rest[start + "<!ENTITY".len()..];
        let decl = rest.trim_start();
        if decl.starts_with('%') {
            continue;
        }
        let name_end = decl
            .find(|c: char| c.is_whitespace())
            .unwrap_or(decl.len());
        let name = &decl[..name_end];
        let after = decl[name_end..].trim_start();
        let Some(quote) = after.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        let body = &after[1..];
        if let Some(close) = body.find(quote) {
            if !name.is_empty() {
                found.push((name.to_string(), body[..close].to_string()));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_tree() {
        let doc = parse(r#"<svg viewBox="0 0 50 50"><g id="a"><rect width="5"/></g></svg>"#)
            .unwrap();
        assert_eq!(doc.root.name, "svg");
        assert_eq!(doc.root.attr("viewBox"), Some("0 0 50 50"));
        let g = doc.root.child_elements().next().unwrap();
        assert_eq!(g.attr("id"), Some("a"));
        assert_eq!(g.child_elements().next().unwrap().name, "rect");
    }

    #[test]
    fn test_parse_keeps_attribute_order() {
        let doc = parse(r#"<svg><rect y="1" x="2" width="3"/></svg>"#).unwrap();
        let rect = doc.root.child_elements().next().unwrap();
        let keys: Vec<&str> = rect.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["y", "x", "width"]);
    }

    #[test]
    fn test_parse_rejects_non_svg_root() {
        let err = parse("<html><body/></html>").unwrap_err();
        assert_eq!(
            err,
            ParseError::NotSvg {
                found: "html".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_empty_input() {
        assert_eq!(parse("").unwrap_err(), ParseError::MissingRoot);
        assert_eq!(parse("   <!-- nothing -->  ").unwrap_err(), ParseError::MissingRoot);
    }

    #[test]
    fn test_parse_rejects_mismatched_tags() {
        assert!(matches!(
            parse("<svg><g></svg>").unwrap_err(),
            ParseError::Malformed { .. }
        ));
    }

    #[test]
    fn test_parse_rejects_unclosed_root() {
        assert!(matches!(
            parse("<svg><rect/>").unwrap_err(),
            ParseError::Unclosed { .. } | ParseError::Malformed { .. }
        ));
    }

    #[test]
    fn test_parse_rejects_second_root() {
        assert_eq!(parse("<svg/><svg/>").unwrap_err(), ParseError::MultipleRoots);
    }

    #[test]
    fn test_parse_drops_formatting_whitespace() {
        let doc = parse("<svg>\n  <g>\n    <rect/>\n  </g>\n</svg>").unwrap();
        assert_eq!(doc.root.children.len(), 1);
        let g = doc.root.child_elements().next().unwrap();
        assert_eq!(g.children.len(), 1);
    }

    #[test]
    fn test_parse_keeps_text_whitespace() {
        let doc = parse("<svg><text><tspan>A</tspan> <tspan>B</tspan></text></svg>").unwrap();
        let text = doc.root.child_elements().next().unwrap();
        assert_eq!(text.text_content(), "A B");
    }

    #[test]
    fn test_parse_cdata_becomes_text() {
        let doc = parse("<svg><style><![CDATA[.a > .b { fill: red }]]></style></svg>").unwrap();
        let style = doc.root.child_elements().next().unwrap();
        assert_eq!(style.text_content(), ".a > .b { fill: red }");
    }

    #[test]
    fn test_parse_resolves_doctype_entities() {
        let markup = r#"<?xml version="1.0"?>
<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd" [
  <!ENTITY ns_svg "http://www.w3.org/2000/svg">
  <!ENTITY brand 'Acme'>
]>
<svg xmlns="&ns_svg;"><title>&brand; &amp; Co</title></svg>"#;
        let doc = parse(markup).unwrap();
        assert_eq!(doc.root.attr("xmlns"), Some("http://www.w3.org/2000/svg"));
        let title = doc.root.child_elements().next().unwrap();
        assert_eq!(title.text_content(), "Acme & Co");
    }

    #[test]
    fn test_parse_unknown_entity_is_error() {
        assert!(matches!(
            parse("<svg><title>&nope;</title></svg>").unwrap_err(),
            ParseError::Malformed { .. }
        ));
    }

    #[test]
    fn test_parse_rejects_deep_nesting() {
        let deep = format!("<svg>{}{}</svg>", "<g>".repeat(MAX_DEPTH), "</g>".repeat(MAX_DEPTH));
        assert_eq!(
            parse(&deep).unwrap_err(),
            ParseError::TooDeep { limit: MAX_DEPTH }
        );

        let deep_leaf = format!("<svg>{}<rect/>{}</svg>", "<g>".repeat(MAX_DEPTH - 1), "</g>".repeat(MAX_DEPTH - 1));
        assert!(matches!(parse(&deep_leaf).unwrap_err(), ParseError::TooDeep { .. }));
    }

    #[test]
    fn test_parse_accepts_nesting_at_the_limit() {
        let n = MAX_DEPTH - 1;
        let markup = format!("<svg>{}{}</svg>", "<g>".repeat(n), "</g>".repeat(n));
        assert!(parse(&markup).is_ok());
    }

    #[test]
    fn test_parse_keeps_comments() {
        let doc = parse("<svg><!-- generator --><rect/></svg>").unwrap();
        assert!(matches!(doc.root.children[0], Node::Comment(ref c) if c == " generator "));
    }
}
