//! A deliberately small CSS reader.
//!
//! Recognizes rule sets (`prelude { prop: value; ... }`) and declaration lists.
//! At-rules are skipped together with their blocks, nested blocks inside a
//! rule are skipped, comments are dropped. Every loop iteration consumes at
//! least one character and nesting is capped, so hostile input costs linear
//! time and bounded depth.

/// Deepest `{ }` nesting the reader will follow before giving up on the sheet.
const MAX_DEPTH: usize = 32;

/// One `property: value` pair. Property names are lowercased.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

/// A rule set: the comma-separated selector list and its declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub selectors: Vec<String>,
    pub declarations: Vec<Declaration>,
}

/// Parse a style sheet into rule sets. Never fails; unreadable parts are skipped.
pub fn parse_stylesheet(input: &str) -> Vec<Rule> {
    Reader::new(input).stylesheet()
}

/// Parse a declaration list such as the body of a `style` attribute.
pub fn parse_declarations(input: &str) -> Vec<Declaration> {
    Reader::new(input).declarations(false)
}

/// The class name of a selector that is exactly one class (`.brand`).
///
/// Compound (`.a.b`), descendant (`g .a`), attribute, pseudo-class and type
/// selectors all return `None`.
pub fn simple_class(selector: &str) -> Option<&str> {
    let name = selector.trim().strip_prefix('.')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    let starts_ok = first.is_ascii_alphabetic() || first == '_' || first == '-' || !first.is_ascii();
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii());
    (starts_ok && rest_ok).then_some(name)
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Reader { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_comment(&self) -> bool {
        self.src[self.pos..].starts_with("/*")
    }

    fn skip_comment(&mut self) {
        match self.src[self.pos + 2..].find("*/") {
            Some(end) => self.pos += 2 + end + 2,
            None => self.pos = self.src.len(),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            if self.at_comment() {
                self.skip_comment();
            } else if self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            } else {
                return;
            }
        }
    }

    /// Consume a quoted string whose opening quote was just read.
    fn skip_string(&mut self, quote: char) {
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                c if c == quote => return,
                _ => {}
            }
        }
    }

    /// Consume a block whose `{` was just read, including nested blocks.
    fn skip_block(&mut self) {
        let mut depth = 1usize;
        while depth > 0 {
            if self.at_comment() {
                self.skip_comment();
                continue;
            }
            match self.bump() {
                None => return,
                Some('{') => {
                    depth += 1;
                    if depth > MAX_DEPTH {
                        self.pos = self.src.len();
                        return;
                    }
                }
                Some('}') => depth -= 1,
                Some(q @ ('"' | '\'')) => self.skip_string(q),
                Some(_) => {}
            }
        }
    }

    fn stylesheet(&mut self) -> Vec<Rule> {
        let mut rules = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return rules,
                Some('@') => self.at_rule(),
                Some('}') | Some(';') => {
                    self.bump();
                }
                Some(_) => {
                    if let Some(rule) = self.rule() {
                        rules.push(rule);
                    }
                }
            }
        }
    }

    /// `@import ...;`, `@media ... { ... }`, `@font-face { ... }`: all skipped.
    fn at_rule(&mut self) {
        while let Some(c) = self.bump() {
            match c {
                ';' => return,
                '{' => {
                    self.skip_block();
                    return;
                }
                q @ ('"' | '\'') => self.skip_string(q),
                _ => {}
            }
        }
    }

    fn rule(&mut self) -> Option<Rule> {
        let mut prelude = String::new();
        let mut start = self.pos;
        loop {
            if self.at_comment() {
                prelude.push_str(&self.src[start..self.pos]);
                self.skip_comment();
                start = self.pos;
                continue;
            }
            match self.bump() {
                None => return None,
                Some('{') => {
                    prelude.push_str(&self.src[start..self.pos - 1]);
                    break;
                }
                Some(';') => return None,
                Some(q @ ('"' | '\'')) => self.skip_string(q),
                Some(_) => {}
            }
        }
        Some(Rule {
            selectors: split_selectors(&prelude),
            declarations: self.declarations(true),
        })
    }

    /// Declarations up to the closing `}` (when `in_block`) or end of input.
    fn declarations(&mut self, in_block: bool) -> Vec<Declaration> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return out,
                Some('}') => {
                    self.bump();
                    if in_block {
                        return out;
                    }
                }
                Some(';') => {
                    self.bump();
                }
                Some(_) => {
                    if let Some(decl) = self.declaration() {
                        out.push(decl);
                    }
                }
            }
        }
    }

    fn declaration(&mut self) -> Option<Declaration> {
        let start = self.pos;
        loop {
            match self.peek() {
                None => return None,
                Some(':') => break,
                // Leave the terminator for the caller.
                Some(';') | Some('}') => return None,
                Some('{') => {
                    self.bump();
                    self.skip_block();
                    return None;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        let property = self.src[start..self.pos].trim().to_ascii_lowercase();
        self.bump();

        let mut value = String::new();
        let mut parens = 0usize;
        loop {
            if self.at_comment() {
                self.skip_comment();
                continue;
            }
            match self.peek() {
                None => break,
                Some(';') | Some('}') if parens == 0 => break,
                Some(c) => {
                    self.bump();
                    match c {
                        '(' => parens += 1,
                        ')' => parens = parens.saturating_sub(1),
                        '"' | '\'' => {
                            let from = self.pos;
                            self.skip_string(c);
                            value.push(c);
                            value.push_str(&self.src[from..self.pos]);
                            continue;
                        }
                        _ => {}
                    }
                    value.push(c);
                }
            }
        }

        let value = strip_important(value.trim());
        if property.is_empty() || value.is_empty() {
            return None;
        }
        Some(Declaration {
            property,
            value: value.to_string(),
        })
    }
}

fn split_selectors(prelude: &str) -> Vec<String> {
    prelude
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_important(value: &str) -> &str {
    let lower = value.to_ascii_lowercase();
    match lower.rfind("!important") {
        Some(idx) if lower[idx..].trim_end() == "!important" => value[..idx].trim_end(),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(property: &str, value: &str) -> Declaration {
        Declaration {
            property: property.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_parse_simple_rules() {
        let rules = parse_stylesheet(".st0{fill:#E30613;} .st1 { stroke: #000; stroke-width: 2 }");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].selectors, vec![".st0"]);
        assert_eq!(rules[0].declarations, vec![decl("fill", "#E30613")]);
        assert_eq!(
            rules[1].declarations,
            vec![decl("stroke", "#000"), decl("stroke-width", "2")]
        );
    }

    #[test]
    fn test_parse_selector_groups() {
        let rules = parse_stylesheet(".a, .b,g .c { fill: red }");
        assert_eq!(rules[0].selectors, vec![".a", ".b", "g .c"]);
    }

    #[test]
    fn test_skips_at_rules_and_comments() {
        let rules = parse_stylesheet(
            "@import url(x.css); /* c { } */ @media print { .a { fill: red } } .b { /* x */ fill: blue /* y */ }",
        );
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].selectors, vec![".b"]);
        assert_eq!(rules[0].declarations, vec![decl("fill", "blue")]);
    }

    #[test]
    fn test_value_keeps_urls_with_semicolons() {
        let rules = parse_stylesheet(".a { fill: url(#grad); mask: url(data:image/png;base64,AAAA) }");
        assert_eq!(
            rules[0].declarations,
            vec![
                decl("fill", "url(#grad)"),
                decl("mask", "url(data:image/png;base64,AAAA)")
            ]
        );
    }

    #[test]
    fn test_strips_important_and_lowercases_property() {
        let decls = parse_declarations("FILL: Red !important; opacity:.5");
        assert_eq!(decls, vec![decl("fill", "Red"), decl("opacity", ".5")]);
    }

    #[test]
    fn test_declarations_tolerate_garbage() {
        let decls = parse_declarations(";;fill;stroke:;: red; fill: blue}");
        assert_eq!(decls, vec![decl("fill", "blue")]);
    }

    #[test]
    fn test_quoted_values() {
        let decls = parse_declarations(r#"font-family: "Open Sans; Bold", sans-serif"#);
        assert_eq!(decls, vec![decl("font-family", r#""Open Sans; Bold", sans-serif"#)]);
    }

    #[test]
    fn test_unterminated_input_is_bounded() {
        assert!(parse_stylesheet(".a { fill: red").len() == 1);
        assert!(parse_stylesheet(".a").is_empty());
        let deep = "{".repeat(10_000);
        assert!(parse_stylesheet(&format!("@media x {deep}")).is_empty());
    }

    #[test]
    fn test_simple_class() {
        assert_eq!(simple_class(".brand"), Some("brand"));
        assert_eq!(simple_class(" .st-0_x "), Some("st-0_x"));
        assert_eq!(simple_class(".a.b"), None);
        assert_eq!(simple_class("g .a"), None);
        assert_eq!(simple_class(".a:hover"), None);
        assert_eq!(simple_class("rect"), None);
        assert_eq!(simple_class(".9a"), None);
    }
}
