//! Parser for the markup fragments returned by the identify endpoint.
//!
//! The endpoint answers a capture with one rendered tile: a single root
//! element wrapping a thumbnail and a few text lines. This is not a general
//! HTML parser; it accepts the practical shape of rendered template output
//! (quoted or unquoted attributes, void elements, character entities,
//! comments, surrounding whitespace) and insists on exactly one root element.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FragmentError {
    #[error("fragment contains no root element")]
    NoRoot,
    #[error("fragment has content outside its root element")]
    TrailingContent,
    #[error("unclosed <{0}> tag")]
    Unclosed(String),
    #[error("mismatched </{found}>, expected </{open}>")]
    Mismatched { open: String, found: String },
    #[error("malformed markup at byte {0}")]
    Malformed(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// One parsed element. Tag and attribute names are lowercased; text nodes
/// are entity-decoded with whitespace collapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|list| list.split_whitespace().any(|part| part == class))
            .unwrap_or(false)
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// All elements below this one in document order, excluding itself.
    pub fn descendants(&self) -> Descendants<'_> {
        let mut stack: Vec<&Element> = self.child_elements().collect();
        stack.reverse();
        Descendants { stack }
    }

    pub fn find(&self, tag: &str) -> Option<&Element> {
        self.descendants().find(|element| element.name == tag)
    }

    /// Concatenated text content of this element and everything below it.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        self.collect_text(&mut parts);
        parts.join(" ")
    }

    fn collect_text<'a>(&'a self, parts: &mut Vec<&'a str>) {
        for node in &self.children {
            match node {
                Node::Text(text) => parts.push(text),
                Node::Element(element) => element.collect_text(parts),
            }
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        let children: Vec<&Element> = element.child_elements().collect();
        for child in children.into_iter().rev() {
            self.stack.push(child);
        }
        Some(element)
    }
}

/// Parses a fragment body into its single root element. Whitespace and
/// comments may surround the root; anything else outside it is an error.
pub fn parse(input: &str) -> Result<Element, FragmentError> {
    let mut parser = Parser::new(input);
    parser.skip_trivia()?;
    if parser.at_end() || parser.peek() != Some(b'<') {
        return Err(FragmentError::NoRoot);
    }
    let root = parser.parse_element()?;
    parser.skip_trivia()?;
    if !parser.at_end() {
        return Err(FragmentError::TrailingContent);
    }
    Ok(root)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn bump(&mut self, n: usize) {
        self.pos += n;
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.src[self.pos..].starts_with(prefix)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.bump(1);
        }
    }

    fn skip_trivia(&mut self) -> Result<(), FragmentError> {
        loop {
            self.skip_whitespace();
            if !self.skip_comment()? {
                return Ok(());
            }
        }
    }

    fn skip_comment(&mut self) -> Result<bool, FragmentError> {
        if !self.starts_with("<!--") {
            return Ok(false);
        }
        match self.src[self.pos..].find("-->") {
            Some(end) => {
                self.pos += end + 3;
                Ok(true)
            }
            None => Err(FragmentError::Malformed(self.pos)),
        }
    }

    fn parse_element(&mut self) -> Result<Element, FragmentError> {
        self.bump(1); // consume '<'
        let name = self.read_name()?;
        let mut attrs = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'>') => {
                    self.bump(1);
                    break;
                }
                Some(b'/') if self.starts_with("/>") => {
                    self.bump(2);
                    return Ok(Element {
                        name,
                        attrs,
                        children: Vec::new(),
                    });
                }
                Some(b'/') => self.bump(1),
                Some(_) => attrs.push(self.read_attr()?),
                None => return Err(FragmentError::Unclosed(name)),
            }
        }
        if is_void(&name) {
            return Ok(Element {
                name,
                attrs,
                children: Vec::new(),
            });
        }
        let children = self.parse_children(&name)?;
        Ok(Element {
            name,
            attrs,
            children,
        })
    }

    fn parse_children(&mut self, open: &str) -> Result<Vec<Node>, FragmentError> {
        let mut children = Vec::new();
        loop {
            if self.at_end() {
                return Err(FragmentError::Unclosed(open.to_string()));
            }
            if self.starts_with("</") {
                let close_pos = self.pos;
                self.bump(2);
                let name = self.read_name()?;
                self.skip_whitespace();
                if self.peek() != Some(b'>') {
                    return Err(FragmentError::Malformed(close_pos));
                }
                self.bump(1);
                if name != open {
                    return Err(FragmentError::Mismatched {
                        open: open.to_string(),
                        found: name,
                    });
                }
                return Ok(children);
            }
            if self.skip_comment()? {
                continue;
            }
            if self.peek() == Some(b'<') {
                children.push(Node::Element(self.parse_element()?));
                continue;
            }
            let text = self.read_text();
            if !text.is_empty() {
                children.push(Node::Text(text));
            }
        }
    }

    fn read_name(&mut self) -> Result<String, FragmentError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':' {
                self.bump(1);
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(FragmentError::Malformed(start));
        }
        Ok(self.src[start..self.pos].to_ascii_lowercase())
    }

    fn read_attr(&mut self) -> Result<(String, String), FragmentError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || b == b'=' || b == b'>' || b == b'/' {
                break;
            }
            self.bump(1);
        }
        if self.pos == start {
            return Err(FragmentError::Malformed(start));
        }
        let name = self.src[start..self.pos].to_ascii_lowercase();
        self.skip_whitespace();
        if self.peek() != Some(b'=') {
            // boolean attribute
            return Ok((name, String::new()));
        }
        self.bump(1);
        self.skip_whitespace();
        let value = self.read_attr_value()?;
        Ok((name, value))
    }

    fn read_attr_value(&mut self) -> Result<String, FragmentError> {
        match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                self.bump(1);
                let start = self.pos;
                while let Some(b) = self.peek() {
                    if b == quote {
                        break;
                    }
                    self.bump(1);
                }
                if self.at_end() {
                    return Err(FragmentError::Malformed(start));
                }
                let raw = &self.src[start..self.pos];
                self.bump(1);
                Ok(decode_entities(raw))
            }
            Some(_) => {
                let start = self.pos;
                while let Some(b) = self.peek() {
                    if b.is_ascii_whitespace() || b == b'>' {
                        break;
                    }
                    self.bump(1);
                }
                Ok(decode_entities(&self.src[start..self.pos]))
            }
            None => Err(FragmentError::Malformed(self.pos)),
        }
    }

    fn read_text(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'<' {
                break;
            }
            self.bump(1);
        }
        let decoded = decode_entities(&self.src[start..self.pos]);
        decoded.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn is_void(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match rest.find(';') {
            Some(semi) if semi <= 10 => match decode_entity(&rest[1..semi]) {
                Some(ch) => {
                    out.push(ch);
                    rest = &rest[semi + 1..];
                }
                None => {
                    out.push('&');
                    rest = &rest[1..];
                }
            },
            _ => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = entity.strip_prefix('#')?;
            let value = if let Some(hex) = code.strip_prefix('x').or_else(|| code.strip_prefix('X'))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                code.parse::<u32>().ok()?
            };
            char::from_u32(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_root() {
        let root = parse(r#"<div id="slot-1">RESULT</div>"#).unwrap();
        assert_eq!(root.name, "div");
        assert_eq!(root.id(), Some("slot-1"));
        assert_eq!(root.text(), "RESULT");
        assert!(root.children.len() == 1);
    }

    #[test]
    fn test_parse_card_tile() {
        let body = r#"
            <div id="slot-3" class="tile">
              <img class="thumb" src="data:image/jpeg;base64,/9j/4AAQ" alt="Pikachu">
              <div class="meta">
                <div class="title">Pikachu</div>
                <div class="sub">Scarlet &amp; Violet Promo &middot; SVP001</div>
                <div class="muted">confidence 0.93</div>
              </div>
            </div>
        "#;
        let root = parse(body).unwrap();
        assert_eq!(root.id(), Some("slot-3"));
        assert!(root.has_class("tile"));

        let img = root.find("img").unwrap();
        assert_eq!(img.attr("src"), Some("data:image/jpeg;base64,/9j/4AAQ"));

        let titles: Vec<String> = root
            .descendants()
            .filter(|el| el.has_class("title"))
            .map(|el| el.text())
            .collect();
        assert_eq!(titles, vec!["Pikachu".to_string()]);
    }

    #[test]
    fn test_attribute_quoting_styles() {
        let root = parse(r#"<div a="one" b='two' c=three d></div>"#).unwrap();
        assert_eq!(root.attr("a"), Some("one"));
        assert_eq!(root.attr("b"), Some("two"));
        assert_eq!(root.attr("c"), Some("three"));
        assert_eq!(root.attr("d"), Some(""));
    }

    #[test]
    fn test_void_and_self_closing_elements() {
        let root = parse("<div><img src=x><br><span/></div>").unwrap();
        let names: Vec<&str> = root.child_elements().map(|el| el.name.as_str()).collect();
        assert_eq!(names, vec!["img", "br", "span"]);
    }

    #[test]
    fn test_entities_decoded() {
        let root = parse(r#"<div title="a&amp;b">1 &lt; 2 &#169; &#x41;</div>"#).unwrap();
        assert_eq!(root.attr("title"), Some("a&b"));
        assert_eq!(root.text(), "1 < 2 \u{a9} A");
    }

    #[test]
    fn test_unknown_entity_kept_literal() {
        let root = parse("<div>fish &chips; &nbsp</div>").unwrap();
        assert_eq!(root.text(), "fish &chips; &nbsp");
    }

    #[test]
    fn test_comments_and_whitespace_around_root() {
        let root = parse("  <!-- rendered tile -->\n <div>ok</div> <!-- end --> ").unwrap();
        assert_eq!(root.text(), "ok");
    }

    #[test]
    fn test_case_insensitive_tags() {
        let root = parse("<DIV Class=\"Tile\">x</div>").unwrap();
        assert_eq!(root.name, "div");
        assert_eq!(root.attr("class"), Some("Tile"));
    }

    #[test]
    fn test_text_whitespace_collapsed() {
        let root = parse("<div>  a\n   b\t c  </div>").unwrap();
        assert_eq!(root.text(), "a b c");
    }

    #[test]
    fn test_empty_fragment_rejected() {
        assert_eq!(parse(""), Err(FragmentError::NoRoot));
        assert_eq!(parse("   \n\t"), Err(FragmentError::NoRoot));
        assert_eq!(parse("<!-- nothing -->"), Err(FragmentError::NoRoot));
        assert_eq!(parse("just text"), Err(FragmentError::NoRoot));
    }

    #[test]
    fn test_second_root_rejected() {
        assert_eq!(
            parse("<div>a</div><div>b</div>"),
            Err(FragmentError::TrailingContent)
        );
        assert_eq!(
            parse("<div>a</div> trailing"),
            Err(FragmentError::TrailingContent)
        );
    }

    #[test]
    fn test_mismatched_close_rejected() {
        assert_eq!(
            parse("<div><span>x</div></div>"),
            Err(FragmentError::Mismatched {
                open: "span".to_string(),
                found: "div".to_string(),
            })
        );
    }

    #[test]
    fn test_unclosed_rejected() {
        assert_eq!(
            parse("<div><span>x"),
            Err(FragmentError::Unclosed("span".to_string()))
        );
    }

    #[test]
    fn test_descendants_document_order() {
        let root = parse("<a><b><c></c></b><d></d></a>").unwrap();
        let names: Vec<&str> = root.descendants().map(|el| el.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "d"]);
    }
}
