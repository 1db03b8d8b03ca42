//! HTML fragment parsing and `innerHTML`-style serialization.

use verso_common::{ParseError, ParseErrorKind};

use crate::document::{Document, NodeData, NodeId};
use crate::unicode::NBSP;

/// Elements serialized without a closing tag and never given children.
pub const VOID_ELEMENTS: &[&str] = &[
    "br", "hr", "img", "input", "col", "wbr", "area", "embed", "source", "track", "meta", "link",
    "param", "base",
];

/// Openers that implicitly close an open `<p>`.
const CLOSES_P: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "details",
    "div",
    "dl",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "ul",
];

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

/// Parse `src` into detached top-level nodes owned by `doc`, in order.
pub fn parse_fragment(doc: &mut Document, src: &str) -> Result<Vec<NodeId>, ParseError> {
    let mut parser = Parser {
        doc,
        src,
        pos: 0,
        stack: Vec::new(),
        top: Vec::new(),
    };
    parser.run()?;
    Ok(parser.top)
}

struct Parser<'d, 's> {
    doc: &'d mut Document,
    src: &'s str,
    pos: usize,
    stack: Vec<NodeId>,
    top: Vec<NodeId>,
}

impl<'s> Parser<'_, 's> {
    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn run(&mut self) -> Result<(), ParseError> {
        while self.pos < self.src.len() {
            let rest = self.rest();
            if rest.starts_with("<!--") {
                match rest[4..].find("-->") {
                    Some(end) => self.pos += 4 + end + 3,
                    None => {
                        return Err(self.error(ParseErrorKind::UnterminatedComment, rest.len()));
                    }
                }
            } else if rest.starts_with("</") {
                self.end_tag()?;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                match rest.find('>') {
                    Some(end) => self.pos += end + 1,
                    None => {
                        return Err(
                            self.error(ParseErrorKind::UnterminatedTag(String::new()), rest.len())
                        );
                    }
                }
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                self.start_tag()?;
            } else if rest == "<" {
                return Err(self
                    .error(ParseErrorKind::UnterminatedTag(String::new()), 1)
                    .with_advice("escape a literal `<` as `&lt;`"));
            } else {
                let skip = usize::from(rest.starts_with('<'));
                let end = rest[skip..].find('<').map_or(rest.len(), |i| i + skip);
                let text = decode_entities(&rest[..end]);
                self.pos += end;
                self.push_text(text);
            }
        }
        Ok(())
    }

    fn error(&self, kind: ParseErrorKind, len: usize) -> ParseError {
        ParseError::new(kind, self.src, self.pos, len)
    }

    fn current(&self) -> Option<NodeId> {
        self.stack.last().copied()
    }

    fn current_tag(&self) -> Option<&str> {
        self.current().and_then(|c| self.doc.tag(c))
    }

    fn attach(&mut self, node: NodeId) {
        match self.current() {
            // the stack only ever holds elements
            Some(parent) => {
                let _ = self.doc.append_child(parent, node);
            }
            None => self.top.push(node),
        }
    }

    fn push_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let last = match self.current() {
            Some(parent) => self.doc.last_child(parent),
            None => self.top.last().copied(),
        };
        if let Some(prev) = last.filter(|l| self.doc.is_text(*l)) {
            let joined = format!("{}{}", self.doc.text(prev).unwrap_or_default(), text);
            self.doc.set_text(prev, joined);
            return;
        }
        let node = self.doc.create_text(text);
        self.attach(node);
    }

    fn read_name(&mut self) -> String {
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/' || c == '=')
            .unwrap_or(rest.len());
        self.pos += end;
        rest[..end].to_ascii_lowercase()
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn start_tag(&mut self) -> Result<(), ParseError> {
        let tag_start = self.pos;
        self.pos += 1;
        let tag = self.read_name();
        let mut attrs: Vec<(String, String)> = Vec::new();
        let self_closing;
        loop {
            self.skip_ws();
            let rest = self.rest();
            if rest.is_empty() {
                return Err(ParseError::new(
                    ParseErrorKind::UnterminatedTag(tag.clone()),
                    self.src,
                    tag_start,
                    self.src.len() - tag_start,
                )
                .with_advice("close the tag with `>`"));
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                self_closing = true;
                break;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                self_closing = false;
                break;
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }
            let name = self.read_name();
            if name.is_empty() {
                // stray `=`
                self.pos += 1;
                continue;
            }
            self.skip_ws();
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_ws();
                self.attr_value(&tag)?
            } else {
                String::new()
            };
            if !attrs.iter().any(|(k, _)| *k == name) {
                attrs.push((name, value));
            }
        }

        self.implicit_close(&tag);
        let el = self.doc.create_element(&tag);
        for (k, v) in &attrs {
            self.doc.set_attr(el, k, v);
        }
        self.attach(el);
        if !self_closing && !is_void(&tag) {
            self.stack.push(el);
        }
        Ok(())
    }

    fn attr_value(&mut self, tag: &str) -> Result<String, ParseError> {
        let rest = self.rest();
        if let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') {
            match rest[1..].find(quote) {
                Some(end) => {
                    let raw = &rest[1..1 + end];
                    self.pos += end + 2;
                    Ok(decode_entities(raw))
                }
                None => Err(self.error(
                    ParseErrorKind::UnterminatedAttribute(tag.to_owned()),
                    rest.len(),
                )),
            }
        } else {
            let end = rest
                .find(|c: char| c.is_ascii_whitespace() || c == '>')
                .unwrap_or(rest.len());
            let raw = &rest[..end];
            let raw = raw.strip_suffix('/').filter(|_| rest[end..].starts_with('>')).unwrap_or(raw);
            self.pos += raw.len();
            Ok(decode_entities(raw))
        }
    }

    fn implicit_close(&mut self, tag: &str) {
        if CLOSES_P.contains(&tag) && self.current_tag() == Some("p") {
            self.stack.pop();
        }
        match tag {
            "li" => self.close_until("li", &["ul", "ol"]),
            "td" | "th" => {
                self.close_until("td", &["tr", "table"]);
                self.close_until("th", &["tr", "table"]);
            }
            "tr" => self.close_until("tr", &["table", "thead", "tbody"]),
            _ => {}
        }
    }

    /// Pop up to and including an open `tag`, unless a `barrier` is found first.
    fn close_until(&mut self, tag: &str, barriers: &[&str]) {
        let found = self.stack.iter().rposition(|n| {
            let t = self.doc.tag(*n).unwrap_or_default();
            t == tag || barriers.contains(&t)
        });
        if let Some(i) = found
            && self.doc.tag(self.stack[i]) == Some(tag)
        {
            self.stack.truncate(i);
        }
    }

    fn end_tag(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 2;
        let tag = self.read_name();
        match self.rest().find('>') {
            Some(end) => self.pos += end + 1,
            None => {
                return Err(ParseError::new(
                    ParseErrorKind::UnterminatedTag(format!("/{tag}")),
                    self.src,
                    start,
                    self.src.len() - start,
                ));
            }
        }
        if let Some(i) = self
            .stack
            .iter()
            .rposition(|n| self.doc.tag(*n) == Some(tag.as_str()))
        {
            self.stack.truncate(i);
        } else if tag == "p" {
            // `</p>` without an opener yields an empty paragraph
            let p = self.doc.create_element("p");
            self.attach(p);
        } else if tag == "br" {
            let br = self.doc.create_element("br");
            self.attach(br);
        }
        Ok(())
    }
}

/// Decode the named and numeric character references the editor produces.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_owned();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        rest = &rest[i..];
        let Some(semi) = rest[1..].find(';').map(|j| j + 1).filter(|j| *j <= 10) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let name = &rest[1..semi];
        let decoded = match name {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(NBSP),
            _ => name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| name.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            NBSP => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            NBSP => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

/// `outerHTML` of a node.
pub fn serialize_node(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, id, &mut out);
    out
}

/// `innerHTML` of a node.
pub fn serialize_children(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    for child in doc.children(id) {
        write_node(doc, child, &mut out);
    }
    out
}

fn write_node(doc: &Document, id: NodeId, out: &mut String) {
    match doc.data(id) {
        Some(NodeData::Text(t)) => escape_text(t, out),
        Some(NodeData::Element { tag, attrs }) => {
            out.push('<');
            out.push_str(tag);
            for (k, v) in attrs {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                escape_attr(v, out);
                out.push('"');
            }
            out.push('>');
            if is_void(tag) {
                return;
            }
            for child in doc.children(id) {
                write_node(doc, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(src: &str) -> String {
        let doc = Document::from_html(src).unwrap();
        doc.inner_html(doc.root())
    }

    #[test]
    fn serializes_like_inner_html() {
        assert_eq!(
            round_trip(r#"<P CLASS='x'>a&nbsp;b<BR>c</P><hr/>"#),
            r#"<p class="x">a&nbsp;b<br>c</p><hr>"#
        );
    }

    #[test]
    fn comments_are_dropped_and_entities_decoded() {
        let doc = Document::from_html("<p>&lt;a&gt; &amp; &#65;&#x42;<!-- gone --></p>").unwrap();
        let p = doc.first_child(doc.root()).unwrap();
        assert_eq!(doc.text_content(p), "<a> & AB");
        assert_eq!(doc.child_count(p), 1);
    }

    #[test]
    fn paragraphs_and_list_items_close_implicitly() {
        assert_eq!(round_trip("<p>a<p>b"), "<p>a</p><p>b</p>");
        assert_eq!(
            round_trip("<ul><li>a<li>b</ul>"),
            "<ul><li>a</li><li>b</li></ul>"
        );
        assert_eq!(
            round_trip("<ul><li>a<ul><li>b</ul><li>c</ul>"),
            "<ul><li>a<ul><li>b</li></ul></li><li>c</li></ul>"
        );
    }

    #[test]
    fn bare_attributes_and_stray_close_tags() {
        assert_eq!(
            round_trip("<input disabled type=text>x</span>"),
            r#"<input disabled="" type="text">x"#
        );
    }

    #[test]
    fn unterminated_tag_is_a_diagnostic() {
        let mut doc = Document::new();
        let err = parse_fragment(&mut doc, "<p>ok</p><span class=\"a").unwrap_err();
        assert_eq!(
            err.kind(),
            &ParseErrorKind::UnterminatedAttribute("span".into())
        );
        let err = parse_fragment(&mut doc, "<p>ok</p><em").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::UnterminatedTag("em".into()));
        assert_eq!(err.offset(), 9);
        assert!(parse_fragment(&mut doc, "a <").is_err());
        assert!(parse_fragment(&mut doc, "<!-- open").is_err());
    }

    #[test]
    fn lone_less_than_is_text() {
        assert_eq!(round_trip("<p>1 < 2</p>"), "<p>1 &lt; 2</p>");
    }

    #[test]
    fn serialized_fragments_snapshot() {
        let doc = Document::from_html(
            r#"<table><tbody><tr><td>a<td>b</tr></tbody></table><pre>x<br>y</pre>"#,
        )
        .unwrap();
        let out: Vec<String> = doc
            .children(doc.root())
            .map(|n| doc.outer_html(n))
            .collect();
        insta::assert_yaml_snapshot!(out, @r#"
        - "<table><tbody><tr><td>a</td><td>b</td></tr></tbody></table>"
        - "<pre>x<br>y</pre>"
        "#);
    }
}
