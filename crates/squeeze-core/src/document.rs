//! HTML head scanning and source-preserving rewriting.
//!
//! Documents go through `lol_html` twice: once to locate the managed
//! elements of the `<head>` (and the first `<base href>`), and once to apply
//! the edits made to them. Markup that was not edited is streamed through
//! byte for byte.
//!
//! Everything before the `<body>` start tag counts as head content, the way
//! HTML parsers place elements that appear before `<head>` or after
//! `</head>`. Comments are opaque: elements inside `<!-- ... -->`, such as IE
//! conditional blocks, are never seen.

use html_escape::{decode_html_entities, encode_double_quoted_attribute};
use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, text, RewriteStrSettings};
use std::cell::{Cell, RefCell};

use crate::element::{AttrEdit, Element, ElementFamily, ElementKind, ElementState};

/// An HTML document with its managed `<head>` elements located.
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    source: String,
    scripts: Vec<Element>,
    stylesheets: Vec<Element>,
    /// Family and index of every visited element, in document order.
    slots: Vec<Option<(ElementFamily, usize)>>,
    base_href: Option<String>,
}

/// State collected by the scanning pass.
#[derive(Default)]
struct Scan {
    visited: Vec<(Element, bool)>,
    base_href: Option<String>,
    in_body: bool,
}

impl HtmlDocument {
    /// Scans `source` for managed elements.
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let scan = RefCell::new(Scan::default());

        let result = rewrite_str(
            &source,
            RewriteStrSettings {
                element_content_handlers: vec![
                    element!("*", |el| {
                        let mut scan = scan.borrow_mut();
                        let tag = el.tag_name().to_ascii_lowercase();
                        match tag.as_str() {
                            "body" => scan.in_body = true,
                            "base" if scan.base_href.is_none() => {
                                scan.base_href = el
                                    .get_attribute("href")
                                    .map(|href| decode_html_entities(&href).into_owned());
                            }
                            _ => {}
                        }

                        let Some(kind) = ElementKind::classify(&tag, |name| el.has_attribute(name))
                        else {
                            return Ok(());
                        };
                        let attrs = el
                            .attributes()
                            .iter()
                            .map(|attr| {
                                (attr.name(), decode_html_entities(&attr.value()).into_owned())
                            })
                            .collect();
                        let text = match kind {
                            ElementKind::Link => None,
                            ElementKind::Script | ElementKind::Style => Some(String::new()),
                        };
                        let in_head = !scan.in_body;
                        scan.visited.push((Element::new(kind, attrs, text), in_head));
                        Ok(())
                    }),
                    text!("style", |chunk| {
                        let mut scan = scan.borrow_mut();
                        if let Some((element, _)) = scan.visited.last_mut() {
                            if element.kind() == ElementKind::Style {
                                element.append_text(chunk.as_str());
                            }
                        }
                        Ok(())
                    }),
                ],
                ..RewriteStrSettings::new()
            },
        );

        let scan = scan.into_inner();
        if let Err(e) = result {
            tracing::debug!(error = %e, "Failed to scan document");
            return Self {
                source,
                scripts: Vec::new(),
                stylesheets: Vec::new(),
                slots: Vec::new(),
                base_href: None,
            };
        }

        let mut scripts = Vec::new();
        let mut stylesheets = Vec::new();
        let mut slots = Vec::with_capacity(scan.visited.len());
        for (element, in_head) in scan.visited {
            if !in_head {
                slots.push(None);
                continue;
            }
            let family = element.kind().family();
            let list = match family {
                ElementFamily::Scripts => &mut scripts,
                ElementFamily::Stylesheets => &mut stylesheets,
            };
            slots.push(Some((family, list.len())));
            list.push(element);
        }

        Self {
            source,
            scripts,
            stylesheets,
            slots,
            base_href: scan.base_href,
        }
    }

    /// Returns the first `<base href>` value, if any.
    pub fn base_href(&self) -> Option<&str> {
        self.base_href.as_deref()
    }

    /// Returns the elements of a family, in document order.
    pub fn elements(&self, family: ElementFamily) -> &[Element] {
        match family {
            ElementFamily::Scripts => &self.scripts,
            ElementFamily::Stylesheets => &self.stylesheets,
        }
    }

    /// Returns the elements of a family for mutation, in document order.
    pub fn elements_mut(&mut self, family: ElementFamily) -> &mut [Element] {
        match family {
            ElementFamily::Scripts => &mut self.scripts,
            ElementFamily::Stylesheets => &mut self.stylesheets,
        }
    }

    /// Returns true if any element was rewritten or removed.
    pub fn is_modified(&self) -> bool {
        self.scripts
            .iter()
            .chain(&self.stylesheets)
            .any(|e| e.state() != ElementState::Original)
    }

    /// Serializes the document, applying element changes.
    ///
    /// If the rewriting pass fails the source is returned unchanged.
    pub fn serialize(&self) -> String {
        if !self.is_modified() {
            return self.source.clone();
        }

        let visit = Cell::new(0usize);
        let result = rewrite_str(
            &self.source,
            RewriteStrSettings {
                element_content_handlers: vec![element!("*", |el| {
                    let tag = el.tag_name();
                    if ElementKind::classify(&tag, |name| el.has_attribute(name)).is_none() {
                        return Ok(());
                    }
                    let index = visit.get();
                    visit.set(index + 1);

                    let Some(element) = self.slot(index) else {
                        return Ok(());
                    };
                    match element.state() {
                        ElementState::Original => {}
                        ElementState::Removed => el.remove(),
                        ElementState::Modified => {
                            for edit in element.attr_edits() {
                                match edit {
                                    AttrEdit::Set(name, value) => el.set_attribute(
                                        name,
                                        &encode_double_quoted_attribute(value),
                                    )?,
                                    AttrEdit::Remove(name) => el.remove_attribute(name),
                                }
                            }
                            if let Some(text) = element.replaced_text() {
                                el.set_inner_content(text, ContentType::Html);
                            }
                        }
                    }
                    Ok(())
                })],
                ..RewriteStrSettings::new()
            },
        );

        match result {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize rewritten document");
                self.source.clone()
            }
        }
    }

    fn slot(&self, index: usize) -> Option<&Element> {
        let (family, position) = (*self.slots.get(index)?)?;
        self.elements(family).get(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ManagedElement;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>Test <script src="nope.js"></script></title>
    <base href="http://cdn.example.com/static/">
    <script src="a.js"></script>
    <script>var inline = "<script src='fake.js'></script>";</script>
    <SCRIPT SRC='b.js' defer></SCRIPT>
    <link rel="stylesheet" href="one.css" media="screen">
    <style type="text/css">@import url(two.css);</style>
    <link rel="stylesheet" href="three.css?a=1&amp;b=2" />
  </head>
  <body>
    <script src="body.js"></script>
  </body>
</html>
"#;

    #[test]
    fn test_locates_head_elements_in_order() {
        let doc = HtmlDocument::parse(PAGE);

        let scripts: Vec<Option<String>> = doc
            .elements(ElementFamily::Scripts)
            .iter()
            .map(|e| e.reference())
            .collect();
        assert_eq!(scripts, vec![Some("a.js".into()), Some("b.js".into())]);

        let sheets: Vec<Option<String>> = doc
            .elements(ElementFamily::Stylesheets)
            .iter()
            .map(|e| e.reference())
            .collect();
        assert_eq!(
            sheets,
            vec![
                Some("one.css".into()),
                Some("two.css".into()),
                Some("three.css?a=1&b=2".into()),
            ]
        );
        assert_eq!(doc.base_href(), Some("http://cdn.example.com/static/"));
    }

    #[test]
    fn test_unmodified_document_round_trips() {
        let doc = HtmlDocument::parse(PAGE);
        assert!(!doc.is_modified());
        assert_eq!(doc.serialize(), PAGE);
    }

    #[test]
    fn test_conditional_comment_is_opaque() {
        let html = r#"
  <html><head>
    <link type="text/css" media="screen" href="http://john/doe.css">
    <link type="text/css" media="screen" href="http://john/doegh.css">

    <!-- Internet Explorer CSS Fixes -->
    <!--[if lt IE 7]>
        <style type="text/css" media="all">
           @import url(http://foo/bar.css);
    </style>
    <![endif]-->
  </head><body></body></html>"#;

        let doc = HtmlDocument::parse(html);
        let refs: Vec<Option<String>> = doc
            .elements(ElementFamily::Stylesheets)
            .iter()
            .map(|e| e.reference())
            .collect();
        assert_eq!(
            refs,
            vec![
                Some("http://john/doe.css".into()),
                Some("http://john/doegh.css".into()),
            ]
        );
    }

    #[test]
    fn test_rewrite_and_remove() {
        let html = "<html><head>\n<script src=\"a.js\"></script>\n<script src=\"b.js\"></script>\n</head></html>";
        let mut doc = HtmlDocument::parse(html);

        {
            let scripts = doc.elements_mut(ElementFamily::Scripts);
            scripts[0].detach();
            scripts[1].rewrite("http://h/merged.js");
        }

        assert!(doc.is_modified());
        assert_eq!(
            doc.serialize(),
            "<html><head>\n\n<script src=\"http://h/merged.js\"></script>\n</head></html>"
        );
    }

    #[test]
    fn test_style_without_import_is_located_but_unmanaged() {
        let html = "<head><style>p { color: red }</style></head>";
        let doc = HtmlDocument::parse(html);
        let sheets = doc.elements(ElementFamily::Stylesheets);
        assert_eq!(sheets.len(), 1);
        assert!(sheets[0].reference().is_none());
    }

    #[test]
    fn test_document_without_head_tag() {
        let html = "<header></header><script src=\"a.js\"></script><body><script src=\"b.js\"></script>";
        let doc = HtmlDocument::parse(html);
        let scripts = doc.elements(ElementFamily::Scripts);
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].reference().as_deref(), Some("a.js"));
        assert_eq!(doc.serialize(), html);
    }

    #[test]
    fn test_truncated_markup_does_not_panic() {
        for html in [
            "<head><script src=\"a.js\">",
            "<head><link href=\"a.css",
            "<head><!-- unterminated",
            "<head><style>@import url(a.css);",
            "<head><",
            "<head></",
        ] {
            let doc = HtmlDocument::parse(html);
            assert_eq!(doc.serialize(), html);
        }
    }

    #[test]
    fn test_non_ascii_content() {
        let html = "<head><title>Grüße</title><link href=\"ü.css\"></head>";
        let doc = HtmlDocument::parse(html);
        assert_eq!(
            doc.elements(ElementFamily::Stylesheets)[0].reference().as_deref(),
            Some("ü.css")
        );
    }

    #[test]
    fn test_untouched_attributes_keep_their_source_bytes() {
        let html = "<head><script src=\"a.js\" data-x=\"a&#x2F;b&nbsp;c\" integrity=\"sha384-x\"></script></head>";
        let mut doc = HtmlDocument::parse(html);
        doc.elements_mut(ElementFamily::Scripts)[0].rewrite("/merged.js");

        let output = doc.serialize();
        assert!(output.contains("src=\"/merged.js\""));
        assert!(output.contains("data-x=\"a&#x2F;b&nbsp;c\""));
        assert!(!output.contains("integrity"));
    }

    #[test]
    fn test_character_references_in_references_are_decoded() {
        let html = r#"<head>
<link rel="stylesheet" href="a.css?x=1&#38;y=2">
<script src="b.js?x=1&#x26;y=2"></script>
<base href="http://h/&#100;ir/">
</head>"#;
        let doc = HtmlDocument::parse(html);

        let sheets = doc.elements(ElementFamily::Stylesheets);
        assert_eq!(sheets[0].reference().as_deref(), Some("a.css?x=1&y=2"));
        let scripts = doc.elements(ElementFamily::Scripts);
        assert_eq!(scripts[0].reference().as_deref(), Some("b.js?x=1&y=2"));
        assert_eq!(doc.base_href(), Some("http://h/dir/"));
    }

    #[test]
    fn test_rewritten_value_is_escaped() {
        let html = "<head><link rel=\"stylesheet\" href=\"a.css\"></head>";
        let mut doc = HtmlDocument::parse(html);
        doc.elements_mut(ElementFamily::Stylesheets)[0].rewrite("/m.css?a=1&b=\"2\"");

        let output = doc.serialize();
        assert!(output.contains("href=\"/m.css?a=1&amp;b=&quot;2&quot;\""));
        assert!(output.contains("rel=\"stylesheet\""));
    }
}
