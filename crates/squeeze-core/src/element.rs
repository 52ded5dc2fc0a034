//! Managed elements and their kind-specific accessors.
//!
//! Three element kinds reference mergeable resources:
//!
//! - `<script src="...">`
//! - `<link href="...">`
//! - `<style>` holding a single `@import url(...)` statement
//!
//! Each kind maps to an [`ElementCapability`]: a pair of plain functions that
//! extract and rewrite the reference. Anything a capability cannot read is
//! "not a managed resource" and is left untouched.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a style block whose line is a single `@import url(...)`
/// statement, optionally wrapped in an HTML comment.
pub static STYLE_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^((?:<!--)?\s*@import\surl*\()([^\)]+)(\);?\s*(?:-->)?)$")
        .expect("Invalid regex")
});

/// Element kinds that can reference a mergeable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// `<script src>`.
    Script,
    /// `<link href>`.
    Link,
    /// `<style>` holding an `@import url(...)`.
    Style,
}

impl ElementKind {
    /// Returns the kind of a tag, if it is managed.
    ///
    /// `has_attr` reports whether the tag carries an attribute.
    pub fn classify(tag: &str, has_attr: impl Fn(&str) -> bool) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "script" if has_attr("src") => Some(Self::Script),
            "link" if has_attr("href") => Some(Self::Link),
            "style" => Some(Self::Style),
            _ => None,
        }
    }

    /// Returns the tag name.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Link => "link",
            Self::Style => "style",
        }
    }

    /// Returns the accessor/mutator pair of this kind.
    pub fn capability(&self) -> &'static ElementCapability {
        match self {
            Self::Script => &SCRIPT,
            Self::Link => &LINK,
            Self::Style => &STYLE,
        }
    }

    /// Returns the family this kind is merged with.
    pub fn family(&self) -> ElementFamily {
        match self {
            Self::Script => ElementFamily::Scripts,
            Self::Link | Self::Style => ElementFamily::Stylesheets,
        }
    }
}

/// Element kinds whose resources are merged together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementFamily {
    /// Scripts.
    Scripts,
    /// Linked and imported stylesheets.
    Stylesheets,
}

impl ElementFamily {
    /// All families, in processing order.
    pub const ALL: [ElementFamily; 2] = [ElementFamily::Scripts, ElementFamily::Stylesheets];

    /// Returns a label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scripts => "scripts",
            Self::Stylesheets => "stylesheets",
        }
    }
}

/// Kind-specific reference accessor and mutator.
pub struct ElementCapability {
    /// Returns the raw reference of an element, if it has one.
    pub extract: fn(&Element) -> Option<String>,
    /// Points an element at a new URL.
    pub rewrite: fn(&mut Element, &str),
}

// A hash of a member no longer matches the merged artifact.
static SCRIPT: ElementCapability = ElementCapability {
    extract: |element| element.attr("src").map(str::to_string),
    rewrite: |element, url| {
        element.set_attr("src", url);
        element.remove_attr("integrity");
    },
};

// A merged stylesheet carries its own `@media` blocks, so the element loses its media.
static LINK: ElementCapability = ElementCapability {
    extract: |element| element.attr("href").map(str::to_string),
    rewrite: |element, url| {
        element.set_attr("href", url);
        element.remove_attr("media");
        element.remove_attr("integrity");
    },
};

static STYLE: ElementCapability = ElementCapability {
    extract: extract_style_import,
    rewrite: rewrite_style_import,
};

fn extract_style_import(element: &Element) -> Option<String> {
    let caps = STYLE_IMPORT.captures(element.text()?)?;
    let reference = caps[2].trim().trim_matches(|c| c == '"' || c == '\'');
    Some(reference.to_string())
}

fn rewrite_style_import(element: &mut Element, url: &str) {
    let rewritten = element.text().and_then(|text| {
        let reference = STYLE_IMPORT.captures(text)?.get(2)?;
        let mut out = String::with_capacity(text.len() + url.len());
        out.push_str(&text[..reference.start()]);
        out.push_str(url);
        out.push_str(&text[reference.end()..]);
        Some(out)
    });
    if let Some(text) = rewritten {
        element.set_text(text);
        element.remove_attr("media");
    }
}

/// What has happened to an element since it was parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Serialized exactly as in the source.
    Original,
    /// Serialized with its edits applied.
    Modified,
    /// Dropped from the output.
    Removed,
}

/// A change to one attribute of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrEdit {
    /// Sets an attribute to a (decoded) value.
    Set(String, String),
    /// Removes an attribute.
    Remove(String),
}

/// An element located in a document's `<head>`.
///
/// Attribute values are held decoded. Edits are recorded so the document can
/// apply them to the source without touching anything else.
#[derive(Debug, Clone)]
pub struct Element {
    kind: ElementKind,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    edits: Vec<AttrEdit>,
    text_replaced: bool,
    state: ElementState,
}

impl Element {
    /// Creates an element from its decoded attributes and raw text.
    pub fn new(kind: ElementKind, attrs: Vec<(String, String)>, text: Option<String>) -> Self {
        Self {
            kind,
            attrs,
            text,
            edits: Vec::new(),
            text_replaced: false,
            state: ElementState::Original,
        }
    }

    /// Returns the element kind.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Returns the element state.
    pub fn state(&self) -> ElementState {
        self.state
    }

    /// Returns the value of an attribute (names are case-insensitive).
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, adding it if missing.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self
            .attrs
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
        self.edits
            .push(AttrEdit::Set(name.to_string(), value.to_string()));
        self.touch();
    }

    /// Removes an attribute if present.
    pub fn remove_attr(&mut self, name: &str) {
        let before = self.attrs.len();
        self.attrs.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        if self.attrs.len() != before {
            self.edits.push(AttrEdit::Remove(name.to_string()));
            self.touch();
        }
    }

    /// Returns the attribute edits, in the order they were made.
    pub fn attr_edits(&self) -> &[AttrEdit] {
        &self.edits
    }

    /// Returns the raw text content.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Replaces the raw text content.
    pub fn set_text(&mut self, text: String) {
        self.text = Some(text);
        self.text_replaced = true;
        self.touch();
    }

    /// Appends a chunk of source text while the element is being scanned.
    pub(crate) fn append_text(&mut self, chunk: &str) {
        self.text.get_or_insert_with(String::new).push_str(chunk);
    }

    /// Returns the text content if it was replaced.
    pub fn replaced_text(&self) -> Option<&str> {
        if self.text_replaced {
            self.text()
        } else {
            None
        }
    }

    fn touch(&mut self) {
        if self.state == ElementState::Original {
            self.state = ElementState::Modified;
        }
    }
}

/// An element whose resource reference can be read, rewritten or dropped.
pub trait ManagedElement {
    /// Returns the raw reference, if this element has one.
    fn reference(&self) -> Option<String>;

    /// Returns the `media` attribute.
    fn media(&self) -> Option<String>;

    /// Points the element at `url`.
    fn rewrite(&mut self, url: &str);

    /// Removes the element from its document.
    fn detach(&mut self);
}

impl ManagedElement for Element {
    fn reference(&self) -> Option<String> {
        if self.state == ElementState::Removed {
            return None;
        }
        (self.kind.capability().extract)(self)
    }

    fn media(&self) -> Option<String> {
        self.attr("media").map(str::to_string)
    }

    fn rewrite(&mut self, url: &str) {
        (self.kind.capability().rewrite)(self, url)
    }

    fn detach(&mut self) {
        self.state = ElementState::Removed;
    }
}
