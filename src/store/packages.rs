//! Package-pin XML documents
//!
//! Two XML shapes pin package versions in a target repository:
//!
//! ```xml
//! <packages>
//!   <package id="Foo" version="1.0.0" />
//! </packages>
//! ```
//!
//! and the legacy MSBuild props form:
//!
//! ```xml
//! <Project>
//!   <ItemGroup>
//!     <PackageReference Update="Foo" Version="1.0.0" />
//!   </ItemGroup>
//! </Project>
//! ```
//!
//! Both are parsed into a `xot` tree that answers lookups. Edits are also
//! recorded against the source span of the attribute value they replace,
//! and saving splices them into the original text, so every byte outside an
//! edited value is written back unchanged. Element names are matched on
//! their local name so namespaced MSBuild files work too; package ids are
//! matched case-insensitively, like NuGet does.

use std::collections::BTreeMap;

use xot::{NameId, Node, Span, SpanInfo, SpanInfoKey, Xot};

use crate::error::{Error, Result};

/// Which of the two pin shapes a document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinFormat {
    /// `<package id=".." version=".."/>`
    Packages,
    /// `<PackageReference Update=".." Version=".."/>`
    PackageReferences,
}

impl PinFormat {
    fn element(self) -> &'static str {
        match self {
            PinFormat::Packages => "package",
            PinFormat::PackageReferences => "PackageReference",
        }
    }

    fn id_attribute(self) -> &'static str {
        match self {
            PinFormat::Packages => "id",
            PinFormat::PackageReferences => "Update",
        }
    }

    fn version_attribute(self) -> &'static str {
        match self {
            PinFormat::Packages => "version",
            PinFormat::PackageReferences => "Version",
        }
    }
}

/// One parsed pin file, paired with the text it was parsed from.
pub struct PinDocument {
    path: String,
    format: PinFormat,
    original: String,
    xot: Xot,
    root: Node,
    spans: SpanInfo,
    id_name: NameId,
    version_name: NameId,
    /// New attribute values keyed by the start offset of the value they
    /// replace, relative to the BOM-stripped source.
    edits: BTreeMap<usize, (Span, String)>,
}

impl PinDocument {
    /// Parse `text` as a pin file of the given format.
    pub fn parse(path: &str, text: &str, format: PinFormat) -> Result<Self> {
        let mut xot = Xot::new();
        let (root, spans) = xot
            .parse_with_span_info(strip_bom(text))
            .map_err(|e| Error::Xml {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        let id_name = xot.add_name(format.id_attribute());
        let version_name = xot.add_name(format.version_attribute());

        Ok(Self {
            path: path.to_string(),
            format,
            original: text.to_string(),
            xot,
            root,
            spans,
            id_name,
            version_name,
            edits: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn is_dirty(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Current value of the version attribute pinned for `package`.
    pub fn version_attribute(&self, package: &str) -> Option<&str> {
        let node = self.find_pin(package)?;
        self.xot.get_attribute(node, self.version_name)
    }

    /// Set the version pinned for `package`.
    ///
    /// Returns `false` when the package has no pin (or no version attribute)
    /// in this document. The document is only marked dirty when the value
    /// actually changes.
    pub fn set_version(&mut self, package: &str, version: &str) -> bool {
        let Some(node) = self.find_pin(package) else {
            return false;
        };
        let current = self
            .xot
            .get_attribute(node, self.version_name)
            .map(str::to_owned);
        let Some(span) = self
            .spans
            .get(SpanInfoKey::AttributeValue(node, self.version_name))
            .copied()
        else {
            return false;
        };
        match current {
            None => false,
            Some(current) if current == version => true,
            Some(_) => {
                self.xot
                    .set_attribute(node, self.version_name, version.to_string());
                let source = &strip_bom(&self.original)[span.range()];
                if unescape_attribute(source) == version {
                    self.edits.remove(&span.start);
                } else {
                    self.edits
                        .insert(span.start, (span, escape_attribute(version)));
                }
                true
            }
        }
    }

    /// Render the document with every recorded edit spliced into the
    /// original text.
    pub fn serialize(&self) -> Result<String> {
        let source = strip_bom(&self.original);
        let bom = &self.original[..self.original.len() - source.len()];

        let mut text = String::with_capacity(self.original.len());
        text.push_str(bom);
        let mut cursor = 0;
        for (span, value) in self.edits.values() {
            let before = source.get(cursor..span.start).ok_or_else(|| Error::Xml {
                path: self.path.clone(),
                message: format!("edit at offset {} overlaps a previous edit", span.start),
            })?;
            text.push_str(before);
            text.push_str(value);
            cursor = span.end;
        }
        text.push_str(&source[cursor..]);
        Ok(text)
    }

    fn find_pin(&self, package: &str) -> Option<Node> {
        let element_name = self.format.element();
        self.xot.descendants(self.root).find(|&node| {
            let Some(element) = self.xot.element(node) else {
                return false;
            };
            self.xot.local_name_str(element.name()) == element_name
                && self
                    .xot
                    .get_attribute(node, self.id_name)
                    .is_some_and(|id| id.eq_ignore_ascii_case(package))
        })
    }
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape_attribute(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
