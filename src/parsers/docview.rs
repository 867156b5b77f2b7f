use roxmltree::{Document, Node};

use crate::archive::ArchiveError;
use crate::parsers::package::xml_options;

const JCR_URI: &str = "http://www.jcp.org/jcr/1.0";

/// One element of a DocView document with its raw attribute values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocViewNode {
    pub name: String,
    pub properties: Vec<(String, String)>,
    pub children: Vec<DocViewNode>,
}

impl DocViewNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn primary_type(&self) -> Option<&str> {
        self.attribute("jcr:primaryType")
    }

    /// Mixins declared as `jcr:mixinTypes="[a,b]"`.
    pub fn mixins(&self) -> Vec<String> {
        let Some(raw) = self.attribute("jcr:mixinTypes") else {
            return Vec::new();
        };
        let inner = raw
            .rsplit_once('}')
            .map(|(_, rest)| rest)
            .unwrap_or(raw)
            .trim_start_matches('[')
            .trim_end_matches(']');
        inner
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Attributes other than the type declarations.
    pub fn plain_properties(&self) -> impl Iterator<Item = &(String, String)> {
        self.properties
            .iter()
            .filter(|(n, _)| n != "jcr:primaryType" && n != "jcr:mixinTypes")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocView {
    /// Prefix/URI pairs declared anywhere in the document.
    pub namespaces: Vec<(String, String)>,
    pub root: DocViewNode,
}

/// Parses a DocView document; `Ok(None)` when the XML is not rooted at `jcr:root`.
pub fn parse_docview(entry: &str, text: &str) -> Result<Option<DocView>, ArchiveError> {
    let doc = Document::parse_with_options(text, xml_options()).map_err(|e| ArchiveError::Xml {
        entry: entry.to_string(),
        message: e.to_string(),
    })?;
    let root = doc.root_element();
    if root.tag_name().name() != "root" || root.tag_name().namespace() != Some(JCR_URI) {
        return Ok(None);
    }

    let mut namespaces: Vec<(String, String)> = Vec::new();
    for element in root.descendants().filter(|n| n.is_element()) {
        for ns in element.namespaces() {
            let Some(prefix) = ns.name() else { continue };
            if prefix == "xml" || namespaces.iter().any(|(p, _)| p == prefix) {
                continue;
            }
            namespaces.push((prefix.to_string(), ns.uri().to_string()));
        }
    }

    Ok(Some(DocView {
        namespaces,
        root: read_element(root),
    }))
}

fn read_element(element: Node) -> DocViewNode {
    let properties = element
        .attributes()
        .map(|attr| {
            let name = qualify(element, attr.namespace(), attr.name());
            (name, attr.value().to_string())
        })
        .collect();
    let children = element
        .children()
        .filter(|n| n.is_element())
        .map(read_element)
        .collect();
    DocViewNode {
        name: decode_iso9075(&qualify(element, element.tag_name().namespace(), element.tag_name().name())),
        properties,
        children,
    }
}

fn qualify(element: Node, namespace: Option<&str>, local: &str) -> String {
    match namespace.and_then(|uri| element.lookup_prefix(uri)) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
        _ => local.to_string(),
    }
}

/// Decodes `_xHHHH_` escapes used for names that are not valid XML.
fn decode_iso9075(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(start) = rest.find("_x") {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate
            .get(2..6)
            .filter(|_| candidate.as_bytes().get(6) == Some(&b'_'))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &candidate[7..];
            }
            None => {
                out.push_str("_x");
                rest = &candidate[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Maps a file system name to a repository name: `_pfx_name` becomes
/// `pfx:name` and `%XX` sequences are decoded.
pub fn decode_platform_name(name: &str) -> String {
    let name = percent_decode(name);
    if let Some(rest) = name.strip_prefix('_') {
        if let Some((prefix, local)) = rest.split_once('_') {
            let valid_prefix = !prefix.is_empty()
                && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
            if valid_prefix && !local.is_empty() {
                return format!("{prefix}:{local}");
            }
        }
    }
    name
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let hex = bytes.get(i + 1..i + 3).filter(|h| h.iter().all(u8::is_ascii_hexdigit));
        if let (b'%', Some(hex)) = (bytes[i], hex) {
            let digits = String::from_utf8_lossy(hex);
            if let Ok(b) = u8::from_str_radix(&digits, 16) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
