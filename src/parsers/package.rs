use std::collections::BTreeMap;

use roxmltree::{Document, ParsingOptions};

use crate::archive::ArchiveError;
use crate::models::package::{PackageId, PackageProperties};

pub const PROPERTIES_ENTRY: &str = "META-INF/vault/properties.xml";

/// Parses `META-INF/vault/properties.xml` (Java properties XML format).
pub fn parse_properties_xml(text: &str) -> Result<PackageProperties, ArchiveError> {
    let doc = Document::parse_with_options(text, xml_options()).map_err(|e| ArchiveError::Xml {
        entry: PROPERTIES_ENTRY.to_string(),
        message: e.to_string(),
    })?;
    let root = doc.root_element();
    if root.tag_name().name() != "properties" {
        return Err(ArchiveError::InvalidProperties(format!(
            "unexpected root element <{}>",
            root.tag_name().name()
        )));
    }

    let mut entries = BTreeMap::new();
    for child in root.children().filter(|n| n.is_element()) {
        if child.tag_name().name() != "entry" {
            continue;
        }
        if let Some(key) = child.attribute("key") {
            entries.insert(key.to_string(), child.text().unwrap_or_default().trim().to_string());
        }
    }

    let field = |key: &str| entries.get(key).cloned().unwrap_or_default();
    let id = PackageId::new(field("group"), field("name"), field("version"));
    if id.name.is_empty() {
        return Err(ArchiveError::InvalidProperties("missing package name".to_string()));
    }

    Ok(PackageProperties { id, entries })
}

/// Renders properties back to XML; used to assemble in-memory archives.
pub fn render_properties_xml(entries: &BTreeMap<String, String>) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n\
         <!DOCTYPE properties SYSTEM \"http://java.sun.com/dtd/properties.dtd\">\n<properties>\n",
    );
    for (key, value) in entries {
        out.push_str(&format!("<entry key=\"{}\">{}</entry>\n", escape(key), escape(value)));
    }
    out.push_str("</properties>\n");
    out
}

pub(crate) fn xml_options() -> ParsingOptions {
    ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    }
}

pub(crate) fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<!DOCTYPE properties SYSTEM "http://java.sun.com/dtd/properties.dtd">
<properties>
<comment>FileVault Package Properties</comment>
<entry key="group">acme</entry>
<entry key="name">site</entry>
<entry key="version">1.2.0</entry>
<entry key="installhook.setup.class">acme.SetupHook</entry>
</properties>"#;

    #[test]
    fn reads_identity_and_hooks() {
        let props = parse_properties_xml(SAMPLE).unwrap();
        assert_eq!(props.id, PackageId::new("acme", "site", "1.2.0"));
        assert_eq!(props.hooks().len(), 1);
        assert_eq!(props.get("version"), Some("1.2.0"));
    }

    #[test]
    fn rejects_nameless_packages_and_bad_xml() {
        let nameless = "<properties><entry key=\"group\">acme</entry></properties>";
        assert!(matches!(
            parse_properties_xml(nameless),
            Err(ArchiveError::InvalidProperties(_))
        ));
        assert!(matches!(parse_properties_xml("<properties>"), Err(ArchiveError::Xml { .. })));
    }

    #[test]
    fn rendered_output_parses_back() {
        let mut entries = BTreeMap::new();
        entries.insert("name".to_string(), "a&b".to_string());
        let props = parse_properties_xml(&render_properties_xml(&entries)).unwrap();
        assert_eq!(props.id.name, "a&b");
    }
}
