//! `imsmanifest.xml` parsing.
//!
//! The parser is a single streaming pass with quick-xml. It keeps only what
//! playback needs: the organization title, the flattened item tree of the
//! default organization, the resource table and the schema version.

use crate::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// A raw `<item>` from the organization tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub identifier: String,
    pub identifier_ref: Option<String>,
    pub title: String,
    pub parameters: Option<String>,
    pub visible: bool,
    pub depth: usize,
}

/// A raw `<resource>` from the resource table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestResource {
    pub identifier: String,
    pub href: Option<String>,
    pub resource_type: Option<String>,
    pub scorm_type: Option<String>,
    /// Concatenated `xml:base` of `<resources>` and `<resource>`.
    pub base: String,
}

#[derive(Debug, Clone, Default)]
struct Organization {
    identifier: String,
    title: String,
    items: Vec<ManifestItem>,
}

/// Parsed manifest contents.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub title: Option<String>,
    pub schema_version: Option<String>,
    /// Namespace hint: `Some(true)` for 2004 namespaces, `Some(false)` for 1.2.
    pub namespace_is_2004: Option<bool>,
    pub items: Vec<ManifestItem>,
    pub resources: Vec<ManifestResource>,
}

#[derive(Debug, Clone, Copy)]
enum TitleTarget {
    Manifest,
    Organization(usize),
    Item(usize, usize),
}

/// Parse a manifest document.
pub fn parse_manifest(xml: &[u8]) -> Result<Manifest> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut manifest = Manifest::default();
    let mut saw_root = false;

    let mut default_org: Option<String> = None;
    let mut organizations: Vec<Organization> = Vec::new();
    let mut current_org: Option<usize> = None;
    let mut item_stack: Vec<usize> = Vec::new();

    let mut resources_base = String::new();
    let mut title_target: Option<TitleTarget> = None;
    let mut title_text = String::new();
    let mut in_schema_version = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::manifest(format!("at byte {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = local_name(e);

                match name.as_str() {
                    "manifest" => {
                        saw_root = true;
                        manifest.namespace_is_2004 = sniff_namespace(e);
                    }
                    "organizations" => {
                        default_org = attr(e, "default");
                    }
                    "organization" => {
                        organizations.push(Organization {
                            identifier: attr(e, "identifier").unwrap_or_default(),
                            ..Default::default()
                        });
                        current_org = if is_empty {
                            None
                        } else {
                            Some(organizations.len() - 1)
                        };
                    }
                    "item" => {
                        if let Some(org_idx) = current_org {
                            let org = &mut organizations[org_idx];
                            let identifier = attr(e, "identifier").unwrap_or_default();
                            org.items.push(ManifestItem {
                                title: identifier.clone(),
                                identifier,
                                identifier_ref: attr(e, "identifierref")
                                    .filter(|r| !r.trim().is_empty()),
                                parameters: attr(e, "parameters"),
                                visible: attr(e, "isvisible")
                                    .map(|v| !v.eq_ignore_ascii_case("false"))
                                    .unwrap_or(true),
                                depth: item_stack.len(),
                            });
                            if !is_empty {
                                item_stack.push(org.items.len() - 1);
                            }
                        }
                    }
                    "title" if !is_empty => {
                        title_target = match (current_org, item_stack.last()) {
                            (Some(org), Some(&item)) => Some(TitleTarget::Item(org, item)),
                            (Some(org), None) => Some(TitleTarget::Organization(org)),
                            (None, _) if manifest.title.is_none() => Some(TitleTarget::Manifest),
                            _ => None,
                        };
                        title_text.clear();
                    }
                    "schemaversion" if !is_empty => {
                        in_schema_version = true;
                    }
                    "resources" => {
                        resources_base = attr(e, "base").unwrap_or_default();
                    }
                    "resource" => {
                        let own_base = attr(e, "base").unwrap_or_default();
                        manifest.resources.push(ManifestResource {
                            identifier: attr(e, "identifier").unwrap_or_default(),
                            href: attr(e, "href"),
                            resource_type: attr(e, "type"),
                            scorm_type: attr(e, "scormtype"),
                            base: join_base(&resources_base, &own_base),
                        });
                    }
                    _ => {}
                }
            }
            Event::Text(ref t) => {
                let text = t
                    .unescape()
                    .map_err(|e| Error::manifest(format!("bad text content: {}", e)))?;
                if title_target.is_some() {
                    title_text.push_str(&text);
                } else if in_schema_version {
                    manifest.schema_version = Some(text.trim().to_string());
                }
            }
            Event::CData(ref c) => {
                if title_target.is_some() {
                    title_text.push_str(&String::from_utf8_lossy(c.as_ref()));
                }
            }
            Event::End(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                match name.as_str() {
                    "title" => {
                        if let Some(target) = title_target.take() {
                            let title = title_text.trim().to_string();
                            if !title.is_empty() {
                                apply_title(&mut manifest, &mut organizations, target, title);
                            }
                        }
                    }
                    "schemaversion" => in_schema_version = false,
                    "item" => {
                        item_stack.pop();
                    }
                    "organization" => {
                        current_org = None;
                        item_stack.clear();
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if !saw_root {
        return Err(Error::manifest("missing <manifest> root element"));
    }

    let chosen = default_org
        .as_deref()
        .and_then(|id| organizations.iter().position(|o| o.identifier == id))
        .or(if organizations.is_empty() { None } else { Some(0) });

    if let Some(idx) = chosen {
        let org = organizations.swap_remove(idx);
        if !org.title.is_empty() {
            manifest.title = Some(org.title);
        }
        manifest.items = org.items;
    }

    Ok(manifest)
}

fn apply_title(
    manifest: &mut Manifest,
    organizations: &mut [Organization],
    target: TitleTarget,
    title: String,
) {
    match target {
        TitleTarget::Manifest => manifest.title = Some(title),
        TitleTarget::Organization(org) => organizations[org].title = title,
        TitleTarget::Item(org, item) => organizations[org].items[item].title = title,
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase()
}

/// Look up an attribute by local name, ignoring namespace prefix and case.
fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|a| {
            String::from_utf8_lossy(a.key.local_name().as_ref()).eq_ignore_ascii_case(name)
        })
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
}

fn sniff_namespace(e: &BytesStart<'_>) -> Option<bool> {
    let mut hint = None;
    for a in e.attributes().with_checks(false).flatten() {
        let value = String::from_utf8_lossy(&a.value).to_ascii_lowercase();
        if value.contains("adlcp_v1p3") || value.contains("adlseq_v1p3") {
            return Some(true);
        }
        if value.contains("adlcp_rootv1p2") {
            hint = Some(false);
        }
    }
    hint
}

fn join_base(outer: &str, inner: &str) -> String {
    let mut base = String::new();
    for part in [outer, inner] {
        if part.is_empty() {
            continue;
        }
        if !base.is_empty() && !base.ends_with('/') {
            base.push('/');
        }
        base.push_str(part);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCORM12: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest identifier="com.example.course" version="1.0"
    xmlns="http://www.imsproject.org/xsd/imscp_rootv1p1p2"
    xmlns:adlcp="http://www.adlnet.org/xsd/adlcp_rootv1p2">
  <metadata>
    <schema>ADL SCORM</schema>
    <schemaversion>1.2</schemaversion>
  </metadata>
  <organizations default="ORG-1">
    <organization identifier="ORG-0"><title>Wrong Org</title></organization>
    <organization identifier="ORG-1">
      <title>Safety &amp; Compliance</title>
      <item identifier="MOD-1">
        <title>Module 1</title>
        <item identifier="ITEM-1" identifierref="RES-1"><title>Introduction</title></item>
        <item identifier="ITEM-2" identifierref="RES-2" parameters="?page=2"/>
      </item>
      <item identifier="ITEM-3" identifierref="RES-1" isvisible="false">
        <title><![CDATA[Quiz]]></title>
      </item>
    </organization>
  </organizations>
  <resources xml:base="content/">
    <resource identifier="RES-1" type="webcontent" adlcp:scormtype="sco" href="intro/index.html">
      <file href="intro/index.html"/>
    </resource>
    <resource identifier="RES-2" type="webcontent" adlcp:scormtype="asset" xml:base="extra" href="page.html"/>
  </resources>
</manifest>"#;

    #[test]
    fn test_parse_scorm12() {
        let manifest = parse_manifest(SCORM12.as_bytes()).unwrap();

        assert_eq!(manifest.title.as_deref(), Some("Safety & Compliance"));
        assert_eq!(manifest.schema_version.as_deref(), Some("1.2"));
        assert_eq!(manifest.namespace_is_2004, Some(false));

        let ids: Vec<&str> = manifest.items.iter().map(|i| i.identifier.as_str()).collect();
        assert_eq!(ids, vec!["MOD-1", "ITEM-1", "ITEM-2", "ITEM-3"]);

        assert_eq!(manifest.items[0].identifier_ref, None);
        assert_eq!(manifest.items[1].title, "Introduction");
        assert_eq!(manifest.items[1].depth, 1);
        assert_eq!(manifest.items[2].title, "ITEM-2");
        assert_eq!(manifest.items[2].parameters.as_deref(), Some("?page=2"));
        assert_eq!(manifest.items[3].title, "Quiz");
        assert!(!manifest.items[3].visible);

        assert_eq!(manifest.resources.len(), 2);
        assert_eq!(manifest.resources[0].scorm_type.as_deref(), Some("sco"));
        assert_eq!(manifest.resources[0].base, "content/");
        assert_eq!(manifest.resources[1].base, "content/extra");
    }

    #[test]
    fn test_parse_2004_namespace() {
        let xml = r#"<manifest xmlns="http://www.imsglobal.org/xsd/imscp_v1p1"
            xmlns:adlcp="http://www.adlnet.org/xsd/adlcp_v1p3">
          <organizations><organization identifier="O"><title>T</title>
            <item identifier="I" identifierref="R"><title>Only</title></item>
          </organization></organizations>
          <resources><resource identifier="R" adlcp:scormType="sco" href="a.html"/></resources>
        </manifest>"#;

        let manifest = parse_manifest(xml.as_bytes()).unwrap();
        assert_eq!(manifest.namespace_is_2004, Some(true));
        assert_eq!(manifest.items.len(), 1);
        assert_eq!(manifest.resources[0].scorm_type.as_deref(), Some("sco"));
    }

    #[test]
    fn test_missing_root_is_error() {
        let result = parse_manifest(b"<other/>");
        assert!(matches!(result, Err(Error::Manifest(_))));
    }

    #[test]
    fn test_malformed_xml_is_error() {
        let result = parse_manifest(b"<manifest><organizations></manifest>");
        assert!(matches!(result, Err(Error::Manifest(_))));
    }

    #[test]
    fn test_join_base() {
        assert_eq!(join_base("", ""), "");
        assert_eq!(join_base("a", "b/"), "a/b/");
        assert_eq!(join_base("a/", "b"), "a/b");
        assert_eq!(join_base("", "b"), "b");
    }
}
