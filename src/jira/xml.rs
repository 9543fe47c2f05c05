//! Reading Jira XML exports into [`JiraItem`] records.
//!
//! Jira exports are RSS documents: `rss/channel/item*`. Each item is mapped
//! element by element; anything missing becomes `None` or an empty list.

use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node, ParsingOptions};

use super::{EPIC_LINK_FIELD, IssueLinkType, JiraComment, JiraItem, JiraUser, LinkGroup};
use crate::{Error, Result};

/// Parse an XML document and return every `<item>` it contains.
///
/// Items without a `<key>` cannot be migrated and are skipped with a warning.
pub fn parse_items(xml: &str) -> Result<Vec<JiraItem>> {
    let doc = parse_document(xml)?;
    let root = doc.root_element();

    let channel = if root.has_tag_name("channel") {
        Some(root)
    } else {
        child(root, "channel")
    };
    let Some(channel) = channel else {
        return Err(Error::Xml(format!(
            "expected <channel> in <{}>",
            root.tag_name().name()
        )));
    };

    let mut items = Vec::new();
    for node in channel.children().filter(|n| n.has_tag_name("item")) {
        match parse_item(node) {
            Some(item) => items.push(item),
            None => tracing::warn!("Skipping <item> without a <key> element"),
        }
    }
    Ok(items)
}

/// Parse XML with DTDs permitted (some Jira versions emit a doctype).
pub(crate) fn parse_document(xml: &str) -> Result<Document<'_>> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(xml, options).map_err(|e| Error::Xml(e.to_string()))
}

/// Split a `;`-separated path list, as accepted by `JIRA_MIGRATION_FILE_PATHS`.
pub fn split_path_list(paths: &str) -> Vec<PathBuf> {
    paths
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Read items from files and directories.
///
/// A directory contributes every `*.xml` file directly inside it, in file name
/// order so that repeated runs import issues in the same order.
pub fn read_xml_files(paths: &[PathBuf]) -> Result<Vec<JiraItem>> {
    let mut items = Vec::new();
    for path in paths {
        if path.is_dir() {
            for file in xml_files_in(path)? {
                items.extend(read_xml_file(&file)?);
            }
        } else {
            items.extend(read_xml_file(path)?);
        }
    }
    Ok(items)
}

/// Read all items of a single XML file.
pub fn read_xml_file(path: &Path) -> Result<Vec<JiraItem>> {
    let content = fs::read_to_string(path)?;
    let items = parse_items(&content)
        .map_err(|e| Error::Xml(format!("{}: {}", path.display(), e)))?;
    tracing::debug!(file = %path.display(), items = items.len(), "Read Jira export");
    Ok(items)
}

fn xml_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "xml"))
        .collect();
    files.sort_by_cached_key(|path| {
        let start = page_start(path);
        (start.is_none(), start, path.clone())
    });
    Ok(files)
}

/// Start offset of a `result-<start>.xml` page file.
fn page_start(path: &Path) -> Option<u64> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("result-")?
        .parse()
        .ok()
}

fn parse_item(node: Node<'_, '_>) -> Option<JiraItem> {
    let key = child_text(node, "key")?;

    let mut item = JiraItem {
        key,
        project_key: child(node, "project").and_then(|p| attr(p, "key")),
        title: child_text(node, "title"),
        description: child_text(node, "description"),
        issue_type: child_text(node, "type"),
        status: child_text(node, "status"),
        status_category_id: child(node, "statusCategory").and_then(|s| attr(s, "id")),
        priority: child_text(node, "priority"),
        resolution: child_text(node, "resolution"),
        reporter: child(node, "reporter").and_then(user),
        assignee: child(node, "assignee").and_then(user),
        created: child_text(node, "created"),
        updated: child_text(node, "updated"),
        resolved: child_text(node, "resolved"),
        fix_version: child_text(node, "fixVersion"),
        components: children(node, "component").filter_map(text).collect(),
        parent: child_text(node, "parent"),
        security: child_text(node, "security"),
        ..Default::default()
    };

    if let Some(labels) = child(node, "labels") {
        item.labels = children(labels, "label").filter_map(text).collect();
    }

    if let Some(comments) = child(node, "comments") {
        item.comments = children(comments, "comment")
            .map(|c| JiraComment {
                author: attr(c, "author").unwrap_or_default(),
                created: attr(c, "created"),
                body: raw_text(c),
            })
            .collect();
    }

    if let Some(subtasks) = child(node, "subtasks") {
        item.subtasks = children(subtasks, "subtask").filter_map(text).collect();
    }

    if let Some(links) = child(node, "issuelinks") {
        item.link_types = children(links, "issuelinktype")
            .map(|t| IssueLinkType {
                name: child_text(t, "name"),
                outward: children(t, "outwardlinks").map(link_group).collect(),
                inward: children(t, "inwardlinks").map(link_group).collect(),
            })
            .collect();
    }

    if let Some(fields) = child(node, "customfields") {
        item.epic_link = children(fields, "customfield")
            .find(|f| attr(*f, "key").as_deref() == Some(EPIC_LINK_FIELD))
            .and_then(|f| child(f, "customfieldvalues"))
            .and_then(|v| child_text(v, "customfieldvalue"));
    }

    Some(item)
}

fn link_group(node: Node<'_, '_>) -> LinkGroup {
    LinkGroup {
        description: attr(node, "description"),
        keys: children(node, "issuelink")
            .flat_map(|link| children(link, "issuekey").filter_map(text).collect::<Vec<_>>())
            .collect(),
    }
}

fn user(node: Node<'_, '_>) -> Option<JiraUser> {
    let display_name = raw_text(node).trim().to_string();
    let username = attr(node, "username");
    if username.is_none() && display_name.is_empty() {
        return None;
    }
    Some(JiraUser {
        username: username.unwrap_or_else(|| display_name.clone()),
        display_name,
    })
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |n| n.has_tag_name(name))
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name).and_then(text)
}

fn attr(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute(name).map(str::to_string)
}

/// Concatenated direct text of an element, untrimmed.
fn raw_text(node: Node<'_, '_>) -> String {
    node.children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

/// Trimmed text of an element; empty text is treated as absent.
fn text(node: Node<'_, '_>) -> Option<String> {
    let value = raw_text(node);
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="0.92">
  <channel>
    <title>Jira</title>
    <issue start="0" end="2" total="2"/>
    <item>
      <title>[PROJ-1] Crash on start</title>
      <project id="10" key="PROJ">Project</project>
      <description>&lt;p&gt;Boom &amp;amp; bust&lt;/p&gt;</description>
      <key id="100">PROJ-1</key>
      <type id="1">Bug</type>
      <priority id="3">Major</priority>
      <status id="6">Closed</status>
      <statusCategory id="3" key="done"/>
      <resolution id="1">Fixed</resolution>
      <assignee username="-1">Unassigned</assignee>
      <reporter username="alice">Alice Example</reporter>
      <labels>
        <label>regression</label>
        <label>ui</label>
      </labels>
      <created>Mon, 4 Mar 2019 10:20:30 +0000</created>
      <updated>Tue, 5 Mar 2019 11:00:00 +0000</updated>
      <resolved>Wed, 6 Mar 2019 12:00:00 +0000</resolved>
      <fixVersion>v2.0</fixVersion>
      <component>core</component>
      <component>web</component>
      <comments>
        <comment id="1" author="bob" created="Tue, 5 Mar 2019 09:00:00 +0000">Seen it too</comment>
      </comments>
      <issuelinks>
        <issuelinktype id="1">
          <name>Duplicate</name>
          <outwardlinks description="duplicates">
            <issuelink><issuekey id="2">PROJ-2</issuekey></issuelink>
          </outwardlinks>
          <inwardlinks description="is duplicated by">
            <issuelink><issuekey id="3">PROJ-3</issuekey></issuelink>
          </inwardlinks>
        </issuelinktype>
      </issuelinks>
      <subtasks>
        <subtask id="4">PROJ-4</subtask>
      </subtasks>
      <customfields>
        <customfield id="cf1" key="com.pyxis.greenhopper.jira:gh-epic-link">
          <customfieldname>Epic Link</customfieldname>
          <customfieldvalues><customfieldvalue>PROJ-9</customfieldvalue></customfieldvalues>
        </customfield>
      </customfields>
    </item>
    <item>
      <title>[PROJ-2] Minimal</title>
      <key>PROJ-2</key>
    </item>
    <item>
      <title>No key here</title>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_items_full_record() {
        let items = parse_items(EXPORT).unwrap();
        assert_eq!(items.len(), 2);

        let item = &items[0];
        assert_eq!(item.key, "PROJ-1");
        assert_eq!(item.project_key.as_deref(), Some("PROJ"));
        assert_eq!(item.title.as_deref(), Some("[PROJ-1] Crash on start"));
        assert_eq!(
            item.description.as_deref(),
            Some("<p>Boom &amp; bust</p>")
        );
        assert_eq!(item.issue_type.as_deref(), Some("Bug"));
        assert_eq!(item.status_category_id.as_deref(), Some("3"));
        assert_eq!(item.resolution.as_deref(), Some("Fixed"));
        assert_eq!(item.reporter.as_ref().unwrap().username, "alice");
        assert_eq!(item.reporter.as_ref().unwrap().display_name, "Alice Example");
        assert_eq!(item.assignee.as_ref().unwrap().display_name, "Unassigned");
        assert_eq!(item.fix_version.as_deref(), Some("v2.0"));
        assert_eq!(item.components, vec!["core", "web"]);
        assert_eq!(item.labels, vec!["regression", "ui"]);
        assert_eq!(item.comments.len(), 1);
        assert_eq!(item.comments[0].author, "bob");
        assert_eq!(item.comments[0].body, "Seen it too");
        assert_eq!(item.subtasks, vec!["PROJ-4"]);
        assert_eq!(item.epic_link.as_deref(), Some("PROJ-9"));
    }

    #[test]
    fn test_parse_items_links() {
        let items = parse_items(EXPORT).unwrap();
        let links = &items[0].link_types;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].name.as_deref(), Some("Duplicate"));
        assert_eq!(links[0].outward[0].description.as_deref(), Some("duplicates"));
        assert_eq!(links[0].outward[0].keys, vec!["PROJ-2"]);
        assert_eq!(
            links[0].inward[0].description.as_deref(),
            Some("is duplicated by")
        );
        assert_eq!(links[0].inward[0].keys, vec!["PROJ-3"]);
    }

    #[test]
    fn test_parse_items_minimal_record_has_no_optional_fields() {
        let items = parse_items(EXPORT).unwrap();
        let item = &items[1];
        assert_eq!(item.key, "PROJ-2");
        assert!(item.project_key.is_none());
        assert!(item.description.is_none());
        assert!(item.fix_version.is_none());
        assert!(item.components.is_empty());
        assert!(item.comments.is_empty());
        assert!(item.epic_link.is_none());
    }

    #[test]
    fn test_parse_items_rejects_non_rss() {
        let result = parse_items("<html><body/></html>");
        assert!(matches!(result, Err(Error::Xml(_))));
    }

    #[test]
    fn test_parse_items_rejects_malformed() {
        let result = parse_items("<rss><channel>");
        assert!(matches!(result, Err(Error::Xml(_))));
    }

    #[test]
    fn test_split_path_list() {
        let paths = split_path_list("a.xml; dir ;;b.xml");
        assert_eq!(
            paths,
            vec![
                PathBuf::from("a.xml"),
                PathBuf::from("dir"),
                PathBuf::from("b.xml")
            ]
        );
    }

    #[test]
    fn test_read_xml_files_from_directory_sorted() {
        let dir = TempDir::new().unwrap();
        let page = |key: &str| {
            format!(
                "<rss><channel><item><key>{}</key></item></channel></rss>",
                key
            )
        };
        fs::write(dir.path().join("result-10000.xml"), page("PROJ-10001")).unwrap();
        fs::write(dir.path().join("result-2000.xml"), page("PROJ-2001")).unwrap();
        fs::write(dir.path().join("result-0.xml"), page("PROJ-1")).unwrap();
        fs::write(dir.path().join("extra.xml"), page("PROJ-20000")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let items = read_xml_files(&[dir.path().to_path_buf()]).unwrap();
        let keys: Vec<&str> = items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["PROJ-1", "PROJ-2001", "PROJ-10001", "PROJ-20000"]);
    }

    #[test]
    fn test_read_xml_file_missing() {
        let result = read_xml_files(&[PathBuf::from("/nonexistent/export.xml")]);
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
