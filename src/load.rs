//! Loaders for the auxiliary lookup tables shipped next to the XML sources:
//! link databases, graphics, and the entity files under `terms/`.
//!
//! The entity files are not well-formed XML, so they are scanned line by
//! line with regexes rather than parsed.

use crate::ast::{Element, ElementKind, Item};
use crate::{Fcache, LinkTarget, Links, Terms, TermValue};
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

const VARIABLE_FILE: &str = "build_variables.ent";
const GLOBAL_TERMS_FILE: &str = "terms_global.ent";
const DOCU_GLOBAL_FILE: &str = "docu_global.ent";
const MANUAL_FILE: &str = "manuals.ent";
const GROUP_CODE_FILE: &str = "../xml/ansys.groupcodes.commands.ent";
const CHARACTER_DIRECTORY: &str = "ent";

/// Version the conversion assumes when the build variables are absent.
const FALLBACK_VERSION: &str = "23.2";

static RE_ENTITY_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!ENTITY (\S*) ").unwrap());

static RE_SINGLE_QUOTED_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'(\S*)'").unwrap());

static RE_SINGLE_QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'(.*)'").unwrap());

static RE_TARGETDOC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"targetdoc="(\S*)""#).unwrap());

static RE_TARGETPTR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"targetptr="(\S*)""#).unwrap());

static RE_CITETITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<citetitle>(.*)</citetitle>").unwrap());

static RE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<!--(.*)-->").unwrap());

static RE_CLASSNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<classname>(.*?)</classname>").unwrap());

static RE_TYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<type>(.*?)</type>").unwrap());

static RE_ENTITY_DECL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"ENTITY(.*)").unwrap());

static RE_ENTITY_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&([^\s;]+);").unwrap());

/// One entry of the global-document table: where an entity points and how
/// it is cited.
#[derive(Debug, Clone, Default)]
pub struct DocuEntry {
    pub targetdoc: Option<String>,
    pub targetptr: Option<String>,
    pub citetitle: Option<String>,
}

/// Entity name → global document entry.
pub type DocuGlobal = HashMap<String, DocuEntry>;

/// Documentation-build variables derived from the terms table.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    pub version: String,
    pub base_url: String,
    /// Directory name carrying the generated pages, used in docstring
    /// cross references.
    pub autogenerated_directory_name: String,
}

impl VersionInfo {
    /// Derive the documentation URLs from the loaded build variables,
    /// unless an explicit base URL overrides them.
    pub fn from_terms(terms: &Terms, base_url_override: Option<&str>) -> VersionInfo {
        let version = terms
            .get("ansys_internal_version")
            .and_then(TermValue::as_text)
            .unwrap_or(FALLBACK_VERSION)
            .to_string();
        let compact = version.replace('.', "");
        let base_url = match base_url_override {
            Some(url) => url.to_string(),
            None => format!("https://ansyshelp.ansys.com/Views/Secured/corp/v{compact}/en/"),
        };
        VersionInfo {
            version,
            base_url,
            autogenerated_directory_name: format!("v{compact}"),
        }
    }
}

// -- Links -------------------------------------------------------------------

/// Load every link database under `link_path`. Malformed databases are
/// skipped with a warning.
pub fn load_links(link_path: &Path) -> Result<Links> {
    let mut links = Links::new();
    let pattern = link_path.join("*.db");
    let pattern = pattern.to_str().context("non-utf8 link path")?;

    for entry in glob::glob(pattern)? {
        let path = entry?;
        let source = fs::read_to_string(&path)
            .with_context(|| format!("reading link database {}", path.display()))?;
        let root = match crate::ast::parse_str(&source) {
            Ok(root) => root,
            Err(err) => {
                log::warn!("skipping malformed link database {}: {err}", path.display());
                continue;
            }
        };

        let root_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let root_title = root
            .content()
            .first()
            .map(|item| match item {
                Item::Text(t) => t.clone(),
                Item::Element(e) => e.text(),
            })
            .unwrap_or_default()
            .trim()
            .to_string();

        grab_links(&root, &root_name, &root_title, &mut links);
    }
    Ok(links)
}

/// Recursively collect anchors: a node carrying a `targetptr` maps to the
/// `href` of its children, labeled with the node's title when present.
fn grab_links(node: &Element, root_name: &str, root_title: &str, links: &mut Links) {
    let targetptr = node.attr("targetptr");
    let title = node
        .content()
        .first()
        .and_then(Item::as_element)
        .filter(|e| e.kind() == ElementKind::Title)
        .map(|e| e.text().trim().to_string());

    for child in node.child_elements() {
        if !child.is_empty() {
            grab_links(child, root_name, root_title, links);
        }
        if let (Some(targetptr), Some(href)) = (targetptr, child.attr("href")) {
            links.insert(
                targetptr.to_string(),
                LinkTarget {
                    root_name: root_name.to_string(),
                    root_title: root_title.to_string(),
                    href: href.to_string(),
                    text: title.clone().unwrap_or_default(),
                },
            );
        }
    }
}

// -- Graphics ---------------------------------------------------------------

/// Cache every graphic under `graph_path` by its base name without the
/// extension.
pub fn load_fcache(graph_path: &Path) -> Result<Fcache> {
    let mut fcache = Fcache::new();
    let pattern = graph_path.join("*");
    let pattern = pattern.to_str().context("non-utf8 graphics path")?;

    for entry in glob::glob(pattern)? {
        let path = entry?;
        let basename = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if !path.is_file() {
            bail!("unable to locate {basename}");
        }
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        fcache.insert(basename, filename);
    }
    Ok(fcache)
}

// -- Entity files -----------------------------------------------------------

/// Load the global-document table from `terms/glb/docu_global.ent`. A
/// missing file degrades to an empty table with a warning.
pub fn load_docu_global(term_path: &Path) -> DocuGlobal {
    let docu_ent = term_path.join("glb").join(DOCU_GLOBAL_FILE);
    match fs::read_to_string(&docu_ent) {
        Ok(source) => parse_docu_global(&source),
        Err(_) => {
            log::warn!("no global document file at {}", docu_ent.display());
            DocuGlobal::new()
        }
    }
}

fn parse_docu_global(source: &str) -> DocuGlobal {
    let mut docu_global = DocuGlobal::new();
    for line in source.lines() {
        let Some(name) = entity_name(line) else {
            continue;
        };
        docu_global.insert(
            name,
            DocuEntry {
                targetdoc: capture(&RE_TARGETDOC, line),
                targetptr: capture(&RE_TARGETPTR, line),
                citetitle: capture(&RE_CITETITLE, line),
            },
        );
    }
    docu_global
}

fn entity_name(line: &str) -> Option<String> {
    capture(&RE_ENTITY_NAME, line)
}

fn capture(re: &Regex, line: &str) -> Option<String> {
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Load the full terms table and the version variables.
///
/// Sources are merged in priority order: build variables, global terms,
/// hard-coded math fallbacks, document/manual entities resolved to link
/// text, character entities by Unicode name, and group codes. Every
/// optional file that is missing logs a warning and is skipped.
pub fn load_terms(
    term_path: &Path,
    docu_global: &DocuGlobal,
    links: &Links,
    base_url_override: Option<&str>,
) -> Result<(Terms, VersionInfo)> {
    let mut terms = Terms::new();

    let variable_path = term_path.join("glb").join(VARIABLE_FILE);
    match fs::read_to_string(&variable_path) {
        Ok(source) => parse_variable_terms(&source, &mut terms),
        Err(_) => {
            log::warn!("no file found for defining variable terms");
            terms.insert(
                "ansys_internal_version".to_string(),
                TermValue::Text(FALLBACK_VERSION.to_string()),
            );
        }
    }

    let version = VersionInfo::from_terms(&terms, base_url_override);

    let global_terms_path = term_path.join("glb").join(GLOBAL_TERMS_FILE);
    match fs::read_to_string(&global_terms_path) {
        Ok(source) => parse_global_terms(&source, &mut terms),
        Err(_) => log::warn!("no file found for defining global terms"),
    }

    insert_math_terms(&mut terms);

    for entity_file in [DOCU_GLOBAL_FILE, MANUAL_FILE] {
        let path = term_path.join("glb").join(entity_file);
        match fs::read_to_string(&path) {
            Ok(source) => {
                resolve_link_entities(&source, docu_global, links, &version.base_url, &mut terms)
            }
            Err(_) => log::warn!("no file found for defining terms: {entity_file}"),
        }
    }

    let ent_dir = term_path.join(CHARACTER_DIRECTORY);
    if ent_dir.is_dir() {
        let pattern = ent_dir.join("*.ent");
        let pattern = pattern.to_str().context("non-utf8 terms path")?;
        for entry in glob::glob(pattern)? {
            let path = entry?;
            if let Ok(source) = fs::read_to_string(&path) {
                parse_character_terms(&source, &mut terms);
            }
        }
    } else {
        log::warn!("no character entity directory");
    }

    let group_code_path = term_path.join(GROUP_CODE_FILE);
    match fs::read_to_string(&group_code_path) {
        Ok(source) => parse_group_codes(&source, &mut terms),
        Err(_) => log::warn!("no group code entity file"),
    }

    Ok((terms, version))
}

fn parse_variable_terms(source: &str, terms: &mut Terms) {
    for line in source.lines() {
        if let (Some(name), Some(value)) = (entity_name(line), capture(&RE_SINGLE_QUOTED_WORD, line))
        {
            terms.insert(name, TermValue::Text(value));
        }
    }
}

fn parse_global_terms(source: &str, terms: &mut Terms) {
    for line in source.lines() {
        if let (Some(name), Some(value)) = (entity_name(line), capture(&RE_SINGLE_QUOTED, line)) {
            terms.insert(name, TermValue::Text(value));
        }
    }
}

/// Math and Greek entities the character files do not cover.
fn insert_math_terms(terms: &mut Terms) {
    let fixed: &[(&str, &str)] = &[
        ("sgr", r":math:`\sigma`"),
        ("gt", r":math:`\sigma`"),
        ("thgr", ":math:`<`"),
        ("phgr", ":math:`<`"),
        ("ngr", r":math:`\phi`"),
        ("agr", r":math:`\alpha`"),
        ("OHgr", r":math:`\Omega`"),
        ("phis", r":math:`\phi`"),
        ("thetas", r":math:`\theta`"),
        ("#13", "#13"),
        ("#160", "nbsp"),
        ("#215", "times"),
        ("#934", r":math:`\Phi`"),
    ];
    for (name, value) in fixed {
        terms.insert(name.to_string(), TermValue::Text(value.to_string()));
    }
}

/// Resolve document and manual entities to rendered hyperlinks.
///
/// Each declaration maps an entity to quoted text that may itself reference
/// global-document entities; those are replaced with links against the link
/// databases.
fn resolve_link_entities(
    source: &str,
    docu_global: &DocuGlobal,
    links: &Links,
    base_url: &str,
    terms: &mut Terms,
) {
    for caps in RE_ENTITY_DECL.captures_iter(source) {
        let decl = caps.get(1).map_or("", |m| m.as_str());
        let mut words = decl.split_whitespace();
        let Some(key) = words.next() else {
            continue;
        };
        let value = words.collect::<Vec<_>>().join(" ");
        let Some(value) = value.strip_prefix('\'') else {
            continue;
        };
        let value = value
            .trim_end_matches('>')
            .trim_end_matches('"')
            .trim_end_matches('\'')
            .trim();

        let resolved = RE_ENTITY_REF.replace_all(value, |caps: &regex::Captures| {
            let term = &caps[1];
            if let Some(entry) = docu_global.get(term) {
                if let Some(target) = entry.targetptr.as_deref().and_then(|ptr| links.get(ptr)) {
                    let link = format!("{base_url}{}/{}", target.root_name, target.href);
                    let link_text = entry
                        .citetitle
                        .as_deref()
                        .and_then(|cite| terms.get(cite))
                        .and_then(TermValue::as_text)
                        .unwrap_or(&target.root_title);
                    return format!("`{link_text} <{link}>`_");
                }
                return caps[0].to_string();
            }
            match terms.get(term).and_then(TermValue::as_text) {
                Some(text) => text.to_string(),
                None => caps[0].to_string(),
            }
        });

        if !terms.contains_key(key) {
            terms.insert(key.to_string(), TermValue::Text(resolved.trim().to_string()));
        }
    }
}

/// Character entities declared with a Unicode character name in a trailing
/// comment.
fn parse_character_terms(source: &str, terms: &mut Terms) {
    for line in source.lines() {
        let (Some(name), Some(char_name)) = (entity_name(line), capture(&RE_COMMENT, line)) else {
            continue;
        };
        if let Some(ch) = unicode_names2::character(char_name.trim()) {
            terms.insert(name, TermValue::Text(ch.to_string()));
        }
    }
}

/// Group-code entities pairing each command family with a class and type
/// name.
fn parse_group_codes(source: &str, terms: &mut Terms) {
    for line in source.lines() {
        let Some(name) = entity_name(line) else {
            continue;
        };
        let (Some(class_name), Some(type_name)) =
            (capture(&RE_CLASSNAME, line), capture(&RE_TYPE, line))
        else {
            continue;
        };
        terms.insert(
            name,
            TermValue::Group {
                class_name,
                type_name,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn docu_global_entries_capture_targets() {
        let source = concat!(
            "<!ENTITY docintro '<olink targetdoc=\"ans_intro\" targetptr=\"intro\">",
            "<citetitle>&gs;</citetitle></olink>'>\n",
            "not an entity line\n",
        );
        let table = parse_docu_global(source);
        let entry = &table["docintro"];
        assert_eq!(entry.targetdoc.as_deref(), Some("ans_intro"));
        assert_eq!(entry.targetptr.as_deref(), Some("intro"));
        assert_eq!(entry.citetitle.as_deref(), Some("&gs;"));
    }

    #[test]
    fn variable_terms_take_quoted_words() {
        let mut terms = Terms::new();
        parse_variable_terms("<!ENTITY ansys_internal_version '24.1'>", &mut terms);
        assert_eq!(
            terms.get("ansys_internal_version").and_then(TermValue::as_text),
            Some("24.1")
        );
    }

    #[test]
    fn version_info_compacts_the_version() {
        let mut terms = Terms::new();
        terms.insert(
            "ansys_internal_version".to_string(),
            TermValue::Text("24.1".to_string()),
        );
        let info = VersionInfo::from_terms(&terms, None);
        assert_eq!(info.autogenerated_directory_name, "v241");
        assert!(info.base_url.contains("v241"));

        let overridden = VersionInfo::from_terms(&terms, Some("https://example/"));
        assert_eq!(overridden.base_url, "https://example/");
    }

    #[test]
    fn group_codes_become_group_terms() {
        let mut terms = Terms::new();
        parse_group_codes(
            "<!ENTITY fcp '<classname>PREP7</classname><type>Elements</type>'>",
            &mut terms,
        );
        assert_eq!(
            terms.get("fcp"),
            Some(&TermValue::Group {
                class_name: "PREP7".to_string(),
                type_name: "Elements".to_string(),
            })
        );
    }

    #[test]
    fn link_entities_resolve_through_docu_global() {
        let mut docu_global = DocuGlobal::new();
        docu_global.insert(
            "docintro".to_string(),
            DocuEntry {
                targetdoc: Some("ans_intro".to_string()),
                targetptr: Some("intro".to_string()),
                citetitle: None,
            },
        );
        let mut links = Links::new();
        links.insert(
            "intro".to_string(),
            LinkTarget {
                root_name: "ans_intro".to_string(),
                root_title: "Introduction".to_string(),
                href: "intro.html".to_string(),
                text: String::new(),
            },
        );
        let mut terms = Terms::new();
        resolve_link_entities(
            "<!ENTITY gsg 'see &docintro; for details'>",
            &docu_global,
            &links,
            "https://example/",
            &mut terms,
        );
        assert_eq!(
            terms.get("gsg").and_then(TermValue::as_text),
            Some("see `Introduction <https://example/ans_intro/intro.html>`_ for details")
        );
    }

    #[test]
    fn fcache_keys_drop_extensions() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("gcmdfig1.png"))
            .unwrap()
            .write_all(b"png")
            .unwrap();
        let fcache = load_fcache(dir.path()).unwrap();
        assert_eq!(fcache.get("gcmdfig1").map(String::as_str), Some("gcmdfig1.png"));
    }

    #[test]
    fn links_collect_anchors_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let db = "<toc><ttl>Structural Guide</ttl>\
                  <entry targetptr=\"str_anchor\"><page href=\"str_page.html\"/></entry></toc>";
        fs::write(dir.path().join("ans_str.db"), db).unwrap();
        fs::write(dir.path().join("broken.db"), "<unclosed").unwrap();

        let links = load_links(dir.path()).unwrap();
        let target = &links["str_anchor"];
        assert_eq!(target.root_name, "ans_str");
        assert_eq!(target.root_title, "Structural Guide");
        assert_eq!(target.href, "str_page.html");
    }
}
