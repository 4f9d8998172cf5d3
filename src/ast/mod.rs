//! Element tree built over the vendor XML schema.
//!
//! Each parsed element carries a [`ElementKind`] resolved from its tag
//! through a flat dispatch match; unrecognized tags fall back to
//! [`ElementKind::Generic`] so unknown markup degrades to plain-text
//! flattening instead of aborting the file.

pub mod render;

use crate::text::{apply_cleanup, collapse_whitespace, normalize_anchor, XML_CLEANUP};
use anyhow::{anyhow, Result};
use regex::Regex;
use roxmltree::Node;
use std::sync::LazyLock;

/// One recognized tag of the vendor schema, plus the generic fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Application,
    BlockQuote,
    BridgeHead,
    Caution,
    Chapter,
    CiteTitle,
    ClassName,
    Code,
    ColSpec,
    Command,
    ComputerOutput,
    Emphasis,
    Entry,
    Envar,
    Example,
    Figure,
    FileName,
    Footnote,
    FootnoteRef,
    FormalPara,
    FunctionElem,
    Generic,
    GlossTerm,
    Graphic,
    GuiButton,
    GuiIcon,
    GuiLabel,
    GuiMenu,
    GuiMenuItem,
    Highlights,
    ImageData,
    ImageObject,
    Important,
    IndexTerm,
    InformalEquation,
    InformalExample,
    InformalFigure,
    InformalTable,
    InlineEquation,
    InlineGraphic,
    Interface,
    ItemizedList,
    Link,
    ListItem,
    Literal,
    LiteralLayout,
    Markup,
    Math,
    MediaObject,
    Member,
    Note,
    OLink,
    OptionElem,
    OrderedList,
    Paragraph,
    Phrase,
    Primary,
    ProductName,
    ProgramListing,
    Quote,
    RefClass,
    RefEntry,
    RefEntryTitle,
    RefMeta,
    RefName,
    RefNameDiv,
    RefPurpose,
    RefSection,
    RefSynopsisDiv,
    Remark,
    Replaceable,
    Row,
    Screen,
    Section1,
    SegTitle,
    Sidebar,
    SimpleList,
    StructName,
    SubScript,
    SuperScript,
    Table,
    TBody,
    Term,
    TGroup,
    THead,
    Title,
    ULink,
    UserInput,
    VariableList,
    VarlistEntry,
    XmlType,
    XmlWarning,
    XRef,
}

/// Tag-name dispatch. Unknown tags degrade to `Generic`.
pub fn kind_for_tag(tag: &str) -> ElementKind {
    use ElementKind::*;
    match tag.to_ascii_lowercase().as_str() {
        "application" => Application,
        "blockquote" => BlockQuote,
        "bridgehead" => BridgeHead,
        "caution" => Caution,
        "chapter" => Chapter,
        "citetitle" => CiteTitle,
        "classname" => ClassName,
        "code" => Code,
        "colspec" => ColSpec,
        "command" => Command,
        "computeroutput" => ComputerOutput,
        "emphasis" => Emphasis,
        "entry" => Entry,
        "envar" => Envar,
        "example" => Example,
        "figure" => Figure,
        "filename" => FileName,
        "footnote" => Footnote,
        "footnoteref" => FootnoteRef,
        "formalpara" => FormalPara,
        "function" => FunctionElem,
        "glossterm" => GlossTerm,
        "graphic" => Graphic,
        "guibutton" => GuiButton,
        "guiicon" => GuiIcon,
        "guilabel" => GuiLabel,
        "guimenu" => GuiMenu,
        "guimenuitem" => GuiMenuItem,
        "highlights" => Highlights,
        "imagedata" => ImageData,
        "imageobject" => ImageObject,
        "important" => Important,
        "indexterm" => IndexTerm,
        "informalequation" => InformalEquation,
        "informalexample" => InformalExample,
        "informalfigure" => InformalFigure,
        "informaltable" => InformalTable,
        "inlineequation" => InlineEquation,
        "inlinegraphic" => InlineGraphic,
        "interface" => Interface,
        "itemizedlist" => ItemizedList,
        "link" => Link,
        "listitem" => ListItem,
        "literal" => Literal,
        "literallayout" => LiteralLayout,
        "markup" => Markup,
        "math" => Math,
        "mediaobject" => MediaObject,
        "member" => Member,
        "note" => Note,
        "olink" => OLink,
        "option" => OptionElem,
        "orderedlist" => OrderedList,
        "para" => Paragraph,
        "phrase" => Phrase,
        "primary" => Primary,
        "productname" => ProductName,
        "programlisting" => ProgramListing,
        "quote" => Quote,
        "refclass" => RefClass,
        "refentry" => RefEntry,
        "refentrytitle" => RefEntryTitle,
        "refmeta" => RefMeta,
        "refname" => RefName,
        "refnamediv" => RefNameDiv,
        "refpurpose" => RefPurpose,
        "refsect1" | "refsect2" | "refsect3" => RefSection,
        "refsynopsisdiv" => RefSynopsisDiv,
        "remark" => Remark,
        "replaceable" => Replaceable,
        "row" => Row,
        "screen" => Screen,
        "sect1" => Section1,
        "segtitle" => SegTitle,
        "sidebar" => Sidebar,
        "simplelist" => SimpleList,
        "structname" => StructName,
        "subscript" => SubScript,
        "superscript" => SuperScript,
        "table" => Table,
        "tbody" => TBody,
        "term" => Term,
        "tgroup" => TGroup,
        "thead" => THead,
        "title" | "ttl" => Title,
        "ulink" => ULink,
        "userinput" => UserInput,
        "variablelist" => VariableList,
        "varlistentry" => VarlistEntry,
        "type" => XmlType,
        "warning" => XmlWarning,
        "xref" => XRef,
        _ => Generic,
    }
}

/// One entry of an element's content sequence, in document order.
#[derive(Debug, Clone)]
pub enum Item {
    /// Interstitial text, whitespace-collapsed.
    Text(String),
    Element(Element),
}

impl Item {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Item::Element(e) => Some(e),
            Item::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Item::Text(t) => Some(t),
            Item::Element(_) => None,
        }
    }
}

/// An owned element of the parsed tree.
///
/// A child's DOM tail (text following its closing tag) lands in the parent's
/// content sequence as a trailing text run, which is how roxmltree already
/// models interstitial text nodes.
#[derive(Debug, Clone)]
pub struct Element {
    kind: ElementKind,
    tag: String,
    id: Option<String>,
    attrs: Vec<(String, String)>,
    content: Vec<Item>,
    /// Set for varlist entries sitting inside a command synopsis block.
    arg_entry: bool,
}

impl Element {
    /// Build an owned element from a DOM node, recursing into children.
    pub fn from_node(node: Node) -> Element {
        let tag = node.tag_name().name().to_string();
        let kind = kind_for_tag(&tag);
        let id = node.attribute("id").map(normalize_anchor);
        let attrs = node
            .attributes()
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect();

        // code-carrying tags keep their text verbatim
        let verbatim = matches!(
            kind,
            ElementKind::ProgramListing
                | ElementKind::UserInput
                | ElementKind::Screen
                | ElementKind::LiteralLayout
                | ElementKind::Code
        );

        let mut content = Vec::new();
        for child in node.children() {
            if child.is_text() {
                if let Some(text) = child.text() {
                    if verbatim {
                        let trimmed = text.trim_matches('\n');
                        if !trimmed.trim().is_empty() {
                            content.push(Item::Text(trimmed.to_string()));
                        }
                        continue;
                    }
                    let collapsed = collapse_whitespace(text);
                    if !collapsed.is_empty() {
                        // a boundary space separates the run from sibling
                        // inline elements when runs are joined back together
                        let mut run = String::with_capacity(collapsed.len() + 2);
                        if text.starts_with(char::is_whitespace) {
                            run.push(' ');
                        }
                        run.push_str(&collapsed);
                        if text.ends_with(char::is_whitespace) {
                            run.push(' ');
                        }
                        content.push(Item::Text(run));
                    }
                }
            } else if child.is_element() {
                content.push(Item::Element(Element::from_node(child)));
            }
        }

        let arg_entry = kind == ElementKind::VarlistEntry && in_synopsis(node);

        Element {
            kind,
            tag,
            id,
            attrs,
            content,
            arg_entry,
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Dot-normalized anchor id, if the source element carried one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn content(&self) -> &[Item] {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Child elements only (text runs skipped).
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.content.iter().filter_map(Item::as_element)
    }

    /// Whether this varlist entry sits inside a command's synopsis block.
    pub fn is_arg_entry(&self) -> bool {
        self.arg_entry
    }

    /// First immediate child of the given kind.
    pub fn find(&self, kind: ElementKind) -> Option<&Element> {
        self.child_elements().find(|e| e.kind == kind)
    }

    /// First descendant of the given kind, depth-first pre-order.
    pub fn rec_find(&self, kind: ElementKind) -> Option<&Element> {
        for child in self.child_elements() {
            if child.kind == kind {
                return Some(child);
            }
            if let Some(found) = child.rec_find(kind) {
                return Some(found);
            }
        }
        None
    }

    /// All matching immediate children, or all matching descendants when
    /// `recursive` is set.
    pub fn find_all(&self, kind: ElementKind, recursive: bool) -> Vec<&Element> {
        let mut found = Vec::new();
        for child in self.child_elements() {
            if child.kind == kind {
                found.push(child);
            } else if recursive {
                found.extend(child.find_all(kind, recursive));
            }
        }
        found
    }

    /// First `Title` child, stringified.
    pub fn title(&self) -> Option<String> {
        self.find(ElementKind::Title).map(|t| t.text())
    }

    /// Whether any character of the stringified element is alphanumeric.
    /// Terms that fail this (e.g. a literal `--`) mark inactive entries.
    pub fn any_alphanumeric(&self) -> bool {
        self.text().chars().any(char::is_alphanumeric)
    }

    /// Trailing content after the first item, stringified. What several
    /// inline tags treat as "the rest".
    pub fn tail(&self) -> String {
        if self.content.len() < 2 {
            return String::new();
        }
        self.content[1..]
            .iter()
            .map(item_text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Plain-text representation of the whole subtree.
    pub fn text(&self) -> String {
        use ElementKind::*;
        match self.kind {
            Paragraph | Title => {
                let mut s = self.join_content();
                s.push('\n');
                s
            }
            Phrase | RefPurpose => self.join_content(),
            Term => {
                let joined = self.join_content();
                // normalize comma spacing inside multi-name terms
                joined
                    .split(',')
                    .map(str::trim)
                    .collect::<Vec<_>>()
                    .join(", ")
            }
            Quote => match self.content.first() {
                Some(first) => format!("\"{}\" {}", item_text(first), self.tail()),
                None => String::new(),
            },
            Link | XRef => self.attr("linkend").unwrap_or_default().to_string(),
            ItemizedList | SimpleList => self
                .content
                .iter()
                .map(|item| format!("* {}", item_text(item).trim()))
                .collect::<Vec<_>>()
                .join("\n"),
            VarlistEntry => match (self.content.first(), self.content.get(1)) {
                (Some(term), Some(text)) => format!("{}\n{}", item_text(term), item_text(text)),
                (Some(term), None) => item_text(term),
                _ => String::new(),
            },
            Command => match self.content.first() {
                Some(name) => format!("{} {}", item_text(name), self.tail())
                    .trim_end()
                    .to_string(),
                None => String::new(),
            },
            RefEntryTitle => apply_cleanup(&self.join_content(), XML_CLEANUP),
            Math | InlineEquation | InformalEquation => "<Equation>".to_string(),
            _ => self.join_content(),
        }
    }

    fn join_content(&self) -> String {
        self.content.iter().map(item_text).collect::<String>()
    }
}

fn item_text(item: &Item) -> String {
    match item {
        Item::Text(t) => t.clone(),
        Item::Element(e) => e.text(),
    }
}

/// Ancestry test for varlist entries: the entry is an argument entry when
/// its variable list is a direct child of the synopsis division, or when the
/// nearest anchored ancestor is an argument-description section.
fn in_synopsis(node: Node) -> bool {
    let mut ancestors = node.ancestors().skip(1).filter(|n| n.is_element());
    let Some(parent) = ancestors.next() else {
        return false;
    };
    let Some(grandparent) = ancestors.next() else {
        return false;
    };
    if parent.tag_name().name() == "variablelist"
        && grandparent.tag_name().name() == "refsynopsisdiv"
    {
        return true;
    }
    // miscoded synopsis sections carry an "argdescript" anchor instead
    grandparent
        .attribute("id")
        .map(|id| id.contains("argdescript"))
        .unwrap_or(false)
}

static RE_EXTERNAL_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&([A-Za-z][A-Za-z0-9._-]*);").unwrap());

/// Rewrite entity references defined in external `.ent` files to literal
/// `&name;` text so parsing succeeds; term substitution resolves them
/// later. The predefined XML entities are left alone.
pub fn sanitize_entities(source: &str) -> String {
    RE_EXTERNAL_ENTITY
        .replace_all(source, |caps: &regex::Captures| {
            match &caps[1] {
                "amp" | "lt" | "gt" | "quot" | "apos" => caps[0].to_string(),
                name => format!("&amp;{name};"),
            }
        })
        .into_owned()
}

fn parse_document(source: &str) -> Result<roxmltree::Document<'_>> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    Ok(roxmltree::Document::parse_with_options(source, options)?)
}

/// Parse an XML source into an element tree rooted at the document element.
pub fn parse_str(source: &str) -> Result<Element> {
    let doc = parse_document(source)?;
    Ok(Element::from_node(doc.root_element()))
}

/// Locate the command wrapper element in a source file. Files without one
/// are not command documents.
pub fn find_refentry(source: &str) -> Result<Element> {
    let doc = parse_document(source)?;
    let node = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "refentry")
        .ok_or_else(|| anyhow!("no refentry element"))?;
    Ok(Element::from_node(node))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tags_fall_back_to_generic() {
        let root = parse_str("<mystery>some <odd>text</odd> here</mystery>").unwrap();
        assert_eq!(root.kind(), ElementKind::Generic);
        assert_eq!(root.text(), "some text here");
    }

    #[test]
    fn tails_fold_into_parent_content() {
        let root = parse_str("<para>before <literal>x</literal> after</para>").unwrap();
        let texts: Vec<_> = root
            .content()
            .iter()
            .filter_map(Item::as_text)
            .collect();
        assert_eq!(texts, vec!["before ", " after"]);
    }

    #[test]
    fn inline_children_keep_word_boundaries() {
        let root = parse_str("<term>Lab <replaceable>VAL</replaceable></term>").unwrap();
        assert_eq!(root.text(), "Lab VAL");

        let para = parse_str("<para>see <command>N</command> for nodes</para>").unwrap();
        assert_eq!(para.text(), "see N for nodes\n");
    }

    #[test]
    fn text_runs_are_collapsed() {
        let root = parse_str("<para>a   b\n\t\tc</para>").unwrap();
        assert_eq!(root.content().len(), 1);
        assert_eq!(root.content()[0].as_text(), Some("a b c"));
    }

    #[test]
    fn ids_are_dot_normalized() {
        let root = parse_str(r#"<refsect1 id="a.b.c">x</refsect1>"#).unwrap();
        assert_eq!(root.id(), Some("a_b_c"));
    }

    #[test]
    fn rec_find_is_preorder() {
        let root = parse_str(
            "<refentry><refsect1><title>first</title></refsect1><title>second</title></refentry>",
        )
        .unwrap();
        let title = root.rec_find(ElementKind::Title).unwrap();
        assert_eq!(title.text().trim(), "first");
    }

    #[test]
    fn find_all_recursive_descends_past_matches() {
        let root = parse_str(
            "<refentry><refsect1><variablelist><varlistentry><term>a</term></varlistentry>\
             </variablelist></refsect1></refentry>",
        )
        .unwrap();
        assert_eq!(root.find_all(ElementKind::VarlistEntry, true).len(), 1);
        assert!(root.find_all(ElementKind::VarlistEntry, false).is_empty());
    }

    #[test]
    fn synopsis_entries_are_arg_entries() {
        let root = parse_str(
            "<refentry><refsynopsisdiv><variablelist><varlistentry><term>N</term>\
             </varlistentry></variablelist></refsynopsisdiv></refentry>",
        )
        .unwrap();
        let entry = root.rec_find(ElementKind::VarlistEntry).unwrap();
        assert!(entry.is_arg_entry());
    }

    #[test]
    fn glossary_entries_are_not_arg_entries() {
        let root = parse_str(
            "<refentry><refsect1><variablelist><varlistentry><term>N</term>\
             </varlistentry></variablelist></refsect1></refentry>",
        )
        .unwrap();
        let entry = root.rec_find(ElementKind::VarlistEntry).unwrap();
        assert!(!entry.is_arg_entry());
    }

    #[test]
    fn argdescript_anchor_marks_arg_entries() {
        let root = parse_str(
            r#"<refentry><refsect1 id="cmd.argdescript.x"><variablelist><varlistentry>
               <term>N</term></varlistentry></variablelist></refsect1></refentry>"#,
        )
        .unwrap();
        let entry = root.rec_find(ElementKind::VarlistEntry).unwrap();
        assert!(entry.is_arg_entry());
    }

    #[test]
    fn refentry_lookup_fails_for_other_documents() {
        assert!(find_refentry("<book><chapter>x</chapter></book>").is_err());
    }

    #[test]
    fn external_entities_survive_as_literal_text() {
        let source = sanitize_entities("<refclass>&fcp;: &lt;TYPE&gt; &#160;</refclass>");
        assert_eq!(source, "<refclass>&amp;fcp;: &lt;TYPE&gt; &#160;</refclass>");
        let root = parse_str(&source).unwrap();
        assert_eq!(root.text().trim_end(), "&fcp;: <TYPE>");
    }
}
