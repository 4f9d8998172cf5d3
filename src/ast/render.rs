//! RST rendering of the element tree.
//!
//! Rendering is driven by a single [`RenderContext`] carrying every lookup
//! table a rule may need, so any element can be rendered from any position
//! in the tree. Inline tails are not handled here: a child's trailing text
//! already sits in its parent's content sequence, so parents join it in.

use super::{Element, ElementKind, Item};
use crate::args::is_numeric;
use crate::text::{
    apply_cleanup, collapse_whitespace, indent_lines, normalize_anchor, resize_length,
    resize_lines, CLEANUP,
};
use crate::{py_name, Fcache, Links, NameMap, Terms};
use regex::Regex;
use std::sync::LazyLock;

/// Default reflow width for rendered docstrings.
pub const DEFAULT_WIDTH: usize = 100;

/// Block-level kinds whose output must not be reflowed by an enclosing
/// element.
const NO_RESIZE: &[ElementKind] = &[
    ElementKind::VariableList,
    ElementKind::ItemizedList,
    ElementKind::SimpleList,
    ElementKind::Caution,
    ElementKind::XmlWarning,
    ElementKind::ProgramListing,
    ElementKind::Example,
];

static RE_EXTERNAL_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`.+`_").unwrap());

/// Everything the per-tag rendering rules may need to consult.
pub struct RenderContext<'a> {
    pub terms: &'a Terms,
    pub links: &'a Links,
    pub fcache: &'a Fcache,
    pub name_map: &'a NameMap,
    pub base_url: Option<&'a str>,
    /// Directory name figure paths are rewritten against.
    pub image_dir: &'a str,
}

impl Element {
    /// Render this element to RST at the given indent and reflow width.
    pub fn to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        use ElementKind::*;
        match self.kind {
            Paragraph => self.paragraph_to_rst(ctx, indent, width),
            Phrase => self
                .generic_to_rst(ctx, indent, width)
                .replace("\n\n", ""),
            ItemizedList | SimpleList => self.list_to_rst(ctx, indent, width),
            OrderedList => self
                .child_elements()
                .map(|item| resize_length(&item.to_rst(ctx, indent, width), width, "", ""))
                .collect::<Vec<_>>()
                .join("\n\n"),
            ListItem => self.list_item_to_rst(ctx, indent, width),
            Member => self
                .content
                .iter()
                .map(|item| self.render_item(item, ctx, indent, width, false))
                .collect::<Vec<_>>()
                .join("\n"),
            VariableList => self.variablelist_to_rst(ctx, indent, width),
            VarlistEntry => self.varlist_entry_to_rst(ctx, indent, width),
            Term => self.term_to_rst(ctx, indent, width),
            RefSection => self.refsection_to_rst(ctx, indent, width),
            Emphasis => self.emphasis_to_rst(ctx, indent, width),
            Example => self.example_to_rst(ctx, indent, width),
            Literal | ComputerOutput | StructName | GuiMenuItem => {
                format!("``{}``", self.join_content().trim())
            }
            Replaceable => format!("``{}``", first_text(self)),
            FileName => format!(":file:`{}`", first_text(self).replace('*', r"\*")),
            SubScript => format!(":sub:`{}`", first_text(self)),
            SuperScript => format!(":sup:`{}`", first_text(self)),
            Command => self.sphinx_cmd(ctx),
            Link => self.link_to_rst(ctx),
            OLink => self.olink_to_rst(ctx, indent, width),
            XRef => {
                let linkend = normalize_anchor(self.attr("linkend").unwrap_or_default());
                let tail = self.join_content();
                format!(":ref:`{linkend}` {tail}").trim_end().to_string()
            }
            Graphic => self.graphic_to_rst(ctx, indent),
            Figure => self.figure_to_rst(ctx, indent, width),
            Math => {
                format!("\n\n{indent}.. math::\n\n{indent}    <Equation>\n")
            }
            InlineEquation | InformalEquation => "<Equation>".to_string(),
            ProgramListing | UserInput => self.program_listing_to_rst(ctx, indent, width),
            Caution | XmlWarning => self.warning_to_rst(indent, width),
            BlockQuote => self.blockquote_to_rst(ctx, indent, width),
            Table => self.table_to_rst(ctx, indent, width),
            TGroup => self.tgroup_to_rst(ctx),
            Entry => self.entry_to_rst(ctx, indent, width),
            InformalTable => "\nThis command contains some tables and extra information which \
                              can be inspected in the original documentation pointed above.\n"
                .to_string(),
            BridgeHead => self.bridgehead_to_rst(ctx, indent, width),
            RefEntryTitle => apply_cleanup(&self.join_content(), crate::text::XML_CLEANUP),
            _ => self.generic_to_rst(ctx, indent, width),
        }
    }

    /// Default rule: render children, reflow interstitial text, join with
    /// spaces.
    fn generic_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        self.content
            .iter()
            .map(|item| self.render_item(item, ctx, indent, width, true))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn render_item(
        &self,
        item: &Item,
        ctx: &RenderContext,
        indent: &str,
        width: usize,
        resize_text: bool,
    ) -> String {
        match item {
            Item::Element(e) => e.to_rst(ctx, indent, width),
            Item::Text(t) if resize_text => resize_length(t, width, indent, indent),
            Item::Text(t) => t.clone(),
        }
    }

    // -- Paragraphs --------------------------------------------------------

    fn paragraph_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        if self.attr("revisionflag") == Some("deleted") {
            return String::new();
        }

        let mut items: Vec<String> = Vec::new();
        for item in &self.content {
            match item {
                Item::Element(e) if e.kind == ElementKind::VariableList => {
                    items.push(format!("\n\n{}", e.to_rst(ctx, indent, width)));
                }
                // subscripts attach to the preceding run without a space
                Item::Element(e) if e.kind == ElementKind::SubScript => {
                    let rendered = e.to_rst(ctx, indent, width);
                    match items.last_mut() {
                        Some(last) => last.push_str(&rendered),
                        None => items.push(rendered),
                    }
                }
                Item::Element(e) => items.push(e.to_rst(ctx, indent, width)),
                Item::Text(t) => {
                    items.push(resize_length(&t.replace('\n', " "), width, indent, indent));
                }
            }
        }

        let mut rst = format!("{}\n\n", items.join(" "));
        rst = apply_cleanup(&rst, CLEANUP);

        if !self.has_no_resize_child() && !rst.contains("* ") {
            rst = resize_length(&rst, width, indent, indent);
        }

        if let Some(id) = self.id() {
            // cross-referencing a paragraph needs a rubric header
            rst = promote_rubric(&rst, id);
        }
        rst
    }

    pub(crate) fn has_no_resize_child(&self) -> bool {
        self.child_elements().any(|e| NO_RESIZE.contains(&e.kind))
    }

    // -- Lists -------------------------------------------------------------

    fn list_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let mut lines: Vec<String> = Vec::new();
        for item in &self.content {
            let (item_lines, skip_resize) = match item {
                Item::Element(e)
                    if matches!(e.kind, ElementKind::ListItem | ElementKind::Member) =>
                {
                    let body = e.to_rst(ctx, indent, width);
                    let bullet = resize_length(&format!("* {body}"), width, indent, "  ");
                    (vec![bullet], true)
                }
                Item::Element(e) => (
                    e.to_rst(ctx, indent, width)
                        .lines()
                        .map(str::to_string)
                        .collect(),
                    false,
                ),
                Item::Text(t) => (t.lines().map(str::to_string).collect(), false),
            };

            if skip_resize || item_lines.join("\n").contains(".. code::") {
                lines.extend(item_lines);
            } else {
                for line in &item_lines {
                    lines.extend(resize_lines(line, width, indent, indent));
                }
            }
        }

        // lists need a preceding blank line and a trailing one
        let mut fenced = vec![String::new(), String::new()];
        fenced.extend(lines);
        fenced.push(String::new());
        fenced.join("\n")
    }

    fn list_item_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let mut items: Vec<String> = Vec::new();
        if let Some(id) = self.id() {
            items.push(format!(".. _{id}:"));
            items.push(String::new());
            items.push(String::new());
        }
        for item in &self.content {
            items.push(self.render_item(item, ctx, indent, width, false));
        }
        items.join("\n")
    }

    // -- Variable lists ----------------------------------------------------

    fn variablelist_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let mut active_items: Vec<String> = Vec::new();
        for (i, item) in self.content.iter().enumerate() {
            if let Item::Element(e) = item {
                if e.kind == ElementKind::VarlistEntry && !e.is_active() {
                    continue;
                }
            }
            let rst_item = self.render_item(item, ctx, indent, width, false);

            // an entry's description (second child) governs reflow: entries
            // holding block content keep their layout and are only indented
            let description = item
                .as_element()
                .filter(|e| e.content().len() > 1)
                .and_then(|e| e.content().get(1))
                .and_then(Item::as_element);
            let rst_item = match description {
                Some(d) if !d.has_no_resize_child() && !rst_item.contains("* ") => {
                    resize_length(&rst_item, width, indent, &format!("{indent}  "))
                }
                Some(_) => indent_lines(&rst_item, &format!("{indent}{indent}")),
                None if item.as_element().is_none() && i == self.content.len() - 1 => {
                    // a trailing text run sits outside the list proper
                    resize_length(&rst_item, width, indent, indent)
                }
                None => resize_length(
                    &rst_item,
                    width,
                    &format!("{indent} "),
                    &format!("{indent}  "),
                ),
            };
            active_items.push(rst_item);
        }
        format!("{}\n", active_items.join("\n"))
    }

    /// Whether this varlist entry carries a real value. Synopsis lists pad
    /// unused positions with terms like `--` or `--,--`.
    pub fn is_active(&self) -> bool {
        if !self.arg_entry {
            return true;
        }
        self.content
            .first()
            .and_then(Item::as_element)
            .map(Element::any_alphanumeric)
            .unwrap_or(false)
    }

    /// Parameter types guessed from a nested variable list of values.
    fn parm_types(&self) -> Vec<&'static str> {
        if let Some(varlist) = self.rec_find(ElementKind::VariableList) {
            let terms: Vec<String> = varlist
                .find_all(ElementKind::VarlistEntry, false)
                .iter()
                .filter_map(|e| e.content.first().map(item_str))
                .collect();
            if !terms.is_empty() {
                let numeric: Vec<bool> = terms.iter().map(|t| is_numeric(t.trim())).collect();
                if numeric.iter().all(|&n| n) {
                    return vec!["int"];
                }
                if numeric.iter().any(|&n| n) {
                    return vec!["int", "str"];
                }
            }
        }
        vec!["str"]
    }

    /// Term of a varlist entry, rewritten for a Python parameter list.
    fn py_term(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let Some(term) = self.content.first() else {
            return String::new();
        };

        if self.arg_entry {
            let mut arg = item_str(term).trim().to_lowercase();
            if arg == "type" {
                arg = "type_".to_string();
            }
            return format!("{arg} : {}", self.parm_types().join(" or "));
        }

        let rendered = match term {
            Item::Element(e) => e.to_rst(ctx, indent, width),
            Item::Text(t) => t.clone(),
        };
        let arg = rendered.replace("--", "").trim().to_string();
        if arg.eq_ignore_ascii_case("blank") {
            return String::new();
        }
        arg
    }

    /// Description of a varlist entry with GUI-interaction sentences removed.
    fn py_text(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let Some(text) = self.content.get(1) else {
            return String::new();
        };
        let rst = match text {
            Item::Element(e) => e.to_rst(ctx, indent, width),
            Item::Text(t) => t.clone(),
        };
        if rst.contains("graphical") {
            return rst
                .split(". ")
                .filter(|sentence| !sentence.contains("GUI"))
                .collect::<Vec<_>>()
                .join(". ");
        }
        rst
    }

    fn varlist_entry_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let mut py_term = self.py_term(ctx, indent, width);
        let py_text = self.py_text(ctx, indent, width);

        if py_term.contains("``") {
            py_term = py_term.replace("``", "");
        }
        if !RE_EXTERNAL_LINK.is_match(&py_term) && !py_term.contains(":ref:`") {
            py_term = format!("``{py_term}``");
        }

        let mut output = format!("* {py_term} - {py_text}");

        let text_no_resize = self
            .content
            .get(1)
            .and_then(Item::as_element)
            .map(Element::has_no_resize_child)
            .unwrap_or(false);
        if !text_no_resize && !py_text.contains("* ") {
            output = resize_length(&output, width, indent, indent);
        }

        let mut split = output.lines();
        let Some(first_line) = split.next() else {
            return output;
        };
        let rest: Vec<&str> = split.collect();
        if rest.is_empty() {
            return output;
        }
        format!(
            "{first_line}\n{}",
            indent_lines(&rest.join("\n"), "  ")
        )
    }

    fn term_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let mut items: Vec<String> = self
            .content
            .iter()
            .map(|item| {
                self.render_item(item, ctx, indent, width, false)
                    .trim()
                    .to_string()
            })
            .collect();

        // multi-name terms sometimes restate the list separator
        if items.len() > 1 && items.iter().any(|i| i.contains(':')) {
            items.retain(|i| !i.contains(':'));
        }

        let text = items.join(", ");
        match text.strip_suffix('\u{2013}') {
            Some(stripped) => stripped.to_string(),
            None => text,
        }
    }

    // -- Sections ----------------------------------------------------------

    fn refsection_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let mut items: Vec<String> = Vec::new();
        if let Some(id) = self.id() {
            items.push(format!("\n.. _{id}:\n\n"));
        }
        // first item is the section title
        for item in self.content.iter().skip(1) {
            items.push(self.render_item(item, ctx, indent, width, false));
        }
        items.join("\n")
    }

    fn emphasis_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let Some(first) = self.content.first() else {
            return String::new();
        };
        let content = match (self.attr("role"), first) {
            (Some("bold"), item) => format!("**{}**", item_str(item).trim()),
            (_, item) => item_str(item),
        };
        let rest: Vec<String> = self.content[1..]
            .iter()
            .map(|item| self.render_item(item, ctx, indent, width, true))
            .collect();
        format!("{content} {}", rest.join(" ")).trim_end().to_string()
    }

    fn example_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let mut lines: Vec<String> = Vec::new();
        for item in &self.content {
            let rst_item = match item {
                Item::Element(e) if e.kind == ElementKind::Title => {
                    let title = e.to_rst(ctx, indent, width);
                    if e.find(ElementKind::Command).is_some() {
                        format!("Example: {title}\n")
                    } else {
                        format!("**Example: {title}**\n")
                    }
                }
                item => self.render_item(item, ctx, indent, width, false),
            };
            lines.push(rst_item);
        }
        indent_lines(&lines.join("\n"), "  ")
    }

    fn warning_to_rst(&self, indent: &str, width: usize) -> String {
        let body_indent = format!("{indent}    ");
        let mut lines = vec![
            String::new(),
            String::new(),
            ".. warning::".to_string(),
            String::new(),
        ];
        lines.push(resize_length(&self.text(), width, &body_indent, &body_indent));
        lines.push(String::new());
        lines.join("\n")
    }

    fn blockquote_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let mut items: Vec<String> = Vec::new();
        for item in &self.content {
            match item {
                Item::Element(e) => items.push(e.to_rst(ctx, indent, width)),
                Item::Text(t) if !t.contains("* ") => {
                    items.push(resize_length(t, width, indent, indent));
                }
                Item::Text(t) => items.push(t.clone()),
            }
        }
        format!("\n\n{}\n\n", items.concat())
    }

    fn bridgehead_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let subtitle = self.generic_to_rst(ctx, indent, width);
        let mut out: Vec<String> = Vec::new();
        if let Some(id) = self.id() {
            out.push(format!("\n.. _{id}:\n"));
        }
        out.push(subtitle.clone());
        out.push("^".repeat(rule_length(&subtitle)));
        out.push(String::new());
        out.join("\n")
    }

    // -- Inline references -------------------------------------------------

    /// Sphinx reference for a command mention: a `:ref:` role when the
    /// command maps to a generated function, a literal otherwise.
    fn sphinx_cmd(&self, ctx: &RenderContext) -> String {
        let name = first_text(self);
        let py_cmd = py_name(&name, ctx.name_map);
        if py_cmd != name && ctx.name_map.values().any(|v| v == py_cmd) {
            format!(":ref:`{py_cmd}`")
        } else {
            format!("``{py_cmd}``")
        }
    }

    fn link_to_rst(&self, ctx: &RenderContext) -> String {
        if ctx.base_url.is_none() {
            log::error!("link rendered without a base url");
        }
        let tail = self.join_content().replace('\n', "");
        let linkend = self.attr("linkend").unwrap_or_default();
        if let (Some(target), Some(base_url)) = (ctx.links.get(linkend), ctx.base_url) {
            let text = target.text.replace('\n', "");
            let link = format!("{base_url}{}/{}", target.root_name, target.href);
            return format!("`{text} <{link}>`_ {tail}").trim_end().to_string();
        }
        // internal link
        let linkend = normalize_anchor(linkend);
        if tail.is_empty() {
            format!(":ref:`{linkend}`")
        } else {
            format!(":ref:`{tail} <{linkend}>`")
        }
    }

    fn olink_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        if ctx.base_url.is_none() {
            log::error!("olink rendered without a base url");
        }
        let targetptr = self.attr("targetptr").unwrap_or_default();
        if let (Some(target), Some(base_url)) = (ctx.links.get(targetptr), ctx.base_url) {
            let link = format!("{base_url}{}/{}", target.root_name, target.href);
            let mut content = collapse_whitespace(&self.text());
            if content.is_empty() {
                content = target.text.clone();
            }
            return format!("`{} <{link}>`_", content.trim());
        }
        self.generic_to_rst(ctx, indent, width)
    }

    // -- Graphics ----------------------------------------------------------

    fn graphic_to_rst(&self, ctx: &RenderContext, indent: &str) -> String {
        let entityref = self.attr("entityref").map(str::trim);
        let Some(entityref) = entityref else {
            // probably a math graphic
            if let Some(fileref) = self.attr("fileref") {
                if fileref.contains("mathgraphics") {
                    return String::new();
                }
            }
            return String::new();
        };

        if entityref == "Linebrk" {
            return "\n\n".to_string();
        }

        if let Some(filename) = ctx.fcache.get(entityref) {
            return format!(
                "\n\n{indent}.. figure:: ../../{}/{filename}\n",
                ctx.image_dir
            );
        }
        String::new()
    }

    fn figure_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let graphic = self.rec_find(ElementKind::Graphic);
        if let Some(graphic) = graphic {
            if graphic.attr("entityref").is_some() {
                let mut lines = vec![graphic.to_rst(ctx, indent, width)];
                if let Some(title) = self.rec_find(ElementKind::Title) {
                    lines.push(format!("   {}", title.text().trim()));
                }
                return format!("\n{}\n", lines.join("\n"));
            }
        }

        let items: Vec<String> = self
            .content
            .iter()
            .map(|item| match item {
                Item::Element(e) => e.to_rst(ctx, indent, width),
                Item::Text(t) => format!("{indent}{t}"),
            })
            .collect();
        format!("\n{}", items.concat())
    }

    // -- Code blocks -------------------------------------------------------

    /// Verbatim source of the listing. Listings with replaceable parameters
    /// are flattened instead.
    fn listing_source(&self) -> String {
        if self
            .child_elements()
            .any(|e| e.kind == ElementKind::Replaceable)
        {
            return self
                .content
                .iter()
                .map(item_str)
                .collect::<Vec<_>>()
                .join(" ");
        }
        self.content
            .iter()
            .filter_map(Item::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn program_listing_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let source = self.listing_source();
        let block = format!(
            "\n\n{indent}.. code:: apdl\n\n{}\n\n",
            indent_lines(&source, &format!("{indent}   "))
        );

        let mut items: Vec<String> = Vec::new();
        for item in &self.content {
            match item {
                // replaceable parameters are already part of the source
                Item::Element(e) if e.kind == ElementKind::Replaceable => {}
                Item::Element(e) => items.push(e.to_rst(ctx, indent, width)),
                Item::Text(t) => {
                    let first_token = t.split_whitespace().next().unwrap_or_default();
                    if !first_token.is_empty() && block.contains(first_token) {
                        items.push(block.clone());
                    } else {
                        items.push(t.clone());
                    }
                }
            }
        }
        items.concat()
    }

    // -- Tables ------------------------------------------------------------

    fn table_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let mut lines: Vec<String> = Vec::new();
        if let Some(id) = self.id() {
            lines.push(format!("\n.. _{id}:\n\n"));
        }

        if let Some(title) = self.title() {
            let title = title.trim().to_string();
            lines.push(title.clone());
            lines.push("=".repeat(rule_length(&title)));
            lines.push(String::new());
        }

        if let Some(tgroup) = self.find(ElementKind::TGroup) {
            lines.push(tgroup.to_rst(ctx, indent, width));
        }
        lines.join("\n")
    }

    fn tgroup_to_rst(&self, ctx: &RenderContext) -> String {
        let (mut rows, l_head) = match self.find(ElementKind::THead) {
            Some(thead) => thead_to_rst(thead, ctx),
            None => (vec![".. flat-table::".to_string(), String::new()], 0),
        };

        if let Some(tbody) = self.find(ElementKind::TBody) {
            rows.extend(tbody_to_rst(tbody, ctx, l_head));
        }
        rows.join("\n")
    }

    fn entry_to_rst(&self, ctx: &RenderContext, indent: &str, width: usize) -> String {
        let content = self
            .content
            .iter()
            .map(|item| self.render_item(item, ctx, indent, width, false))
            .collect::<Vec<_>>()
            .join(" ");
        match self.attr("morerows") {
            Some(morerows) => format!(":rspan:`{morerows}` {content}"),
            None => content,
        }
    }

    /// Cells of a table row, flattened to single lines.
    fn row_cells(&self, ctx: &RenderContext) -> Vec<String> {
        self.find_all(ElementKind::Entry, false)
            .iter()
            .map(|entry| {
                entry
                    .to_rst(ctx, "", DEFAULT_WIDTH)
                    .replace('\n', " ")
                    .replace('\r', " ")
            })
            .collect()
    }
}

/// Header block of a flat-table plus the inferred column count.
fn thead_to_rst(thead: &Element, ctx: &RenderContext) -> (Vec<String>, usize) {
    let rows = thead.find_all(ElementKind::Row, false);
    let mut out: Vec<String> = Vec::new();
    let mut l_rst_list = 0;

    let ini = if rows.len() > 1 {
        out.push(format!(
            ".. flat-table:: {}",
            rows[0].row_cells(ctx).concat()
        ));
        out.push(format!("   :header-rows: {}", rows.len() - 1));
        1
    } else if rows.first().map(|r| r.content.len()) == Some(1) {
        // single-cell header row reads as a caption, not a header
        log::warn!("table header with a single entry treated as a caption");
        let cells = rows[0].row_cells(ctx);
        out.push(cells.into_iter().next().unwrap_or_default());
        out.push(String::new());
        out.push(".. flat-table::".to_string());
        rows.len()
    } else {
        out.push(".. flat-table::".to_string());
        out.push("   :header-rows: 1".to_string());
        0
    };

    out.push(String::new());
    for row in rows.iter().skip(ini) {
        let cells = row.row_cells(ctx);
        l_rst_list = cells.len();
        out.push(format!("   * - {}", cells.join("\n     - ")));
    }
    (out, l_rst_list)
}

/// Body rows of a flat-table. Rows whose first cell is a bare command
/// mention become cross-reference entries.
fn tbody_to_rst(tbody: &Element, ctx: &RenderContext, l_head: usize) -> Vec<String> {
    let mut l_head = l_head;
    let mut rst_rows: Vec<String> = Vec::new();

    for (i, row) in tbody.find_all(ElementKind::Row, false).iter().enumerate() {
        let entries = row.find_all(ElementKind::Entry, false);
        let Some(first) = entries.first() else {
            continue;
        };

        if !first.content.is_empty() {
            if let Some(cmd) = leading_command(first) {
                rst_rows.push(format!("   * - :ref:`{}`", py_name(&cmd, ctx.name_map)));
                let description = entries
                    .get(1)
                    .and_then(|e| e.content.first().map(item_str))
                    .unwrap_or_default();
                rst_rows.push(format!("     - {description}"));
                if l_head == 0 && i == 0 {
                    l_head = 2;
                }
            } else {
                let cells = row.row_cells(ctx);
                if l_head == 0 && i == 0 {
                    l_head = cells.len();
                }
                rst_rows.push(format!("   * - {}", cells.join("\n     - ")));
            }
        } else if let Some(second) = entries.get(1) {
            if let Some(cmd) = leading_command(second) {
                rst_rows.push(format!("   * - :ref:`{}`", py_name(&cmd, ctx.name_map)));
                let description = entries
                    .get(2)
                    .and_then(|e| e.content.first().map(item_str))
                    .unwrap_or_default();
                rst_rows.push(format!("     - {description}"));
            }
        }
    }
    rst_rows
}

fn leading_command(entry: &Element) -> Option<String> {
    entry
        .content
        .first()
        .and_then(Item::as_element)
        .filter(|e| e.kind == ElementKind::Command)
        .map(first_text)
}

fn first_text(element: &Element) -> String {
    element
        .content
        .first()
        .map(|item| item_str(item).trim().to_string())
        .unwrap_or_default()
}

fn item_str(item: &Item) -> String {
    match item {
        Item::Text(t) => t.clone(),
        Item::Element(e) => e.text(),
    }
}

/// Length of an RST section rule: literal asterisks count twice because
/// they are escaped in the rendered title.
fn rule_length(title: &str) -> usize {
    title.chars().count() + title.matches('*').count()
}

/// Anchored paragraphs opening with a bold run get that run promoted to a
/// rubric so the anchor has a target Sphinx accepts.
fn promote_rubric(rst: &str, id: &str) -> String {
    let mut lines = rst.lines();
    let Some(first) = lines.next() else {
        return rst.to_string();
    };
    let candidate = first.trim();
    if !candidate.starts_with("**") || candidate.contains("**Command default:**") {
        return rst.to_string();
    }

    let header = if candidate.ends_with("**") {
        format!(".. _{id}:\n\n.. rubric:: {candidate}\n\n")
    } else if candidate.contains("``") {
        let stripped = candidate.replace("**", "").replace("``", "");
        format!(".. _{id}:\n\n.. rubric:: **{stripped}**\n\n")
    } else {
        return rst.to_string();
    };
    format!("{header}{}", lines.collect::<Vec<_>>().join("\n"))
}
