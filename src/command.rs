//! Command model extracted from one source file.
//!
//! A [`CommandDoc`] wraps the parsed `refentry` tree and derives the pieces
//! the generator needs: the command name, the declared argument names from
//! the signature line, the argument descriptions, the default block, and
//! the notes sections. The docstring assembly and its cleanup pipeline live
//! here too.

use crate::args::{is_ellipsis, to_py_arg_name, to_py_signature, ArgType, Argument, ArgumentList};
use crate::ast::render::{RenderContext, DEFAULT_WIDTH};
use crate::ast::{self, Element, ElementKind};
use crate::custom::CustomFunctions;
use crate::load::VersionInfo;
use crate::text::{
    apply_cleanup, escape_asterisks, indent_lines, punctuation_whitespace, replace_terms,
    resize_length, CLEANUP, XML_CLEANUP,
};
use crate::{ConvertError, NameMap, Terms, TermValue};
use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

/// Per-command admonition blocks injected by the caller:
/// `{"command": [("message_type", "message")]}`.
pub type CommandComments = HashMap<String, Vec<(String, String)>>;

static RE_GROUP_ENTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&(.*?);").unwrap());

static RE_CLASSNAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\S+):").unwrap());

static RE_CMD_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<CMD>[a-z0-9]*</CMD>").unwrap());

static RE_PIPED_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\|(.*)\|").unwrap());

static RE_TRAILING_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^_|^`][A-Za-z0-9]*)_\s[^:]").unwrap());

static RE_BGCOLOR_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bgcolor=\S{9,10} ").unwrap());

static RE_BGCOLOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"bgcolor=\S{9,10}").unwrap());

static RE_CELLFONT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_cellfont Shading=\S{8}").unwrap());

static RE_CARET_NOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Caret.*\?").unwrap());

/// Lines dropped from docstrings: menu-only interaction hints.
const GUI_LINE_MARKERS: &[&str] = &[
    "cannot be accessed from a menu",
    "Graphical picking is available only",
];

/// Classification assigned from the refclass block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGroup {
    /// Module the generated function lands in.
    pub module: String,
    /// Class within that module.
    pub class: String,
}

/// Extracted argument model plus an authoring quirk flag.
#[derive(Debug, Default)]
pub struct ArgDesc {
    pub arguments: Vec<Argument>,
    /// Set when prose paragraphs sit between the argument entries; the
    /// generated notes then point back at the original page.
    pub paragraph_in_desc: bool,
}

/// One command reference document.
#[derive(Debug)]
pub struct CommandDoc {
    root: Element,
    name: String,
    filename: String,
    group: Option<CommandGroup>,
    is_archived: bool,
}

/// Cheap metadata pass: the command name only.
pub fn command_name(source: &str, origin: &str) -> Result<String> {
    let sanitized = ast::sanitize_entities(source);
    let root = ast::find_refentry(&sanitized)
        .map_err(|_| ConvertError::NotACommandFile(origin.to_string()))?;
    name_from(&root, origin)
}

fn name_from(root: &Element, origin: &str) -> Result<String> {
    let name = root
        .rec_find(ElementKind::RefMeta)
        .and_then(|meta| meta.find(ElementKind::RefEntryTitle))
        .map(|title| title.text().trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ConvertError::NotACommandFile(origin.to_string()))?;
    Ok(name)
}

impl CommandDoc {
    /// Parse a command document. `origin` names the source file for error
    /// messages and the filename fallback.
    pub fn from_source(source: &str, origin: &str) -> Result<CommandDoc> {
        let sanitized = ast::sanitize_entities(source);
        let root = ast::find_refentry(&sanitized)
            .map_err(|_| ConvertError::NotACommandFile(origin.to_string()))?;
        let name = name_from(&root, origin)?;

        let filename = root
            .child_elements()
            .find_map(|child| child.attr("filename"))
            .or_else(|| root.attr("filename"))
            .map(str::to_string)
            .unwrap_or_else(|| {
                let stem = Path::new(origin)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default();
                format!("{stem}.html")
            });

        Ok(CommandDoc {
            root,
            name,
            filename,
            group: None,
            is_archived: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn py_name(&self, name_map: &NameMap) -> String {
        crate::py_name(&self.name, name_map).to_string()
    }

    pub fn group(&self) -> Option<&CommandGroup> {
        self.group.as_ref()
    }

    pub fn is_archived(&self) -> bool {
        self.is_archived
    }

    /// Documentation page of the command.
    pub fn url(&self, version: &VersionInfo) -> String {
        let base = version.base_url.trim_end_matches('/');
        format!("{base}/ans_cmd/{}", self.filename)
    }

    /// Assign the group and archive flag from the refclass block. Returns
    /// `false` for commands that must not be converted at all.
    pub fn classify(&mut self, terms: &Terms) -> bool {
        let Some(refclass) = self
            .root
            .rec_find(ElementKind::RefNameDiv)
            .and_then(|div| div.find(ElementKind::RefClass))
        else {
            return true;
        };
        let text = refclass.text();

        if let Some(caps) = RE_GROUP_ENTITY.captures(&text) {
            let code = &caps[1];
            if code == "xtycadimport" {
                log::warn!("CAD command - {} will not be converted", self.name);
                return false;
            }
            match terms.get(code) {
                Some(TermValue::Group {
                    class_name,
                    type_name,
                }) => {
                    self.group = Some(CommandGroup {
                        module: class_name.clone(),
                        class: type_name.clone(),
                    });
                }
                _ => log::warn!("unknown group code &{code}; for {}", self.name),
            }
            return true;
        }

        // archived commands carry a literal "Class: Type" refclass
        let class_names: Vec<&str> = RE_CLASSNAME
            .captures_iter(&text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if let (Some(first), Some(colon)) = (class_names.first(), text.find(':')) {
            let after = &text[colon + 1..];
            let type_name = if class_names.len() > 1 {
                // the function belongs to the first class listed
                truncate_at_double_uppercase(after)
            } else {
                after
            };
            self.group = Some(CommandGroup {
                module: (*first).to_string(),
                class: type_name.trim().to_string(),
            });
            self.is_archived = true;
        }
        true
    }

    /// Argument names declared on the signature line, normalized and
    /// deduplicated. Bad names are the one fatal per-command condition.
    pub fn args(&self, terms: &Terms) -> Result<Vec<String>> {
        let Some(refname) = self
            .root
            .rec_find(ElementKind::RefNameDiv)
            .and_then(|div| div.find(ElementKind::RefName))
        else {
            return Ok(Vec::new());
        };

        let mut cmd = refname.text();
        for (term, value) in terms {
            if let Some(text) = value.as_text() {
                let entity = format!("&{term};");
                if cmd.contains(&entity) {
                    cmd = cmd.replace(&entity, text);
                }
            }
        }
        let cmd = cmd.replace("``", "");

        let mut args = Vec::new();
        for item in cmd.split(',').skip(1) {
            let arg = to_py_arg_name(item);
            if arg.contains("blank") || arg.is_empty() {
                args.push(String::new());
            } else if arg.contains(" or ") {
                let first = arg.split(" or ").next().unwrap_or("").trim().to_string();
                args.push(first);
            } else if is_ellipsis(&arg) {
                // continuation marker, not an argument
            } else if !is_identifier(&arg) {
                return Err(ConvertError::InvalidArgumentName {
                    command: self.name.clone(),
                    name: arg,
                }
                .into());
            } else {
                args.push(arg);
            }
        }
        renumber_duplicates(&mut args);
        Ok(args)
    }

    /// Extract the argument descriptions from the synopsis division, or
    /// from the refsections of miscoded documents.
    pub fn arg_desc(&self, terms: &Terms, url: &str) -> Result<ArgDesc> {
        let initial_args = self.args(terms)?;
        let mut list: Option<ArgumentList> = None;
        let mut paragraph_in_desc = false;

        let blocks: Vec<&Element> = match self.root.rec_find(ElementKind::RefSynopsisDiv) {
            Some(refsyn) => refsyn.child_elements().collect(),
            None => self
                .root
                .find_all(ElementKind::RefSection, false)
                .into_iter()
                .flat_map(|section| section.child_elements())
                .collect(),
        };
        for block in blocks {
            match block.kind() {
                ElementKind::VariableList => {
                    let next = ArgumentList::from_list_entry(url, Some(block), initial_args.clone());
                    match &mut list {
                        Some(list) => list.merge(next),
                        None => list = Some(next),
                    }
                }
                ElementKind::Paragraph => paragraph_in_desc = true,
                _ => {}
            }
        }

        let Some(mut list) = list else {
            return Ok(ArgDesc {
                arguments: Vec::new(),
                paragraph_in_desc,
            });
        };

        while list
            .py_arg_names()
            .last()
            .map(String::is_empty)
            .unwrap_or(false)
        {
            list.remove_last_arg();
        }
        if list.py_arg_names().len() != list.initial_args().len() {
            log::warn!(
                "{}: generated arguments {:?} do not line up with the declared {:?}",
                self.name,
                list.py_arg_names(),
                list.initial_args(),
            );
        }
        Ok(ArgDesc {
            arguments: list.arguments().to_vec(),
            paragraph_in_desc,
        })
    }

    /// Rendered one-line purpose of the command.
    pub fn short_desc(&self, ctx: &RenderContext) -> String {
        match self
            .root
            .rec_find(ElementKind::RefNameDiv)
            .and_then(|div| div.find(ElementKind::RefPurpose))
        {
            Some(purpose) => resize_length(
                &purpose.to_rst(ctx, "", DEFAULT_WIDTH),
                DEFAULT_WIDTH,
                "",
                "",
            ),
            None => String::new(),
        }
    }

    /// The "Command Default" block, wherever the document put it.
    pub fn default_section(&self) -> Option<&Element> {
        if let Some(refsyn) = self.root.find(ElementKind::RefSynopsisDiv) {
            for item in refsyn.child_elements() {
                if section_title_is(item, "Command Default") {
                    return Some(item);
                }
            }
        }
        self.root
            .find_all(ElementKind::RefSection, false)
            .into_iter()
            .find(|section| section_title_is(section, "Command Default"))
    }

    /// Split the top-level sections into other-parameters (titles carrying
    /// `=`) and notes, dropping the menu/argument/default sections handled
    /// elsewhere.
    fn classify_sections(&self) -> (Vec<&Element>, Vec<&Element>) {
        let mut other_parameters = Vec::new();
        let mut notes = Vec::new();
        for item in self.root.child_elements() {
            let Some(title) = item.title() else { continue };
            let title = title.trim().to_string();
            if title.contains('=') {
                other_parameters.push(item);
            } else if title.contains("Menu Paths")
                || title == "Argument Description"
                || title == "Command Default"
            {
                continue;
            } else {
                notes.push(item);
            }
        }
        (other_parameters, notes)
    }

    /// Render a notes-style section list under an underlined heading.
    fn py_notes(
        &self,
        sections: &[&Element],
        section_title: &str,
        ctx: &RenderContext,
        url: &str,
        paragraph_in_desc: bool,
    ) -> Vec<String> {
        let mut lines = vec![section_title.to_string(), "-".repeat(section_title.len())];
        if section_title == "Notes" && paragraph_in_desc {
            lines.extend([
                String::new(),
                ".. warning::".to_string(),
                String::new(),
                "   This function contains specificities regarding the argument definitions."
                    .to_string(),
                format!("   Please refer to the `command documentation <{url}>`_"),
                "   for further explanations.".to_string(),
                String::new(),
                String::new(),
            ]);
        }
        for note in sections {
            if let Some(title) = note.title() {
                let title = title.trim();
                if title != section_title {
                    lines.push(format!("**{title}**"));
                }
            }
            let rendered = note.to_rst(ctx, "", DEFAULT_WIDTH);
            let rendered = replace_terms(&rendered, ctx.terms);
            for line in rendered.split('\n') {
                if !line.is_empty() && !line.starts_with('.') && !line.starts_with(char::is_whitespace)
                {
                    lines.push(resize_length(line, DEFAULT_WIDTH, "", ""));
                } else {
                    lines.push(line.to_string());
                }
            }
        }
        lines
    }

    /// Parameters section of the docstring.
    fn py_parm(
        &self,
        arg_desc: &[Argument],
        ctx: &RenderContext,
        custom: Option<&CustomFunctions>,
        py_name: &str,
    ) -> Vec<String> {
        let mut lines = Vec::new();
        if arg_desc.is_empty() {
            return lines;
        }
        lines.push("Parameters".to_string());

        if let Some(custom_args) = custom.and_then(|c| c.args(py_name)) {
            let generated: Vec<String> = arg_desc.iter().map(Argument::py_arg_name).collect();
            if !same_name_set(custom_args, &generated) {
                if let Some(params) = custom.and_then(|c| c.params(py_name)) {
                    lines.extend(params.iter().cloned());
                    return lines;
                }
            }
        }

        lines.push("-".repeat(10));
        for argument in arg_desc {
            lines.extend(argument.to_py_docstring(ctx, DEFAULT_WIDTH));
            lines.push(String::new());
        }
        lines
    }

    /// Full docstring of the generated function.
    pub fn py_docstring(
        &self,
        ctx: &RenderContext,
        version: &VersionInfo,
        custom: Option<&CustomFunctions>,
        comments: &CommandComments,
    ) -> Result<String> {
        let url = self.url(version);
        let py_name = self.py_name(ctx.name_map);
        let arg_desc = self.arg_desc(ctx.terms, &url)?;
        let product = ctx
            .terms
            .get("pn006p")
            .and_then(TermValue::as_text)
            .unwrap_or("Ansys");
        let xml_cmd = format!("{product} Command: `{} <{url}>`_", self.name);

        let mut items = vec![self.short_desc(ctx), String::new(), xml_cmd];

        if let Some(command_comments) = comments.get(&self.name) {
            for (comment_type, comment) in command_comments {
                let indented = indent_lines(comment, "    ");
                items.push(format!("\n.. {comment_type}::\n\n{indented}\n"));
            }
        }

        if let Some(default) = self.default_section() {
            items.push(String::new());
            items.push("**Command default:**".to_string());
            items.push(default.to_rst(ctx, "", DEFAULT_WIDTH));
        }

        if !self.args(ctx.terms)?.is_empty() {
            items.push(String::new());
            items.extend(self.py_parm(&arg_desc.arguments, ctx, custom, &py_name));
        }

        if let Some(returns) = custom.and_then(|c| c.returns(&py_name)) {
            items.push(String::new());
            items.extend(returns.iter().cloned());
        }

        let (other_parameters, notes) = self.classify_sections();
        let automated_notes =
            self.py_notes(&notes, "Notes", ctx, &url, arg_desc.paragraph_in_desc);
        let custom_notes = custom
            .and_then(|c| c.notes(&py_name))
            .filter(|lines| automated_notes.join("\n").len() < lines.join("\n").len());
        match custom_notes {
            Some(lines) => items.extend(lines.iter().cloned()),
            None => {
                if !other_parameters.is_empty() {
                    items.push(String::new());
                    items.extend(self.py_notes(
                        &other_parameters,
                        "Other Parameters",
                        ctx,
                        &url,
                        false,
                    ));
                }
                if !notes.is_empty() {
                    items.push(String::new());
                    items.extend(automated_notes);
                }
            }
        }

        if let Some(examples) = custom.and_then(|c| c.examples(&py_name)) {
            items.push(String::new());
            items.extend(examples.iter().cloned());
        }

        let mut docstr = items.join("\n");
        docstr = apply_cleanup(&docstr, XML_CLEANUP);
        docstr = apply_cleanup(&docstr, CLEANUP);
        docstr = self.cleanup_pipeline(docstr, version);

        if self.is_archived {
            log::info!("{} is an archived command", self.name);
            docstr.push_str(
                "\n\n.. warning::\n\n    This command is archived in the latest version of the software.\n",
            );
        }

        Ok(replace_terms(&docstr, ctx.terms))
    }

    /// Line- and table-level docstring repairs applied after assembly.
    fn cleanup_pipeline(&self, docstr: String, version: &VersionInfo) -> String {
        let mut docstr = docstr
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");

        let autogen = &version.autogenerated_directory_name;
        docstr = RE_CMD_TAG
            .replace_all(&docstr, |caps: &regex::Captures| {
                let func = caps[0].replace("<CMD>", "").replace("</CMD>", "");
                format!(":func:`{func}() <{autogen}.{func}>`")
            })
            .into_owned();
        docstr = RE_PIPED_SPAN
            .replace_all(&docstr, |caps: &regex::Captures| {
                caps[0].replace('|', r"\|")
            })
            .into_owned();
        docstr = RE_TRAILING_UNDERSCORE
            .replace_all(&docstr, |caps: &regex::Captures| caps[0].replace('_', ""))
            .into_owned();

        let mut lines: Vec<String> = docstr
            .lines()
            .filter(|line| !GUI_LINE_MARKERS.iter().any(|marker| line.contains(marker)))
            .map(str::to_string)
            .collect();

        insert_flat_table_headers(&mut lines);
        reduce_duplicate_links(&mut lines);

        let mut docstr = lines.join("\n");
        while docstr.contains("\n\n\n") {
            docstr = docstr.replace("\n\n\n", "\n\n");
        }

        let mut lines: Vec<String> = docstr.lines().map(str::to_string).collect();
        close_open_lists(&mut lines);
        let mut docstr = lines.join("\n");

        docstr = RE_BGCOLOR_SPACE.replace_all(&docstr, "").into_owned();
        docstr = RE_BGCOLOR.replace_all(&docstr, "").into_owned();
        docstr = RE_CELLFONT.replace_all(&docstr, "").into_owned();
        docstr = RE_CARET_NOTE.replace_all(&docstr, "").into_owned();
        docstr = docstr.replace('–', "-");
        docstr = docstr.replace(". . .", "...");
        docstr = escape_asterisks(&docstr);
        punctuation_whitespace(&docstr)
    }

    /// First line of the generated function definition.
    pub fn py_signature(
        &self,
        ctx: &RenderContext,
        url: &str,
        custom: Option<&CustomFunctions>,
        indent: &str,
    ) -> Result<String> {
        let py_name = self.py_name(ctx.name_map);
        let mut args = vec!["self".to_string()];

        if let Some(custom_args) = custom.and_then(|c| c.args(&py_name)) {
            // type checks are not run for custom functions
            for argument in custom_args {
                if let Some(sig) = to_py_signature(argument, &[ArgType::Str]) {
                    args.push(sig);
                }
            }
        } else {
            for argument in &self.arg_desc(ctx.terms, url)?.arguments {
                if let Some(sig) = to_py_signature(&argument.py_arg_name(), &argument.types()) {
                    args.push(sig);
                }
            }
        }
        let arg_sig = args.join(", ");
        Ok(format!("{indent}def {py_name}({arg_sig}, **kwargs):"))
    }

    /// Generated function body: dispatch through `self.run`, or the custom
    /// body verbatim.
    pub fn py_source(
        &self,
        ctx: &RenderContext,
        url: &str,
        custom: Option<&CustomFunctions>,
        indent: &str,
    ) -> Result<String> {
        let py_name = self.py_name(ctx.name_map);
        if let Some(code) = custom.and_then(|c| c.code(&py_name)) {
            let mut body = indent_lines(&code.join("\n"), indent);
            body.push('\n');
            return Ok(body);
        }

        let arg_desc = self.arg_desc(ctx.terms, url)?;
        let command = if arg_desc.arguments.is_empty() {
            format!("command = \"{}\"\n", self.name)
        } else {
            let mut command = format!("command = f\"{}", self.name);
            for arg in &arg_desc.arguments {
                let name = arg.py_arg_name();
                if name.is_empty() {
                    command.push(',');
                } else {
                    command.push_str(&format!(",{{{name}}}"));
                }
            }
            command.push_str("\"\n");
            command
        };
        let body = format!("{command}return self.run(command, **kwargs)\n");
        Ok(indent_lines(&body, &format!("    {indent}")))
    }

    /// Complete generated function: imports, signature, docstring, body.
    pub fn to_python(
        &self,
        ctx: &RenderContext,
        version: &VersionInfo,
        custom: Option<&CustomFunctions>,
        comments: &CommandComments,
        indent: &str,
    ) -> Result<String> {
        let url = self.url(version);
        let py_name = self.py_name(ctx.name_map);
        let docstring = self.py_docstring(ctx, version, custom, comments)?;
        let docstring = indent_lines(
            &format!("r\"\"\"{docstring}\n\"\"\""),
            &format!("{indent}    "),
        );
        let signature = self.py_signature(ctx, &url, custom, indent)?;
        let source = self.py_source(ctx, &url, custom, indent)?;

        match custom.and_then(|c| c.imports(&py_name)) {
            Some(imports) => Ok(format!(
                "\n{}\n{signature}\n{docstring}\n{source}\n",
                imports.join("\n")
            )),
            None => Ok(format!("\n{signature}\n{docstring}\n{source}\n")),
        }
    }
}

fn section_title_is(section: &Element, title: &str) -> bool {
    section
        .title()
        .map(|t| t.trim() == title)
        .unwrap_or(false)
}

/// Cut a multi-class refclass tail before the next class name, marked by
/// two consecutive uppercase letters.
fn truncate_at_double_uppercase(text: &str) -> &str {
    let indices: Vec<(usize, char)> = text.char_indices().collect();
    for pair in indices.windows(2) {
        if pair[0].1.is_ascii_uppercase() && pair[1].1.is_ascii_uppercase() {
            return &text[..pair[0].0];
        }
    }
    text
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Duplicate declared names get numbered suffixes, in order of appearance.
fn renumber_duplicates(args: &mut [String]) {
    let names: Vec<String> = args.to_vec();
    for name in names {
        if name.is_empty() {
            continue;
        }
        if args.iter().filter(|a| **a == name).count() > 1 {
            let mut i = 0;
            for slot in args.iter_mut() {
                if *slot == name {
                    *slot = format!("{name}{i}");
                    i += 1;
                }
            }
        }
    }
}

fn same_name_set(a: &[String], b: &[String]) -> bool {
    use std::collections::HashSet;
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}

/// A table row appearing without its directive gets a `.. flat-table ::`
/// header inserted above it.
fn insert_flat_table_headers(lines: &mut Vec<String>) {
    let mut i = 2;
    while i < lines.len() {
        let header = lines[i - 2].trim_start().starts_with(":header-rows:")
            || lines[i - 2].trim_start().starts_with(".. flat-table");
        let continuation = lines[i - 1].trim_start().starts_with("* -")
            || lines[i - 1].trim_start().starts_with('-');
        if lines[i].trim_start().starts_with("* -") && !(continuation || header) {
            lines.insert(i, ".. flat-table ::".to_string());
            lines.insert(i + 1, String::new());
        }
        i += 1;
    }
}

/// Inside flat tables, a hyperlink repeated verbatim keeps its target only
/// on the first occurrence; later ones keep the link text.
fn reduce_duplicate_links(lines: &mut [String]) {
    let mut link_list: Vec<String> = Vec::new();
    let mut in_flat_table = false;
    for line in lines.iter() {
        if line.contains(".. flat-table::") {
            in_flat_table = true;
        }
        if in_flat_table {
            for (i, span) in line.split('`').enumerate() {
                if i % 2 == 1 && span.contains('<') {
                    link_list.push(span.to_string());
                }
            }
        }
    }
    if link_list.len() < 2 {
        return;
    }

    let mut seen: Vec<&String> = Vec::new();
    for link in &link_list {
        if seen.contains(&link) {
            continue;
        }
        seen.push(link);
        if link_list.iter().filter(|l| *l == link).count() < 2 {
            continue;
        }
        let Some(angle) = link.find('<') else { continue };
        let name_link = link[..angle.saturating_sub(1)].to_string();

        let mut first = true;
        let mut in_flat_table = false;
        for line in lines.iter_mut() {
            if line.contains(".. flat-table::") {
                in_flat_table = true;
            }
            if in_flat_table && line.contains(link.as_str()) {
                if first {
                    first = false;
                } else {
                    *line = line.replace(link.as_str(), &name_link);
                }
            }
        }
    }
}

/// Guarantee a blank line after every table-row run.
fn close_open_lists(lines: &mut Vec<String>) {
    let mut i = 0;
    while i < lines.len() {
        let mut j = 1;
        if lines[i].trim_start().starts_with("* -") {
            while i + j < lines.len().saturating_sub(1)
                && lines[i + j].trim_start().starts_with('-')
            {
                j += 1;
            }
            if i + j < lines.len() && !lines[i + j].trim_start().starts_with("* -") {
                if i + j == lines.len() - 1 {
                    j += 1;
                }
                if i + j >= lines.len() {
                    lines.push(String::new());
                } else {
                    lines.insert(i + j, String::new());
                }
            }
        }
        i += j;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Fcache, Links, NameMap};

    const ABBR_XML: &str = r#"<refentry id="ABBR">
<refentryinfo filename="ans_cmd_abbr.html"/>
<refmeta><refentrytitle>*ABBR</refentrytitle></refmeta>
<refnamediv>
  <refname>*ABBR, Abbr, String</refname>
  <refpurpose>Defines an abbreviation.</refpurpose>
  <refclass>&amp;fcp;</refclass>
</refnamediv>
<refsynopsisdiv>
  <variablelist>
    <varlistentry><term>Abbr</term>
      <listitem><para>The abbreviation, up to eight characters.</para></listitem>
    </varlistentry>
    <varlistentry><term>String</term>
      <listitem><para>String of characters the abbreviation represents.</para></listitem>
    </varlistentry>
  </variablelist>
</refsynopsisdiv>
<refsect1><title>Notes</title><para>Abbreviations are shortcuts.</para></refsect1>
<refsect1><title>Menu Paths</title><para>Utility Menu</para></refsect1>
</refentry>"#;

    fn terms_with_group() -> Terms {
        let mut terms = Terms::new();
        terms.insert(
            "fcp".to_string(),
            TermValue::Group {
                class_name: "APDL".to_string(),
                type_name: "Abbreviations".to_string(),
            },
        );
        terms
    }

    fn context<'a>(
        terms: &'a Terms,
        links: &'a Links,
        fcache: &'a Fcache,
        name_map: &'a NameMap,
    ) -> RenderContext<'a> {
        RenderContext {
            terms,
            links,
            fcache,
            name_map,
            base_url: Some("https://example/"),
            image_dir: "images",
        }
    }

    fn version() -> VersionInfo {
        VersionInfo {
            version: "24.1".to_string(),
            base_url: "https://example/".to_string(),
            autogenerated_directory_name: "v241".to_string(),
        }
    }

    #[test]
    fn name_comes_from_the_refmeta_title() {
        let doc = CommandDoc::from_source(ABBR_XML, "abbr.xml").unwrap();
        assert_eq!(doc.name(), "*ABBR");
    }

    #[test]
    fn non_command_files_are_rejected() {
        let err = CommandDoc::from_source("<book><title>guide</title></book>", "guide.xml")
            .unwrap_err();
        assert!(err.to_string().contains("no refentry"));
    }

    #[test]
    fn declared_args_follow_the_signature_line() {
        let doc = CommandDoc::from_source(ABBR_XML, "abbr.xml").unwrap();
        let args = doc.args(&Terms::new()).unwrap();
        assert_eq!(args, vec!["abbr", "string"]);
    }

    #[test]
    fn duplicate_declared_args_are_renumbered() {
        let mut args = vec!["val".to_string(), "val".to_string(), "other".to_string()];
        renumber_duplicates(&mut args);
        assert_eq!(args, vec!["val0", "val1", "other"]);
    }

    #[test]
    fn group_entity_classifies_the_command() {
        let mut doc = CommandDoc::from_source(ABBR_XML, "abbr.xml").unwrap();
        assert!(doc.classify(&terms_with_group()));
        assert_eq!(
            doc.group(),
            Some(&CommandGroup {
                module: "APDL".to_string(),
                class: "Abbreviations".to_string(),
            })
        );
        assert!(!doc.is_archived());
    }

    #[test]
    fn literal_refclass_marks_archived_commands() {
        let xml = ABBR_XML.replace("&amp;fcp;", "PREP7: Database");
        let mut doc = CommandDoc::from_source(&xml, "abbr.xml").unwrap();
        assert!(doc.classify(&Terms::new()));
        assert_eq!(
            doc.group(),
            Some(&CommandGroup {
                module: "PREP7".to_string(),
                class: "Database".to_string(),
            })
        );
        assert!(doc.is_archived());
    }

    #[test]
    fn cad_commands_are_skipped() {
        let xml = ABBR_XML.replace("&amp;fcp;", "&amp;xtycadimport;");
        let mut doc = CommandDoc::from_source(&xml, "abbr.xml").unwrap();
        assert!(!doc.classify(&Terms::new()));
    }

    #[test]
    fn menu_paths_are_excluded_from_notes() {
        let doc = CommandDoc::from_source(ABBR_XML, "abbr.xml").unwrap();
        let (other, notes) = doc.classify_sections();
        assert!(other.is_empty());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title().unwrap().trim(), "Notes");
    }

    #[test]
    fn docstring_carries_the_command_attribution_line() {
        let doc = CommandDoc::from_source(ABBR_XML, "abbr.xml").unwrap();
        let (terms, links, fcache) = (Terms::new(), Links::new(), Fcache::new());
        let mut name_map = NameMap::new();
        name_map.insert("*ABBR".to_string(), "abbr".to_string());
        let ctx = context(&terms, &links, &fcache, &name_map);

        let docstr = doc
            .py_docstring(&ctx, &version(), None, &CommandComments::new())
            .unwrap();
        assert!(docstr.contains("Defines an abbreviation."));
        assert!(docstr
            .contains("Ansys Command: `*ABBR <https://example/ans_cmd/ans_cmd_abbr.html>`_"));
        assert!(docstr.contains("Parameters"));
        assert!(docstr.contains("abbr : str"));
        assert!(docstr.contains("Notes"));
    }

    #[test]
    fn signature_and_source_interpolate_the_arguments() {
        let doc = CommandDoc::from_source(ABBR_XML, "abbr.xml").unwrap();
        let (terms, links, fcache) = (Terms::new(), Links::new(), Fcache::new());
        let mut name_map = NameMap::new();
        name_map.insert("*ABBR".to_string(), "abbr".to_string());
        let ctx = context(&terms, &links, &fcache, &name_map);
        let url = doc.url(&version());

        let signature = doc.py_signature(&ctx, &url, None, "    ").unwrap();
        assert_eq!(
            signature,
            "    def abbr(self, abbr: str = \"\", string: str = \"\", **kwargs):"
        );

        let source = doc.py_source(&ctx, &url, None, "    ").unwrap();
        assert!(source.contains("command = f\"*ABBR,{abbr},{string}\""));
        assert!(source.contains("return self.run(command, **kwargs)"));
    }

    #[test]
    fn archived_commands_get_a_warning_block() {
        let xml = ABBR_XML.replace("&amp;fcp;", "PREP7: Database");
        let mut doc = CommandDoc::from_source(&xml, "abbr.xml").unwrap();
        doc.classify(&Terms::new());
        let (terms, links, fcache, name_map) =
            (Terms::new(), Links::new(), Fcache::new(), NameMap::new());
        let ctx = context(&terms, &links, &fcache, &name_map);

        let docstr = doc
            .py_docstring(&ctx, &version(), None, &CommandComments::new())
            .unwrap();
        assert!(docstr.contains("This command is archived"));
    }

    #[test]
    fn flat_table_rows_get_a_directive() {
        let mut lines: Vec<String> = ["Some text", "", "* - first", "  - second"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        insert_flat_table_headers(&mut lines);
        assert_eq!(lines[2], ".. flat-table ::");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "* - first");
    }

    #[test]
    fn repeated_links_in_flat_tables_lose_their_target() {
        let mut lines: Vec<String> = [
            ".. flat-table:: Items",
            "   * - `Name <https://example/x.html>`_",
            "   * - `Name <https://example/x.html>`_",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        reduce_duplicate_links(&mut lines);
        assert!(lines[1].contains("<https://example/x.html>"));
        assert!(!lines[2].contains("<https://example/x.html>"));
        assert!(lines[2].contains("Name"));
    }

    #[test]
    fn custom_code_replaces_the_generated_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("abbr.py"),
            "def abbr(self, abbr=\"\", **kwargs):\n    \"\"\"doc\n    \"\"\"\n    return self.run(f\"*ABBR,{abbr}\")\n",
        )
        .unwrap();
        let custom = CustomFunctions::from_dir(dir.path()).unwrap();

        let doc = CommandDoc::from_source(ABBR_XML, "abbr.xml").unwrap();
        let (terms, links, fcache) = (Terms::new(), Links::new(), Fcache::new());
        let mut name_map = NameMap::new();
        name_map.insert("*ABBR".to_string(), "abbr".to_string());
        let ctx = context(&terms, &links, &fcache, &name_map);
        let url = doc.url(&version());

        let source = doc.py_source(&ctx, &url, Some(&custom), "").unwrap();
        assert!(source.contains("return self.run(f\"*ABBR,{abbr}\")"));
    }
}
