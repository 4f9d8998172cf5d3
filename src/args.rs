//! Heuristic extraction of Python arguments from command synopsis entries.
//!
//! Argument names in the source markup are free-form: comma-separated
//! groups, ellipsis ranges (`Cname1, Cname2, …`), padding terms (`--`),
//! ordinals, and characters Python identifiers cannot carry. This module
//! normalizes them and reconciles the extracted list against the argument
//! names declared in the command signature.

use crate::ast::render::RenderContext;
use crate::ast::{Element, ElementKind, Item};
use crate::text::{indent_lines, replace_terms, resize_lines};
use regex::Regex;
use std::sync::LazyLock;

/// Python builtins and keywords an argument must not shadow.
const FORBIDDEN_ARGUMENT_NAMES: &[&str] = &[
    "abs", "char", "class", "dir", "eval", "format", "id", "int", "iter", "list", "min", "max",
    "property", "set", "type",
];

/// Character fixes turning a raw argument token into identifier material.
const PY_ARG_CLEANUP: &[(&str, &str)] = &[
    ("(", "_"),
    (")", "_"),
    ("+", "plus"),
    ("blank", ""),
    ("-", "_"),
    ("'", ""),
    ("caret1?", ""),
];

const MISSING_ARGUMENT_DESCRIPTION: &str = "The description of the argument is missing in the \
Python function.\nPlease, refer to the `command documentation <url>`_ for further information.";

const ADDITIONAL_ARGUMENT_DESCRIPTION: &str = "Additional arguments can be passed to the initial \
command.\nPlease, refer to the `command documentation <url>`_ for further information.";

/// Name of the catch-all parameter appended when the markup documents more
/// arguments than the signature declares.
pub const ADDITIONAL_ARG_NAME: &str = "additional_command_arg";

static RE_ITER_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([a-zA-Z_]*)(\d*)").unwrap());

static RE_PLUS_OFFSET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\+(\d+)").unwrap());

/// Whether the string parses as a number.
pub fn is_numeric(text: &str) -> bool {
    text.parse::<f64>().is_ok()
}

/// Whether an argument token stands for an elided range.
pub fn is_ellipsis(name: &str) -> bool {
    [". . .", "...", "\u{2026}"]
        .iter()
        .any(|e| name.contains(e))
}

fn digit_word(digit: char) -> &'static str {
    match digit {
        '0' => "zero",
        '1' => "one",
        '2' => "two",
        '3' => "three",
        '4' => "four",
        '5' => "five",
        '6' => "six",
        '7' => "seven",
        '8' => "eight",
        _ => "nine",
    }
}

fn ordinal_word(digit: char) -> &'static str {
    match digit {
        '1' => "first",
        '2' => "second",
        '3' => "third",
        '4' => "fourth",
        '5' => "fifth",
        '6' => "sixth",
        '7' => "seventh",
        '8' => "eighth",
        _ => "ninth",
    }
}

/// Normalize a raw argument token into a Python identifier. Padding terms
/// and bare numbers map to the empty string.
pub fn to_py_arg_name(name: &str) -> String {
    let mut arg = name.trim().to_lowercase();
    if arg.is_empty() || arg == "--" || arg == "\u{2013}" {
        return String::new();
    }
    if arg.contains("--") {
        return arg.replace("--", "");
    }
    if arg.chars().all(|c| c.is_ascii_digit()) {
        return String::new();
    }

    let chars: Vec<char> = arg.chars().collect();
    if chars[0].is_ascii_digit() {
        if chars.get(1).is_some_and(|c| c.is_ascii_digit()) {
            log::warn!("argument {name:?} starts with a multi-digit number");
            arg = format!("{}{}", digit_word(chars[0]), &arg[1..]);
        } else if matches!(arg.get(1..3), Some("st" | "nd" | "rd" | "th")) {
            // ordinal, e.g. "1st" becomes "first"
            arg = format!("{}{}", ordinal_word(chars[0]), &arg[3..]);
        } else {
            arg = format!("{}{}", digit_word(chars[0]), &arg[1..]);
        }
    }

    for (from, to) in PY_ARG_CLEANUP {
        arg = arg.replace(from, to);
    }
    let mut arg = arg.trim().trim_end_matches('_').to_string();

    if FORBIDDEN_ARGUMENT_NAMES.contains(&arg.as_str()) {
        arg.push('_');
    }
    arg
}

/// Split a token into its alphabetic stem and trailing iteration number
/// (`"cname3"` gives `("cname", 3)`).
pub fn get_iter_values(name: &str) -> (String, u32) {
    let Some(caps) = RE_ITER_NAME.captures(name.trim()) else {
        return (String::new(), 0);
    };
    let stem = caps.get(1).map_or("", |m| m.as_str()).to_string();
    let iter = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
    (stem, iter)
}

/// Offset after a `+` sign and the byte span of its digits.
fn get_plus_offset(name: &str) -> Option<(u32, (usize, usize))> {
    let caps = RE_PLUS_OFFSET.captures(name.trim())?;
    let digits = caps.get(1)?;
    let value = digits.as_str().parse().ok()?;
    Some((value, (digits.start(), digits.end())))
}

/// Declared arguments matching the stem of an elided group.
///
/// ```text
/// initial: [energytype, cname1, ..., cname6]   elided: [Cname1, Cname2, …]
/// gives:   [cname1, ..., cname6]
/// ```
fn complete_args_from_initial(initial_args: &[String], ellipsis_args: &[&str]) -> Vec<String> {
    let first = to_py_arg_name(ellipsis_args.first().copied().unwrap_or_default());
    let (stem, _) = get_iter_values(&first);
    if stem.is_empty() {
        return Vec::new();
    }
    initial_args
        .iter()
        .filter(|arg| arg.contains(&stem))
        .cloned()
        .collect()
}

/// Expand a comma-separated term group (possibly holding an ellipsis) into
/// individual argument names.
pub fn expand_ellipsis_group(parts: &[&str], initial_args: &[String]) -> Vec<String> {
    if !parts.iter().any(|p| is_ellipsis(p)) {
        return parts.iter().map(|p| p.trim().to_string()).collect();
    }

    // prefer matching the declared signature over numbering heuristics
    let complete = complete_args_from_initial(initial_args, parts);
    if !complete.is_empty() {
        return complete;
    }

    let mut names: Vec<String> = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        let part = part.trim();
        if !is_ellipsis(part) {
            continue;
        }
        let Some(next) = parts.get(i + 1).map(|p| p.trim()) else {
            continue;
        };

        if let Some((final_iter, (start, end))) = get_plus_offset(next) {
            // offset ranges, e.g. "val+1, …, val+4"
            let prev_iter = i
                .checked_sub(1)
                .and_then(|k| parts.get(k))
                .and_then(|p| get_plus_offset(p.trim()))
                .map(|(n, _)| n)
                .unwrap_or(0);
            for j in prev_iter + 1..final_iter {
                let name = format!("{}{j}{}", &next[..start], &next[end..]);
                if !to_py_arg_name(&name).is_empty() {
                    names.push(name);
                }
            }
        } else {
            let mut k = i;
            while k > 0 && parts[k - 1].trim().is_empty() {
                k -= 1;
            }
            let Some(prev) = k.checked_sub(1).and_then(|k| parts.get(k)) else {
                continue;
            };
            let (prev_stem, prev_n) = get_iter_values(&to_py_arg_name(prev));
            let (next_stem, next_n) = get_iter_values(&to_py_arg_name(next));
            if prev_stem != next_stem {
                log::warn!(
                    "inconsistent argument stems around an ellipsis: {prev_stem} != {next_stem}"
                );
                continue;
            }
            if next_n > 0 {
                for j in prev_n + 1..next_n {
                    names.push(format!("{prev_stem}{j}"));
                }
            } else {
                names.push(next_stem);
            }
        }
    }
    names
}

// -- Argument ---------------------------------------------------------------

/// Guessed Python type of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Int,
    Str,
}

impl ArgType {
    pub fn name(self) -> &'static str {
        match self {
            ArgType::Int => "int",
            ArgType::Str => "str",
        }
    }
}

/// Join type names for a docstring (`" or "`) or a signature (`" | "`).
pub fn str_types(types: &[ArgType], join: &str) -> String {
    types
        .iter()
        .map(|t| t.name())
        .collect::<Vec<_>>()
        .join(join)
}

/// Keyword-argument clause of the generated signature, or `None` for a
/// padding argument.
pub fn to_py_signature(py_arg_name: &str, types: &[ArgType]) -> Option<String> {
    if py_arg_name.is_empty() {
        return None;
    }
    Some(format!(
        "{py_arg_name}: {} = \"\"",
        str_types(types, " | ")
    ))
}

/// Description attached to an argument: either markup from the synopsis or
/// replacement text.
#[derive(Debug, Clone)]
pub enum ArgDescription {
    Markup(Element),
    Text(String),
}

/// One extracted command argument.
#[derive(Debug, Clone)]
pub struct Argument {
    name: String,
    description: ArgDescription,
}

impl Argument {
    pub fn new(name: impl Into<String>, description: ArgDescription) -> Self {
        Argument {
            name: name.into(),
            description,
        }
    }

    /// Build an argument from a synopsis varlist entry, sharing the entry's
    /// description element.
    pub fn from_entry(entry: &Element) -> Option<Argument> {
        let mut items = entry.content().iter();
        let term = items.find_map(|item| {
            item.as_element()
                .filter(|e| e.kind() == ElementKind::Term)
        })?;
        let description = entry
            .content()
            .iter()
            .skip_while(|item| {
                item.as_element()
                    .map(|e| e.kind() != ElementKind::Term)
                    .unwrap_or(true)
            })
            .nth(1);
        let description = match description {
            Some(Item::Element(e)) => ArgDescription::Markup(e.clone()),
            Some(Item::Text(t)) => ArgDescription::Text(t.clone()),
            None => ArgDescription::Text(String::new()),
        };
        Some(Argument::new(term.text(), description))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn py_arg_name(&self) -> String {
        to_py_arg_name(&self.name)
    }

    /// Parameter types guessed from a nested value list in the description.
    pub fn types(&self) -> Vec<ArgType> {
        if let ArgDescription::Markup(desc) = &self.description {
            if let Some(varlist) = desc.rec_find(ElementKind::VariableList) {
                let terms: Vec<String> = varlist
                    .find_all(ElementKind::VarlistEntry, false)
                    .iter()
                    .filter_map(|e| e.content().first())
                    .map(|item| match item {
                        Item::Text(t) => t.clone(),
                        Item::Element(e) => e.text(),
                    })
                    .collect();
                if terms.iter().any(|t| is_numeric(t.trim())) {
                    return vec![ArgType::Int, ArgType::Str];
                }
            }
        }
        vec![ArgType::Str]
    }

    /// Child arguments expanded when the term names several parameters at
    /// once.
    pub fn multiple_args(&self, initial_args: &[String]) -> Vec<Argument> {
        if !self.name.contains(',') {
            return Vec::new();
        }
        let parts: Vec<&str> = self.name.split(',').collect();
        expand_ellipsis_group(&parts, initial_args)
            .into_iter()
            .map(|name| Argument::new(name, self.description.clone()))
            .collect()
    }

    fn description_is(&self, text: &str) -> bool {
        matches!(&self.description, ArgDescription::Text(t) if t == text)
    }

    /// Numpydoc parameter block for this argument.
    pub fn to_py_docstring(&self, ctx: &RenderContext, width: usize) -> Vec<String> {
        let py_arg_name = self.py_arg_name();
        if py_arg_name.is_empty() {
            return Vec::new();
        }

        let rst = match &self.description {
            ArgDescription::Markup(e) => e.to_rst(ctx, "", width),
            ArgDescription::Text(t) => t.clone(),
        };
        let rst = replace_terms(&rst, ctx.terms);
        let indent = "    ";

        let description = match &self.description {
            ArgDescription::Markup(e) if !e.has_no_resize_child() && !rst.contains("* ") => {
                resize_lines(&rst, width, indent, indent)
            }
            ArgDescription::Markup(_) => {
                indent_lines(&rst, indent).lines().map(str::to_string).collect()
            }
            ArgDescription::Text(_) if !rst.contains(" * ") => {
                resize_lines(&rst, width, indent, indent)
            }
            ArgDescription::Text(_) => rst.lines().map(str::to_string).collect(),
        };

        let mut docstring = vec![format!(
            "{py_arg_name} : {}",
            str_types(&self.types(), " or ")
        )];
        docstring.extend(description);
        docstring
    }
}

// -- ArgumentList -----------------------------------------------------------

/// Arguments of one command, reconciled against the names its signature
/// declares.
#[derive(Debug, Clone)]
pub struct ArgumentList {
    initial_args: Vec<String>,
    arguments: Vec<Argument>,
    additional_args: Vec<Argument>,
    missing_description: String,
    additional_description: String,
}

impl ArgumentList {
    /// Extract arguments from a synopsis variable list and align them with
    /// the declared names. `url` points to the command's documentation page
    /// for the placeholder descriptions.
    pub fn from_list_entry(
        url: &str,
        list_entry: Option<&Element>,
        initial_args: Vec<String>,
    ) -> ArgumentList {
        let mut list = ArgumentList {
            initial_args,
            arguments: Vec::new(),
            additional_args: Vec::new(),
            missing_description: MISSING_ARGUMENT_DESCRIPTION.replace("url", url),
            additional_description: ADDITIONAL_ARGUMENT_DESCRIPTION.replace("url", url),
        };

        let mut temp_args: Vec<Argument> = Vec::new();
        if let Some(list_entry) = list_entry {
            for entry in list_entry.find_all(ElementKind::VarlistEntry, false) {
                let Some(argument) = Argument::from_entry(entry) else {
                    continue;
                };
                let expanded = argument.multiple_args(&list.initial_args);
                if expanded.is_empty() {
                    upsert(&mut temp_args, argument);
                } else {
                    for arg in expanded {
                        if list.initial_args.contains(&arg.py_arg_name()) {
                            upsert(&mut temp_args, arg);
                        }
                    }
                }
            }
        }

        list.align(temp_args);
        list
    }

    /// Fold a later argument-description block into this list. Documented
    /// arguments replace placeholders; new names land at the end.
    pub fn merge(&mut self, other: ArgumentList) {
        let mut temp_args: Vec<Argument> = Vec::new();
        for arg in other.arguments {
            let name = arg.py_arg_name();
            if self.initial_args.contains(&name)
                && !arg.description_is(&self.missing_description)
                && !arg.description_is(&self.additional_description)
            {
                upsert(&mut temp_args, arg);
            }
        }

        for initial_arg in self.initial_args.clone() {
            match temp_args.iter().find(|a| a.py_arg_name() == initial_arg) {
                Some(arg) => match self.position(&initial_arg) {
                    Some(i) => self.arguments[i] = arg.clone(),
                    None => self.arguments.push(arg.clone()),
                },
                None => {
                    if self.position(&initial_arg).is_none() {
                        self.arguments.push(Argument::new(
                            initial_arg,
                            ArgDescription::Text(self.missing_description.clone()),
                        ));
                    }
                }
            }
        }

        self.collect_additional(temp_args);
    }

    /// Order extracted arguments by the declared signature, padding holes
    /// with placeholder descriptions.
    fn align(&mut self, temp_args: Vec<Argument>) {
        for initial_arg in &self.initial_args {
            match temp_args.iter().find(|a| &a.py_arg_name() == initial_arg) {
                Some(arg) => self.arguments.push(arg.clone()),
                None => self.arguments.push(Argument::new(
                    initial_arg.clone(),
                    ArgDescription::Text(self.missing_description.clone()),
                )),
            }
        }
        self.collect_additional(temp_args);
    }

    fn collect_additional(&mut self, temp_args: Vec<Argument>) {
        if temp_args.len() == self.initial_args.len() {
            return;
        }
        let mut is_additional = false;
        for arg in temp_args {
            if self.position(&arg.py_arg_name()).is_none() {
                self.additional_args.push(arg);
                is_additional = true;
            }
        }
        if is_additional && self.position(ADDITIONAL_ARG_NAME).is_none() {
            self.arguments.push(Argument::new(
                ADDITIONAL_ARG_NAME,
                ArgDescription::Text(self.additional_description.clone()),
            ));
        }
    }

    fn position(&self, py_arg_name: &str) -> Option<usize> {
        self.arguments
            .iter()
            .position(|a| a.py_arg_name() == py_arg_name)
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn initial_args(&self) -> &[String] {
        &self.initial_args
    }

    pub fn py_arg_names(&self) -> Vec<String> {
        self.arguments.iter().map(Argument::py_arg_name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    pub fn remove_last_arg(&mut self) {
        self.arguments.pop();
    }
}

/// Insert keeping one argument per generated name, later entries winning.
fn upsert(args: &mut Vec<Argument>, arg: Argument) {
    let name = arg.py_arg_name();
    match args.iter().position(|a| a.py_arg_name() == name) {
        Some(i) => args[i] = arg,
        None => args.push(arg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_str;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ordinals_are_spelled_out() {
        assert_eq!(to_py_arg_name("1st"), "first");
        assert_eq!(to_py_arg_name("2nd"), "second");
        assert_eq!(to_py_arg_name("3D"), "threed");
    }

    #[test]
    fn forbidden_names_get_a_trailing_underscore() {
        assert_eq!(to_py_arg_name("Type"), "type_");
        assert_eq!(to_py_arg_name("Format"), "format_");
        assert_eq!(to_py_arg_name("VAL1"), "val1");
    }

    #[test]
    fn padding_terms_map_to_empty() {
        assert_eq!(to_py_arg_name("--"), "");
        assert_eq!(to_py_arg_name(""), "");
        assert_eq!(to_py_arg_name("17"), "");
        assert_eq!(to_py_arg_name("Blank"), "");
    }

    #[test]
    fn special_characters_are_cleaned() {
        assert_eq!(to_py_arg_name("Par(1)"), "par_1");
        assert_eq!(to_py_arg_name("N+1"), "nplus1");
    }

    #[test]
    fn iter_values_split_stem_and_number() {
        assert_eq!(get_iter_values("cname3"), ("cname".to_string(), 3));
        assert_eq!(get_iter_values("energytype"), ("energytype".to_string(), 0));
    }

    #[test]
    fn ellipsis_expands_against_declared_args() {
        let initial = strings(&[
            "energytype", "cname1", "cname2", "cname3", "cname4", "cname5", "cname6",
        ]);
        let parts = vec!["Cname1", " Cname2", " \u{2026}"];
        assert_eq!(
            expand_ellipsis_group(&parts, &initial),
            strings(&["cname1", "cname2", "cname3", "cname4", "cname5", "cname6"])
        );
    }

    #[test]
    fn ellipsis_without_declared_match_numbers_the_stem() {
        let parts = vec!["c1", "\u{2026}", "c4"];
        assert_eq!(expand_ellipsis_group(&parts, &[]), strings(&["c2", "c3"]));
    }

    #[test]
    fn non_ellipsis_groups_split_on_commas() {
        let parts = vec!["VX", " VY", " VZ"];
        assert_eq!(
            expand_ellipsis_group(&parts, &[]),
            strings(&["VX", "VY", "VZ"])
        );
    }

    #[test]
    fn missing_descriptions_fill_declared_holes() {
        let root = parse_str(
            "<refentry><refsynopsisdiv><variablelist>\
             <varlistentry><term>N</term><listitem><para>node number</para></listitem>\
             </varlistentry></variablelist></refsynopsisdiv></refentry>",
        )
        .unwrap();
        let varlist = root.rec_find(ElementKind::VariableList).unwrap();
        let list = ArgumentList::from_list_entry(
            "https://example/cmd.html",
            Some(varlist),
            strings(&["n", "dx", "dy", "dz"]),
        );
        assert_eq!(list.py_arg_names(), strings(&["n", "dx", "dy", "dz"]));
        let second = &list.arguments()[1];
        assert!(matches!(
            &second.description,
            ArgDescription::Text(t) if t.contains("https://example/cmd.html")
        ));
    }

    #[test]
    fn undeclared_arguments_become_a_catch_all() {
        let root = parse_str(
            "<refentry><refsynopsisdiv><variablelist>\
             <varlistentry><term>N</term><listitem><para>node number</para></listitem>\
             </varlistentry>\
             <varlistentry><term>EXTRA</term><listitem><para>undeclared</para></listitem>\
             </varlistentry>\
             </variablelist></refsynopsisdiv></refentry>",
        )
        .unwrap();
        let varlist = root.rec_find(ElementKind::VariableList).unwrap();
        let list =
            ArgumentList::from_list_entry("https://example/cmd.html", Some(varlist), strings(&["n"]));
        let names = list.py_arg_names();
        assert_eq!(names, strings(&["n", ADDITIONAL_ARG_NAME]));
        assert_eq!(list.additional_args.len(), 1);
    }

    #[test]
    fn merge_replaces_placeholder_descriptions() {
        let initial = strings(&["n", "dx"]);
        let mut list = ArgumentList::from_list_entry("url", None, initial.clone());
        assert!(list
            .arguments()
            .iter()
            .all(|a| a.description_is(&list.missing_description)));

        let root = parse_str(
            "<refentry><refsynopsisdiv><variablelist>\
             <varlistentry><term>DX</term><listitem><para>offset</para></listitem>\
             </varlistentry></variablelist></refsynopsisdiv></refentry>",
        )
        .unwrap();
        let varlist = root.rec_find(ElementKind::VariableList).unwrap();
        let other = ArgumentList::from_list_entry("url", Some(varlist), initial);
        list.merge(other);

        assert_eq!(list.py_arg_names(), strings(&["n", "dx"]));
        assert!(matches!(
            &list.arguments()[1].description,
            ArgDescription::Markup(_)
        ));
    }

    #[test]
    fn signature_types_join_with_pipes() {
        assert_eq!(
            to_py_signature("energytype", &[ArgType::Str, ArgType::Int]),
            Some("energytype: str | int = \"\"".to_string())
        );
        assert_eq!(to_py_signature("", &[ArgType::Str]), None);
    }
}
