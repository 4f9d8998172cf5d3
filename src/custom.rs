//! Hand-written override files for generated commands.
//!
//! An override directory holds one `*.py` file per customized command,
//! named after the generated function. Each file is scanned line by line
//! and split into its docstring sections, its argument list, its imports,
//! and the source body following the docstring. Whatever sections a file
//! provides replace the generated ones.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

static RE_ARG_BEFORE_COLON: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w+)\s*:").unwrap());

static RE_ARG_BEFORE_EQUALS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w+)\s*=").unwrap());

/// Lines kept unindented inside Parameters/Returns sections.
const NO_INDENT: &[&str] = &["int", "float", "str", "-------", "None", "bool"];

/// Per-command override sections, keyed by generated function name.
#[derive(Debug, Default)]
pub struct CustomFunctions {
    names: Vec<String>,
    args: HashMap<String, Vec<String>>,
    params: HashMap<String, Vec<String>>,
    returns: HashMap<String, Vec<String>>,
    notes: HashMap<String, Vec<String>>,
    examples: HashMap<String, Vec<String>>,
    code: HashMap<String, Vec<String>>,
    imports: HashMap<String, Vec<String>>,
}

impl CustomFunctions {
    /// Scan a directory of override files.
    pub fn from_dir(path: &Path) -> Result<CustomFunctions> {
        if !path.is_dir() {
            bail!("the custom function path {} does not exist", path.display());
        }
        let mut custom = CustomFunctions::default();
        let pattern = path.join("*.py");
        let pattern = pattern.to_str().context("non-utf8 custom function path")?;

        for entry in glob::glob(pattern)? {
            let file = entry?;
            let py_name = file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let source = fs::read_to_string(&file)
                .with_context(|| format!("reading override file {}", file.display()))?;
            let sections = parse_override(&source);

            if sections.code.is_empty() {
                log::warn!("no code found in {}", file.display());
            }
            custom.names.push(py_name.clone());
            insert_section(&mut custom.args, &py_name, sections.args);
            insert_section(&mut custom.params, &py_name, sections.params);
            insert_section(&mut custom.returns, &py_name, sections.returns);
            insert_section(&mut custom.notes, &py_name, sections.notes);
            insert_section(&mut custom.examples, &py_name, sections.examples);
            insert_section(&mut custom.code, &py_name, sections.code);
            insert_section(&mut custom.imports, &py_name, sections.imports);
        }
        Ok(custom)
    }

    pub fn contains(&self, py_name: &str) -> bool {
        self.names.iter().any(|n| n == py_name)
    }

    pub fn args(&self, py_name: &str) -> Option<&[String]> {
        self.args.get(py_name).map(Vec::as_slice)
    }

    pub fn params(&self, py_name: &str) -> Option<&[String]> {
        self.params.get(py_name).map(Vec::as_slice)
    }

    pub fn returns(&self, py_name: &str) -> Option<&[String]> {
        self.returns.get(py_name).map(Vec::as_slice)
    }

    pub fn notes(&self, py_name: &str) -> Option<&[String]> {
        self.notes.get(py_name).map(Vec::as_slice)
    }

    pub fn examples(&self, py_name: &str) -> Option<&[String]> {
        self.examples.get(py_name).map(Vec::as_slice)
    }

    pub fn code(&self, py_name: &str) -> Option<&[String]> {
        self.code.get(py_name).map(Vec::as_slice)
    }

    pub fn imports(&self, py_name: &str) -> Option<&[String]> {
        self.imports.get(py_name).map(Vec::as_slice)
    }
}

fn insert_section(map: &mut HashMap<String, Vec<String>>, py_name: &str, lines: Vec<String>) {
    if !lines.is_empty() {
        map.insert(py_name.to_string(), lines);
    }
}

#[derive(Debug, Default)]
struct Sections {
    args: Vec<String>,
    params: Vec<String>,
    returns: Vec<String>,
    notes: Vec<String>,
    examples: Vec<String>,
    code: Vec<String>,
    imports: Vec<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum DocSection {
    None,
    Params,
    Returns,
    Notes,
    Examples,
}

/// Line state machine over one override file.
///
/// Docstring sections are expected in the order Returns, Notes, Examples;
/// everything after the closing docstring quotes is source code.
fn parse_override(source: &str) -> Sections {
    let mut sections = Sections::default();
    let mut section = DocSection::None;
    let mut in_def = false;
    let mut begun_docstring = false;
    let mut ended_docstring = false;

    for line in source.lines() {
        if line.contains("import") && !in_def {
            sections.imports.push(line.to_string());
        } else if line.contains("def") && !in_def {
            in_def = true;
            for split_arg in line.split(',') {
                if split_arg.contains("**kwarg") {
                    break;
                }
                let re = if split_arg.contains(':') {
                    &RE_ARG_BEFORE_COLON
                } else if split_arg.contains('=') {
                    &RE_ARG_BEFORE_EQUALS
                } else {
                    continue;
                };
                if let Some(caps) = re.captures(split_arg) {
                    sections.args.push(caps[1].to_string());
                }
            }
        } else if line.contains("\"\"\"") && !begun_docstring {
            begun_docstring = true;
        } else if line.contains("\"\"\"") && begun_docstring {
            section = DocSection::None;
            ended_docstring = true;
        } else if line.trim() == "Parameters" {
            section = DocSection::Params;
        } else if line.trim() == "Returns" {
            section = DocSection::Returns;
            sections.returns.push(line.trim().to_string());
        } else if line.trim() == "Examples" {
            section = DocSection::Examples;
            sections.examples.push(line.trim().to_string());
        } else if line.trim() == "Notes" {
            section = DocSection::Notes;
            sections.notes.push(line.trim().to_string());
        } else if ended_docstring {
            sections.code.push(line.to_string());
        } else {
            match section {
                DocSection::Examples => sections.examples.push(line.trim().to_string()),
                DocSection::Returns => sections.returns.push(section_line(line, false)),
                DocSection::Notes => sections.notes.push(line.trim().to_string()),
                DocSection::Params => sections.params.push(section_line(line, true)),
                DocSection::None => {}
            }
        }
    }
    sections
}

/// Section lines are re-indented four spaces except type/underline rows.
fn section_line(line: &str, optional_marker: bool) -> String {
    let trimmed = line.trim();
    let unindented = NO_INDENT.iter().any(|n| trimmed.ends_with(n))
        || (optional_marker && trimmed.ends_with(", optional"));
    if unindented {
        trimmed.to_string()
    } else if trimmed.is_empty() {
        String::new()
    } else {
        format!("    {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const OVERRIDE: &str = r#"import numpy as np


def kdist(self, kp1: str = "", kp2: str = "", **kwargs):
    """Calculates the distance between two keypoints.

    Parameters
    ----------
    kp1 : str
        First keypoint.
    kp2 : str
        Second keypoint.

    Returns
    -------
    list
        Distance between the keypoints.

    Examples
    --------
    >>> mapdl.kdist(1, 2)
    """
    return parse_kdist(self.run(f"KDIST,{kp1},{kp2}", **kwargs))
"#;

    #[test]
    fn override_args_come_from_the_signature() {
        let sections = parse_override(OVERRIDE);
        assert_eq!(sections.args, vec!["kp1", "kp2"]);
    }

    #[test]
    fn override_code_follows_the_docstring() {
        let sections = parse_override(OVERRIDE);
        assert_eq!(
            sections.code,
            vec!["    return parse_kdist(self.run(f\"KDIST,{kp1},{kp2}\", **kwargs))"]
        );
        assert_eq!(sections.imports, vec!["import numpy as np"]);
    }

    #[test]
    fn section_bodies_are_reindented() {
        let sections = parse_override(OVERRIDE);
        assert!(sections.returns.contains(&"Returns".to_string()));
        assert!(sections
            .returns
            .contains(&"    Distance between the keypoints.".to_string()));
        assert!(sections
            .examples
            .contains(&">>> mapdl.kdist(1, 2)".to_string()));
    }

    #[test]
    fn from_dir_keys_by_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("kdist.py")).unwrap();
        file.write_all(OVERRIDE.as_bytes()).unwrap();

        let custom = CustomFunctions::from_dir(dir.path()).unwrap();
        assert!(custom.contains("kdist"));
        assert_eq!(custom.args("kdist").unwrap(), ["kp1", "kp2"]);
        assert!(custom.code("kdist").is_some());
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(CustomFunctions::from_dir(Path::new("/nonexistent/overrides")).is_err());
    }
}
