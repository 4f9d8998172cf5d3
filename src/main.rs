//! xml2py — convert an XML/DocBook command reference into Python client
//! modules with embedded RST docstrings.
//!
//! The documentation directory is expected to carry four subdirectories:
//! `graphics/` (figures), `links/` (link databases), `terms/` (entity
//! files), and `xml/` (the command sources). One Python class file is
//! written per command group.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use xml2py::ast::render::RenderContext;
use xml2py::command::{command_name, CommandComments, CommandDoc};
use xml2py::custom::CustomFunctions;
use xml2py::load;
use xml2py::{ConvertError, NameMap};

#[derive(Parser)]
#[command(
    name = "xml2py",
    about = "Convert an XML command reference into Python client modules"
)]
struct Cli {
    /// Documentation directory containing graphics/, links/, terms/ and xml/
    #[arg(short = 'x', long = "xml-path")]
    xml_path: PathBuf,

    /// Output directory for the generated package
    #[arg(short = 'o', long, default_value = "package")]
    output: PathBuf,

    /// Directory of hand-written override files
    #[arg(short = 'f', long = "functions-path")]
    functions_path: Option<PathBuf>,

    /// Base URL of the online documentation, overriding the build variables
    #[arg(long)]
    base_url: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let (graph_path, link_path, term_path, xml_path) = get_paths(&cli.xml_path);

    let links = load::load_links(&link_path)?;
    let fcache = load::load_fcache(&graph_path)?;
    let docu_global = load::load_docu_global(&term_path);
    let (terms, version) =
        load::load_terms(&term_path, &docu_global, &links, cli.base_url.as_deref())?;

    let custom = match &cli.functions_path {
        Some(path) => Some(CustomFunctions::from_dir(path)?),
        None => None,
    };

    if !xml_path.is_dir() {
        bail!("invalid xml path {}", xml_path.display());
    }
    let pattern = xml_path.join("**").join("*.xml");
    let pattern = pattern.to_str().context("non-utf8 xml path")?;
    let mut files: Vec<PathBuf> = glob::glob(pattern)?.filter_map(Result::ok).collect();
    files.sort();

    // metadata pass: the command names feed the name map
    let mut meta_names = Vec::new();
    let mut sources = Vec::new();
    for path in files {
        let source = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        match command_name(&source, &path.display().to_string()) {
            Ok(name) => {
                meta_names.push(name);
                sources.push((path, source));
            }
            Err(err) => log::warn!("skipping {}: {err}", path.display()),
        }
    }
    log::info!("found {} command files", sources.len());

    let name_map = build_name_map(&meta_names)?;
    let ctx = RenderContext {
        terms: &terms,
        links: &links,
        fcache: &fcache,
        name_map: &name_map,
        base_url: Some(&version.base_url),
        image_dir: "images",
    };
    let comments = CommandComments::new();

    // full pass
    let mut commands = Vec::new();
    for (path, source) in &sources {
        let mut doc = match CommandDoc::from_source(source, &path.display().to_string()) {
            Ok(doc) => doc,
            Err(err) => {
                log::warn!("skipping {}: {err}", path.display());
                continue;
            }
        };
        if !doc.classify(&terms) {
            continue;
        }
        commands.push(doc);
    }
    commands.sort_by_key(|c| c.py_name(&name_map));

    write_package(
        &cli.output,
        &commands,
        &ctx,
        &version,
        custom.as_ref(),
        &comments,
    )?;
    log::info!("commands written to {}", cli.output.display());
    Ok(())
}

/// Resolve the four documentation subdirectories, warning about gaps.
fn get_paths(doc_path: &Path) -> (PathBuf, PathBuf, PathBuf, PathBuf) {
    let graph_path = doc_path.join("graphics");
    let link_path = doc_path.join("links");
    let term_path = doc_path.join("terms");
    let xml_path = doc_path.join("xml");
    for (path, what) in [
        (&graph_path, "graphics"),
        (&link_path, "links"),
        (&term_path, "terms"),
        (&xml_path, "xml"),
    ] {
        if !path.is_dir() {
            log::warn!("the {what} directory is missing under {}", doc_path.display());
        }
    }
    (graph_path, link_path, term_path, xml_path)
}

/// Map each command to its generated function name: lowercase with the
/// leading symbol dropped when that stays unique, spelled out otherwise
/// (`VGET` and `*VGET` become `vget` and `star_vget`).
fn build_name_map(names: &[String]) -> Result<NameMap> {
    let mut naive_counts: HashMap<String, usize> = HashMap::new();
    for name in names {
        *naive_counts.entry(flat_name(name)).or_default() += 1;
    }

    let mut map = NameMap::new();
    let mut owners: HashMap<String, String> = HashMap::new();
    for name in names {
        let flat = flat_name(name);
        let py_name = if naive_counts.get(&flat).copied().unwrap_or(0) > 1 {
            spell_leading_symbol(name)
        } else {
            flat
        };
        if let Some(first) = owners.get(&py_name) {
            if first != name {
                return Err(ConvertError::NameCollision {
                    first: first.clone(),
                    second: name.clone(),
                    py_name,
                }
                .into());
            }
            continue;
        }
        owners.insert(py_name.clone(), name.clone());
        map.insert(name.clone(), py_name);
    }
    Ok(map)
}

fn flat_name(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.chars().next() {
        Some(c) if !c.is_alphanumeric() => lower[c.len_utf8()..].to_string(),
        _ => lower,
    }
}

fn spell_leading_symbol(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.chars().next() {
        Some('*') => format!("star_{}", &lower[1..]),
        Some('/') => format!("slash_{}", &lower[1..]),
        _ => lower,
    }
}

fn module_dir_name(group_module: &str) -> String {
    group_module.replace('/', "").replace(' ', "_").to_lowercase()
}

fn class_file_name(class: &str) -> String {
    class.replace(' ', "_").replace('/', "_").to_lowercase()
}

/// Title-cased class identifier: `apdl abbreviations` -> `ApdlAbbreviations`.
fn python_class_name(class: &str) -> String {
    class
        .replace('/', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect()
}

#[derive(Default)]
struct ClassFile {
    class_name: String,
    imports: BTreeSet<String>,
    methods: Vec<String>,
}

/// Write one class file per command group, plus the package import files.
fn write_package(
    output: &Path,
    commands: &[CommandDoc],
    ctx: &RenderContext,
    version: &load::VersionInfo,
    custom: Option<&CustomFunctions>,
    comments: &CommandComments,
) -> Result<()> {
    let mut modules: BTreeMap<String, BTreeMap<String, ClassFile>> = BTreeMap::new();

    for command in commands {
        let Some(group) = command.group() else {
            log::warn!("{} has no group; not converted", command.name());
            continue;
        };
        let module = module_dir_name(&group.module);
        let file = class_file_name(&group.class);
        let method = command.to_python(ctx, version, custom, comments, "    ")?;
        let (imports, body) = split_imports(&method);

        let entry = modules
            .entry(module)
            .or_default()
            .entry(file)
            .or_insert_with(|| ClassFile {
                class_name: python_class_name(&group.class),
                ..ClassFile::default()
            });
        entry.imports.extend(imports);
        entry.methods.push(body);
    }

    fs::create_dir_all(output)
        .with_context(|| format!("creating output directory {}", output.display()))?;

    for (module, class_files) in &modules {
        let module_dir = output.join(module);
        fs::create_dir_all(&module_dir)?;

        for (file, entry) in class_files {
            let mut content = String::new();
            for import in &entry.imports {
                content.push_str(import);
                content.push('\n');
            }
            if !entry.imports.is_empty() {
                content.push('\n');
            }
            content.push_str(&format!("class {}:\n", entry.class_name));
            for method in &entry.methods {
                content.push_str(method);
            }
            fs::write(module_dir.join(format!("{file}.py")), content)?;
        }

        let mut init = String::from("from . import (\n");
        for file in class_files.keys() {
            init.push_str(&format!("    {file},\n"));
        }
        init.push_str(")\n");
        fs::write(module_dir.join("__init__.py"), init)?;
    }

    let mut init = String::from("from . import (\n");
    for module in modules.keys() {
        init.push_str(&format!("    {module},\n"));
    }
    init.push_str(")\n");
    fs::write(output.join("__init__.py"), init)?;
    Ok(())
}

/// Pull custom import lines out of a generated method so they can sit at
/// the top of the class file instead of between methods.
fn split_imports(method: &str) -> (Vec<String>, String) {
    let mut imports = Vec::new();
    let mut body = Vec::new();
    let mut seen_def = false;
    for line in method.lines() {
        if !seen_def && line.trim_start().starts_with("def ") {
            seen_def = true;
        }
        let trimmed = line.trim_start();
        if !seen_def && (trimmed.starts_with("import ") || trimmed.starts_with("from ")) {
            imports.push(line.trim().to_string());
        } else {
            body.push(line);
        }
    }
    let mut body = body.join("\n");
    body.push('\n');
    (imports, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_names_drop_their_leading_symbol() {
        let names = vec!["/GCOLUMN".to_string(), "KDIST".to_string()];
        let map = build_name_map(&names).unwrap();
        assert_eq!(map["/GCOLUMN"], "gcolumn");
        assert_eq!(map["KDIST"], "kdist");
    }

    #[test]
    fn colliding_names_spell_the_symbol() {
        let names = vec!["VGET".to_string(), "*VGET".to_string(), "/VGET".to_string()];
        let map = build_name_map(&names).unwrap();
        assert_eq!(map["VGET"], "vget");
        assert_eq!(map["*VGET"], "star_vget");
        assert_eq!(map["/VGET"], "slash_vget");
    }

    #[test]
    fn unresolvable_collisions_are_an_error() {
        let names = vec!["VGET".to_string(), "vget".to_string()];
        assert!(build_name_map(&names).is_err());
    }

    #[test]
    fn class_names_are_title_cased() {
        assert_eq!(python_class_name("matrix operations"), "MatrixOperations");
        assert_eq!(python_class_name("set up/controls"), "SetUpControls");
        assert_eq!(module_dir_name("Matrix OP"), "matrix_op");
        assert_eq!(class_file_name("Set Up/Controls"), "set_up_controls");
    }

    #[test]
    fn custom_imports_move_to_the_file_top() {
        let method = "\nimport numpy as np\n    def kdist(self, **kwargs):\n        pass\n";
        let (imports, body) = split_imports(method);
        assert_eq!(imports, vec!["import numpy as np"]);
        assert!(!body.contains("import numpy"));
        assert!(body.contains("def kdist"));
    }
}
