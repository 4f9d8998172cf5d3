use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn cmd() -> assert_cmd::Command {
    assert_cmd::Command::from(Command::new(env!("CARGO_BIN_EXE_xml2py")))
}

const ABBR_XML: &str = r#"<refentry id="abbr">
<refentryinfo filename="abbr_cmd.html"/>
<refmeta><refentrytitle>*ABBR</refentrytitle></refmeta>
<refnamediv>
  <refname>*ABBR, Abbr, String</refname>
  <refpurpose>Defines an abbreviation.</refpurpose>
  <refclass>&fcp;</refclass>
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
<refsect1><title>Notes</title><para>Abbreviations are command shortcuts.</para></refsect1>
</refentry>"#;

/// Lay out a minimal documentation directory: graphics, link databases,
/// entity files and one command source.
fn write_doc_tree(root: &Path) {
    fs::create_dir_all(root.join("graphics")).unwrap();
    fs::create_dir_all(root.join("links")).unwrap();
    fs::create_dir_all(root.join("terms/glb")).unwrap();
    fs::create_dir_all(root.join("xml")).unwrap();

    fs::write(root.join("graphics/gcmdfig1.png"), b"png").unwrap();
    fs::write(
        root.join("links/ans_cmd.db"),
        "<toc><ttl>Command Reference</ttl>\
         <entry targetptr=\"abbr\"><page href=\"abbr_cmd.html\"/></entry></toc>",
    )
    .unwrap();

    fs::write(
        root.join("terms/glb/build_variables.ent"),
        "<!ENTITY ansys_internal_version '24.1'>\n",
    )
    .unwrap();
    fs::write(
        root.join("terms/glb/terms_global.ent"),
        "<!ENTITY pn006p 'Mechanical APDL'>\n",
    )
    .unwrap();
    fs::write(root.join("terms/glb/docu_global.ent"), "").unwrap();
    fs::write(root.join("terms/glb/manuals.ent"), "").unwrap();

    fs::write(
        root.join("xml/ansys.groupcodes.commands.ent"),
        "<!ENTITY fcp '<classname>APDL</classname><type>Abbreviations</type>'>\n",
    )
    .unwrap();
    fs::write(root.join("xml/abbr.xml"), ABBR_XML).unwrap();
}

#[test]
fn converts_a_command_reference() {
    let doc = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_doc_tree(doc.path());

    cmd()
        .args(["-x", doc.path().to_str().unwrap()])
        .args(["-o", out.path().to_str().unwrap()])
        .assert()
        .success();

    let class_file = fs::read_to_string(out.path().join("apdl/abbreviations.py")).unwrap();
    assert!(class_file.contains("class Abbreviations:"));
    assert!(class_file.contains("def abbr(self, abbr: str = \"\", string: str = \"\", **kwargs):"));
    assert!(class_file.contains("Defines an abbreviation."));
    assert!(class_file.contains("command = f\"*ABBR,{abbr},{string}\""));
    assert!(class_file.contains("return self.run(command, **kwargs)"));

    let module_init = fs::read_to_string(out.path().join("apdl/__init__.py")).unwrap();
    assert!(module_init.contains("abbreviations"));
    let package_init = fs::read_to_string(out.path().join("__init__.py")).unwrap();
    assert!(package_init.contains("apdl"));
}

#[test]
fn docstring_links_to_the_online_documentation() {
    let doc = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_doc_tree(doc.path());

    cmd()
        .args(["-x", doc.path().to_str().unwrap()])
        .args(["-o", out.path().to_str().unwrap()])
        .args(["--base-url", "https://docs.example/"])
        .assert()
        .success();

    let class_file = fs::read_to_string(out.path().join("apdl/abbreviations.py")).unwrap();
    assert!(class_file.contains("Mechanical APDL Command:"));
    assert!(class_file.contains("https://docs.example/ans_cmd/abbr_cmd.html"));
}

#[test]
fn custom_function_body_replaces_the_generated_one() {
    let doc = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let overrides = TempDir::new().unwrap();
    write_doc_tree(doc.path());
    fs::write(
        overrides.path().join("abbr.py"),
        "import secrets\n\n\
         def abbr(self, abbr=\"\", string=\"\", **kwargs):\n\
         \x20   \"\"\"doc\n\
         \x20   \"\"\"\n\
         \x20   return self.run(f\"*ABBR,{abbr},{string}\", mute=True, **kwargs)\n",
    )
    .unwrap();

    cmd()
        .args(["-x", doc.path().to_str().unwrap()])
        .args(["-o", out.path().to_str().unwrap()])
        .args(["-f", overrides.path().to_str().unwrap()])
        .assert()
        .success();

    let class_file = fs::read_to_string(out.path().join("apdl/abbreviations.py")).unwrap();
    assert!(class_file.starts_with("import secrets\n"));
    assert!(class_file.contains("mute=True"));
    assert!(!class_file.contains("return self.run(command, **kwargs)"));
}

#[test]
fn non_command_files_are_skipped() {
    let doc = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_doc_tree(doc.path());
    fs::write(
        doc.path().join("xml/preface.xml"),
        "<book><title>Command Reference Preface</title></book>",
    )
    .unwrap();

    cmd()
        .env("RUST_LOG", "warn")
        .args(["-x", doc.path().to_str().unwrap()])
        .args(["-o", out.path().to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("preface.xml"));

    assert!(out.path().join("apdl/abbreviations.py").exists());
    assert!(!out.path().join("preface.py").exists());
}

#[test]
fn missing_xml_directory_fails() {
    let doc = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    cmd()
        .args(["-x", doc.path().to_str().unwrap()])
        .args(["-o", out.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid xml path"));
}
