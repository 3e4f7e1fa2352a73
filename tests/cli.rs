use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};

fn rdftext_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(bin) = option_env!("CARGO_BIN_EXE_rdftext") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("rdftext");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}

fn run(
    data_dir: &Path,
    args: &[&str],
    stdin: Option<&str>,
) -> Result<Output, Box<dyn std::error::Error>> {
    let mut child = Command::new(rdftext_bin()?)
        .args(args)
        .env("RDFTEXT_DATA_DIR", data_dir)
        .env("RDFTEXT_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(input) = stdin {
        child
            .stdin
            .take()
            .ok_or("stdin not captured")?
            .write_all(input.as_bytes())?;
    } else {
        drop(child.stdin.take());
    }

    Ok(child.wait_with_output()?)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn define_load_query_lookup_roundtrip() -> Result<(), Box<dyn std::error::Error>>
{
    let tempdir = tempfile::tempdir()?;
    let data = tempdir.path();

    let out = run(
        data,
        &[
            "define",
            "places",
            "--primary-field",
            "label",
            "--graph-field",
            "graph",
            "--field",
            "label",
            "--field",
            "code=exact",
        ],
        None,
    )?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let records = concat!(
        r#"{"id":"http://example.org/rome","graph":"http://example.org/g","values":{"label":"Roma capitale","code":"IT-RM"}}"#,
        "\n",
        r#"{"id":"http://example.org/paris","graph":"http://example.org/g","values":{"label":"Paris","code":"FR-75"}}"#,
        "\n",
    );
    let out = run(data, &["load", "places", "-"], Some(records))?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout(&out).contains("Loaded 2 entities"));

    let out = run(data, &["query", "places", "*pitale", "--json"], None)?;
    assert!(out.status.success());
    let hits: serde_json::Value = serde_json::from_str(&stdout(&out))?;
    assert_eq!(hits.as_array().map(Vec::len), Some(1));
    assert_eq!(hits[0]["node"]["type"], "uri");
    assert_eq!(hits[0]["node"]["value"], "http://example.org/rome");

    let out = run(
        data,
        &["query", "places", "code:FR-75", "--graph", "http://example.org/g"],
        None,
    )?;
    assert!(stdout(&out).contains("<http://example.org/paris>"));

    let out = run(
        data,
        &["lookup", "places", "http://example.org/rome", "--json"],
        None,
    )?;
    assert!(out.status.success());
    let record: serde_json::Value = serde_json::from_str(&stdout(&out))?;
    assert_eq!(record["graph"], "http://example.org/g");
    assert_eq!(record["fields"]["code"][0]["lexical"], "IT-RM");

    let out = run(data, &["lookup", "places", "http://example.org/none"], None)?;
    assert!(!out.status.success());

    Ok(())
}

#[test]
fn list_status_and_drop() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    let data = tempdir.path();

    let out = run(data, &["list"], None)?;
    assert!(stdout(&out).contains("No indexes defined."));

    let out = run(
        data,
        &["define", "notes", "--primary-field", "text", "--field", "text"],
        None,
    )?;
    assert!(out.status.success());

    let out = run(
        data,
        &["define", "notes", "--primary-field", "text", "--field", "text"],
        None,
    )?;
    assert!(!out.status.success(), "redefining an index must fail");

    let out = run(data, &["list", "--json"], None)?;
    let list: serde_json::Value = serde_json::from_str(&stdout(&out))?;
    assert_eq!(list[0]["name"], "notes");
    assert_eq!(list[0]["definition"]["primary_field"], "text");

    let out = run(data, &["status", "--json"], None)?;
    assert!(out.status.success());
    let status: serde_json::Value = serde_json::from_str(&stdout(&out))?;
    assert_eq!(status["indexes"][0]["name"], "notes");
    assert_eq!(status["indexes"][0]["documents"], 0);
    assert_eq!(status["system"]["name"], "rdftext");

    let out = run(data, &["drop", "notes"], None)?;
    assert!(out.status.success());
    assert!(!data.join("indexes").join("notes").exists());

    let out = run(data, &["drop", "notes"], None)?;
    assert!(!out.status.success());

    Ok(())
}

#[test]
fn bad_load_leaves_index_empty() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    let data = tempdir.path();

    run(
        data,
        &["define", "notes", "--primary-field", "text", "--field", "text"],
        None,
    )?;

    let records = concat!(
        r#"{"id":"http://example.org/a","values":{"text":"fine"}}"#,
        "\n",
        r#"{"id":"http://example.org/b","values":{"missing":"field"}}"#,
        "\n",
    );
    let out = run(data, &["load", "notes", "-"], Some(records))?;
    assert!(!out.status.success());

    let out = run(data, &["query", "notes", "fine", "--json"], None)?;
    assert_eq!(stdout(&out).trim(), "[]");

    Ok(())
}

#[test]
fn index_names_are_validated() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    let data = tempdir.path().join("data");

    let out = run(
        &data,
        &["define", "keep", "--primary-field", "text", "--field", "text"],
        None,
    )?;
    assert!(out.status.success());
    let record = r#"{"id":"http://example.org/a","values":{"text":"hi"}}"#;
    let out = run(&data, &["load", "keep", "-"], Some(record))?;
    assert!(out.status.success());

    for name in ["", ".", "..", "../../escaped", "a/b"] {
        let out = run(
            &data,
            &["define", name, "--primary-field", "text", "--field", "text"],
            None,
        )?;
        assert!(!out.status.success(), "define {name:?} must fail");

        let out = run(&data, &["drop", name], None)?;
        assert!(!out.status.success(), "drop {name:?} must fail");
    }
    assert!(!tempdir.path().join("escaped").exists());
    assert!(data.join("indexes").join("keep").is_dir());

    let out = run(&data, &["query", "keep", "hi", "--json"], None)?;
    assert!(out.status.success());
    let hits: serde_json::Value = serde_json::from_str(&stdout(&out))?;
    assert_eq!(hits.as_array().map(Vec::len), Some(1));

    let out = run(&data, &["list", "--json"], None)?;
    let list: serde_json::Value = serde_json::from_str(&stdout(&out))?;
    assert_eq!(list.as_array().map(Vec::len), Some(1));

    Ok(())
}
