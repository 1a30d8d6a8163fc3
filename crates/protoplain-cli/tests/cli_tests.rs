use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn protoplain(sidecar: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_protoplain"))
        .arg("--crf")
        .arg(sidecar)
        .args(args)
        .env_remove("PROTOPLAIN_LOG")
        .env_remove("PROTOPLAIN_PLAIN_SUFFIX")
        .env("NO_COLOR", "1")
        .output()
        .expect("spawn protoplain")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn meta_decode_and_encode() {
    let dir = tempdir().unwrap();
    let sidecar = dir.path().join("plain.crf.json");

    let out = protoplain(&sidecar, &["meta", "decode", "0x3005"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out).trim(), "0x3005 origin=embed depth=2 path_index=5");

    let out = protoplain(
        &sidecar,
        &["meta", "encode", "--origin", "embed", "--depth", "2", "--index", "5"],
    );
    assert!(out.status.success());
    assert_eq!(stdout(&out).trim(), "0x3005");
}

#[test]
fn record_then_collide_across_processes() {
    let dir = tempdir().unwrap();
    let sidecar = dir.path().join("gen").join("plain.crf.json");

    let out = protoplain(&sidecar, &["crf", "record", "email", "crm/contact.proto"]);
    assert!(out.status.success(), "{out:?}");
    assert!(sidecar.exists());

    let out = protoplain(&sidecar, &["crf", "check", "email"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("crm/contact.proto"));

    let before = fs::read_to_string(&sidecar).unwrap();
    let out = protoplain(&sidecar, &["crf", "record", "email", "crm/lead.proto"]);
    assert!(!out.status.success());
    assert_eq!(fs::read_to_string(&sidecar).unwrap(), before);

    let out = protoplain(&sidecar, &["crf", "show"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("email crm/contact.proto"));
}

#[test]
fn layout_render_tracks_names_when_asked() {
    let dir = tempdir().unwrap();
    let sidecar = dir.path().join("plain.crf.json");
    let manifest = dir.path().join("person.json");
    fs::write(
        &manifest,
        r#"{"type_name":"people.Person","fields":[
            {"json_name":"name","origin":"direct","number":1,"source":"person.proto"},
            {"json_name":"street","origin":"embed","path":[3],"number":1,"source":"address.proto"}
        ]}"#,
    )
    .unwrap();
    let manifest = manifest.to_str().unwrap();

    let out = protoplain(&sidecar, &["layout", "render", manifest]);
    assert!(out.status.success(), "{out:?}");
    assert!(stdout(&out).contains("pub static PERSON_PLAIN_INFO"));
    assert!(!sidecar.exists());

    let out = protoplain(&sidecar, &["layout", "render", "--track", manifest]);
    assert!(out.status.success(), "{out:?}");
    let ledger = fs::read_to_string(&sidecar).unwrap();
    assert!(ledger.contains("people.Person.street"));

    // Same manifest again is idempotent.
    let out = protoplain(&sidecar, &["layout", "render", "--track", manifest]);
    assert!(out.status.success(), "{out:?}");
    assert_eq!(fs::read_to_string(&sidecar).unwrap(), ledger);
}

#[test]
fn unattributed_manifest_renders_twice_with_tracking() {
    let dir = tempdir().unwrap();
    let sidecar = dir.path().join("plain.crf.json");
    let manifest = dir.path().join("order.json");
    fs::write(
        &manifest,
        r#"{"type_name":"shop.Order","fields":[
            {"json_name":"id","origin":"direct","number":1,"kind":"uint64"},
            {"json_name":"tags","origin":"direct","number":2,"repeated":true}
        ]}"#,
    )
    .unwrap();
    let manifest = manifest.to_str().unwrap();

    let out = protoplain(&sidecar, &["layout", "render", "--track", manifest]);
    assert!(out.status.success(), "{out:?}");
    let rendered = stdout(&out);
    assert!(rendered.contains("Leaf::new(1, ::protoplain_runtime::ScalarKind::Uint64)"));
    assert!(rendered.contains("Leaf::repeated(2, ::protoplain_runtime::ScalarKind::String)"));
    let ledger = fs::read_to_string(&sidecar).unwrap();

    let out = protoplain(&sidecar, &["layout", "render", "--track", manifest]);
    assert!(out.status.success(), "{out:?}");
    assert_eq!(fs::read_to_string(&sidecar).unwrap(), ledger);
}
