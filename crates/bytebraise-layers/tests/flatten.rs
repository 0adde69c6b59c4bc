mod common;

use std::fs;
use std::os::unix::fs::symlink;
use std::path::PathBuf;

use pretty_assertions::assert_eq;

use bytebraise_layers::{FlattenReport, Flattener, LayerError, LayerRegistry, RecipeCollection};
use common::{read, write, Fixture};

struct Flattened {
    fixture: Fixture,
    out: PathBuf,
    result: Result<FlattenReport, LayerError>,
}

fn flatten(fixture: Fixture, names: &[&str]) -> Flattened {
    let registry = LayerRegistry::load(&fixture.build).unwrap();
    let collection = RecipeCollection::collect(&registry).unwrap();
    let out = fixture.root.join("out");
    let names = names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    let result = Flattener::new(&registry, &collection).flatten(&names, &out);

    Flattened {
        fixture,
        out,
        result,
    }
}

/// Two layers overriding each other: `low` (priority 5) and `high` (priority 10).
fn two_layers() -> Fixture {
    let fixture = Fixture::new();
    let low = fixture.layer("meta-low", "low", 5);
    let high = fixture.layer("meta-high", "high", 10);

    write(&low.join("recipes-a/foo/foo_1.0.bb"), "SUMMARY = \"low foo\"\n");
    write(&low.join("recipes-a/foo/files/fix.patch"), "low patch\n");
    write(&low.join("recipes-b/bar/bar_1.0.bb"), "SUMMARY = \"bar\"\n");
    write(&low.join(".git/HEAD"), "ref: refs/heads/main\n");

    write(&high.join("recipes-a/foo/foo_1.0.bb"), "SUMMARY = \"high foo\"\n");
    write(&high.join("recipes-a/foo/files/fix.patch"), "high patch\n");
    write(&high.join("recipes-b/bar/bar_1.0.bbappend"), "EXTRA = \"1\"\n");
    write(&high.join("extra/baz_1.0.bb"), "SUMMARY = \"baz\"\n");

    // BBLAYERS order deliberately differs from priority order
    fixture.configure(&[&high, &low]);
    fixture
}

#[test_log::test]
fn higher_priority_layer_wins() {
    let flattened = flatten(two_layers(), &[]);
    let report = flattened.result.unwrap();
    let out = &flattened.out;
    let low = flattened.fixture.root.join("meta-low");

    assert_eq!(read(&out.join("recipes-a/foo/foo_1.0.bb")), "SUMMARY = \"high foo\"\n");
    assert_eq!(read(&out.join("recipes-a/foo/files/fix.patch")), "high patch\n");
    assert_eq!(
        read(&out.join("recipes-b/bar/bar_1.0.bb")),
        "SUMMARY = \"bar\"\n\n##### bbappended from high #####\nEXTRA = \"1\"\n"
    );
    assert_eq!(
        read(&out.join("conf/layer.conf")),
        read(&low.join("conf/layer.conf"))
    );

    assert!(!out.join(".git").exists());
    assert!(!out.join("recipes-b/bar/bar_1.0.bbappend").exists());

    assert_eq!(report.skipped, vec![low.join("recipes-a/foo/foo_1.0.bb")]);
    assert_eq!(report.overwritten, vec![out.join("recipes-a/foo/files/fix.patch")]);
    assert!(report.orphaned_appends.is_empty());
    assert_eq!(report.unmatched, vec![out.join("extra/baz_1.0.bb")]);
}

#[test]
fn non_empty_output_dir() {
    let fixture = two_layers();
    let out = fixture.root.join("out");
    write(&out.join("existing.txt"), "keep\n");

    let flattened = flatten(fixture, &[]);
    let err = flattened.result.unwrap_err();
    assert!(matches!(err, LayerError::InvalidArgument(_)));
    assert_eq!(err.exit_code(), 1);

    let entries = fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect::<Vec<_>>();
    assert_eq!(entries, vec!["existing.txt"]);
}

#[test]
fn single_layer_is_rejected() {
    let flattened = flatten(two_layers(), &["low"]);
    assert!(matches!(flattened.result, Err(LayerError::InvalidArgument(_))));
    assert!(!flattened.out.exists());
}

#[test]
fn unknown_layer_name() {
    let flattened = flatten(two_layers(), &["low", "nope"]);
    match flattened.result {
        Err(LayerError::LayerNotFound { name, parse_errors }) => {
            assert_eq!(name, "nope");
            assert!(parse_errors.is_empty());
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test_log::test]
fn orphaned_appends_are_all_kept() {
    let fixture = Fixture::new();
    let low = fixture.layer("meta-low", "low", 5);
    let high = fixture.layer("meta-high", "high", 10);
    let other = fixture.layer("meta-other", "other", 7);

    write(&low.join("recipes-a/foo/foo_1.0.bb"), "SUMMARY = \"foo\"\n");
    write(&high.join("recipes-a/foo/foo_1.0.bbappend"), "A = \"high\"\n");
    write(&other.join("recipes-a/foo/foo_1.0.bbappend"), "A = \"other\"\n");
    write(&other.join("recipes-c/qux/qux_2.0.bb"), "SUMMARY = \"qux\"\n");
    fixture.configure(&[&low, &high, &other]);

    let flattened = flatten(fixture, &["high", "other"]);
    let report = flattened.result.unwrap();
    let out = &flattened.out;

    assert!(!out.join("recipes-a/foo/foo_1.0.bb").exists());
    assert_eq!(
        read(&out.join("recipes-a/foo/foo_1.0.bbappend")),
        "A = \"high\"\n\n##### bbappended from other #####\nA = \"other\"\n"
    );
    assert_eq!(report.orphaned_appends.len(), 2);
    assert!(report.applied_appends.is_empty());

    // meta-other has the lowest priority of the selection, so its layer.conf is kept
    assert_eq!(
        read(&out.join("conf/layer.conf")),
        read(&flattened.fixture.root.join("meta-other/conf/layer.conf"))
    );
}

#[test_log::test]
fn symlinks_are_not_followed() {
    let fixture = Fixture::new();
    let low = fixture.layer("meta-low", "low", 5);
    let high = fixture.layer("meta-high", "high", 10);

    write(&low.join("common/files/fix.patch"), "shared patch\n");
    write(&low.join("zzz/later.txt"), "later\n");
    fs::create_dir_all(low.join("recipes-a/foo")).unwrap();
    symlink("../../common/files", low.join("recipes-a/foo/files")).unwrap();
    symlink("nowhere", low.join("recipes-a/foo/broken")).unwrap();
    symlink("../../zzz/later.txt", low.join("recipes-a/foo/later.txt")).unwrap();
    write(&high.join("recipes-b/bar/bar_1.0.bb"), "SUMMARY = \"bar\"\n");
    fixture.configure(&[&low, &high]);

    let flattened = flatten(fixture, &[]);
    let report = flattened.result.unwrap();
    let out = &flattened.out;

    assert!(report.failed.is_empty());
    assert_eq!(read(&out.join("zzz/later.txt")), "later\n");
    assert_eq!(read(&out.join("common/files/fix.patch")), "shared patch\n");
    assert!(fs::symlink_metadata(out.join("recipes-a/foo/files")).is_err());
    assert_eq!(
        fs::read_link(out.join("recipes-a/foo/broken")).unwrap(),
        PathBuf::from("nowhere")
    );
    assert_eq!(
        fs::read_link(out.join("recipes-a/foo/later.txt")).unwrap(),
        PathBuf::from("../../zzz/later.txt")
    );
    assert_eq!(read(&out.join("recipes-a/foo/later.txt")), "later\n");
    assert!(out.join("recipes-b/bar/bar_1.0.bb").exists());
}

#[test_log::test]
fn copy_failure_is_not_fatal() {
    let fixture = Fixture::new();
    let low = fixture.layer("meta-low", "low", 5);
    let high = fixture.layer("meta-high", "high", 10);

    write(&low.join("clash/inner.txt"), "inner\n");
    write(&high.join("clash"), "a file where low has a directory\n");
    write(&high.join("zzz/later.txt"), "later\n");
    fixture.configure(&[&low, &high]);

    let flattened = flatten(fixture, &[]);
    let report = flattened.result.unwrap();
    let out = &flattened.out;
    let high = flattened.fixture.root.join("meta-high");

    assert_eq!(report.failed, vec![high.join("clash")]);
    assert_eq!(read(&out.join("clash/inner.txt")), "inner\n");
    assert_eq!(read(&out.join("zzz/later.txt")), "later\n");
}
