mod common;

use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;

use bytebraise_conf::ConfData;
use bytebraise_layers::{LayerError, LayerRegistry, Resolver};
use common::{write, Fixture};

fn by_name(resolver: &Resolver, names: &[&str], patterns: &str) -> Result<Vec<PathBuf>, LayerError> {
    let names = names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    let mut found = vec![];
    resolver.find_layers_by_name(&names, patterns, |_, dir| found.push(dir.to_path_buf()))?;
    Ok(found)
}

fn search_tree() -> Fixture {
    let fixture = Fixture::new();
    fixture.layer("meta-a", "a", 5);
    fixture.layer("vendor/meta-a", "a", 6);
    fixture.layer("meta-b", "b", 5);
    fixture
}

#[test_log::test]
fn unique_name() {
    let fixture = search_tree();
    let d = ConfData::new();
    let resolver = Resolver::new(&d, vec![]);
    let patterns = format!("{r}/* {r}/*/*", r = fixture.root.display());

    assert_eq!(
        by_name(&resolver, &["b"], &patterns).unwrap(),
        vec![fixture.root.join("meta-b")]
    );
}

#[test]
fn duplicate_name() {
    let fixture = search_tree();
    let d = ConfData::new();
    let resolver = Resolver::new(&d, vec![]);
    let patterns = format!("{r}/* {r}/*/*", r = fixture.root.display());

    let err = by_name(&resolver, &["a"], &patterns).unwrap_err();
    assert_eq!(err.exit_code(), 3);
    match err {
        LayerError::DuplicateLayers { name, paths } => {
            assert_eq!(name, "a");
            assert_eq!(
                paths,
                vec![fixture.root.join("meta-a"), fixture.root.join("vendor/meta-a")]
            );
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn name_not_found() {
    let fixture = search_tree();
    let d = ConfData::new();
    let resolver = Resolver::new(&d, vec![]);
    let patterns = format!("{r}/* {r}/*/*", r = fixture.root.display());

    let err = by_name(&resolver, &["b", "zzz"], &patterns).unwrap_err();
    assert!(matches!(&err, LayerError::LayerNotFound { name, parse_errors } if name == "zzz" && parse_errors.is_empty()));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn name_not_found_with_parse_errors() {
    let fixture = search_tree();
    write(
        &fixture.root.join("meta-broken/conf/layer.conf"),
        "inherit something\n",
    );
    let d = ConfData::new();
    let resolver = Resolver::new(&d, vec![]);

    let err = by_name(&resolver, &["zzz"], &format!("{}/*", fixture.root.display())).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    match err {
        LayerError::LayerNotFound { parse_errors, .. } => {
            assert_eq!(parse_errors.len(), 1);
            assert_eq!(
                parse_errors[0].source,
                fixture.root.join("meta-broken/conf/layer.conf")
            );
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn configured_layer_resolves_duplicate() {
    let fixture = search_tree();
    let configured = fixture.root.join("vendor/meta-a");
    let b = fixture.root.join("meta-b");
    fixture.configure(&[&configured, &b]);

    let registry = LayerRegistry::load(&fixture.build).unwrap();
    let resolver = Resolver::from_registry(&registry);
    let patterns = format!("{r}/* {r}/*/*", r = fixture.root.display());

    assert_eq!(
        by_name(&resolver, &["a", "b"], &patterns).unwrap(),
        vec![configured, b]
    );
}

#[test]
fn layer_with_path() {
    let fixture = search_tree();
    write(&fixture.root.join("meta-b/recipes-x/x/x_1.0.bb"), "");
    write(&fixture.root.join("meta-a/recipes-x/x/x_1.0.bb"), "");
    let d = ConfData::new();
    let resolver = Resolver::new(&d, vec![]);
    let patterns = format!("{r}/* {r}/*/*", r = fixture.root.display());

    let mut found = vec![];
    resolver
        .find_layer_with_path(
            &[String::from("recipes-x/x/x_1.0.bb")],
            &patterns,
            |path, dir| found.push((path.to_string(), dir.to_path_buf())),
        )
        .unwrap();
    assert_eq!(
        found,
        vec![
            (String::from("recipes-x/x/x_1.0.bb"), fixture.root.join("meta-a")),
            (String::from("recipes-x/x/x_1.0.bb"), fixture.root.join("meta-b")),
        ]
    );

    // Paths before the missing one are still reported
    let mut found = vec![];
    let err = resolver
        .find_layer_with_path(
            &[String::from("conf/layer.conf"), String::from("recipes-y")],
            &patterns,
            |_, dir| found.push(dir.to_path_buf()),
        )
        .unwrap_err();
    assert!(matches!(&err, LayerError::PathNotFound(path) if path == "recipes-y"));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(found.len(), 3);
    assert!(found.iter().all(|dir| Path::new(dir).join("conf/layer.conf").exists()));
}
