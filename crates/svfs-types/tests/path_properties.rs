//! Path algebra properties using rstest for parameterization.

use rstest::rstest;
use svfs_types::{normalize, validate_scheme, VirtualPath};

#[rstest]
#[case("")]
#[case("/")]
#[case("a")]
#[case("a/")]
#[case("a//b///c")]
#[case("./a/./b/")]
#[case("a/b/../c")]
#[case("../../x/y/")]
#[case("a/b/..")]
#[case("a/b/.")]
#[case("Assets/Textures/")]
fn normalization_is_idempotent(#[case] raw: &str) {
    let once = normalize(raw);
    assert_eq!(normalize(&once), once, "input: {raw:?}");
}

#[rstest]
#[case("vol://")]
#[case("vol://a")]
#[case("vol://a/b/")]
#[case("local://Assets/Textures/")]
#[case("local://Assets/img.png")]
#[case("rom://maps/../tiles/./t0.bin")]
fn display_round_trips_through_parse(#[case] uri: &str) {
    let path = VirtualPath::parse(uri).unwrap();
    assert_eq!(VirtualPath::parse(&path.to_string()).unwrap(), path);
}

#[rstest]
#[case("vol", "")]
#[case("vol", "a/b/")]
#[case("Assets", "./x/../y.txt")]
#[case("rom", "/leading/slash")]
fn constructed_paths_round_trip(#[case] scheme: &str, #[case] local: &str) {
    validate_scheme(scheme).unwrap();
    let path = VirtualPath::new(scheme, local);
    assert_eq!(VirtualPath::parse(&path.to_string()).unwrap(), path);
    let root = VirtualPath::root(scheme);
    assert_eq!(VirtualPath::parse(&root.to_string()).unwrap(), root);
}

#[rstest]
#[case("")]
#[case("a://b")]
#[case("a/b")]
fn unaddressable_schemes_are_rejected(#[case] scheme: &str) {
    assert!(validate_scheme(scheme).is_err());
    let shown = VirtualPath::new(scheme, "x").to_string();
    assert!(VirtualPath::parse(&shown).is_err(), "{shown}");
}

#[rstest]
#[case("vol://", "a")]
#[case("vol://", "a.txt")]
#[case("vol://docs/", "report.txt")]
#[case("vol://deep/er/still/", "leaf")]
fn combine_then_parent_is_identity(#[case] dir: &str, #[case] name: &str) {
    let dir = VirtualPath::parse(dir).unwrap();
    let child = dir.combine(name).unwrap();
    assert_eq!(child.parent().unwrap(), dir);
    assert!(dir.is_direct_parent_of(&child));
}

#[rstest]
#[case("vol://a/", "vol://a/b")]
#[case("vol://a/", "vol://a/b/c/d")]
#[case("vol://", "vol://x/")]
#[case("vol://a/", "vol://b/c")]
#[case("vol://a/", "vol://a/")]
#[case("vol://a", "vol://a/b")]
#[case("vol://a/", "other://a/b")]
fn direct_parent_implies_parent(#[case] a: &str, #[case] b: &str) {
    let a = VirtualPath::parse(a).unwrap();
    let b = VirtualPath::parse(b).unwrap();
    if a.is_direct_parent_of(&b) {
        assert!(a.is_parent_of(&b));
    }
    assert!(!a.is_parent_of(&a));
    assert!(!b.is_parent_of(&b));
}

#[test]
fn scenario_parse_accessors() {
    let dir = VirtualPath::parse("local://Assets/Textures/").unwrap();
    assert_eq!(dir.scheme(), "local");
    assert_eq!(dir.local_path(), "Assets/Textures/");
    assert!(dir.is_directory());
    assert_eq!(dir.name(), "Textures");

    let file = VirtualPath::parse("local://Assets/img.png").unwrap();
    assert!(!file.is_directory());
    assert_eq!(file.extension(), Some(".png"));
}
