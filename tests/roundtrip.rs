use apgbuild::archive::pack_directory;
use apgbuild::checksum::{generate_manifest, verify_manifest};
use apgbuild::compress::CompressionAlgo;
use apgbuild::config::ExtractLimits;
use apgbuild::extract::{inspect_entries, list_entries, unpack};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn build_tree(root: &Path) {
    fs::create_dir_all(root.join("data/usr/bin")).unwrap();
    fs::create_dir_all(root.join("data/etc/empty.d")).unwrap();
    fs::write(root.join("metadata.json"), br#"{"name":"rt","version":"0.1"}"#).unwrap();
    fs::write(root.join("data/usr/bin/rt"), b"\x7fELF fake binary").unwrap();
    fs::write(root.join("data/etc/rt.conf"), b"key=value\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::{symlink, PermissionsExt};
        let set_mode = |rel: &str, mode: u32| {
            fs::set_permissions(root.join(rel), fs::Permissions::from_mode(mode)).unwrap();
        };
        set_mode("data/usr/bin/rt", 0o755);
        set_mode("data/etc/rt.conf", 0o600);
        symlink("rt", root.join("data/usr/bin/rt-alias")).unwrap();
    }
}

#[test]
fn pack_then_unpack_reproduces_the_tree() {
    let work = tempdir().unwrap();
    let source = work.path().join("rt");
    build_tree(&source);
    let package = work.path().join("rt.apg");

    let stats = pack_directory(&source, &package, CompressionAlgo::default()).unwrap();
    assert_eq!(stats.files_added, 3);

    let dest = work.path().join("out");
    let report = unpack(&package, &dest, &ExtractLimits::default()).unwrap();
    assert!(report.skipped.is_empty(), "{:?}", report.skipped);

    for rel in ["metadata.json", "data/usr/bin/rt", "data/etc/rt.conf"] {
        assert_eq!(fs::read(source.join(rel)).unwrap(), fs::read(dest.join(rel)).unwrap(), "{rel}");
    }
    assert!(dest.join("data/etc/empty.d").is_dir());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = |p: &str| fs::metadata(dest.join(p)).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode("data/usr/bin/rt"), 0o755);
        assert_eq!(mode("data/etc/rt.conf"), 0o600);
        let link = fs::read_link(dest.join("data/usr/bin/rt-alias")).unwrap();
        assert_eq!(link, Path::new("rt"));
    }
}

#[test]
fn listing_matches_what_extraction_materialises() {
    let work = tempdir().unwrap();
    let source = work.path().join("rt");
    build_tree(&source);
    let package = work.path().join("rt.apg");
    pack_directory(&source, &package, CompressionAlgo::default()).unwrap();

    let names = list_entries(&package).unwrap();
    let entries = inspect_entries(&package).unwrap();
    assert_eq!(names.len(), entries.len());

    let dest = work.path().join("out");
    unpack(&package, &dest, &ExtractLimits::default()).unwrap();
    for name in &names {
        let path = dest.join(name.trim_end_matches('/'));
        assert!(fs::symlink_metadata(&path).is_ok(), "{name} was not extracted");
    }
}

#[test]
fn manifest_is_stable_and_survives_packaging() {
    let work = tempdir().unwrap();
    let source = work.path().join("rt");
    build_tree(&source);
    let data = source.join("data");
    let manifest = source.join("crc32sums");

    let first = generate_manifest(&data, &manifest).unwrap();
    let text = fs::read_to_string(&manifest).unwrap();
    let second = generate_manifest(&data, &manifest).unwrap();
    assert_eq!(first, second);
    assert_eq!(text, fs::read_to_string(&manifest).unwrap());

    let package = work.path().join("rt.apg");
    pack_directory(&source, &package, CompressionAlgo::Store).unwrap();
    let dest = work.path().join("out");
    unpack(&package, &dest, &ExtractLimits::default()).unwrap();

    let report = verify_manifest(&dest.join("crc32sums"), &dest.join("data")).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.passed.len(), first.len());
}

#[cfg(unix)]
#[test]
fn directory_modes_survive_including_read_only_parents() {
    use std::os::unix::fs::PermissionsExt;

    let work = tempdir().unwrap();
    let source = work.path().join("modes");
    fs::create_dir_all(source.join("private/inner")).unwrap();
    fs::create_dir_all(source.join("sealed")).unwrap();
    fs::write(source.join("sealed/child.txt"), b"inside a read-only dir").unwrap();
    fs::set_permissions(source.join("private"), fs::Permissions::from_mode(0o750)).unwrap();
    fs::set_permissions(source.join("sealed"), fs::Permissions::from_mode(0o555)).unwrap();

    let package = work.path().join("modes.apg");
    pack_directory(&source, &package, CompressionAlgo::default()).unwrap();
    let dest = work.path().join("out");
    let report = unpack(&package, &dest, &ExtractLimits::default()).unwrap();
    assert!(report.skipped.is_empty(), "{:?}", report.skipped);

    let mode = |p: &str| fs::metadata(dest.join(p)).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode("private"), 0o750);
    assert_eq!(mode("sealed"), 0o555);
    assert_eq!(fs::read(dest.join("sealed/child.txt")).unwrap(), b"inside a read-only dir");

    for root in [&source, &dest] {
        fs::set_permissions(root.join("sealed"), fs::Permissions::from_mode(0o755)).unwrap();
    }
}
