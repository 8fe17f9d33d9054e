//! End-to-end behavior through the dispatcher, against real directories.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use svfs_core::{
    ChangeEvent, ChangeKind, EntryKind, PhysicalOptions, PhysicalVolume, VfsError, VfsEvent,
    VirtualFileSystem, VirtualPath, Volume,
};
use tokio::sync::mpsc::UnboundedReceiver;

fn p(uri: &str) -> VirtualPath {
    VirtualPath::parse(uri).unwrap()
}

async fn physical(root: &Path, watch: bool) -> Arc<PhysicalVolume> {
    let options = PhysicalOptions {
        watch,
        ..Default::default()
    };
    Arc::new(PhysicalVolume::open("vol", root, options).await.unwrap())
}

async fn mounted(root: &Path, watch: bool) -> (VirtualFileSystem, Arc<PhysicalVolume>) {
    let volume = physical(root, watch).await;
    let vfs = VirtualFileSystem::new();
    vfs.mount_volume(Volume::from_backend(volume.clone()), "physical")
        .unwrap();
    (vfs, volume)
}

/// Wait for the first change matching `kind` and `path`.
async fn expect_change(
    rx: &mut UnboundedReceiver<VfsEvent>,
    kind: ChangeKind,
    path: &VirtualPath,
) -> ChangeEvent {
    let wait = async {
        while let Some(event) = rx.recv().await {
            if let VfsEvent::Changed(change) = event
                && change.kind == kind
                && &change.path == path
            {
                return change;
            }
        }
        panic!("event channel closed");
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .unwrap_or_else(|_| panic!("no {kind:?} event for {path}"))
}

#[tokio::test]
async fn deleting_watched_directory_reports_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("assets")).unwrap();
    std::fs::write(dir.path().join("assets/a.txt"), b"a").unwrap();
    std::fs::create_dir(dir.path().join("assets/sprites")).unwrap();

    let (vfs, volume) = mounted(dir.path(), true).await;
    assert!(volume.is_watching());

    let files: Vec<VirtualPath> = vfs
        .files(&p("vol://assets/"))
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.path().clone())
        .collect();
    assert_eq!(files, vec![p("vol://assets/a.txt")]);
    let directories: Vec<VirtualPath> = vfs
        .directories(&p("vol://assets/"))
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.path().clone())
        .collect();
    assert_eq!(directories, vec![p("vol://assets/sprites/")]);

    let (_sub, mut rx) = vfs.channel();

    assert!(vfs.delete_entry(&p("vol://assets/")).await.unwrap());

    let change = expect_change(&mut rx, ChangeKind::Deleted, &p("vol://assets/")).await;
    assert_eq!(change.entry, EntryKind::Directory);
    assert_eq!(change.path.to_string(), "vol://assets/");
    assert_eq!(volume.cached_kind(&p("vol://assets/")), None);
    assert_eq!(volume.cached_kind(&p("vol://assets/a.txt")), None);
    assert_eq!(volume.cached_kind(&p("vol://assets/sprites/")), None);
}

#[tokio::test]
async fn external_create_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (vfs, volume) = mounted(dir.path(), true).await;
    let (_sub, mut rx) = vfs.channel();

    std::fs::create_dir(dir.path().join("levels")).unwrap();

    let change = expect_change(&mut rx, ChangeKind::Created, &p("vol://levels/")).await;
    assert_eq!(change.entry, EntryKind::Directory);
    assert_eq!(volume.cached_kind(&p("vol://levels/")), Some(EntryKind::Directory));
}

#[tokio::test]
async fn second_mount_of_scheme_is_rejected() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let (vfs, volume) = mounted(first.path(), false).await;

    let other = physical(second.path(), false).await;
    let err = vfs
        .mount_volume(Volume::from_backend(other), "physical")
        .unwrap_err();
    assert!(matches!(err, VfsError::AlreadyMounted(_)));

    let current = vfs.get_volume("vol").unwrap();
    assert_eq!(current.info().root, volume.root().display().to_string());
}

#[tokio::test]
async fn rename_collision_leaves_source() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("docs")).unwrap();
    std::fs::write(dir.path().join("docs/report.txt"), b"draft").unwrap();
    std::fs::write(dir.path().join("docs/final.txt"), b"done").unwrap();
    let (vfs, _volume) = mounted(dir.path(), false).await;

    let err = vfs
        .rename_entry(&p("vol://docs/report.txt"), "final.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::AlreadyExists(_)));
    assert_eq!(
        vfs.read_to_string(&p("vol://docs/report.txt")).await.unwrap(),
        "draft"
    );
    assert_eq!(
        vfs.read_to_string(&p("vol://docs/final.txt")).await.unwrap(),
        "done"
    );
}

#[tokio::test]
async fn rename_rejects_bad_names_before_touching_storage() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
    let (vfs, _volume) = mounted(dir.path(), false).await;

    for bad in ["", "  ", "x/y", ".."] {
        let err = vfs.rename_entry(&p("vol://a.txt"), bad).await.unwrap_err();
        assert!(matches!(err, VfsError::InvalidName { .. }), "{bad:?}: {err}");
    }
    assert!(dir.path().join("a.txt").exists());
}

#[tokio::test]
async fn create_twice_and_delete_absent() {
    let dir = tempfile::tempdir().unwrap();
    let (vfs, _volume) = mounted(dir.path(), false).await;
    let path = p("vol://new/notes.txt");

    vfs.create_file(&path, false).await.unwrap();
    assert!(matches!(
        vfs.create_file(&path, false).await,
        Err(VfsError::AlreadyExists(_))
    ));
    vfs.create_file(&path, true).await.unwrap();

    let folder = p("vol://new/");
    assert!(matches!(
        vfs.create_directory(&folder, false).await,
        Err(VfsError::AlreadyExists(_))
    ));
    vfs.create_directory(&folder, true).await.unwrap();
    assert!(vfs.exists(&path).await.unwrap());

    assert!(!vfs.delete_entry(&p("vol://missing.txt")).await.unwrap());
}

#[tokio::test]
async fn duplicate_creates_identical_copy() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("img/icons")).unwrap();
    std::fs::write(dir.path().join("img/hero.png"), b"png-bytes").unwrap();
    std::fs::write(dir.path().join("img/icons/a.png"), b"a").unwrap();
    let (vfs, _volume) = mounted(dir.path(), false).await;

    let copy = vfs.duplicate_entry(&p("vol://img/hero.png")).await.unwrap();
    assert_eq!(copy.path(), &p("vol://img/hero (1).png"));
    assert_eq!(copy.read_bytes().await.unwrap(), b"png-bytes");
    assert!(vfs.exists(&p("vol://img/hero.png")).await.unwrap());

    let copy = vfs.duplicate_entry(&p("vol://img/")).await.unwrap();
    let mut original: Vec<String> = vfs
        .entries_recursive(&p("vol://img/"))
        .unwrap()
        .map_ok(|entry| entry.path().local_path().trim_start_matches("img/").to_string())
        .try_collect()
        .await
        .unwrap();
    let mut copied: Vec<String> = copy
        .volume()
        .unwrap()
        .entries_recursive(copy.path())
        .unwrap()
        .map_ok(|entry| {
            entry
                .path()
                .local_path()
                .trim_start_matches("img (1)/")
                .to_string()
        })
        .try_collect()
        .await
        .unwrap();
    original.sort();
    copied.sort();
    assert_eq!(original, copied);
}

#[tokio::test]
async fn files_recursive_through_dispatcher() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sub1/deep")).unwrap();
    std::fs::create_dir(dir.path().join("sub2")).unwrap();
    for file in ["a.txt", "sub1/x.txt", "sub1/deep/y.txt", "sub2/z.txt"] {
        std::fs::write(dir.path().join(file), b"").unwrap();
    }
    let (vfs, _volume) = mounted(dir.path(), false).await;

    let files: Vec<String> = vfs
        .files_recursive(&VirtualPath::root("vol"))
        .unwrap()
        .map_ok(|entry| entry.to_string())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        files,
        vec![
            "vol://sub1/deep/y.txt",
            "vol://sub1/x.txt",
            "vol://sub2/z.txt",
            "vol://a.txt",
        ]
    );
}

#[tokio::test]
async fn structural_misuse_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("docs")).unwrap();
    let (vfs, _volume) = mounted(dir.path(), false).await;

    assert!(matches!(
        vfs.read_bytes(&p("vol://docs/")).await,
        Err(VfsError::TypeMismatch { .. })
    ));
    assert!(matches!(
        vfs.write_bytes(&p("vol://docs/missing.txt"), b"x").await,
        Err(VfsError::NotFound(_))
    ));
    assert!(matches!(
        vfs.move_entry(&p("vol://docs/"), &p("vol://docs/")).await,
        Err(VfsError::InvalidOperation(_))
    ));
}
