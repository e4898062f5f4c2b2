//! Storing revisions and reopening them.

use docmedium_core::{MediaDescriptor, RevisionTag};
use docmedium_storage::{Folder, PackageStorage};
use docmedium_testkit::prelude::*;

const DOC: &str = "report.dmpk";

fn revision(content: &[u8]) -> Vec<u8> {
    let mut root = Folder::new();
    root.put_stream("content.xml", content.to_vec());
    PackageStorage::encode_folder(&root).unwrap()
}

/// Stores `contents` as consecutive revisions of `DOC`.
fn store_revisions(ws: &TestWorkspace, contents: &[&[u8]]) {
    let mut medium = ws.open(DOC, OpenMode::READWRITE);
    for (i, content) in contents.iter().enumerate() {
        let number = medium
            .add_version(RevisionTag::new(format!("rev {i}"), "Tester"))
            .expect("package document takes revisions");
        let path = medium.versions()[number as usize - 1].stream_path();
        assert_eq!(path, format!("Versions/Version{number}"));

        let storage = medium.get_storage(false).unwrap();
        storage
            .root_mut()
            .unwrap()
            .folder_mut("Versions")
            .unwrap()
            .put_stream(&format!("Version{number}"), revision(content));
    }
    assert!(medium.save_version_list());
    assert!(medium.commit());
}

#[test]
fn revisions_are_numbered_from_one() {
    let ws = TestWorkspace::new();
    ws.write_package(DOC, &[("content.xml", b"<current/>")]);
    store_revisions(&ws, &[b"<first/>", b"<second/>"]);

    let mut medium = ws.open(DOC, OpenMode::READ);
    let identifiers: Vec<String> = medium
        .get_version_list(false)
        .iter()
        .map(|t| t.identifier.clone())
        .collect();
    assert_eq!(identifiers, ["Version1", "Version2"]);
    assert_eq!(medium.versions()[1].comment, "rev 1");
}

#[test]
fn latest_revision_opens_read_only() {
    let ws = TestWorkspace::new();
    ws.write_package(DOC, &[("content.xml", b"<current/>")]);
    store_revisions(&ws, &[b"<first/>", b"<second/>"]);

    let descriptor = MediaDescriptor {
        version: Some(-1),
        ..MediaDescriptor::default()
    };
    let mut medium = ws.open_descriptor(DOC, descriptor);
    let storage = medium.get_storage(false).expect("revision opens as a storage");
    assert_eq!(storage.read_stream("content.xml").unwrap(), b"<second/>");
    assert!(medium.is_read_only());
    assert_eq!(medium.error_code(), ErrorCode::None);
    drop(medium);

    assert!(ws.temp_files().is_empty());
    assert_eq!(ws.read_package_stream(DOC, "content.xml"), b"<current/>");
}

#[test]
fn first_revision_by_number() {
    let ws = TestWorkspace::new();
    ws.write_package(DOC, &[("content.xml", b"<current/>")]);
    store_revisions(&ws, &[b"<first/>", b"<second/>"]);

    let descriptor = MediaDescriptor {
        version: Some(1),
        ..MediaDescriptor::default()
    };
    let mut medium = ws.open_descriptor(DOC, descriptor);
    let storage = medium.get_storage(false).unwrap();
    assert_eq!(storage.read_stream("content.xml").unwrap(), b"<first/>");
}

#[test]
fn missing_revision_is_an_error() {
    let ws = TestWorkspace::new();
    ws.write_package(DOC, &[("content.xml", b"<current/>")]);
    store_revisions(&ws, &[b"<only/>"]);

    let descriptor = MediaDescriptor {
        version: Some(5),
        ..MediaDescriptor::default()
    };
    let mut medium = ws.open_descriptor(DOC, descriptor);
    assert!(medium.get_storage(false).is_none());
    assert_eq!(medium.error_code(), ErrorCode::General);
}
