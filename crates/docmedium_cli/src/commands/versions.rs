//! Revision listing and extraction.

use super::{check, context, document_url, CommandResult};
use docmedium_core::{
    Config, MediaDescriptor, MediaHandles, Medium, MediumContext, OpenMode, Outcome, RevisionTag,
};
use docmedium_storage::{CommitOutcome, ElementModes, StorageOpenOptions, StorageSource};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Prints the stored revisions of a package document.
pub fn list(path: &Path, answer: Outcome, format: &str) -> CommandResult {
    let tags = load(path, context(Config::default(), answer))?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&tags)?),
        _ => {
            if tags.is_empty() {
                println!("No stored versions");
            }
            for (i, tag) in tags.iter().enumerate() {
                println!(
                    "{:>3}  {}  {}  {}",
                    i + 1,
                    tag.time_stamp.format("%Y-%m-%d %H:%M"),
                    tag.author,
                    tag.comment
                );
            }
        }
    }
    Ok(())
}

/// Reads the revision list.
pub fn load(path: &Path, ctx: MediumContext) -> CommandResult<Vec<RevisionTag>> {
    let url = document_url(path)?;
    let mut medium = Medium::open(ctx, url.as_str(), OpenMode::READ);
    if !medium.is_storage() {
        check(&medium, "opening")?;
        return Err(format!("{} is not a package", path.display()).into());
    }
    Ok(medium.get_version_list(false).to_vec())
}

/// Writes revision `version` of the document into a new package at `output`.
pub fn extract(path: &Path, answer: Outcome, version: i16, output: &Path) -> CommandResult {
    extract_with(path, context(Config::default(), answer), version, output)?;
    println!("✓ Version {version} written to {}", output.display());
    Ok(())
}

/// [`extract`] with an explicit context.
pub fn extract_with(
    path: &Path,
    ctx: MediumContext,
    version: i16,
    output: &Path,
) -> CommandResult {
    if version == 0 {
        return Err("version 0 is the live document".into());
    }
    let descriptor = MediaDescriptor {
        file_name: Some(document_url(path)?.to_string()),
        read_only: Some(true),
        version: Some(version),
        ..MediaDescriptor::default()
    };
    let factory = Arc::clone(&ctx.storages);
    let mut medium = Medium::from_descriptor(ctx, descriptor, MediaHandles::default())?;

    let Some(revision) = medium.get_storage(false) else {
        check(&medium, "opening the version")?;
        return Err(format!("{} has no version {version}", path.display()).into());
    };
    let mut target = factory.create(
        StorageSource::Path(output),
        ElementModes::READWRITE.truncating(),
        &StorageOpenOptions::default(),
    )?;
    revision.copy_to(target.as_mut())?;
    match target.commit(None)? {
        CommitOutcome::Committed => {
            info!(version, output = %output.display(), "version extracted");
            Ok(())
        }
        CommitOutcome::RelocatedTo(relocated) => {
            Err(format!("version written to {} instead", relocated.display()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmedium_storage::{Folder, PackageStorage};
    use tempfile::tempdir;

    fn package(content: &[u8]) -> Vec<u8> {
        let mut root = Folder::new();
        root.put_stream("content.xml", content.to_vec());
        PackageStorage::encode_folder(&root).unwrap()
    }

    fn document_with_revision(dir: &Path) -> std::path::PathBuf {
        let doc = dir.join("report.dmpk");
        let tag = RevisionTag {
            identifier: "Version1".into(),
            ..RevisionTag::new("first draft", "Ann")
        };
        let mut root = Folder::new();
        root.put_stream("content.xml", b"<current/>".to_vec());
        root.put_stream("VersionList.json", serde_json::to_vec(&[tag]).unwrap());
        root.folder_mut("Versions")
            .unwrap()
            .put_stream("Version1", package(b"<old/>"));
        std::fs::write(&doc, PackageStorage::encode_folder(&root).unwrap()).unwrap();
        doc
    }

    fn ctx(dir: &Path) -> MediumContext {
        context(Config::new().temp_dir(dir), Outcome::Abort)
    }

    #[test]
    fn lists_stored_revisions() {
        let dir = tempdir().unwrap();
        let doc = document_with_revision(dir.path());
        let tags = load(&doc, ctx(dir.path())).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].author, "Ann");
        assert_eq!(tags[0].comment, "first draft");
    }

    #[test]
    fn extracts_a_revision_as_package() {
        let dir = tempdir().unwrap();
        let doc = document_with_revision(dir.path());
        let out = dir.path().join("old.dmpk");

        extract_with(&doc, ctx(dir.path()), 1, &out).unwrap();

        let root = PackageStorage::decode_folder(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!(root.stream("content.xml"), Some(&b"<old/>"[..]));
    }

    #[test]
    fn unknown_revision_is_an_error() {
        let dir = tempdir().unwrap();
        let doc = document_with_revision(dir.path());
        let out = dir.path().join("old.dmpk");
        assert!(extract_with(&doc, ctx(dir.path()), 3, &out).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn plain_file_has_no_versions() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("notes.txt");
        std::fs::write(&doc, b"plain").unwrap();
        assert!(load(&doc, ctx(dir.path())).is_err());
    }
}
