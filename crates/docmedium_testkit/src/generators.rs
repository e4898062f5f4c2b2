//! Property-based test generators using proptest.

use crate::crash::CommitFault;
use docmedium_core::LockEntry;
use docmedium_storage::Folder;
use proptest::prelude::*;

/// Strategy for document bytes, including empty documents.
pub fn document_bytes_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

/// Strategy for stream names valid inside a package.
pub fn stream_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_.]{0,15}").expect("Invalid regex")
}

/// Strategy for a flat package tree with one to eight streams.
pub fn package_tree_strategy() -> impl Strategy<Value = Folder> {
    prop::collection::btree_map(stream_name_strategy(), document_bytes_strategy(), 1..8).prop_map(
        |streams| {
            let mut root = Folder::new();
            for (name, data) in streams {
                root.put_stream(&name, data);
            }
            root
        },
    )
}

/// Strategy for lock record fields, heavy on characters that need escaping.
pub fn lock_field_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 ,;\\\\:/.]{0,24}").expect("Invalid regex")
}

/// Strategy for complete lock records.
pub fn lock_entry_strategy() -> impl Strategy<Value = LockEntry> {
    (
        lock_field_strategy(),
        lock_field_strategy(),
        lock_field_strategy(),
        lock_field_strategy(),
        lock_field_strategy(),
    )
        .prop_map(|(app_user_name, sys_user_name, host, edit_time, user_url)| LockEntry {
            app_user_name,
            sys_user_name,
            host,
            edit_time,
            user_url,
        })
}

/// Strategy for commit faults that do not succeed normally.
pub fn commit_fault_strategy() -> impl Strategy<Value = CommitFault> {
    prop_oneof![
        Just(CommitFault::Relocate),
        Just(CommitFault::TearAndRelocate),
        Just(CommitFault::Fail),
    ]
}
