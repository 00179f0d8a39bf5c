use shelf_core::storage::models::*;
use shelf_core::storage::Database;
use shelf_core::Error;

fn meta() -> EntryMeta {
    EntryMeta::Timestamps {
        created: Some(1_700_000_000),
        modified: Some(1_700_000_100),
    }
}

fn make_entry(id: &str, entry_type: EntryType, path: &str, parent: Option<&str>) -> Entry {
    Entry {
        id: id.to_string(),
        entry_type,
        path: path.to_string(),
        size: match entry_type {
            EntryType::File => Some(10),
            _ => None,
        },
        mime_type: None,
        comment: None,
        tags: Vec::new(),
        meta: meta(),
        parent_id: parent.map(str::to_string),
        is_phantom_symlink: false,
    }
}

/// /srv (root) ─ docs ─ a.txt, b.md ; /srv/photo.png
fn seed(db: &Database) {
    db.create_entry(&make_entry("root", EntryType::Folder, "/srv", None)).unwrap();
    db.create_entry(&make_entry("docs", EntryType::Folder, "/srv/docs", Some("root"))).unwrap();
    db.create_entry(&make_entry("a", EntryType::File, "/srv/docs/a.txt", Some("docs"))).unwrap();
    db.create_entry(&make_entry("b", EntryType::File, "/srv/docs/b.md", Some("docs"))).unwrap();
    let mut photo = make_entry("p", EntryType::File, "/srv/photo.png", Some("root"));
    photo.mime_type = Some("image/png".into());
    photo.tags = vec!["image".into(), "holiday".into()];
    db.create_entry(&photo).unwrap();
}

#[test]
fn test_create_and_lookup() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);

    let by_id = db.get_entry_by_id("p").unwrap().unwrap();
    assert_eq!(by_id.path, "/srv/photo.png");
    assert_eq!(by_id.tags, vec!["image", "holiday"]);
    assert_eq!(by_id.meta, meta());

    let by_path = db.get_entry_by_path("/srv/docs").unwrap().unwrap();
    assert_eq!(by_path.id, "docs");
    assert!(db.get_entry_by_id("nope").unwrap().is_none());
    assert_eq!(db.count_entries().unwrap(), 5);
}

#[test]
fn test_validation_does_not_mutate() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);

    let relative = make_entry("r", EntryType::File, "relative/x.txt", Some("root"));
    assert!(matches!(db.create_entry(&relative), Err(Error::RelativePath(_))));

    let mut huge = make_entry("h", EntryType::File, "/srv/huge.bin", Some("root"));
    huge.size = Some(u64::MAX);
    assert!(matches!(db.create_entry(&huge), Err(Error::InvalidSize { .. })));

    let orphan = make_entry("o", EntryType::File, "/srv/x/orphan.txt", Some("ghost"));
    assert!(matches!(db.create_entry(&orphan), Err(Error::ParentNotFound { .. })));

    let dup = make_entry("other-id", EntryType::File, "/srv/docs/a.txt", Some("docs"));
    assert!(matches!(db.create_entry(&dup), Err(Error::DuplicatePath(_))));

    assert_eq!(db.count_entries().unwrap(), 5);
}

#[test]
fn test_update_replaces_and_requires_existing_row() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);

    let mut a = db.get_entry_by_id("a").unwrap().unwrap();
    a.size = Some(99);
    a.mime_type = Some("text/plain".into());
    db.update_entry(&a).unwrap();
    assert_eq!(db.get_entry_by_id("a").unwrap().unwrap().size, Some(99));

    let ghost = make_entry("ghost", EntryType::File, "/srv/ghost.txt", Some("root"));
    assert!(matches!(db.update_entry(&ghost), Err(Error::NotFound(_))));
}

#[test]
fn test_children_and_descendants() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);

    let children = db.get_children("root", None).unwrap();
    let paths: Vec<&str> = children.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/srv/docs", "/srv/photo.png"]);

    let folders = db.get_children("root", Some(EntryType::Folder)).unwrap();
    assert_eq!(folders.len(), 1);

    let descendants = db.get_descendants("root").unwrap();
    assert_eq!(descendants.len(), 4);
    assert!(descendants.iter().all(|e| e.id != "root"));
}

#[test]
fn test_delete_cascades_to_descendants_and_passwords() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);
    db.set_file_password("a", "secret").unwrap();

    assert!(db.delete_entry("docs").unwrap());
    assert!(db.get_entry_by_id("docs").unwrap().is_none());
    assert!(db.get_entry_by_id("a").unwrap().is_none());
    assert!(db.get_entry_by_id("b").unwrap().is_none());
    assert!(!db.has_file_password("a").unwrap());
    assert!(db.get_entry_by_id("p").unwrap().is_some());
    assert!(!db.delete_entry("docs").unwrap());
}

#[test]
fn test_path_prefix_is_a_string_prefix() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);
    db.create_entry(&make_entry("s2", EntryType::Folder, "/srv2", None)).unwrap();

    let under_docs = db.list_by_path_prefix("/srv/docs").unwrap();
    assert_eq!(under_docs.len(), 3);
    assert_eq!(db.list_by_path_prefix("/srv").unwrap().len(), 6);
}

#[test]
fn test_search_is_case_insensitive_and_ranks_folders_first() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);
    db.set_comment("a", Some("Quarterly DOCS review")).unwrap();

    let results = db.search_entries("docs", SearchOptions::default()).unwrap();
    assert_eq!(results[0].entry_type, EntryType::Folder);
    assert_eq!(results.len(), 3);

    let by_tag = db.search_entries("HOLIDAY", SearchOptions::default()).unwrap();
    assert_eq!(by_tag.len(), 1);
    assert_eq!(by_tag[0].id, "p");

    let by_comment = db
        .search_entries(
            "quarterly",
            SearchOptions {
                entry_type: Some(EntryType::File),
                limit: 10,
            },
        )
        .unwrap();
    assert_eq!(by_comment.len(), 1);

    let limited = db
        .search_entries("srv", SearchOptions { entry_type: None, limit: 2 })
        .unwrap();
    assert_eq!(limited.len(), 2);
}

#[test]
fn test_search_folds_non_ascii_case() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);
    let mut song = make_entry("s", EntryType::File, "/srv/Été Été.mp3", Some("root"));
    song.tags = vec!["Ölmusik".into()];
    db.create_entry(&song).unwrap();

    for query in ["été", "ÉTÉ", "Été"] {
        let hits = db.search_entries(query, SearchOptions::default()).unwrap();
        assert_eq!(hits.len(), 1, "query {}", query);
        assert_eq!(hits[0].id, "s");
    }

    let by_tag = db.search_entries("ölMUSIK", SearchOptions::default()).unwrap();
    assert_eq!(by_tag.len(), 1);

    let prefixed = db.get_tag_cloud(Some("öl"), 10).unwrap();
    assert_eq!(prefixed.len(), 1);
    assert_eq!(prefixed[0].tag, "Ölmusik");
}

#[test]
fn test_tag_cloud_orders_by_count_then_name() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);
    db.set_tags("a", vec!["work".into(), "holiday".into()]).unwrap();
    db.set_tags("b", vec!["work".into(), "work".into(), "alpha".into()]).unwrap();

    let cloud = db.get_tag_cloud(None, 10).unwrap();
    let pairs: Vec<(&str, i64)> = cloud.iter().map(|t| (t.tag.as_str(), t.count)).collect();
    assert_eq!(
        pairs,
        vec![("holiday", 2), ("work", 2), ("alpha", 1), ("image", 1)]
    );

    let prefixed = db.get_tag_cloud(Some("HO"), 10).unwrap();
    assert_eq!(prefixed.len(), 1);
    assert_eq!(db.get_tag_cloud(None, 1).unwrap().len(), 1);
}

#[test]
fn test_user_fields_require_existing_entry() {
    let db = Database::open_in_memory().unwrap();
    assert!(matches!(db.set_comment("x", Some("hi")), Err(Error::NotFound(_))));
    assert!(matches!(db.set_tags("x", vec!["a".into()]), Err(Error::NotFound(_))));
}

#[test]
fn test_every_file_excludes_folders_and_links() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);
    let mut link = make_entry("l", EntryType::Link, "/srv/link", Some("root"));
    link.meta = EntryMeta::Broken {
        created: None,
        modified: None,
    };
    db.create_entry(&link).unwrap();

    let files = db.get_every_file().unwrap();
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|e| e.entry_type == EntryType::File));
}

#[test]
fn test_password_lifecycle() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);

    assert!(!db.has_file_password("a").unwrap());
    assert!(!db.verify_file_password("a", "anything").unwrap());

    db.set_file_password("a", "correct horse").unwrap();
    assert!(db.has_file_password("a").unwrap());
    assert!(!db.verify_file_password("a", "wrong").unwrap());
    assert!(db.verify_file_password("a", "correct horse").unwrap());

    let hash = db.get_file_password_hash("a").unwrap().unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(!hash.contains("correct horse"));

    assert!(db.remove_file_password("a").unwrap());
    assert!(!db.has_file_password("a").unwrap());
    assert!(!db.remove_file_password("a").unwrap());
}

#[test]
fn test_passwords_only_guard_files() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);
    assert!(matches!(db.set_file_password("docs", "pw"), Err(Error::Other(_))));
    assert!(matches!(db.set_file_password("ghost", "pw"), Err(Error::NotFound(_))));
}

#[test]
fn test_truncate_all() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);
    db.truncate_all().unwrap();
    assert_eq!(db.count_entries().unwrap(), 0);
}
