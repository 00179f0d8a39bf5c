use super::IgnoreRules;
use crate::progress::ProgressReporter;
use crate::storage::models::{Entry, EntryMeta, EntryType};
use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const PROGRESS_EVERY: usize = 64;

/// Whether a record is final or a folder announced before its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitPhase {
    /// Folder emitted before descending; its size is not known yet.
    Open,
    /// The record is complete.
    Close,
}

/// One filesystem node as the walker sees it. Carries only walker-owned fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRecord {
    pub id: String,
    pub entry_type: EntryType,
    pub path: String,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub meta: EntryMeta,
    pub parent_id: Option<String>,
    pub is_phantom_symlink: bool,
}

impl EntryRecord {
    pub fn into_entry(self, tags: Vec<String>) -> Entry {
        Entry {
            id: self.id,
            entry_type: self.entry_type,
            path: self.path,
            size: self.size,
            mime_type: self.mime_type,
            comment: None,
            tags,
            meta: self.meta,
            parent_id: self.parent_id,
            is_phantom_symlink: self.is_phantom_symlink,
        }
    }

    /// Overwrites the walker-owned columns of `entry`; id, comment and tags stay.
    pub fn apply_to(&self, entry: &mut Entry) {
        entry.entry_type = self.entry_type;
        entry.size = self.size;
        entry.mime_type = self.mime_type.clone();
        entry.meta = self.meta.clone();
        entry.parent_id = self.parent_id.clone();
        entry.is_phantom_symlink = self.is_phantom_symlink;
    }
}

/// Receives records in parent-before-child order.
pub trait EntrySink {
    /// Stable id for a path: the stored one when known, a fresh one otherwise.
    fn id_for(&mut self, path: &str) -> String;

    /// Stored size for a path, used when a folder cannot be listed.
    fn known_size(&self, _path: &str) -> Option<u64> {
        None
    }

    /// Returns false when the record could not be stored. A folder rejected
    /// at [`EmitPhase::Open`] is not descended into.
    fn emit(&mut self, record: &EntryRecord, phase: EmitPhase) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkCounts {
    pub folders: usize,
    pub files: usize,
    pub links: usize,
    pub bytes: u64,
    pub errors: usize,
}

impl WalkCounts {
    fn nodes(&self) -> usize {
        self.folders + self.files + self.links
    }
}

struct DirNode {
    virtual_path: PathBuf,
    real_path: PathBuf,
    parent_id: Option<String>,
    phantom: bool,
}

pub(crate) fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn unix_secs(time: std::io::Result<SystemTime>) -> Option<i64> {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
}

fn times(metadata: Option<&Metadata>) -> (Option<i64>, Option<i64>) {
    match metadata {
        Some(m) => (unix_secs(m.created()), unix_secs(m.modified())),
        None => (None, None),
    }
}

fn node_meta(metadata: Option<&Metadata>, phantom_real: Option<&Path>) -> EntryMeta {
    let (created, modified) = times(metadata);
    match phantom_real {
        Some(real) => EntryMeta::Phantom {
            created,
            modified,
            real_path: path_string(real),
        },
        None => EntryMeta::Timestamps { created, modified },
    }
}

/// Depth-first traversal of one root. Each folder is emitted before its
/// children and again with its aggregated size once they are done.
pub(crate) struct Traversal<'a, S: EntrySink> {
    sink: &'a mut S,
    ignore: &'a IgnoreRules,
    reporter: &'a dyn ProgressReporter,
    ancestors: Vec<PathBuf>,
    counts: WalkCounts,
}

impl<'a, S: EntrySink> Traversal<'a, S> {
    pub(crate) fn new(
        sink: &'a mut S,
        ignore: &'a IgnoreRules,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            sink,
            ignore,
            reporter,
            ancestors: Vec::new(),
            counts: WalkCounts::default(),
        }
    }

    /// Walks `root` and returns its aggregate size.
    pub(crate) fn visit_root(&mut self, root: &Path) -> u64 {
        self.visit_dir(DirNode {
            virtual_path: root.to_path_buf(),
            real_path: root.to_path_buf(),
            parent_id: None,
            phantom: false,
        })
    }

    pub(crate) fn counts(&self) -> WalkCounts {
        self.counts
    }

    fn tick(&self, path: &str) {
        let nodes = self.counts.nodes();
        if nodes % PROGRESS_EVERY == 0 {
            self.reporter.on_walk_progress(nodes, path);
        }
    }

    fn visit_dir(&mut self, dir: DirNode) -> u64 {
        let path = path_string(&dir.virtual_path);
        let metadata = match fs::metadata(&dir.real_path) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("Cannot stat directory {}: {}", dir.real_path.display(), e);
                self.counts.errors += 1;
                None
            }
        };
        let phantom_real = dir.phantom.then_some(dir.real_path.as_path());

        let mut record = EntryRecord {
            id: self.sink.id_for(&path),
            entry_type: EntryType::Folder,
            path,
            size: None,
            mime_type: None,
            meta: node_meta(metadata.as_ref(), phantom_real),
            parent_id: dir.parent_id.clone(),
            is_phantom_symlink: dir.phantom,
        };
        if !self.sink.emit(&record, EmitPhase::Open) {
            self.counts.errors += 1;
            return 0;
        }
        self.counts.folders += 1;
        self.tick(&record.path);

        let Some(children) = self.list_children(&dir) else {
            // Unlisted children keep their rows, so the folder keeps its size.
            record.size = self.sink.known_size(&record.path);
            if !self.sink.emit(&record, EmitPhase::Close) {
                self.counts.errors += 1;
            }
            return record.size.unwrap_or(0);
        };

        let canonical = fs::canonicalize(&dir.real_path).unwrap_or_else(|_| dir.real_path.clone());
        self.ancestors.push(canonical);

        let mut total = 0u64;
        for name in children {
            total += self.visit_child(&dir, &record.id, &name);
        }

        self.ancestors.pop();
        record.size = Some(total);
        if !self.sink.emit(&record, EmitPhase::Close) {
            self.counts.errors += 1;
        }
        total
    }

    /// Sorted, non-ignored child names, or `None` when the folder is unreadable.
    fn list_children(&mut self, dir: &DirNode) -> Option<Vec<OsString>> {
        let read = match fs::read_dir(&dir.real_path) {
            Ok(read) => read,
            Err(e) => {
                warn!("Cannot read directory {}: {}", dir.real_path.display(), e);
                self.counts.errors += 1;
                return None;
            }
        };

        let mut names = Vec::new();
        for item in read {
            match item {
                Ok(item) => {
                    let name = item.file_name();
                    let full = dir.virtual_path.join(&name);
                    if self
                        .ignore
                        .is_ignored(&name.to_string_lossy(), &full.to_string_lossy())
                    {
                        debug!("Ignoring {}", full.display());
                        continue;
                    }
                    names.push(name);
                }
                Err(e) => {
                    warn!("Error listing {}: {}", dir.real_path.display(), e);
                    self.counts.errors += 1;
                }
            }
        }
        names.sort();
        Some(names)
    }

    fn visit_child(&mut self, dir: &DirNode, parent_id: &str, name: &OsString) -> u64 {
        let real = dir.real_path.join(name);
        let virtual_path = dir.virtual_path.join(name);
        let metadata = match fs::symlink_metadata(&real) {
            Ok(m) => m,
            Err(e) => {
                warn!("Cannot stat {}: {}", real.display(), e);
                self.counts.errors += 1;
                return 0;
            }
        };

        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            self.visit_symlink(dir, parent_id, virtual_path, &real, &metadata)
        } else if file_type.is_dir() {
            self.visit_dir(DirNode {
                virtual_path,
                real_path: real,
                parent_id: Some(parent_id.to_string()),
                phantom: dir.phantom,
            })
        } else if file_type.is_file() {
            self.visit_file(dir, parent_id, virtual_path, &real, &metadata)
        } else {
            debug!("Skipping special file {}", real.display());
            0
        }
    }

    fn visit_file(
        &mut self,
        dir: &DirNode,
        parent_id: &str,
        virtual_path: PathBuf,
        real: &Path,
        metadata: &Metadata,
    ) -> u64 {
        let size = metadata.len();
        let path = path_string(&virtual_path);
        let record = EntryRecord {
            id: self.sink.id_for(&path),
            entry_type: EntryType::File,
            mime_type: mime_guess::from_path(&virtual_path)
                .first()
                .map(|m| m.essence_str().to_string()),
            path,
            size: Some(size),
            meta: node_meta(Some(metadata), dir.phantom.then_some(real)),
            parent_id: Some(parent_id.to_string()),
            is_phantom_symlink: dir.phantom,
        };
        if !self.sink.emit(&record, EmitPhase::Close) {
            self.counts.errors += 1;
            return 0;
        }
        self.counts.files += 1;
        self.counts.bytes += size;
        self.tick(&record.path);
        size
    }

    fn visit_symlink(
        &mut self,
        dir: &DirNode,
        parent_id: &str,
        virtual_path: PathBuf,
        real: &Path,
        link_metadata: &Metadata,
    ) -> u64 {
        let (created, modified) = times(Some(link_metadata));
        let resolved = fs::canonicalize(real)
            .and_then(|target| fs::metadata(&target).map(|m| (target, m)));

        let meta = match resolved {
            Ok((target, target_meta)) if target_meta.is_dir() => {
                if !self.ancestors.contains(&target) {
                    return self.visit_dir(DirNode {
                        virtual_path,
                        real_path: target,
                        parent_id: Some(parent_id.to_string()),
                        phantom: true,
                    });
                }
                warn!(
                    "Symlink {} points back into its own ancestry ({}), not descending",
                    virtual_path.display(),
                    target.display()
                );
                EntryMeta::Symlink {
                    created,
                    modified,
                    symlink_target: path_string(&target),
                }
            }
            Ok((target, _)) => EntryMeta::Symlink {
                created,
                modified,
                symlink_target: path_string(&target),
            },
            Err(e) => {
                debug!("Broken symlink {}: {}", virtual_path.display(), e);
                EntryMeta::Broken { created, modified }
            }
        };

        let path = path_string(&virtual_path);
        let record = EntryRecord {
            id: self.sink.id_for(&path),
            entry_type: EntryType::Link,
            path,
            size: None,
            mime_type: None,
            meta,
            parent_id: Some(parent_id.to_string()),
            is_phantom_symlink: dir.phantom,
        };
        if self.sink.emit(&record, EmitPhase::Close) {
            self.counts.links += 1;
            self.tick(&record.path);
        } else {
            self.counts.errors += 1;
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IgnorePolicy;
    use crate::progress::SilentReporter;
    use std::fs;
    use tempfile::TempDir;

    /// Records everything it is given, in order.
    #[derive(Default)]
    struct Recorder {
        next: usize,
        seen: Vec<(EntryRecord, EmitPhase)>,
        reject: Option<String>,
    }

    impl EntrySink for Recorder {
        fn id_for(&mut self, _path: &str) -> String {
            self.next += 1;
            format!("id-{}", self.next)
        }

        fn emit(&mut self, record: &EntryRecord, phase: EmitPhase) -> bool {
            if self.reject.as_deref() == Some(record.path.as_str()) {
                return false;
            }
            self.seen.push((record.clone(), phase));
            true
        }
    }

    fn walk(root: &Path, ignore: IgnoreRules) -> (Recorder, WalkCounts, u64) {
        let mut sink = Recorder::default();
        let reporter = SilentReporter;
        let (total, counts) = {
            let mut traversal = Traversal::new(&mut sink, &ignore, &reporter);
            let total = traversal.visit_root(root);
            (total, traversal.counts())
        };
        (sink, counts, total)
    }

    fn no_ignore() -> IgnoreRules {
        IgnoreRules::new(Vec::new(), IgnorePolicy::Name)
    }

    #[test]
    fn parent_is_emitted_before_children() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/b.txt"), [0u8; 20]).unwrap();
        fs::write(tmp.path().join("a.txt"), [0u8; 10]).unwrap();

        let (sink, counts, total) = walk(tmp.path(), no_ignore());
        assert_eq!(total, 30);
        assert_eq!(counts.files, 2);
        assert_eq!(counts.folders, 2);

        let mut opened: Vec<String> = Vec::new();
        for (record, phase) in &sink.seen {
            if let Some(parent) = &record.parent_id {
                assert!(opened.contains(parent), "{} emitted before its parent", record.path);
            }
            if *phase == EmitPhase::Open || record.entry_type != EntryType::Folder {
                opened.push(record.id.clone());
            }
        }

        let closes: Vec<&EntryRecord> = sink
            .seen
            .iter()
            .filter(|(r, p)| r.entry_type == EntryType::Folder && *p == EmitPhase::Close)
            .map(|(r, _)| r)
            .collect();
        assert_eq!(closes[0].size, Some(20));
        assert_eq!(closes[1].size, Some(30));
    }

    #[test]
    fn folder_open_has_no_size() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("x.bin"), [1u8; 5]).unwrap();
        let (sink, _, _) = walk(tmp.path(), no_ignore());
        let (first, phase) = &sink.seen[0];
        assert_eq!(*phase, EmitPhase::Open);
        assert_eq!(first.size, None);
        assert!(first.parent_id.is_none());
    }

    #[test]
    fn ignored_names_are_not_visited() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("node_modules")).unwrap();
        fs::write(tmp.path().join("node_modules/big.js"), [0u8; 100]).unwrap();
        fs::write(tmp.path().join("keep.txt"), [0u8; 3]).unwrap();

        let ignore = IgnoreRules::new(vec!["node_modules".to_string()], IgnorePolicy::Name);
        let (sink, _, total) = walk(tmp.path(), ignore);
        assert_eq!(total, 3);
        assert!(sink.seen.iter().all(|(r, _)| !r.path.contains("node_modules")));
    }

    #[test]
    fn rejected_folder_is_not_descended() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("bad")).unwrap();
        fs::write(tmp.path().join("bad/inner.txt"), [0u8; 7]).unwrap();

        let mut sink = Recorder {
            reject: Some(path_string(&tmp.path().join("bad"))),
            ..Default::default()
        };
        let ignore = no_ignore();
        let reporter = SilentReporter;
        let total = Traversal::new(&mut sink, &ignore, &reporter).visit_root(tmp.path());
        assert_eq!(total, 0);
        assert!(sink.seen.iter().all(|(r, _)| !r.path.ends_with("inner.txt")));
    }

    #[test]
    fn mime_type_is_guessed_from_name() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("photo.png"), [0u8; 1]).unwrap();
        let (sink, _, _) = walk(tmp.path(), no_ignore());
        let file = sink
            .seen
            .iter()
            .find(|(r, _)| r.entry_type == EntryType::File)
            .map(|(r, _)| r)
            .unwrap();
        assert_eq!(file.mime_type.as_deref(), Some("image/png"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycle_becomes_link() {
        let tmp = TempDir::new().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        fs::create_dir(root.join("a")).unwrap();
        std::os::unix::fs::symlink(&root, root.join("a/loop")).unwrap();

        let (sink, counts, _) = walk(&root, no_ignore());
        assert_eq!(counts.links, 1);
        let link = sink
            .seen
            .iter()
            .find(|(r, _)| r.entry_type == EntryType::Link)
            .map(|(r, _)| r)
            .unwrap();
        assert!(matches!(&link.meta, EntryMeta::Symlink { symlink_target, .. }
            if *symlink_target == path_string(&root)));
    }
}
