use crate::notebook::Document;
use crate::JuiceError;
use std::path::{Path, PathBuf};

/// Where candidate notebooks come from.
pub trait NotebookStore {
    /// Candidate notebook paths, in the order they should be tried.
    fn list(&self) -> Result<Vec<PathBuf>, JuiceError>;
    fn read(&self, path: &Path) -> Result<String, JuiceError>;
}

/// `*.ipynb` files directly inside one directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl NotebookStore for DirStore {
    fn list(&self) -> Result<Vec<PathBuf>, JuiceError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = match entry {
                Ok(e) => e.path(),
                Err(_) => continue,
            };
            if path.is_file() && path.extension().is_some_and(|ext| ext == "ipynb") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn read(&self, path: &Path) -> Result<String, JuiceError> {
        Ok(std::fs::read_to_string(path)?)
    }
}

#[derive(Debug)]
pub struct CachedNotebook {
    pub document: Document,
    pub path: PathBuf,
}

/// Finds the notebook containing the executing cell and remembers it.
///
/// A cell is identified only by verbatim source equality, so editing a cell
/// between runs makes the cached document miss and triggers a fresh scan.
pub struct Locator<S: NotebookStore> {
    store: S,
    cache: Option<CachedNotebook>,
}

impl<S: NotebookStore> Locator<S> {
    pub fn new(store: S) -> Self {
        Self { store, cache: None }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cached(&self) -> Option<&CachedNotebook> {
        self.cache.as_ref()
    }

    /// `Ok(None)` means no candidate contains the cell. Unreadable or malformed
    /// candidates are skipped; only a failure to list candidates is an error.
    pub fn locate(
        &mut self,
        current_source: &str,
    ) -> Result<Option<&CachedNotebook>, JuiceError> {
        let hit = self
            .cache
            .as_ref()
            .is_some_and(|c| c.document.contains_code_cell(current_source));
        if hit {
            log::debug!("notebook cache hit");
            return Ok(self.cache.as_ref());
        }

        for path in self.store.list()? {
            let document = match self.store.read(&path).and_then(|s| Document::parse(&s)) {
                Ok(d) => d,
                Err(e) => {
                    log::debug!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            if document.contains_code_cell(current_source) {
                log::debug!("located notebook {}", path.display());
                self.cache = Some(CachedNotebook { document, path });
                return Ok(self.cache.as_ref());
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell as Counter;
    use std::collections::BTreeMap;

    /// In-memory store that counts every list/read call.
    #[derive(Default)]
    pub(crate) struct CountingStore {
        pub files: BTreeMap<PathBuf, String>,
        pub lists: Counter<usize>,
        pub reads: Counter<usize>,
    }

    impl CountingStore {
        pub fn with(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(p, c)| (PathBuf::from(p), c.to_string()))
                    .collect(),
                ..Default::default()
            }
        }

        pub fn accesses(&self) -> usize {
            self.lists.get() + self.reads.get()
        }
    }

    impl NotebookStore for CountingStore {
        fn list(&self) -> Result<Vec<PathBuf>, JuiceError> {
            self.lists.set(self.lists.get() + 1);
            Ok(self.files.keys().cloned().collect())
        }

        fn read(&self, path: &Path) -> Result<String, JuiceError> {
            self.reads.set(self.reads.get() + 1);
            self.files.get(path).cloned().ok_or_else(|| {
                JuiceError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    path.display().to_string(),
                ))
            })
        }
    }

    pub(crate) fn notebook_json(sources: &[&str]) -> String {
        let cells: Vec<serde_json::Value> = sources
            .iter()
            .map(|s| serde_json::json!({"cell_type": "code", "source": s, "outputs": []}))
            .collect();
        serde_json::json!({"cells": cells, "nbformat": 4}).to_string()
    }

    #[test]
    fn second_locate_uses_cache() {
        let json = notebook_json(&["x = 1", "%%prompt\nhi"]);
        let store = CountingStore::with(&[("a.ipynb", json.as_str())]);
        let mut locator = Locator::new(store);

        let found = locator.locate("%%prompt\nhi").unwrap().unwrap();
        assert_eq!(found.path, PathBuf::from("a.ipynb"));
        let after_first = locator.store().accesses();
        assert_eq!(after_first, 2);

        let again = locator.locate("%%prompt\nhi").unwrap().unwrap();
        assert_eq!(again.document.cells.len(), 2);
        assert_eq!(locator.store().accesses(), after_first);
    }

    #[test]
    fn edited_cell_forces_rescan() {
        let store = CountingStore::with(&[("a.ipynb", notebook_json(&["x = 1"]).as_str())]);
        let mut locator = Locator::new(store);
        assert!(locator.locate("x = 1").unwrap().is_some());
        let before = locator.store().accesses();

        assert!(locator.locate("x = 2").unwrap().is_none());
        assert!(locator.store().accesses() > before);
        // Cache keeps the last located document until something else matches.
        assert!(locator.cached().is_some());
    }

    #[test]
    fn malformed_sibling_is_skipped() {
        let store = CountingStore::with(&[
            ("a_broken.ipynb", "{ not json"),
            ("b_missing_cells.ipynb", r#"{"nbformat": 4}"#),
            ("c_good.ipynb", notebook_json(&["print('hi')"]).as_str()),
        ]);
        let mut locator = Locator::new(store);
        let found = locator.locate("print('hi')").unwrap().unwrap();
        assert_eq!(found.path, PathBuf::from("c_good.ipynb"));
    }

    #[test]
    fn not_found_when_no_candidate_matches() {
        let store = CountingStore::with(&[("a.ipynb", notebook_json(&["x = 1"]).as_str())]);
        let mut locator = Locator::new(store);
        assert!(locator.locate("nope").unwrap().is_none());
        assert!(locator.cached().is_none());
    }

    #[test]
    fn markdown_cells_never_identify_notebook() {
        let json = r#"{"cells": [{"cell_type": "markdown", "source": "x = 1"}]}"#;
        let mut locator = Locator::new(CountingStore::with(&[("a.ipynb", json)]));
        assert!(locator.locate("x = 1").unwrap().is_none());
    }

    #[test]
    fn dir_store_lists_only_notebooks_sorted() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.ipynb"), "{}").unwrap();
        std::fs::write(dir.path().join("a.ipynb"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("c.ipynb")).unwrap();

        let paths = DirStore::new(dir.path()).list().unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.ipynb", "b.ipynb"]);
    }

    #[test]
    fn dir_store_missing_dir_is_error() {
        let store = DirStore::new("/definitely/not/here");
        assert!(store.list().is_err());
    }
}
