//! Reading a set of POD5 files as one collection.
//!
//! A [`DatasetReader`] discovers files under the given paths, keeps a
//! bounded LRU of open readers and can build a global read-id to path
//! index for random access. Duplicate read ids across files are legal:
//! iteration yields every occurrence, while indexed access returns one
//! occurrence and warns unless the caller opts out.

use std::{
    collections::HashMap,
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread,
};

use lru::LruCache;
use uuid::Uuid;

use crate::{
    error::Pod5Error,
    reader::{Reader, ReadRecord},
};

/// Options controlling dataset discovery and caching.
#[derive(Debug, Clone)]
pub struct DatasetOptions {
    /// Search directories recursively.
    pub recursive: bool,
    /// File-name suffix to match when searching directories.
    pub pattern: String,
    /// Worker threads for counting and indexing.
    pub threads: usize,
    /// Maximum open readers kept cached. Zero disables caching.
    pub max_cached_readers: usize,
    /// Warn when indexed access encounters duplicate read ids.
    pub warn_duplicate_indexing: bool,
    /// Build the read-id index immediately instead of on first use.
    pub index_on_open: bool,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            pattern: ".pod5".to_string(),
            threads: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            max_cached_readers: 16,
            warn_duplicate_indexing: true,
            index_on_open: false,
        }
    }
}

/// A set of POD5 files addressable as a single collection.
pub struct DatasetReader {
    paths: Vec<PathBuf>,
    options: DatasetOptions,
    readers: Mutex<LruCache<PathBuf, Arc<Reader>>>,
    index: Mutex<Option<Arc<HashMap<Uuid, PathBuf>>>>,
    num_reads: Mutex<Option<usize>>,
}

impl DatasetReader {
    /// Discover files under `paths` and build a dataset over them.
    pub fn new(
        paths: &[impl AsRef<Path>],
        options: DatasetOptions,
    ) -> Result<Self, Pod5Error> {
        let mut collected = Vec::new();
        for path in paths {
            collect_files(path.as_ref(), &options, &mut collected)?;
        }
        collected.sort();
        collected.dedup();

        let capacity = NonZeroUsize::new(options.max_cached_readers.max(1))
            .expect("capacity is at least one");
        let dataset = Self {
            paths: collected,
            options,
            readers: Mutex::new(LruCache::new(capacity)),
            index: Mutex::new(None),
            num_reads: Mutex::new(None),
        };
        if dataset.options.index_on_open {
            dataset.build_index()?;
        }
        Ok(dataset)
    }

    /// The discovered file paths, sorted.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Get (or open) the reader for one dataset file.
    pub fn get_reader(&self, path: &Path) -> Result<Arc<Reader>, Pod5Error> {
        if self.options.max_cached_readers == 0 {
            return Ok(Arc::new(Reader::open(path)?));
        }
        let mut cache = self.readers.lock().expect("reader cache lock poisoned");
        if let Some(reader) = cache.get(&path.to_path_buf()) {
            return Ok(reader.clone());
        }
        drop(cache);

        // Open outside the lock; opening can be slow.
        let reader = Arc::new(Reader::open(path)?);
        let mut cache = self.readers.lock().expect("reader cache lock poisoned");
        let evicted = cache.push(path.to_path_buf(), reader.clone());
        drop(cache);
        // Drop any evicted reader outside the lock so its unmap cannot
        // stall other cache users.
        drop(evicted);
        Ok(reader)
    }

    /// Total reads across the dataset. Parallelises over files.
    pub fn num_reads(&self) -> Result<usize, Pod5Error> {
        if let Some(count) = *self.num_reads.lock().expect("count lock poisoned") {
            return Ok(count);
        }
        let counts = self.map_files(|reader| reader.num_reads())?;
        let total = counts.into_iter().sum();
        *self.num_reads.lock().expect("count lock poisoned") = Some(total);
        Ok(total)
    }

    /// All read ids in the dataset, in path order. Duplicates appear as
    /// often as they occur.
    pub fn read_ids(&self) -> Result<Vec<Uuid>, Pod5Error> {
        let per_file = self.map_files(|reader| reader.read_ids())?;
        Ok(per_file.into_iter().flatten().collect())
    }

    /// Whether any read id occurs more than once in the dataset.
    pub fn has_duplicates(&self) -> Result<bool, Pod5Error> {
        let index = self.build_index()?;
        Ok(index.len() != self.num_reads()?)
    }

    /// The file containing `read_id`, if any. Builds the index on first
    /// use and warns about duplicates unless suppressed.
    pub fn get_path(&self, read_id: &Uuid) -> Result<Option<PathBuf>, Pod5Error> {
        let index = self.build_index()?;
        if self.options.warn_duplicate_indexing && index.len() != self.num_reads()? {
            log::warn!("duplicate read ids found in dataset");
        }
        Ok(index.get(read_id).cloned())
    }

    /// Fetch one read by id, or `None` if no file holds it.
    pub fn get_read(&self, read_id: &Uuid) -> Result<Option<ReadRecord>, Pod5Error> {
        let Some(path) = self.get_path(read_id)? else {
            return Ok(None);
        };
        let reader = self.get_reader(&path)?;
        reader.get_read(read_id)
    }

    /// Iterate reads across every file, in path order, sequentially per
    /// file. With a selection, absent ids are skipped per file (every
    /// occurrence of a selected id is yielded).
    pub fn reads(
        &self,
        selection: Option<&[Uuid]>,
    ) -> Result<impl Iterator<Item = Result<ReadRecord, Pod5Error>> + '_, Pod5Error> {
        let selection = selection.map(|ids| ids.to_vec());
        let mut files = self.paths.clone().into_iter();
        let mut current: Option<std::vec::IntoIter<Result<ReadRecord, Pod5Error>>> = None;
        Ok(std::iter::from_fn(move || loop {
            if let Some(records) = &mut current {
                if let Some(record) = records.next() {
                    return Some(record);
                }
                current = None;
            }
            let path = files.next()?;
            let reader = match self.get_reader(&path) {
                Ok(reader) => reader,
                Err(err) => return Some(Err(err)),
            };
            let collected: Vec<Result<ReadRecord, Pod5Error>> = match &selection {
                Some(ids) => match reader.reads_selected(ids, true) {
                    Ok(records) => records.collect(),
                    Err(err) => vec![Err(err)],
                },
                None => reader.reads().collect(),
            };
            current = Some(collected.into_iter());
        }))
    }

    /// Drop every cached reader.
    pub fn clear_readers(&self) {
        let mut cache = self.readers.lock().expect("reader cache lock poisoned");
        let drained = (0..cache.len())
            .filter_map(|_| cache.pop_lru())
            .collect::<Vec<_>>();
        drop(cache);
        drop(drained);
    }

    /// Forget the read-id index; it rebuilds on next use.
    pub fn clear_index(&self) {
        *self.index.lock().expect("index lock poisoned") = None;
    }

    fn build_index(&self) -> Result<Arc<HashMap<Uuid, PathBuf>>, Pod5Error> {
        if let Some(index) = &*self.index.lock().expect("index lock poisoned") {
            return Ok(index.clone());
        }
        let per_file = self.map_files(|reader| reader.read_ids())?;
        let mut index = HashMap::new();
        for (path, ids) in self.paths.iter().zip(per_file) {
            for id in ids {
                // First occurrence wins; iteration still sees them all.
                index.entry(id).or_insert_with(|| path.clone());
            }
        }
        let index = Arc::new(index);
        *self.index.lock().expect("index lock poisoned") = Some(index.clone());
        Ok(index)
    }

    /// Apply `f` to every file's reader with up to `threads` workers,
    /// preserving path order in the results.
    fn map_files<T: Send>(
        &self,
        f: impl Fn(&Reader) -> Result<T, Pod5Error> + Sync,
    ) -> Result<Vec<T>, Pod5Error> {
        let workers = self.options.threads.max(1).min(self.paths.len().max(1));
        let results = Mutex::new(
            (0..self.paths.len())
                .map(|_| None)
                .collect::<Vec<Option<Result<T, Pod5Error>>>>(),
        );
        let next = std::sync::atomic::AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    if i >= self.paths.len() {
                        break;
                    }
                    let outcome = self
                        .get_reader(&self.paths[i])
                        .and_then(|reader| f(&reader));
                    results.lock().expect("result lock poisoned")[i] = Some(outcome);
                });
            }
        });

        results
            .into_inner()
            .expect("result lock poisoned")
            .into_iter()
            .map(|slot| slot.expect("every file processed"))
            .collect()
    }
}

fn collect_files(
    path: &Path,
    options: &DatasetOptions,
    out: &mut Vec<PathBuf>,
) -> Result<(), Pod5Error> {
    if path.is_file() {
        out.push(path.to_path_buf());
        return Ok(());
    }
    if !path.is_dir() {
        return Err(Pod5Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("dataset input does not exist: {}", path.display()),
        )));
    }
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = entry.path();
        if entry_path.is_dir() {
            if options.recursive {
                collect_files(&entry_path, options, out)?;
            }
        } else if entry_path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(&options.pattern))
        {
            out.push(entry_path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        test_util,
        writer::{Writer, WriterOptions},
    };

    fn write_file(path: &Path, acquisition: &str, ids: std::ops::Range<u32>) {
        let info = test_util::run_info(acquisition);
        let mut writer = Writer::create(path, WriterOptions::default()).unwrap();
        for n in ids {
            writer.add_read(&test_util::read(n, &info, 16)).unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn test_discovery_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        write_file(&dir.path().join("a.pod5"), "acq-a", 0..4);
        write_file(&nested.join("b.pod5"), "acq-b", 10..16);
        fs::write(dir.path().join("ignore.txt"), b"nope").unwrap();

        let flat = DatasetReader::new(&[dir.path()], DatasetOptions::default()).unwrap();
        assert_eq!(flat.paths().len(), 1);

        let recursive = DatasetReader::new(
            &[dir.path()],
            DatasetOptions {
                recursive: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(recursive.paths().len(), 2);
        assert_eq!(recursive.num_reads().unwrap(), 10);
        assert_eq!(recursive.read_ids().unwrap().len(), 10);
    }

    #[test]
    fn test_get_read_across_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("a.pod5"), "acq-a", 0..4);
        write_file(&dir.path().join("b.pod5"), "acq-b", 10..14);

        let dataset = DatasetReader::new(&[dir.path()], DatasetOptions::default()).unwrap();
        let record = dataset
            .get_read(&test_util::read_id(12))
            .unwrap()
            .expect("read 12 is in b.pod5");
        assert_eq!(record.read_number(), 12);
        assert!(dataset
            .get_read(&test_util::read_id(99))
            .unwrap()
            .is_none());
        assert!(!dataset.has_duplicates().unwrap());
    }

    #[test]
    fn test_duplicates_are_iterated_and_deduped_on_lookup() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("a.pod5"), "acq-a", 0..3);
        write_file(&dir.path().join("b.pod5"), "acq-b", 0..3);

        let dataset = DatasetReader::new(&[dir.path()], DatasetOptions::default()).unwrap();
        assert!(dataset.has_duplicates().unwrap());
        let all = dataset
            .reads(None)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(all.len(), 6);
        // Indexed access returns exactly one occurrence.
        let record = dataset.get_read(&test_util::read_id(1)).unwrap().unwrap();
        assert_eq!(record.read_number(), 1);
    }

    #[test]
    fn test_selection_iterates_matches_only() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("a.pod5"), "acq-a", 0..5);

        let dataset = DatasetReader::new(&[dir.path()], DatasetOptions::default()).unwrap();
        let wanted = [test_util::read_id(1), test_util::read_id(3)];
        let selected = dataset
            .reads(Some(&wanted))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(
            selected
                .iter()
                .map(|record| record.read_number())
                .collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn test_reader_cache_eviction() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("a.pod5"), "acq-a", 0..2);
        write_file(&dir.path().join("b.pod5"), "acq-b", 10..12);
        write_file(&dir.path().join("c.pod5"), "acq-c", 20..22);

        let dataset = DatasetReader::new(
            &[dir.path()],
            DatasetOptions {
                max_cached_readers: 1,
                ..Default::default()
            },
        )
        .unwrap();
        // Touch every file; the cache holds at most one reader but every
        // access still works.
        for path in dataset.paths().to_vec() {
            let reader = dataset.get_reader(&path).unwrap();
            assert_eq!(reader.num_reads().unwrap(), 2);
        }
        dataset.clear_readers();
    }
}
