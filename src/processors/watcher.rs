//! Polling watcher for newly created spectrum files.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use log::{debug, info};

use crate::config::WatcherConfig;

/// List file names in `dir` with the given extension (case-insensitive).
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_matching(dir: &Path, extension: &str) -> io::Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        let matches = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if !matches || !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.insert(name.to_string());
        }
    }
    Ok(names)
}

/// File names already handed out by the watcher.
///
/// Grows monotonically. When backed by a log file every new name is appended
/// to it, so a restart resumes where the previous run stopped instead of
/// treating everything currently on disk as handled.
#[derive(Debug, Default)]
pub struct SeenFiles {
    names: BTreeSet<String>,
    log: Option<PathBuf>,
}

impl SeenFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            log: None,
        }
    }

    /// Treat every matching file currently in `dir` as already seen.
    pub fn from_dir(dir: &Path, extension: &str) -> io::Result<Self> {
        Ok(Self {
            names: list_matching(dir, extension)?,
            log: None,
        })
    }

    /// Open a persistent seen set.
    ///
    /// If `log_path` exists its lines are the seen names. Otherwise the set is
    /// seeded from the current contents of `dir` and written to a new log.
    pub fn open(log_path: &Path, dir: &Path, extension: &str) -> io::Result<Self> {
        if log_path.exists() {
            let content = fs::read_to_string(log_path)?;
            let names: BTreeSet<String> = content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
            info!(
                "Loaded {} seen file names from {}",
                names.len(),
                log_path.display()
            );
            return Ok(Self {
                names,
                log: Some(log_path.to_path_buf()),
            });
        }

        let names = list_matching(dir, extension)?;
        let mut file = fs::File::create(log_path)?;
        for name in &names {
            writeln!(file, "{}", name)?;
        }
        file.flush()?;

        Ok(Self {
            names,
            log: Some(log_path.to_path_buf()),
        })
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Record `name` as seen. Returns `true` if it was not seen before.
    ///
    /// # Errors
    ///
    /// Returns an error if the name cannot be appended to the log. The name
    /// is recorded in memory regardless.
    pub fn mark_seen(&mut self, name: &str) -> io::Result<bool> {
        if !self.names.insert(name.to_string()) {
            return Ok(false);
        }
        if let Some(log) = &self.log {
            let mut file = OpenOptions::new().create(true).append(true).open(log)?;
            writeln!(file, "{}", name)?;
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileSignature {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileSignature {
    fn of(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Level-triggered poller over one directory.
#[derive(Debug)]
pub struct FileWatcher {
    dir: PathBuf,
    extension: String,
    poll_interval: Duration,
    stability_checks: u32,
    /// Candidates waiting to settle: last signature and how many consecutive
    /// polls it has been unchanged.
    pending: HashMap<String, (FileSignature, u32)>,
}

impl FileWatcher {
    pub fn new(
        dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        config: &WatcherConfig,
    ) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            poll_interval: config.poll_interval(),
            stability_checks: config.stability_checks,
            pending: HashMap::new(),
        }
    }

    /// Check the directory once without blocking.
    ///
    /// Returns the smallest (by name) file not in `seen` that is ready. With
    /// `stability_checks > 0` a file is ready only after its size and mtime
    /// stayed unchanged for that many consecutive polls.
    pub fn poll_once(&mut self, seen: &SeenFiles) -> io::Result<Option<String>> {
        let listing = list_matching(&self.dir, &self.extension)?;
        let candidates: Vec<String> = listing.into_iter().filter(|n| !seen.contains(n)).collect();

        if self.stability_checks == 0 {
            return Ok(candidates.into_iter().next());
        }

        self.pending.retain(|name, _| candidates.contains(name));

        let mut ready = None;
        for name in candidates {
            let signature = match FileSignature::of(&self.dir.join(&name)) {
                Ok(s) => s,
                Err(_) => continue,
            };

            let stable_for = match self.pending.get(&name) {
                Some((previous, count)) if *previous == signature => count + 1,
                _ => 0,
            };
            self.pending.insert(name.clone(), (signature, stable_for));

            if stable_for >= self.stability_checks && ready.is_none() {
                ready = Some(name);
            }
        }

        if let Some(name) = &ready {
            self.pending.remove(name);
        }
        Ok(ready)
    }

    /// Block until a new, settled file appears and return its name.
    ///
    /// Sleeps `poll_interval` between directory listings.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory becomes unreadable.
    pub fn wait_for_new_file(&mut self, seen: &SeenFiles) -> io::Result<String> {
        loop {
            if let Some(name) = self.poll_once(seen)? {
                debug!("New file ready: {}", name);
                return Ok(name);
            }
            thread::sleep(self.poll_interval);
        }
    }
}
