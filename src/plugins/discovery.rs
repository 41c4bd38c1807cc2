//! Built-in discovery plugins.
//!
//! Discovery plugins walk the package once and record which kinds of
//! sources are present. Tool plugins read the resulting facts instead of
//! walking the tree again.

use super::{DiscoveryPlugin, Plugin, PluginContext, PluginError};
use crate::models::{Facts, Package};
use async_trait::async_trait;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// Finds source files by extension or shebang line.
#[derive(Debug, Clone, Copy)]
pub struct FileTypeDiscoveryPlugin {
    name: &'static str,
    fact: &'static str,
    extensions: &'static [&'static str],
    shebangs: &'static [&'static str],
}

impl FileTypeDiscoveryPlugin {
    /// Python sources, stored under `python_src`.
    pub fn python() -> Self {
        Self {
            name: "python",
            fact: "python_src",
            extensions: &["py", "pyi"],
            shebangs: &["python"],
        }
    }

    /// C and C++ sources and headers, stored under `c_src`.
    pub fn c() -> Self {
        Self {
            name: "c",
            fact: "c_src",
            extensions: &["c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx"],
            shebangs: &[],
        }
    }

    /// Shell scripts, stored under `shell_src`.
    pub fn shell() -> Self {
        Self {
            name: "shell",
            fact: "shell_src",
            extensions: &["sh", "bash", "ksh", "zsh"],
            shebangs: &["sh", "bash", "ksh", "zsh", "dash"],
        }
    }

    fn matches(&self, path: &Path) -> bool {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            return self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext));
        }
        !self.shebangs.is_empty() && shebang_matches(path, self.shebangs)
    }
}

impl Plugin for FileTypeDiscoveryPlugin {
    fn name(&self) -> &str {
        self.name
    }
}

#[async_trait]
impl DiscoveryPlugin for FileTypeDiscoveryPlugin {
    async fn scan(&self, package: &Package, ctx: &PluginContext) -> Result<Facts, PluginError> {
        let root = package.path().to_path_buf();
        let excludes = ctx.exclude_dirs.clone();
        let matcher = *self;

        // a dropped scan (timeout or cancellation) stops the blocking walk
        let stop = Arc::new(AtomicBool::new(false));
        let _guard = StopOnDrop(stop.clone());

        let files = tokio::task::spawn_blocking(move || {
            source_files(&root, &excludes, &stop)
                .into_iter()
                .filter(|path| matcher.matches(path))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| PluginError::Other(format!("discovery task failed: {}", e)))?;

        debug!("{} discovery found {} files", self.name, files.len());

        let mut facts = Facts::new();
        for file in files {
            facts.insert(self.fact, file);
        }
        Ok(facts)
    }
}

/// Detects a CMake build at the package root.
pub struct CMakeDiscoveryPlugin;

impl Plugin for CMakeDiscoveryPlugin {
    fn name(&self) -> &str {
        "cmake"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["c".to_string()]
    }
}

#[async_trait]
impl DiscoveryPlugin for CMakeDiscoveryPlugin {
    async fn scan(&self, package: &Package, _ctx: &PluginContext) -> Result<Facts, PluginError> {
        let lists = package.path().join("CMakeLists.txt");
        let mut facts = Facts::new();

        if tokio::fs::try_exists(&lists).await? {
            facts.insert("cmake", lists);
        }
        Ok(facts)
    }
}

/// Raises its flag when dropped.
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// All regular files under `root`, skipping hidden entries and excluded
/// directory names. The walk ends early once `stop` is set.
fn source_files(root: &Path, excludes: &[String], stop: &AtomicBool) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !is_excluded(&name, excludes)
        })
        .take_while(|_| !stop.load(Ordering::Relaxed))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

fn is_excluded(name: &str, excludes: &[String]) -> bool {
    // Hidden files
    if name.starts_with('.') {
        return true;
    }

    excludes.iter().any(|pattern| name == pattern)
}

fn shebang_matches(path: &Path, interpreters: &[&str]) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut first = String::new();
    if BufReader::new(file).read_line(&mut first).is_err() {
        return false;
    }

    let Some(line) = first.strip_prefix("#!") else {
        return false;
    };
    let mut parts = line.split_whitespace();
    let program = match parts.next() {
        Some(p) if p.ends_with("/env") => parts.next().unwrap_or(""),
        Some(p) => p.rsplit('/').next().unwrap_or(p),
        None => return false,
    };

    interpreters.iter().any(|interp| {
        program == *interp
            || program
                .strip_prefix(interp)
                .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit() || c == '.'))
    })
}
