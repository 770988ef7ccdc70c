//! # View Finder
//!
//! Locates template files in the view hierarchy.
//!
//! ```text
//! view_path/<view>/_user.html.erb     partial, most specific
//! view_path/<view>/user.html.erb
//! view_path/_user.html.erb            fallback to the shared folder
//! view_path/user.html.erb
//! ```
//!
//! A name matches a file exactly or as `name.<ext>...`; editor backups
//! ending in `~` are skipped. Every location checked is recorded so a miss
//! can report all of them.

use crate::error::{ViewError, ViewResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A located template file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FoundTemplate {
    /// Path of the file.
    pub location: String,
    /// Format chain, first stage first (reversed extensions).
    pub formats: Vec<String>,
    /// View it was searched for.
    pub view: String,
    /// Template name it was searched for.
    pub template: String,
}

/// Storage the finder searches.
pub trait TemplateSource: Send + Sync + fmt::Debug {
    /// True if `path` is a directory.
    fn is_dir(&self, path: &str) -> bool;

    /// True if `path` is a regular file.
    fn is_file(&self, path: &str) -> bool;

    /// Entry names (not paths) of the directory at `path`, sorted.
    fn list(&self, path: &str) -> Vec<String>;

    /// Reads the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::Io`] if the file cannot be read.
    fn read(&self, path: &str) -> ViewResult<String>;
}

/// Templates on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsSource;

impl TemplateSource for FsSource {
    fn is_dir(&self, path: &str) -> bool {
        Path::new(path).is_dir()
    }

    fn is_file(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }

    fn list(&self, path: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(path) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }

    fn read(&self, path: &str) -> ViewResult<String> {
        std::fs::read_to_string(path).map_err(|source| ViewError::Io {
            path: path.to_owned(),
            source,
        })
    }
}

/// Templates held in memory, keyed by `/`-separated path.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: RwLock<BTreeMap<String, String>>,
}

impl MemorySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a file.
    #[must_use]
    pub fn with(self, path: &str, content: &str) -> Self {
        self.insert(path, content);
        self
    }

    /// Adds (or replaces) a file.
    pub fn insert(&self, path: &str, content: &str) {
        self.files.write().insert(normalize(path), content.to_owned());
    }

    /// Removes a file.
    pub fn remove(&self, path: &str) -> bool {
        self.files.write().remove(&normalize(path)).is_some()
    }
}

fn normalize(path: &str) -> String {
    let mut out = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            p => out.push(p),
        }
    }
    out.join("/")
}

impl TemplateSource for MemorySource {
    fn is_dir(&self, path: &str) -> bool {
        let dir = normalize(path);
        if dir.is_empty() {
            return true;
        }
        let prefix = format!("{dir}/");
        self.files.read().keys().any(|k| k.starts_with(&prefix))
    }

    fn is_file(&self, path: &str) -> bool {
        self.files.read().contains_key(&normalize(path))
    }

    fn list(&self, path: &str) -> Vec<String> {
        let dir = normalize(path);
        let prefix = if dir.is_empty() { String::new() } else { format!("{dir}/") };
        let mut names: Vec<String> = self
            .files
            .read()
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(str::to_owned)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn read(&self, path: &str) -> ViewResult<String> {
        self.files
            .read()
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| ViewError::Io {
                path: path.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such template"),
            })
    }
}

/// Searches view paths for templates.
#[derive(Debug)]
pub struct ViewFinder {
    view_paths: Vec<String>,
    source: Box<dyn TemplateSource>,
}

impl ViewFinder {
    /// Creates a finder over `view_paths`, each joined to `root`.
    #[must_use]
    pub fn new(root: &str, view_paths: &[String], source: Box<dyn TemplateSource>) -> Self {
        let view_paths = view_paths.iter().map(|p| join(root, p)).collect();
        Self { view_paths, source }
    }

    /// Resolved view paths, in search order.
    #[must_use]
    pub fn view_paths(&self) -> &[String] {
        &self.view_paths
    }

    /// Searches `template` for `view`, falling back to the shared folder.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::TemplateNotFound`] listing every candidate.
    pub fn find_view(&self, view: &str, template: &str, partial: bool) -> ViewResult<FoundTemplate> {
        let mut candidates = Vec::new();
        for base in &self.view_paths {
            for prefix in [view, ""] {
                let dir = join(base, prefix);
                let names = if partial {
                    [format!("_{template}"), template.to_owned()]
                } else {
                    [template.to_owned(), view.to_owned()]
                };
                for name in &names {
                    if let Some(location) = self.check_file(&dir, name, &mut candidates) {
                        return Ok(found(location, view, template));
                    }
                }
            }
        }
        tracing::debug!(view, template, checked = candidates.len(), "template not found");
        Err(ViewError::TemplateNotFound {
            view: view.to_owned(),
            template: template.to_owned(),
            candidates,
        })
    }

    /// Searches `template` next to the template currently rendering.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::TemplateNotFound`] listing every candidate.
    pub fn find_in_folder(&self, dir: &str, template: &str, partial: bool) -> ViewResult<FoundTemplate> {
        let mut candidates = Vec::new();
        let names = if partial {
            vec![format!("_{template}"), template.to_owned()]
        } else {
            vec![template.to_owned()]
        };
        for name in &names {
            if let Some(location) = self.check_file(dir, name, &mut candidates) {
                return Ok(found(location, dir, template));
            }
        }
        Err(ViewError::TemplateNotFound {
            view: dir.to_owned(),
            template: template.to_owned(),
            candidates,
        })
    }

    /// Checks a file path given directly; formats come from its extensions.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::TemplateNotFound`] if the file does not exist.
    pub fn find_file(&self, path: &str) -> ViewResult<FoundTemplate> {
        if self.source.is_file(path) {
            return Ok(found(path.to_owned(), "", path));
        }
        Err(ViewError::TemplateNotFound {
            view: String::new(),
            template: path.to_owned(),
            candidates: vec![path.to_owned()],
        })
    }

    /// Reads the content of a located template.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::Io`] if the source cannot read it.
    pub fn read(&self, location: &str) -> ViewResult<String> {
        self.source.read(location)
    }

    fn check_file(&self, dir: &str, name: &str, candidates: &mut Vec<String>) -> Option<String> {
        if !self.source.is_dir(dir) {
            return None;
        }
        let exact = join(dir, name);
        candidates.push(exact.clone());
        if self.source.is_file(&exact) {
            return Some(exact);
        }
        candidates.push(format!("{exact}.*"));
        let prefix = format!("{name}.");
        self.source
            .list(dir)
            .into_iter()
            .find(|entry| entry.starts_with(&prefix) && !entry.ends_with('~'))
            .map(|entry| join(dir, &entry))
            .filter(|path| self.source.is_file(path))
    }
}

fn found(location: String, view: &str, template: &str) -> FoundTemplate {
    FoundTemplate {
        formats: formats_of(&location),
        location,
        view: view.to_owned(),
        template: template.to_owned(),
    }
}

/// Reversed extensions of `path`: `a/x.html.erb` → `[".erb", ".html"]`.
#[must_use]
pub fn formats_of(path: &str) -> Vec<String> {
    let file = path.rsplit('/').next().unwrap_or(path);
    let mut parts = file.split('.');
    parts.next();
    let mut formats: Vec<String> = parts.filter(|p| !p.is_empty()).map(|p| format!(".{p}")).collect();
    formats.reverse();
    formats
}

/// Directory of a template location.
#[must_use]
pub fn dir_of(location: &str) -> String {
    location
        .rsplit_once('/')
        .map(|(dir, _)| dir.to_owned())
        .unwrap_or_default()
}

fn join(base: &str, part: &str) -> String {
    if part.is_empty() {
        return base.to_owned();
    }
    if base.is_empty() || base == "." || Path::new(part).is_absolute() {
        return part.to_owned();
    }
    PathBuf::from(base).join(part).to_string_lossy().into_owned()
}
