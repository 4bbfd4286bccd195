//! Archive extraction with single-wrapper normalisation.
//!
//! Hosting providers wrap a repository snapshot in one top-level folder
//! (`owner-repo-<sha>/...`). When an archive has exactly one root item and it is a directory,
//! its contents are moved up so the repository's own files sit directly in the destination.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};
use uuid::Uuid;
use zip::result::ZipError;
use zip::ZipArchive;

/// Where an extracted project ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedProject {
    /// The extraction destination.
    pub root_path: PathBuf,
    /// The archive's single root item, folder or file. `None` for empty and multi-rooted
    /// archives.
    pub project_folder_name: Option<String>,
    /// Whether the wrapping folder was removed.
    pub flattened: bool,
}

impl ExtractedProject {
    /// Directory holding the project's own top-level files.
    ///
    /// A wrapped archive is flattened into the root and an unwrapped one is unpacked there as
    /// is, so this is always the root.
    pub fn project_dir(&self) -> &Path {
        &self.root_path
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("corrupt archive {path}: {source}")]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn corrupt(path: &Path) -> impl FnOnce(ZipError) -> Self + '_ {
        move |source| ExtractError::CorruptArchive {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Top-level shape of an archive, computed from entry names only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootLayout {
    Empty,
    /// Exactly one root item. `is_dir` is true when any entry is, or lies beneath, a directory
    /// with that name.
    Single { name: String, is_dir: bool },
    Multiple(BTreeSet<String>),
}

impl RootLayout {
    pub fn inspect<'a>(entry_names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut roots = BTreeSet::new();
        let mut dir_roots = BTreeSet::new();
        for raw in entry_names {
            let name = raw.trim_start_matches('/');
            let Some(first) = name.split('/').next().filter(|s| !s.is_empty()) else {
                continue;
            };
            if name.len() > first.len() {
                dir_roots.insert(first.to_string());
            }
            roots.insert(first.to_string());
        }

        match roots.len() {
            0 => RootLayout::Empty,
            1 => {
                let name = roots.into_iter().next().unwrap_or_default();
                let is_dir = dir_roots.contains(&name);
                RootLayout::Single { name, is_dir }
            }
            _ => RootLayout::Multiple(roots),
        }
    }

    /// Name of the only root item, whether or not it is a directory.
    pub fn root_item(&self) -> Option<&str> {
        match self {
            RootLayout::Single { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The wrapping folder to flatten, if the archive is single-rooted.
    pub fn wrapper(&self) -> Option<&str> {
        match self {
            RootLayout::Single { name, is_dir: true } => Some(name),
            _ => None,
        }
    }
}

/// Unpack `archive_path` into `destination_dir`, delete the archive and flatten a single
/// wrapping folder.
///
/// A corrupt archive is left on disk. If flattening fails the unpacked tree is left with its
/// wrapping folder in place.
pub fn extract(archive_path: &Path, destination_dir: &Path) -> Result<ExtractedProject, ExtractError> {
    info!(
        archive = %archive_path.display(),
        destination = %destination_dir.display(),
        "Extracting archive"
    );

    let file = File::open(archive_path).map_err(ExtractError::io(archive_path))?;
    let mut archive = ZipArchive::new(file).map_err(|e| {
        error!(error = %e, archive = %archive_path.display(), "Archive could not be read");
        ExtractError::corrupt(archive_path)(e)
    })?;

    let layout = RootLayout::inspect(archive.file_names());
    debug!(?layout, entries = archive.len(), "Inspected archive root items");

    fs::create_dir_all(destination_dir).map_err(ExtractError::io(destination_dir))?;
    if let Err(e) = archive.extract(destination_dir) {
        error!(error = %e, archive = %archive_path.display(), "Archive could not be unpacked");
        return Err(ExtractError::corrupt(archive_path)(e));
    }
    drop(archive);

    fs::remove_file(archive_path).map_err(ExtractError::io(archive_path))?;
    debug!(archive = %archive_path.display(), "Removed archive after extraction");

    let wrapper = layout.wrapper().map(str::to_string);
    if let Some(name) = &wrapper {
        flatten(destination_dir, name)?;
        info!(wrapper = %name, destination = %destination_dir.display(), "Flattened wrapping folder");
    } else {
        debug!(?layout, "Archive is not single-rooted, leaving layout untouched");
    }

    Ok(ExtractedProject {
        root_path: destination_dir.to_path_buf(),
        flattened: wrapper.is_some(),
        project_folder_name: layout.root_item().map(str::to_string),
    })
}

/// Move everything in `destination/wrapper` up into `destination` and remove `wrapper`.
///
/// The wrapper is renamed first so a child sharing its name can move up without a clash. Either
/// every child moves or none does: a name already taken in `destination` aborts before anything
/// moves, and a failed move puts the moved children back and restores the wrapper.
fn flatten(destination: &Path, wrapper: &str) -> Result<(), ExtractError> {
    let wrapper_path = destination.join(wrapper);
    let staging = destination.join(format!(".flatten-{}", Uuid::new_v4()));
    fs::rename(&wrapper_path, &staging).map_err(ExtractError::io(&wrapper_path))?;

    let children = match fs::read_dir(&staging).and_then(|entries| {
        entries
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<io::Result<Vec<_>>>()
    }) {
        Ok(children) => children,
        Err(e) => {
            restore_wrapper(&staging, &wrapper_path);
            return Err(ExtractError::io(&staging)(e));
        }
    };

    if let Some(taken) = children
        .iter()
        .map(|name| destination.join(name))
        .find(|to| fs::symlink_metadata(to).is_ok())
    {
        error!(path = %taken.display(), "Cannot flatten, name already exists in destination");
        restore_wrapper(&staging, &wrapper_path);
        return Err(ExtractError::Io {
            path: taken,
            source: io::Error::new(io::ErrorKind::AlreadyExists, "destination entry already exists"),
        });
    }

    for (moved, name) in children.iter().enumerate() {
        let from = staging.join(name);
        if let Err(e) = fs::rename(&from, destination.join(name)) {
            error!(error = %e, path = %from.display(), "Flatten failed, rolling back");
            for name in &children[..moved] {
                if let Err(e) = fs::rename(destination.join(name), staging.join(name)) {
                    error!(error = %e, entry = ?name, "Could not move entry back during rollback");
                }
            }
            restore_wrapper(&staging, &wrapper_path);
            return Err(ExtractError::io(&from)(e));
        }
    }

    fs::remove_dir(&staging).map_err(ExtractError::io(&staging))
}

fn restore_wrapper(staging: &Path, wrapper_path: &Path) {
    if let Err(e) = fs::rename(staging, wrapper_path) {
        error!(
            error = %e,
            staging = %staging.display(),
            wrapper = %wrapper_path.display(),
            "Could not restore wrapping folder"
        );
    }
}
