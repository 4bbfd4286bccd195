//! Directory-to-document serializer.
//!
//! Walks an extracted project in sorted order and produces one markdown document: a header, a
//! box-drawing tree of the project, and one section per file. Text files (by extension
//! allow-list) are embedded in fenced blocks; everything else gets a placeholder.
//!
//! A single pre-order traversal feeds both the tree and the file sections, so the two always
//! agree on order and an unchanged tree serializes byte-identically.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Infrastructure and tooling directories that never end up in a document.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".idea",
    ".vscode",
    ".vs",
    "venv",
    "env",
    "node_modules",
    "__pycache__",
    "dist",
    "build",
    "bin",
    "obj",
    "target",
    "DerivedData",
    "Archives",
    "Artifacts",
    "Intermediate",
    "Saved",
    "DerivedDataCache",
];

/// Extensions read as text and embedded verbatim.
pub const DEFAULT_TEXT_EXTENSIONS: &[&str] = &[
    ".py",
    ".java",
    ".c",
    ".cpp",
    ".h",
    ".hpp",
    ".cs",
    ".js",
    ".ts",
    ".jsx",
    ".tsx",
    ".html",
    ".css",
    ".scss",
    ".less",
    ".json",
    ".xml",
    ".yaml",
    ".yml",
    ".toml",
    ".md",
    ".txt",
    ".sh",
    ".bat",
    ".ps1",
    ".lua",
    ".sql",
    ".ini",
    ".cfg",
    ".conf",
    ".gradle",
    ".properties",
    ".dockerfile",
    ".cmake",
    ".rs",
    ".go",
];

/// Extension-less build files that are text whatever their case.
pub const DEFAULT_TEXT_FILE_NAMES: &[&str] = &["dockerfile", "makefile"];

const HEADER_NOTE: &str = "> This file was automatically generated for AI code analysis.\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOptions {
    pub ignore_dirs: BTreeSet<String>,
    /// Lower-case, dot-prefixed.
    pub text_extensions: BTreeSet<String>,
    /// Lower-case file names.
    pub text_file_names: BTreeSet<String>,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            ignore_dirs: DEFAULT_IGNORE_DIRS.iter().map(|s| s.to_string()).collect(),
            text_extensions: DEFAULT_TEXT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            text_file_names: DEFAULT_TEXT_FILE_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DocumentOptions {
    pub fn with_ignore_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Accepts `kt`, `.kt` or `.KT` alike.
    pub fn with_text_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.text_extensions.extend(extensions.into_iter().map(|ext| {
            let ext = ext.as_ref().trim_start_matches('.').to_lowercase();
            format!(".{ext}")
        }));
        self
    }

    /// Language hint for a text file, `None` for assets.
    pub fn classify(&self, file_name: &str) -> Option<String> {
        let lower = file_name.to_lowercase();
        if self.text_file_names.contains(&lower) {
            return Some(lower);
        }
        let ext = Path::new(&lower).extension()?.to_str()?;
        let dotted = format!(".{ext}");
        self.text_extensions
            .contains(&dotted)
            .then(|| ext.to_string())
    }
}

/// The serialized form of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDocument {
    pub project_name: String,
    pub text: String,
    /// Text files embedded with their content.
    pub embedded_files: usize,
    /// Non-text files and symbolic links, listed without content.
    pub skipped_assets: usize,
    pub read_errors: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("cannot read project directory {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write document {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Serialize `project_root` with the default options and write the document to `output_path`.
pub fn serialize(project_root: &Path, output_path: &Path) -> Result<ProjectDocument, DocumentError> {
    serialize_with(project_root, output_path, &DocumentOptions::default())
}

pub fn serialize_with(
    project_root: &Path,
    output_path: &Path,
    options: &DocumentOptions,
) -> Result<ProjectDocument, DocumentError> {
    let document = render(project_root, options)?;

    let write_error = |source| DocumentError::Write {
        path: output_path.to_path_buf(),
        source,
    };
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(output_path, &document.text).map_err(write_error)?;

    info!(
        project = %document.project_name,
        output = %output_path.display(),
        embedded = document.embedded_files,
        skipped = document.skipped_assets,
        read_errors = document.read_errors,
        "Wrote project document"
    );
    Ok(document)
}

/// Build the document for `project_root` without writing it anywhere.
pub fn render(project_root: &Path, options: &DocumentOptions) -> Result<ProjectDocument, DocumentError> {
    let project_name = project_name(project_root);
    debug!(root = %project_root.display(), project = %project_name, "Serializing project");

    let entries = sorted_entries(project_root, options).map_err(|source| DocumentError::Unreadable {
        path: project_root.to_path_buf(),
        source,
    })?;

    let mut builder = DocumentBuilder {
        root: project_root,
        options,
        tree: String::new(),
        contents: String::new(),
        embedded_files: 0,
        skipped_assets: 0,
        read_errors: 0,
    };
    builder.visit_entries(&entries, "");

    let mut text = String::with_capacity(builder.tree.len() + builder.contents.len() + 256);
    text.push_str(&format!("# Project Context: {project_name}\n"));
    text.push_str(HEADER_NOTE);
    text.push_str("## 1. Project Structure\n");
    text.push_str("```text\n");
    text.push_str(&builder.tree);
    text.push_str("```\n\n");
    text.push_str("## 2. File Contents\n");
    text.push_str(&builder.contents);

    debug!(
        project = %project_name,
        embedded = builder.embedded_files,
        "Serialized project"
    );
    Ok(ProjectDocument {
        project_name,
        text,
        embedded_files: builder.embedded_files,
        skipped_assets: builder.skipped_assets,
        read_errors: builder.read_errors,
    })
}

fn project_name(project_root: &Path) -> String {
    let resolved = fs::canonicalize(project_root).unwrap_or_else(|_| project_root.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| resolved.display().to_string())
}

struct Entry {
    name: String,
    path: PathBuf,
    is_dir: bool,
    /// Links are listed but never followed, so nothing outside the root is read.
    is_symlink: bool,
}

fn sorted_entries(dir: &Path, options: &DocumentOptions) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type()?;
        let is_dir = file_type.is_dir();
        if is_dir && options.ignore_dirs.contains(&name) {
            continue;
        }
        entries.push(Entry {
            name,
            path: entry.path(),
            is_dir,
            is_symlink: file_type.is_symlink(),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

struct DocumentBuilder<'a> {
    root: &'a Path,
    options: &'a DocumentOptions,
    tree: String,
    contents: String,
    embedded_files: usize,
    skipped_assets: usize,
    read_errors: usize,
}

impl DocumentBuilder<'_> {
    fn visit_entries(&mut self, entries: &[Entry], prefix: &str) {
        for (i, entry) in entries.iter().enumerate() {
            let is_last = i + 1 == entries.len();
            let connector = if is_last { "└── " } else { "├── " };
            self.tree.push_str(prefix);
            self.tree.push_str(connector);
            self.tree.push_str(&entry.name);
            self.tree.push('\n');

            if entry.is_dir {
                let guide = if is_last { "    " } else { "│   " };
                self.visit_dir(&entry.path, &format!("{prefix}{guide}"));
            } else {
                self.push_file(entry);
            }
        }
    }

    fn visit_dir(&mut self, dir: &Path, prefix: &str) {
        match sorted_entries(dir, self.options) {
            Ok(entries) => self.visit_entries(&entries, prefix),
            Err(e) => {
                warn!(error = ?e, path = %dir.display(), "Cannot list directory, skipping");
                let note = if e.kind() == io::ErrorKind::PermissionDenied {
                    "[Permission Denied]".to_string()
                } else {
                    format!("[Unreadable: {e}]")
                };
                self.tree.push_str(&format!("{prefix}└── {note}\n"));
            }
        }
    }

    fn push_file(&mut self, entry: &Entry) {
        let rel_path = relative_path(self.root, &entry.path);
        if entry.is_symlink {
            debug!(path = %entry.path.display(), "Not following symbolic link");
            self.contents
                .push_str(&format!("\n### File: `{rel_path}` (Symlink)\n"));
            self.contents.push_str("> Content skipped (Symbolic link)\n");
            self.skipped_assets += 1;
            return;
        }
        match self.options.classify(&entry.name) {
            Some(hint) => match fs::read_to_string(&entry.path) {
                Ok(content) => {
                    self.contents.push_str(&format!("\n### File: `{rel_path}`\n"));
                    self.contents.push_str(&format!("```{hint}\n"));
                    self.contents.push_str(&content);
                    self.contents.push_str("\n```\n");
                    self.contents.push_str("---\n");
                    self.embedded_files += 1;
                }
                Err(e) => {
                    warn!(error = %e, path = %entry.path.display(), "Failed to read text file");
                    self.contents
                        .push_str(&format!("\n### File: `{rel_path}` (Read Error)\n"));
                    self.contents.push_str(&format!("> Error reading file: {e}\n"));
                    self.read_errors += 1;
                }
            },
            None => {
                self.contents
                    .push_str(&format!("\n### File: `{rel_path}` (Binary/Asset)\n"));
                self.contents.push_str("> Content skipped (Non-text file)\n");
                self.skipped_assets += 1;
            }
        }
    }
}

/// `/`-separated path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
