use std::path::PathBuf;

use uuid::Uuid;

use crate::services::{ListOptions, DEFAULT_CONTAINER_BASE};

pub const DEFAULT_SOURCE_CONTENT: &str = "Hello, World!";
pub const DEFAULT_FILE_STEM: &str = "QuickStart";
pub const DOWNLOADED_SUFFIX: &str = "_DOWNLOADED";

/// Knobs for one quickstart run
#[derive(Debug, Clone)]
pub struct QuickstartOptions {
    /// Container base name; a UUID is appended
    pub container_base: String,
    /// Text written to the source file
    pub content: String,
    /// Source files are named `<file_stem>_<uuid>.txt`
    pub file_stem: String,
    /// Parent of the per-run scratch directory (system temp dir if unset)
    pub scratch_root: Option<PathBuf>,
    /// Check after cleanup that the container is really gone
    pub verify_teardown: bool,
    pub list_options: ListOptions,
}

impl Default for QuickstartOptions {
    fn default() -> Self {
        Self {
            container_base: DEFAULT_CONTAINER_BASE.to_string(),
            content: DEFAULT_SOURCE_CONTENT.to_string(),
            file_stem: DEFAULT_FILE_STEM.to_string(),
            scratch_root: None,
            verify_teardown: true,
            list_options: ListOptions::default(),
        }
    }
}

impl QuickstartOptions {
    pub fn with_container_base(mut self, base: impl Into<String>) -> Self {
        self.container_base = base.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn with_verify_teardown(mut self, verify: bool) -> Self {
        self.verify_teardown = verify;
        self
    }

    pub fn with_list_options(mut self, options: ListOptions) -> Self {
        self.list_options = options;
        self
    }

    pub(crate) fn scratch_root(&self) -> PathBuf {
        self.scratch_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// A fresh, unique source file name
    pub fn source_file_name(&self) -> String {
        format!("{}_{}.txt", self.file_stem, Uuid::new_v4())
    }
}

/// `name.ext` -> `name_DOWNLOADED.ext`; names without an extension get the
/// suffix appended
pub fn destination_file_name(source: &str) -> String {
    match source.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}{}.{}", stem, DOWNLOADED_SUFFIX, ext),
        _ => format!("{}{}", source, DOWNLOADED_SUFFIX),
    }
}
