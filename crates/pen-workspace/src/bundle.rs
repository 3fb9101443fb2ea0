//! Fragment file import and export
//!
//! A bundle is a directory with `index.html`, `style.css` and `script.js`.
//! Import accepts any files and routes them by extension.

use crate::error::WorkspaceError;
use pen_preview::{FragmentKind, FragmentSet};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Fragments read from files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Import {
    /// Text per kind and the file it came from
    pub fragments: BTreeMap<FragmentKind, (PathBuf, String)>,
    /// Files with an unrecognized extension
    pub skipped: Vec<PathBuf>,
}

impl Import {
    /// True if no file was recognized
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Imported text for a kind
    #[must_use]
    pub fn get(&self, kind: FragmentKind) -> Option<&str> {
        self.fragments.get(&kind).map(|(_, text)| text.as_str())
    }

    /// Kinds and texts in document order
    pub fn edits(&self) -> impl Iterator<Item = (FragmentKind, &str)> + '_ {
        self.fragments
            .iter()
            .map(|(kind, (_, text))| (*kind, text.as_str()))
    }

    /// Overlay imported fragments on `current`
    #[must_use]
    pub fn apply_to(&self, current: &FragmentSet) -> FragmentSet {
        self.edits()
            .fold(current.clone(), |set, (kind, text)| set.with(kind, text))
    }
}

/// Read fragment files
///
/// `.html`, `.css` and `.js` files map to markup, style and script. Other
/// files are skipped. When two files map to the same kind the later wins.
///
/// # Errors
/// Returns `WorkspaceError::Io` if a recognized file cannot be read
pub async fn import<P: AsRef<Path>>(paths: &[P]) -> Result<Import, WorkspaceError> {
    let mut imported = Import::default();
    for path in paths {
        let path = path.as_ref();
        let Some(kind) = FragmentKind::from_path(path) else {
            tracing::warn!("Skipping {}: not an html, css or js file", path.display());
            imported.skipped.push(path.to_path_buf());
            continue;
        };

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| WorkspaceError::io_error(path, e))?;
        if let Some((previous, _)) = imported
            .fragments
            .insert(kind, (path.to_path_buf(), text))
        {
            tracing::debug!("{} replaces {} for {}", path.display(), previous.display(), kind);
        }
    }
    Ok(imported)
}

/// Write the three fragments into `dir`
///
/// Creates `dir` if needed and returns the written paths.
///
/// # Errors
/// Returns `WorkspaceError::Io` if the directory or a file cannot be written
pub async fn export(fragments: &FragmentSet, dir: &Path) -> Result<Vec<PathBuf>, WorkspaceError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| WorkspaceError::io_error(dir, e))?;

    let mut written = Vec::with_capacity(FragmentKind::ALL.len());
    for kind in FragmentKind::ALL {
        let path = dir.join(kind.file_name());
        tokio::fs::write(&path, fragments.get(kind))
            .await
            .map_err(|e| WorkspaceError::io_error(&path, e))?;
        written.push(path);
    }
    tracing::info!("Exported bundle to {}", dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_overlays_only_imported_kinds() {
        let mut imported = Import::default();
        imported
            .fragments
            .insert(FragmentKind::Style, (PathBuf::from("a.css"), "b{}".to_string()));
        let current = FragmentSet::new("<p>", "p{}", "x()");
        assert_eq!(imported.apply_to(&current), FragmentSet::new("<p>", "b{}", "x()"));
    }

    #[tokio::test]
    async fn missing_recognized_file_is_an_error() {
        let result = import(&[Path::new("/nonexistent/app.js")]).await;
        assert!(matches!(result, Err(WorkspaceError::Io { .. })));
    }

    #[tokio::test]
    async fn unrecognized_files_are_not_read() {
        let imported = import(&[Path::new("/nonexistent/readme.md")]).await.unwrap();
        assert!(imported.is_empty());
        assert_eq!(imported.skipped, vec![PathBuf::from("/nonexistent/readme.md")]);
    }
}
