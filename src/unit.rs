use std::path::{Path, PathBuf};

use url::Url;

use crate::error::ConsolidationError;

/// What the user asked to bind: a directory of files or a documentation site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Directory(PathBuf),
    Site(Url),
}

impl Target {
    /// Anything containing `://` must be a valid URL; everything else is a
    /// directory that has to exist.
    pub fn parse(input: &str) -> Result<Self, ConsolidationError> {
        if input.contains("://") {
            let url = Url::parse(input).map_err(|source| ConsolidationError::InvalidUrl {
                input: input.to_string(),
                source,
            })?;
            return Ok(Target::Site(url));
        }

        let path = PathBuf::from(input);
        if !path.exists() {
            return Err(ConsolidationError::RootNotFound(path));
        }
        if !path.is_dir() {
            return Err(ConsolidationError::NotADirectory(path));
        }
        Ok(Target::Directory(path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSource {
    /// Path relative to the enumeration root.
    File(PathBuf),
    Page(Url),
}

/// One content item to merge. Ordinals are assigned once by the enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub identity: String,
    pub ordinal: usize,
    pub display_label: String,
    pub source: UnitSource,
}

impl Unit {
    pub fn file(ordinal: usize, relative: &Path, display_label: String) -> Self {
        Self {
            identity: slash_path(relative),
            ordinal,
            display_label,
            source: UnitSource::File(relative.to_path_buf()),
        }
    }

    pub fn page(ordinal: usize, url: Url, display_label: String) -> Self {
        Self {
            identity: url.to_string(),
            ordinal,
            display_label,
            source: UnitSource::Page(url),
        }
    }

    pub fn section_anchor(&self) -> String {
        section_anchor(self.ordinal)
    }

    /// TOC nesting level: the number of path separators in the label.
    pub fn depth(&self) -> usize {
        self.display_label.matches('/').count()
    }
}

pub fn section_anchor(ordinal: usize) -> String {
    format!("section-{}", ordinal)
}

/// Joins path components with `/` regardless of platform.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_argument_becomes_site() {
        let target = Target::parse("https://example.com/docs/").unwrap();
        assert_eq!(
            target,
            Target::Site(Url::parse("https://example.com/docs/").unwrap())
        );
    }

    #[test]
    fn malformed_url_is_rejected() {
        let err = Target::parse("http://exa mple.com").unwrap_err();
        assert!(matches!(err, ConsolidationError::InvalidUrl { .. }));
    }

    #[test]
    fn missing_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = Target::parse(missing.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConsolidationError::RootNotFound(p) if p == missing));
    }

    #[test]
    fn regular_file_is_not_a_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mdx");
        std::fs::write(&file, "# A").unwrap();

        let err = Target::parse(file.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConsolidationError::NotADirectory(p) if p == file));
    }

    #[test]
    fn anchor_and_depth() {
        let unit = Unit::file(2, Path::new("b/d.mdx"), "b/d".to_string());
        assert_eq!(unit.identity, "b/d.mdx");
        assert_eq!(unit.section_anchor(), "section-2");
        assert_eq!(unit.depth(), 1);
    }
}
