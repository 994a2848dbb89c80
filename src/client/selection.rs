//! Image selection: filtering, deduplication, caps and previews.

use crate::error::{ImageForgeError, Result};
use crate::image::encode::to_data_url;
use crate::image::ImageFormat;
use std::collections::HashSet;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Default maximum number of images in a selection.
pub const MAX_FILES: usize = 10;

/// Default byte budget for a whole selection (20 MiB).
pub const MAX_TOTAL_BYTES: u64 = 20 * 1024 * 1024;

/// Identity of a selected file: name, size and last-modified time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileKey {
    /// File name as reported by the picker.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last-modified time, milliseconds since the Unix epoch.
    pub last_modified: i64,
}

impl std::fmt::Display for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.name, self.size, self.last_modified)
    }
}

/// A file picked or dropped by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// File name.
    pub name: String,
    /// Last-modified time, milliseconds since the Unix epoch.
    pub last_modified: i64,
    /// MIME type declared by the source, if any.
    pub mime_type: Option<String>,
    /// File contents.
    pub data: Vec<u8>,
}

impl SelectedFile {
    /// Creates a file entry from in-memory contents.
    pub fn new(
        name: impl Into<String>,
        last_modified: i64,
        mime_type: Option<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            last_modified,
            mime_type,
            data,
        }
    }

    /// Reads a file from disk, guessing its MIME type from content and extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let metadata = std::fs::metadata(path)?;

        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mime_type = ImageFormat::from_magic_bytes(&data)
            .or_else(|| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .and_then(ImageFormat::from_extension)
            })
            .map(|f| f.mime_type().to_string());

        Ok(Self::new(name, last_modified, mime_type, data))
    }

    /// Returns the size of the file in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Returns the identity key used for deduplication.
    pub fn key(&self) -> FileKey {
        FileKey {
            name: self.name.clone(),
            size: self.size(),
            last_modified: self.last_modified,
        }
    }

    /// Returns the image format detected from the file contents.
    ///
    /// This is the same detection the upload route applies, so a file with no
    /// format here would be refused by the server.
    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::from_magic_bytes(&self.data)
    }

    /// Returns true if the file is an image the upload route accepts.
    ///
    /// The contents must be a recognised format. A declared MIME type, when
    /// present, must also be an `image/` type.
    pub fn is_image(&self) -> bool {
        let declared_ok = match self.mime_type.as_deref() {
            Some(mime) if !mime.is_empty() => mime.to_lowercase().starts_with("image/"),
            _ => true,
        };
        declared_ok && self.format().is_some()
    }

    /// Returns the MIME type to send with this file.
    pub fn effective_mime_type(&self) -> &str {
        match self.mime_type.as_deref() {
            Some(mime) if !mime.is_empty() => mime,
            _ => self
                .format()
                .map(|f| f.mime_type())
                .unwrap_or("application/octet-stream"),
        }
    }
}

/// A displayable preview of a selected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    /// Key of the file this preview belongs to.
    pub key: FileKey,
    /// `data:` URL of the file contents.
    pub url: String,
}

/// How new files combine with the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Discard the current selection.
    #[default]
    Replace,
    /// Keep the current selection and add the new files after it.
    Append,
}

/// Count and byte caps for a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionLimits {
    /// Maximum number of files.
    pub max_files: usize,
    /// Maximum combined size in bytes.
    pub max_total_bytes: u64,
}

impl Default for SelectionLimits {
    fn default() -> Self {
        Self {
            max_files: MAX_FILES,
            max_total_bytes: MAX_TOTAL_BYTES,
        }
    }
}

/// What happened to a batch of files offered to the selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionReport {
    /// Number of files in the selection after the update.
    pub accepted: usize,
    /// Files dropped because they were not images.
    pub skipped_non_images: usize,
    /// Files dropped as duplicates of an earlier entry.
    pub duplicates_removed: usize,
    /// Files dropped by the count cap.
    pub truncated: usize,
    /// Message to show the user, if anything was dropped by the cap.
    pub warning: Option<String>,
}

/// The user's currently chosen images pending submission.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    files: Vec<SelectedFile>,
    previews: Vec<Preview>,
    limits: SelectionLimits,
}

impl SelectionSet {
    /// Creates an empty selection with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty selection with custom limits.
    pub fn with_limits(limits: SelectionLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Offers new files to the selection.
    ///
    /// Non-images are dropped, duplicates removed (first occurrence wins) and
    /// the result truncated to the count cap. If the combined size exceeds
    /// the byte budget nothing changes and [`ImageForgeError::SelectionTooLarge`] is
    /// returned.
    pub fn apply(
        &mut self,
        files: impl IntoIterator<Item = SelectedFile>,
        mode: SelectionMode,
    ) -> Result<SelectionReport> {
        let mut report = SelectionReport::default();

        let incoming: Vec<SelectedFile> = files
            .into_iter()
            .filter(|f| {
                let keep = f.is_image();
                if !keep {
                    report.skipped_non_images += 1;
                }
                keep
            })
            .collect();

        let mut merged = match mode {
            SelectionMode::Append => self.files.clone(),
            SelectionMode::Replace => Vec::new(),
        };
        merged.extend(incoming);

        let mut seen = HashSet::new();
        let before_dedup = merged.len();
        merged.retain(|f| seen.insert(f.key()));
        report.duplicates_removed = before_dedup - merged.len();

        if merged.len() > self.limits.max_files {
            report.truncated = merged.len() - self.limits.max_files;
            merged.truncate(self.limits.max_files);
            report.warning = Some(format!(
                "You can select up to {} images. Only the first {} were kept.",
                self.limits.max_files, self.limits.max_files
            ));
        }

        let total: u64 = merged.iter().map(SelectedFile::size).sum();
        if total > self.limits.max_total_bytes {
            tracing::warn!(total, limit = self.limits.max_total_bytes, "selection rejected");
            return Err(ImageForgeError::SelectionTooLarge {
                total,
                limit: self.limits.max_total_bytes,
            });
        }

        report.accepted = merged.len();
        self.files = merged;
        self.regenerate_previews();
        Ok(report)
    }

    /// Removes the file with the given key. Returns true if it was present.
    pub fn remove(&mut self, key: &FileKey) -> bool {
        let before = self.files.len();
        self.files.retain(|f| &f.key() != key);
        let removed = self.files.len() != before;
        if removed {
            self.regenerate_previews();
        }
        removed
    }

    /// Empties the selection.
    pub fn clear(&mut self) {
        self.files.clear();
        self.previews.clear();
    }

    /// Returns the selected files in order.
    pub fn files(&self) -> &[SelectedFile] {
        &self.files
    }

    /// Returns one preview per selected file, in order.
    pub fn previews(&self) -> &[Preview] {
        &self.previews
    }

    /// Returns the configured limits.
    pub fn limits(&self) -> SelectionLimits {
        self.limits
    }

    /// Number of selected files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Combined size of the selected files in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(SelectedFile::size).sum()
    }

    fn regenerate_previews(&mut self) {
        self.previews = self
            .files
            .iter()
            .map(|f| Preview {
                key: f.key(),
                url: to_data_url(f.effective_mime_type(), &f.data),
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn image(name: &str, size: usize) -> SelectedFile {
        let mut data = PNG_MAGIC.to_vec();
        data.resize(size.max(PNG_MAGIC.len()), 0);
        SelectedFile::new(name, 1_700_000_000_000, Some("image/png".into()), data)
    }

    fn names(set: &SelectionSet) -> Vec<&str> {
        set.files().iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_replace_filters_non_images() {
        let mut set = SelectionSet::new();
        let text = SelectedFile::new("notes.txt", 1, Some("text/plain".into()), b"hi".to_vec());

        let report = set
            .apply([image("a.png", 20), text], SelectionMode::Replace)
            .unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(report.skipped_non_images, 1);
        assert_eq!(names(&set), vec!["a.png"]);
        assert_eq!(set.previews().len(), 1);
        assert!(set.previews()[0].url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_untyped_files_are_sniffed() {
        let sniffed = SelectedFile::new("blob", 1, None, PNG_MAGIC.to_vec());
        let by_name_only = SelectedFile::new("photo.JPG", 1, None, vec![0; 4]);
        let unknown = SelectedFile::new("data.bin", 1, None, vec![0; 20]);

        assert!(sniffed.is_image());
        assert!(!by_name_only.is_image());
        assert!(!unknown.is_image());
        assert_eq!(sniffed.effective_mime_type(), "image/png");
    }

    #[test]
    fn test_declared_image_types_must_be_recognised() {
        let heic = SelectedFile::new(
            "IMG_0001.HEIC",
            1,
            Some("image/heic".into()),
            b"\0\0\0\x18ftypheic\0\0\0\0mdat".to_vec(),
        );
        let avif = SelectedFile::new(
            "pic.avif",
            1,
            Some("image/avif".into()),
            b"\0\0\0\x1cftypavif\0\0\0\0mdat".to_vec(),
        );
        let svg = SelectedFile::new(
            "logo.svg",
            1,
            Some("image/svg+xml".into()),
            b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>".to_vec(),
        );
        let mislabeled = SelectedFile::new("a.png", 1, Some("text/plain".into()), PNG_MAGIC.to_vec());

        assert!(heic.is_image());
        assert_eq!(heic.format(), Some(ImageFormat::Heic));
        assert!(!avif.is_image());
        assert!(!svg.is_image());
        assert!(!mislabeled.is_image());

        let mut set = SelectionSet::new();
        let report = set
            .apply([heic, avif, svg], SelectionMode::Replace)
            .unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.skipped_non_images, 2);
        assert_eq!(names(&set), vec!["IMG_0001.HEIC"]);
    }

    #[test]
    fn test_append_merges_and_dedupes() {
        let mut set = SelectionSet::new();
        set.apply([image("a.png", 20), image("b.png", 20)], SelectionMode::Replace)
            .unwrap();

        let report = set
            .apply([image("b.png", 20), image("c.png", 20)], SelectionMode::Append)
            .unwrap();

        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(names(&set), vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn test_same_name_different_size_is_distinct() {
        let mut set = SelectionSet::new();
        set.apply([image("a.png", 20), image("a.png", 30)], SelectionMode::Replace)
            .unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_replace_discards_previous_selection() {
        let mut set = SelectionSet::new();
        set.apply([image("a.png", 20)], SelectionMode::Replace).unwrap();
        set.apply([image("b.png", 20)], SelectionMode::Replace).unwrap();
        assert_eq!(names(&set), vec!["b.png"]);
    }

    #[test]
    fn test_over_count_truncates_with_warning() {
        let mut set = SelectionSet::new();
        let files: Vec<_> = (0..MAX_FILES + 3)
            .map(|i| image(&format!("{i}.png"), 20))
            .collect();

        let report = set.apply(files, SelectionMode::Replace).unwrap();

        assert_eq!(set.len(), MAX_FILES);
        assert_eq!(report.truncated, 3);
        assert!(report.warning.unwrap().contains(&MAX_FILES.to_string()));
        assert_eq!(set.files()[0].name, "0.png");
        assert_eq!(set.previews().len(), MAX_FILES);
    }

    #[test]
    fn test_over_budget_rejects_and_keeps_prior_selection() {
        let mut set = SelectionSet::with_limits(SelectionLimits {
            max_files: 5,
            max_total_bytes: 100,
        });
        set.apply([image("keep.png", 40)], SelectionMode::Replace)
            .unwrap();

        let err = set
            .apply([image("big1.png", 60), image("big2.png", 60)], SelectionMode::Replace)
            .unwrap_err();

        assert!(matches!(
            err,
            ImageForgeError::SelectionTooLarge {
                total: 120,
                limit: 100
            }
        ));
        assert_eq!(names(&set), vec!["keep.png"]);
        assert_eq!(set.previews().len(), 1);
    }

    #[test]
    fn test_append_over_budget_counts_existing_files() {
        let mut set = SelectionSet::with_limits(SelectionLimits {
            max_files: 5,
            max_total_bytes: 100,
        });
        set.apply([image("a.png", 60)], SelectionMode::Replace).unwrap();

        assert!(set
            .apply([image("b.png", 50)], SelectionMode::Append)
            .is_err());
        assert_eq!(set.total_bytes(), 60);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut set = SelectionSet::new();
        set.apply([image("a.png", 20), image("b.png", 20)], SelectionMode::Replace)
            .unwrap();

        let key = set.files()[0].key();
        assert!(set.remove(&key));
        assert!(!set.remove(&key));
        assert_eq!(names(&set), vec!["b.png"]);
        assert_eq!(set.previews().len(), 1);

        set.clear();
        assert!(set.is_empty());
        assert!(set.previews().is_empty());
    }

    #[test]
    fn test_from_path_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, PNG_MAGIC).unwrap();

        let file = SelectedFile::from_path(&path).unwrap();
        assert_eq!(file.name, "shot.png");
        assert_eq!(file.size(), 12);
        assert_eq!(file.mime_type.as_deref(), Some("image/png"));
        assert!(file.last_modified > 0);
        assert_eq!(file.key().to_string(), format!("shot.png-12-{}", file.last_modified));
    }
}
