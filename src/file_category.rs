//! File categorization for the watched root.
//!
//! Maps a file extension to one of nine fixed categories and recognizes the
//! system-managed category folders that hold them.
//!
//! # Examples
//!
//! ```
//! use std::path::Path;
//! use tidywatch::file_category::{Category, FileMapper};
//!
//! let mapper = FileMapper::default();
//! assert_eq!(mapper.classify_name(Path::new("photo.HEIC"), false), Category::Images);
//! assert_eq!(mapper.classify_name(Path::new("report.pdf"), false), Category::Documents);
//! assert_eq!(mapper.classify_name(Path::new("Holiday"), true), Category::Folder);
//! ```
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Delimiter that wraps the name of a sentinel category folder, as in `*2024*`.
pub const SENTINEL: char = '*';

/// A broad file category, which is also the name of the folder it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Text, office and markup documents.
    Documents,
    /// Raster and vector images.
    Images,
    /// Audio files.
    Audio,
    /// Video files.
    Video,
    /// Compressed archives and packages.
    Archives,
    /// Electronic books.
    Ebooks,
    /// Executables, scripts, fonts, databases and the like.
    SoftwareAndOthers,
    /// Directories.
    Folder,
    /// Anything without a recognized extension.
    Unknown,
}

impl Category {
    /// Every category, in lookup priority order.
    pub const ALL: [Category; 9] = [
        Category::Documents,
        Category::Images,
        Category::Audio,
        Category::Video,
        Category::Archives,
        Category::Ebooks,
        Category::SoftwareAndOthers,
        Category::Folder,
        Category::Unknown,
    ];

    /// Returns the directory name for this category.
    ///
    /// # Examples
    ///
    /// ```
    /// use tidywatch::file_category::Category;
    ///
    /// assert_eq!(Category::Ebooks.dir_name(), "E-books");
    /// assert_eq!(Category::SoftwareAndOthers.dir_name(), "Software and Others");
    /// ```
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Documents => "Documents",
            Category::Images => "Images",
            Category::Audio => "Audio",
            Category::Video => "Video",
            Category::Archives => "Archives",
            Category::Ebooks => "E-books",
            Category::SoftwareAndOthers => "Software and Others",
            Category::Folder => "Folder",
            Category::Unknown => "Unknown",
        }
    }

    /// Parses a directory name back into its category. Matching is exact.
    pub fn from_dir_name(name: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.dir_name() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Identity of a system-managed folder, derived once from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderTag {
    /// A `*`-wrapped name such as `*2024*`; holds the text between the markers.
    Sentinel(String),
    /// One of the fixed category names.
    Named(Category),
}

impl FolderTag {
    /// Classifies a folder name. Returns `None` for folders the system must
    /// leave alone.
    ///
    /// # Examples
    ///
    /// ```
    /// use tidywatch::file_category::{Category, FolderTag};
    ///
    /// assert_eq!(FolderTag::from_name("*2024*"), Some(FolderTag::Sentinel("2024".into())));
    /// assert_eq!(FolderTag::from_name("Audio"), Some(FolderTag::Named(Category::Audio)));
    /// assert_eq!(FolderTag::from_name("Projects"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<FolderTag> {
        // A lone marker both starts and ends with itself.
        if name.len() == SENTINEL.len_utf8() && name.starts_with(SENTINEL) {
            return Some(FolderTag::Sentinel(String::new()));
        }
        if let Some(inner) = name
            .strip_prefix(SENTINEL)
            .and_then(|rest| rest.strip_suffix(SENTINEL))
        {
            return Some(FolderTag::Sentinel(inner.to_string()));
        }
        Category::from_dir_name(name).map(FolderTag::Named)
    }

    /// Classifies the last component of `path`.
    pub fn from_path(path: &Path) -> Option<FolderTag> {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(FolderTag::from_name)
    }

    /// Wraps `inner` in sentinel markers.
    pub fn sentinel(inner: &str) -> String {
        format!("{SENTINEL}{inner}{SENTINEL}")
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, FolderTag::Sentinel(_))
    }
}

/// Maps file extensions to categories.
///
/// Lookups walk the categories in priority order, so an extension listed under
/// several categories (`pdf`, `svg`, `xml`, ...) resolves to the first one.
#[derive(Debug, Clone)]
pub struct FileMapper {
    tables: Vec<(Category, HashSet<String>)>,
}

impl FileMapper {
    /// Creates a new `FileMapper` with the standard table.
    pub fn new() -> Self {
        let mut mapper = Self {
            tables: Category::ALL
                .into_iter()
                .filter(|c| *c != Category::Unknown)
                .map(|c| (c, HashSet::new()))
                .collect(),
        };
        mapper.populate_standard_mappings();
        mapper
    }

    fn populate_standard_mappings(&mut self) {
        self.add_extensions(
            Category::Documents,
            &[
                "pdf", "docx", "doc", "odt", "rtf", "tex", "log", "msg", "wpd", "wps", "pptx",
                "ppt", "ods", "xlr", "xls", "xlsx", "key", "pps", "ai", "ps", "svg", "indd",
                "pct", "eps", "txt", "md", "html", "htm", "xhtml", "xml", "csv", "goodnotes",
            ],
        );
        self.add_extensions(
            Category::Images,
            &[
                "jpg", "jpeg", "png", "heic", "gif", "bmp", "tif", "tiff", "psd", "ai", "indd",
                "pct", "pdf", "eps", "svg", "ico",
            ],
        );
        self.add_extensions(
            Category::Audio,
            &[
                "mp3", "m4a", "wav", "aac", "wma", "flac", "alac", "ogg", "mid", "midi", "mpa",
                "cda", "aif",
            ],
        );
        self.add_extensions(
            Category::Video,
            &[
                "mp4", "m4v", "mov", "wmv", "avi", "avchd", "flv", "swf", "h264", "mkv", "3g2",
                "3gp", "rm", "vob", "webm",
            ],
        );
        self.add_extensions(
            Category::Archives,
            &[
                "zip", "rar", "7z", "tar", "gz", "arj", "deb", "pkg", "rpm", "tar.gz", "z", "bin",
            ],
        );
        self.add_extensions(
            Category::Ebooks,
            &["mobi", "epub", "azw", "azw3", "kf8", "fb2"],
        );
        self.add_extensions(
            Category::SoftwareAndOthers,
            &[
                "app", "exe", "dmg", "bat", "cgi", "pl", "com", "jar", "py", "wsf", "fnt", "fon",
                "otf", "ttf", "rom", "sav", "bak", "cfg", "ini", "prf", "torrent", "asp", "aspx",
                "cer", "cfm", "css", "htm", "html", "js", "jsp", "part", "php", "rss", "xhtml",
                "dat", "db", "dbf", "mdb", "sql", "tar", "xml",
            ],
        );
        self.add_extensions(Category::Folder, &["folder"]);
    }

    fn add_extensions(&mut self, category: Category, exts: &[&str]) {
        for ext in exts {
            self.add_extension_mapping(ext, category);
        }
    }

    /// Adds a file extension to a category. Priority between categories is
    /// unchanged. Mapping to `Unknown` is a no-op since it is the fallback.
    pub fn add_extension_mapping(&mut self, ext: &str, category: Category) {
        let ext = ext.trim_start_matches('.').to_lowercase();
        if let Some((_, set)) = self.tables.iter_mut().find(|(c, _)| *c == category) {
            set.insert(ext);
        }
    }

    /// Maps a file extension to the first category that lists it.
    ///
    /// # Examples
    ///
    /// ```
    /// use tidywatch::file_category::{Category, FileMapper};
    ///
    /// let mapper = FileMapper::default();
    /// assert_eq!(mapper.extension_to_category("SVG"), Some(Category::Documents));
    /// assert_eq!(mapper.extension_to_category("xyz"), None);
    /// ```
    pub fn extension_to_category(&self, ext: &str) -> Option<Category> {
        let ext = ext.to_lowercase();
        self.tables
            .iter()
            .find(|(_, set)| set.contains(&ext))
            .map(|(category, _)| *category)
    }

    /// Classifies a path that exists on disk. Directories are `Folder`.
    pub fn classify(&self, path: &Path) -> Category {
        self.classify_name(path, path.is_dir())
    }

    /// Classifies a path without touching the filesystem.
    pub fn classify_name(&self, path: &Path, is_dir: bool) -> Category {
        if is_dir {
            return Category::Folder;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.extension_to_category(ext))
            .unwrap_or(Category::Unknown)
    }
}

impl Default for FileMapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_category_dir_names_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_dir_name(category.dir_name()), Some(category));
        }
        assert_eq!(Category::from_dir_name("documents"), None);
    }

    #[test]
    fn test_shared_extensions_follow_priority() {
        let mapper = FileMapper::default();
        for ext in ["pdf", "svg", "ai", "eps", "indd", "pct"] {
            assert_eq!(mapper.extension_to_category(ext), Some(Category::Documents));
        }
        for ext in ["html", "htm", "xhtml", "xml"] {
            assert_eq!(mapper.extension_to_category(ext), Some(Category::Documents));
        }
        assert_eq!(mapper.extension_to_category("tar"), Some(Category::Archives));
        assert_eq!(
            mapper.extension_to_category("py"),
            Some(Category::SoftwareAndOthers)
        );
    }

    #[test]
    fn test_standard_table_samples() {
        let mapper = FileMapper::default();
        let cases = [
            ("heic", Category::Images),
            ("mp3", Category::Audio),
            ("mkv", Category::Video),
            ("7z", Category::Archives),
            ("epub", Category::Ebooks),
            ("dmg", Category::SoftwareAndOthers),
            ("goodnotes", Category::Documents),
        ];
        for (ext, expected) in cases {
            assert_eq!(mapper.extension_to_category(ext), Some(expected), "{ext}");
        }
    }

    #[test]
    fn test_classify_is_case_insensitive_and_stable() {
        let mapper = FileMapper::default();
        let path = Path::new("/r/IMG_0001.HEIC");
        let first = mapper.classify_name(path, false);
        assert_eq!(first, Category::Images);
        assert_eq!(mapper.classify_name(path, false), first);
    }

    #[test]
    fn test_classify_unknown_and_extensionless() {
        let mapper = FileMapper::default();
        assert_eq!(mapper.classify_name(Path::new("a.qwerty"), false), Category::Unknown);
        assert_eq!(mapper.classify_name(Path::new("Makefile"), false), Category::Unknown);
        assert_eq!(mapper.classify_name(Path::new("trailing."), false), Category::Unknown);
    }

    #[test]
    fn test_classify_directories_are_folders() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path().join("album.zip");
        std::fs::create_dir(&dir).expect("Failed to create directory");

        let mapper = FileMapper::default();
        assert_eq!(mapper.classify(&dir), Category::Folder);
        assert_eq!(mapper.classify_name(Path::new("Photos"), true), Category::Folder);
    }

    #[test]
    fn test_custom_mapping_keeps_priority() {
        let mut mapper = FileMapper::default();
        mapper.add_extension_mapping(".Pages", Category::Documents);
        mapper.add_extension_mapping("pdf", Category::Archives);

        assert_eq!(mapper.extension_to_category("pages"), Some(Category::Documents));
        assert_eq!(mapper.extension_to_category("pdf"), Some(Category::Documents));
    }

    #[test]
    fn test_folder_tag_predicate() {
        assert_eq!(
            FolderTag::from_name("*2024*"),
            Some(FolderTag::Sentinel("2024".to_string()))
        );
        assert_eq!(
            FolderTag::from_name("*x*"),
            Some(FolderTag::Sentinel("x".to_string()))
        );
        assert_eq!(
            FolderTag::from_name("Software and Others"),
            Some(FolderTag::Named(Category::SoftwareAndOthers))
        );
        for name in ["2024", "*2024", "2024*", "documents", "Misc"] {
            assert_eq!(FolderTag::from_name(name), None, "{name}");
        }
    }

    #[test]
    fn test_lone_marker_is_a_sentinel_folder() {
        assert_eq!(
            FolderTag::from_name("*"),
            Some(FolderTag::Sentinel(String::new()))
        );
        assert_eq!(
            FolderTag::from_name("**"),
            Some(FolderTag::Sentinel(String::new()))
        );
    }

    #[test]
    fn test_sentinel_builder_is_recognized() {
        let name = FolderTag::sentinel("1999");
        assert_eq!(name, "*1999*");
        assert!(FolderTag::from_name(&name).is_some_and(|t| t.is_sentinel()));
    }
}
