/// Extension-based file categorization.
///
/// Categories are matched on the file extension string only (lowercase, with the
/// leading dot). Rule sets are turned into a single reverse index once at startup,
/// so classifying a file is one hash lookup.
///
/// # Examples
///
/// ```
/// use dltidy::file_category::ExtensionClassifier;
///
/// let classifier = ExtensionClassifier::default();
/// assert_eq!(classifier.classify(".mp3"), Some("Audio"));
/// assert_eq!(classifier.classify(".pdf"), Some("Docs"));
/// assert_eq!(classifier.classify(".xyz"), None);
/// ```
use std::collections::HashMap;

/// The built-in categories, in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Audio files (MP3, FLAC, WAV, etc.)
    Audio,
    /// Video files (MP4, MOV, AVI, etc.)
    Video,
    /// Documents (PDF, DOC, DOCX)
    Docs,
    /// Image files (PNG, JPG, HEIC, etc.)
    Images,
    /// Windows executables
    Executables,
    /// Archives (ZIP, RAR, 7Z)
    Archives,
    /// Source code and structured text
    Code,
    /// Font files
    Fonts,
    /// Torrent metadata files
    Torrents,
    /// 3D models and print files
    Models3D,
}

impl Category {
    /// Every built-in category, highest priority first.
    ///
    /// When an extension is claimed by more than one category the earliest one
    /// in this list wins.
    pub const PRIORITY: [Category; 10] = [
        Category::Audio,
        Category::Video,
        Category::Docs,
        Category::Images,
        Category::Executables,
        Category::Archives,
        Category::Code,
        Category::Fonts,
        Category::Torrents,
        Category::Models3D,
    ];

    /// Returns the label of this category, which is also its default folder name.
    ///
    /// ```
    /// use dltidy::file_category::Category;
    ///
    /// assert_eq!(Category::Images.label(), "Images");
    /// assert_eq!(Category::Models3D.label(), "3D");
    /// ```
    pub fn label(&self) -> &'static str {
        match self {
            Category::Audio => "Audio",
            Category::Video => "Video",
            Category::Docs => "Docs",
            Category::Images => "Images",
            Category::Executables => "Executables",
            Category::Archives => "Archives",
            Category::Code => "Code",
            Category::Fonts => "Fonts",
            Category::Torrents => "Torrents",
            Category::Models3D => "3D",
        }
    }

    /// Looks up a built-in category by label, ignoring case.
    pub fn from_label(label: &str) -> Option<Category> {
        Self::PRIORITY
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(label))
    }

    /// Whether the category takes part in sorting without being enabled in configuration.
    pub fn enabled_by_default(&self) -> bool {
        !matches!(
            self,
            Category::Code | Category::Fonts | Category::Torrents | Category::Models3D
        )
    }

    /// The built-in extension set for this category.
    pub fn default_extensions(&self) -> &'static [&'static str] {
        match self {
            Category::Audio => &[
                ".wav", ".wma", ".aac", ".mp3", ".flac", ".m4a", ".ogg", ".alac",
            ],
            Category::Video => &[
                ".webm", ".mpg", ".mp2", ".mpeg", ".mpe", ".mpv", ".mp4", ".m4p", ".m4v", ".avi",
                ".wmv", ".mov", ".qt", ".flv", ".swf", ".avchd",
            ],
            Category::Docs => &[".doc", ".docx", ".pdf"],
            Category::Images => &[
                ".png", ".jpeg", ".jpg", ".jfi", ".jpe", ".jif", ".jfif", ".heif", ".heic", ".gif",
                ".svg", ".svgz", ".eps", ".webp", ".tiff", ".tif", ".ind", ".ai", ".psd",
            ],
            Category::Executables => &[".exe"],
            Category::Archives => &[".zip", ".rar", ".7z"],
            Category::Code => &[
                ".py", ".rs", ".js", ".ts", ".c", ".cpp", ".h", ".hpp", ".java", ".go", ".sh",
                ".json", ".xml", ".yaml", ".yml", ".toml",
            ],
            Category::Fonts => &[".ttf", ".otf", ".woff", ".woff2"],
            Category::Torrents => &[".torrent"],
            Category::Models3D => &[
                ".stl", ".obj", ".fbx", ".blend", ".3mf", ".gltf", ".glb", ".step", ".stp",
            ],
        }
    }

    /// Builds the rule for this category from its built-in extension set.
    pub fn default_rule(&self) -> CategoryRule {
        CategoryRule::new(self.label(), self.default_extensions().iter().copied())
    }
}

/// Normalizes an extension to lowercase with a single leading dot.
///
/// Surrounding whitespace is trimmed. An empty input stays empty.
///
/// ```
/// use dltidy::file_category::normalize_extension;
///
/// assert_eq!(normalize_extension("MP3"), ".mp3");
/// assert_eq!(normalize_extension(".Tar"), ".tar");
/// assert_eq!(normalize_extension(""), "");
/// ```
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return String::new();
    }
    format!(".{}", trimmed.to_lowercase())
}

/// A category label together with the extensions that belong to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub label: String,
    /// Normalized extensions (lowercase, leading dot, no empties).
    pub extensions: Vec<String>,
}

impl CategoryRule {
    pub fn new<I, S>(label: impl Into<String>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for ext in extensions {
            let ext = normalize_extension(ext.as_ref());
            if !ext.is_empty() && !normalized.contains(&ext) {
                normalized.push(ext);
            }
        }
        Self {
            label: label.into(),
            extensions: normalized,
        }
    }
}

/// An extension claimed by two categories. The higher-priority one keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionOverlap {
    pub extension: String,
    pub kept_by: String,
    pub shadowed: String,
}

/// Maps an extension to the label of the first category (in priority order) that claims it.
#[derive(Debug, Clone)]
pub struct ExtensionClassifier {
    labels: Vec<String>,
    index: HashMap<String, usize>,
    overlaps: Vec<ExtensionOverlap>,
}

impl ExtensionClassifier {
    /// Builds the reverse index from rules given in priority order.
    ///
    /// Rules sharing a label are merged. Extensions already claimed by an
    /// earlier rule stay with it and are recorded in [`Self::overlaps`].
    pub fn new<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = CategoryRule>,
    {
        let mut labels: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut overlaps = Vec::new();

        for rule in rules {
            let slot = match labels.iter().position(|label| *label == rule.label) {
                Some(slot) => slot,
                None => {
                    labels.push(rule.label.clone());
                    labels.len() - 1
                }
            };

            for ext in rule.extensions {
                match index.get(&ext) {
                    Some(&owner) if owner != slot => overlaps.push(ExtensionOverlap {
                        extension: ext,
                        kept_by: labels[owner].clone(),
                        shadowed: rule.label.clone(),
                    }),
                    Some(_) => {}
                    None => {
                        index.insert(ext, slot);
                    }
                }
            }
        }

        Self {
            labels,
            index,
            overlaps,
        }
    }

    /// Returns the category label for an already-normalized extension.
    ///
    /// Callers lowercase the extension once when reading the directory entry;
    /// no case folding happens here.
    pub fn classify(&self, extension: &str) -> Option<&str> {
        self.index
            .get(extension)
            .map(|&slot| self.labels[slot].as_str())
    }

    /// All labels, in priority order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn overlaps(&self) -> &[ExtensionOverlap] {
        &self.overlaps
    }
}

impl Default for ExtensionClassifier {
    /// The categories enabled out of the box, with their built-in extension sets.
    fn default() -> Self {
        Self::new(
            Category::PRIORITY
                .iter()
                .filter(|category| category.enabled_by_default())
                .map(Category::default_rule),
        )
    }
}
