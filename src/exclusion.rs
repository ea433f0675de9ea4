//! Transient-file exclusion.
//!
//! Browsers and download tools write into the downloads folder under a
//! temporary name (`movie.mp4.crdownload`, `setup.exe.part`) and rename the
//! file when it is complete. Anything matching one of these markers is left
//! alone, whatever its eventual extension.
//!
//! Three kinds of markers are supported, checked in this order:
//! 1. Name suffixes, compared case-insensitively (`.crdownload`)
//! 2. Glob patterns matched against the file name (`~$*`)
//! 3. Regex patterns matched against the file name

use crate::config::ConfigError;
use crate::file_category::normalize_extension;
use glob::Pattern;
use regex::Regex;

/// Suffixes of partial downloads left by common browsers and tools.
pub const DEFAULT_TEMP_SUFFIXES: [&str; 5] = [".crdownload", ".download", ".tmp", ".part", ".partial"];

/// Compiled set of transient-file markers.
#[derive(Debug, Clone)]
pub struct TempExclusionSet {
    suffixes: Vec<String>,
    patterns: Vec<Pattern>,
    regexes: Vec<Regex>,
}

impl TempExclusionSet {
    /// Compiles suffix, glob and regex markers.
    ///
    /// Suffixes are normalized like extensions (`PART` and `.part` are the same marker).
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex pattern is invalid.
    pub fn new(suffixes: &[String], patterns: &[String], regex: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|pattern| Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let regexes = regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            regexes,
            ..Self::from_suffixes(suffixes)
        })
    }

    /// An exclusion set with only suffix markers.
    pub fn from_suffixes<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for suffix in suffixes {
            let suffix = normalize_extension(suffix.as_ref());
            if !suffix.is_empty() && !normalized.contains(&suffix) {
                normalized.push(suffix);
            }
        }
        Self {
            suffixes: normalized,
            patterns: Vec::new(),
            regexes: Vec::new(),
        }
    }

    /// Returns true if the file name carries a transient marker.
    pub fn is_transient(&self, file_name: &str) -> bool {
        let lowered = file_name.to_lowercase();
        if self.suffixes.iter().any(|suffix| lowered.ends_with(suffix.as_str())) {
            return true;
        }

        if self.patterns.iter().any(|pattern| pattern.matches(file_name)) {
            return true;
        }

        self.regexes.iter().any(|regex| regex.is_match(file_name))
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }
}

impl Default for TempExclusionSet {
    fn default() -> Self {
        Self::from_suffixes(DEFAULT_TEMP_SUFFIXES)
    }
}
