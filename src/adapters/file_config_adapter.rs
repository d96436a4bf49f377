//! INI run configuration.
//!
//! Section and key names are case-insensitive, so `[Strategy.Trend]` and
//! `[strategy.trend]` name the same member strategy. Values are trimmed.

use crate::domain::error::StratlabError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    ini: Ini,
    source: String,
}

impl FileConfigAdapter {
    /// Load an INI file. Unreadable and malformed files are both
    /// `ConfigParse` errors naming the file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StratlabError> {
        let source = path.as_ref().display().to_string();
        let mut ini = Ini::new();
        ini.load(path.as_ref()).map_err(|reason| StratlabError::ConfigParse {
            file: source.clone(),
            reason,
        })?;
        Ok(Self { ini, source })
    }

    pub fn from_string(content: &str) -> Result<Self, StratlabError> {
        let source = "<inline>".to_string();
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|reason| StratlabError::ConfigParse {
                file: source.clone(),
                reason,
            })?;
        Ok(Self { ini, source })
    }

    /// Where the configuration was read from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Lowercased section names, sorted.
    pub fn sections(&self) -> Vec<String> {
        let mut names = self.ini.sections();
        names.sort();
        names
    }

    /// Names of `[strategy.<name>]` member sections, sorted.
    pub fn member_strategies(&self) -> Vec<String> {
        self.sections()
            .into_iter()
            .filter_map(|s| s.strip_prefix("strategy.").map(str::to_string))
            .filter(|name| !name.is_empty())
            .collect()
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini.get(section, key)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.ini.getfloat(section, key) {
            Ok(Some(v)) if v.is_finite() => v,
            _ => default,
        }
    }
}
