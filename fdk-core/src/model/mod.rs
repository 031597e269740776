//! Catalog entity model
//!
//! Plain value types shared by every layer: catalog objects, their
//! property sets and the upstream release a store snapshot reflects.
//! Nothing here performs I/O.

mod object;
mod property;
mod release;

pub use object::{CatalogObject, Completeness, Relationship};
pub use property::{Property, PropertyFormat, PropertySet};
pub use release::ReleaseInfo;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Languages served by the upstream catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    De,
    Fr,
    It,
    En,
}

impl Language {
    pub const ALL: [Language; 4] = [Language::De, Language::Fr, Language::It, Language::En];

    pub fn code(&self) -> &'static str {
        match self {
            Language::De => "de",
            Language::Fr => "fr",
            Language::It => "it",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "de" => Ok(Language::De),
            "fr" => Ok(Language::Fr),
            "it" => Ok(Language::It),
            "en" => Ok(Language::En),
            other => Err(format!(
                "Unsupported language '{other}' (expected one of: de, fr, it, en)"
            )),
        }
    }
}
