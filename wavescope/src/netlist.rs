//! Lightweight inspection of SPICE netlist text.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::io;

lazy_static! {
    static ref TITLE: Regex = Regex::new(r"(?im)^\.title (.*)$").unwrap();
}

/// A circuit description, held as raw text.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Netlist {
    source: String,
}

impl Netlist {
    #[inline]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(io::read_to_string(path)?))
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Derives the circuit title.
    ///
    /// A `.title` directive anywhere in the netlist wins. Failing that, the
    /// first line is used, with a leading `*` comment marker stripped.
    /// An empty first line means the netlist has no title.
    pub fn title(&self) -> Option<String> {
        if let Some(caps) = TITLE.captures(&self.source) {
            if let Some(m) = caps.get(1) {
                return Some(m.as_str().trim().to_string());
            }
        }

        let first = self.source.split('\n').next().unwrap_or_default();
        if first.is_empty() {
            return None;
        }
        let first = first.strip_prefix('*').unwrap_or(first);
        Some(first.trim().to_string())
    }
}
