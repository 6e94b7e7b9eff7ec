use std::fmt;
use std::str::FromStr;

use serde::ser::{Serialize, SerializeTuple, Serializer};

use crate::error::TallyError;

/// Accession key derived from a BLAST subject id.
///
/// Parsing keeps everything before the first `_` or `|`, so `AB123456.1_3|Oryzias`
/// becomes `AB123456.1`. Bare accessions parse to themselves. Surrounding whitespace is
/// trimmed before the split, so a space-padded column yields the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identifier {
    type Err = TallyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let head = value
            .trim()
            .split(|ch: char| ch == '_' || ch == '|')
            .next()
            .unwrap_or_default();
        if head.is_empty() {
            return Err(TallyError::InvalidIdentifier(value.to_string()));
        }
        Ok(Self(head.to_string()))
    }
}

/// NCBI taxonomy id, kept as its decimal text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaxonomyId(String);

impl TaxonomyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a value read back from the cache without re-validating it.
    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaxonomyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxonomyId {
    type Err = TallyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(TallyError::InvalidTaxonomyId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub identifier: Identifier,
    pub taxonomy_id: TaxonomyId,
    pub organism_name: String,
}

impl CacheRecord {
    pub fn new(
        identifier: Identifier,
        taxonomy_id: TaxonomyId,
        organism_name: impl Into<String>,
    ) -> Self {
        Self {
            identifier,
            taxonomy_id,
            organism_name: organism_name.into(),
        }
    }
}

/// One line of the population report.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonomyGroup {
    pub taxonomy_id: TaxonomyId,
    pub organism_name: String,
    pub count: usize,
    pub ratio: f64,
}

// Serialized positionally: `[taxonomy_id, organism_name, count, ratio]`.
impl Serialize for TaxonomyGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(4)?;
        tuple.serialize_element(self.taxonomy_id.as_str())?;
        tuple.serialize_element(&self.organism_name)?;
        tuple.serialize_element(&self.count)?;
        tuple.serialize_element(&self.ratio)?;
        tuple.end()
    }
}
