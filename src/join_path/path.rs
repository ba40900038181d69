use crate::error::CompilationError;
use std::fmt;

/// One association hop, optionally aliased with `as <alias>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hop {
    pub association: String,
    pub alias: Option<String>,
}

impl Hop {
    pub fn new(association: &str) -> Self {
        Self {
            association: association.to_string(),
            alias: None,
        }
    }

    pub fn aliased(association: &str, alias: &str) -> Self {
        Self {
            association: association.to_string(),
            alias: Some(alias.to_string()),
        }
    }

    /// Alias the joined table is visible under
    pub fn effective_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.association)
    }

    /// Parse `name` or `name as alias`
    pub fn parse(segment: &str) -> Result<Self, CompilationError> {
        let words: Vec<&str> = segment.split_whitespace().collect();
        match words.as_slice() {
            [name] if is_identifier(name) => Ok(Self::new(name)),
            [name, keyword, alias]
                if keyword.eq_ignore_ascii_case("as")
                    && is_identifier(name)
                    && is_identifier(alias) =>
            {
                Ok(Self::aliased(name, alias))
            }
            _ => Err(CompilationError::InvalidPath(segment.to_string())),
        }
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} as {}", self.association, alias),
            None => write!(f, "{}", self.association),
        }
    }
}

/// A dotted chain of association hops, e.g. `posts as p.comments`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssociationPath {
    pub hops: Vec<Hop>,
}

impl AssociationPath {
    pub fn parse(path: &str) -> Result<Self, CompilationError> {
        if path.trim().is_empty() {
            return Err(CompilationError::InvalidPath(path.to_string()));
        }
        let hops = path
            .split('.')
            .map(Hop::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { hops })
    }

    pub fn from_hops(hops: Vec<Hop>) -> Self {
        Self { hops }
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Alias of the last hop
    pub fn terminal_alias(&self) -> Option<&str> {
        self.hops.last().map(Hop::effective_alias)
    }
}

impl fmt::Display for AssociationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.hops.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
