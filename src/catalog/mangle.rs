// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Canonical identity keys for catalog objects.
//!
//! Format: `type/schema/name`, where `/` and `\` inside schema and name are
//! escaped with a leading `\`. The encoding is injective, so two distinct
//! objects never share a key and [`unmangle_name`] recovers the exact triple.

use std::fmt;

use super::error::CatalogError;

const DELIMITER: char = '/';
const ESCAPE: char = '\\';

/// Kind of catalog object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CatalogType {
    Schema,
    Table,
    View,
    Index,
    Sequence,
    Macro,
    Type,
    Function,
}

impl CatalogType {
    /// All catalog types.
    pub const ALL: [CatalogType; 8] = [
        CatalogType::Schema,
        CatalogType::Table,
        CatalogType::View,
        CatalogType::Index,
        CatalogType::Sequence,
        CatalogType::Macro,
        CatalogType::Type,
        CatalogType::Function,
    ];

    /// Returns the tag used in mangled names.
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogType::Schema => "schema",
            CatalogType::Table => "table",
            CatalogType::View => "view",
            CatalogType::Index => "index",
            CatalogType::Sequence => "sequence",
            CatalogType::Macro => "macro",
            CatalogType::Type => "type",
            CatalogType::Function => "function",
        }
    }

    /// Parses a tag produced by [`as_str`](Self::as_str).
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for CatalogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical string key of a catalog object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MangledName(String);

impl MangledName {
    /// Returns the encoded key.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MangledName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully qualified identity of a catalog object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName {
    pub catalog_type: CatalogType,
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(catalog_type: CatalogType, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            catalog_type,
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the canonical key.
    pub fn mangle(&self) -> MangledName {
        mangle_name(self.catalog_type, &self.schema, &self.name)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.catalog_type, self.schema, self.name)
    }
}

impl TryFrom<&MangledName> for QualifiedName {
    type Error = CatalogError;

    fn try_from(key: &MangledName) -> Result<Self, Self::Error> {
        let (catalog_type, schema, name) = unmangle_name(key)?;
        Ok(Self {
            catalog_type,
            schema,
            name,
        })
    }
}

fn escape_into(out: &mut String, part: &str) {
    for c in part.chars() {
        if c == DELIMITER || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

/// Encodes an object identity into its canonical key.
pub fn mangle_name(catalog_type: CatalogType, schema: &str, name: &str) -> MangledName {
    let tag = catalog_type.as_str();
    let mut out = String::with_capacity(tag.len() + schema.len() + name.len() + 2);
    out.push_str(tag);
    out.push(DELIMITER);
    escape_into(&mut out, schema);
    out.push(DELIMITER);
    escape_into(&mut out, name);
    MangledName(out)
}

/// Decodes a canonical key back into `(type, schema, name)`.
pub fn unmangle_name(key: &MangledName) -> Result<(CatalogType, String, String), CatalogError> {
    let invalid = |reason: &str| CatalogError::InvalidMangledName {
        key: key.0.clone(),
        reason: reason.to_string(),
    };

    let mut parts: Vec<String> = Vec::with_capacity(3);
    let mut current = String::new();
    let mut escaped = false;
    for c in key.0.chars() {
        if escaped {
            if c != DELIMITER && c != ESCAPE {
                return Err(invalid("invalid escape sequence"));
            }
            current.push(c);
            escaped = false;
        } else if c == ESCAPE {
            escaped = true;
        } else if c == DELIMITER {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if escaped {
        return Err(invalid("dangling escape"));
    }
    parts.push(current);

    let [tag, schema, name]: [String; 3] = parts
        .try_into()
        .map_err(|_| invalid("expected three components"))?;
    let catalog_type = CatalogType::from_tag(&tag).ok_or_else(|| invalid("unknown catalog type"))?;
    Ok((catalog_type, schema, name))
}
