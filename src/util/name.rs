use std::fmt;

use crate::consts::{EXTENSION_LENGTH, NAME_LENGTH};
use crate::util::error::{Error, Result};

/// An 8.3 file name as stored in the directory: upper case, without padding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileName {
    pub(crate) name: String,
    pub(crate) extension: String,
}

impl FileName {
    pub fn parse(name: &str) -> Result<FileName> {
        if !check_legal_name(name) {
            return Err(Error::InvalidName(name.to_string()));
        }

        let (name, extension) = name.split_once('.').unwrap_or((name, ""));
        Ok(FileName {
            name: name.to_ascii_uppercase(),
            extension: extension.to_ascii_uppercase(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extension.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.name, self.extension)
        }
    }
}

pub fn check_legal_name(name: &str) -> bool {
    let (name, extension) = name.split_once('.').unwrap_or((name, ""));

    (1..=NAME_LENGTH).contains(&name.len())
        && extension.len() <= EXTENSION_LENGTH
        && name.chars().chain(extension.chars()).all(is_legal_char)
}

#[inline]
fn is_legal_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
