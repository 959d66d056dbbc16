use crate::error::QuireError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dotted schema version of an event payload: `major.minor[.build[.revision]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    major: u32,
    minor: u32,
    build: Option<u32>,
    revision: Option<u32>,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            build: None,
            revision: None,
        }
    }

    pub const fn with_build(mut self, build: u32) -> Self {
        self.build = Some(build);
        self
    }

    /// Set the revision component. A revision implies a build, which
    /// defaults to 0 when not set.
    pub const fn with_revision(mut self, revision: u32) -> Self {
        if self.build.is_none() {
            self.build = Some(0);
        }
        self.revision = Some(revision);
        self
    }

    pub const fn major(&self) -> u32 {
        self.major
    }

    pub const fn minor(&self) -> u32 {
        self.minor
    }

    pub const fn build(&self) -> Option<u32> {
        self.build
    }

    pub const fn revision(&self) -> Option<u32> {
        self.revision
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{}", build)?;
        }
        if let Some(revision) = self.revision {
            write!(f, ".{}", revision)?;
        }
        Ok(())
    }
}

impl FromStr for SchemaVersion {
    type Err = QuireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || QuireError::InvalidRecord(format!("invalid schema version '{}'", s));

        let parts = s
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                part.parse::<u32>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>, _>>()?;

        match parts.as_slice() {
            [major, minor] => Ok(Self::new(*major, *minor)),
            [major, minor, build] => Ok(Self::new(*major, *minor).with_build(*build)),
            [major, minor, build, revision] => Ok(Self::new(*major, *minor)
                .with_build(*build)
                .with_revision(*revision)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = QuireError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SchemaVersion> for String {
    fn from(version: SchemaVersion) -> Self {
        version.to_string()
    }
}
