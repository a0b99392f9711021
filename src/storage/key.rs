use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::common::{FaceGateError, Result};

const KEY_PREFIX: &str = "user_";

/// Integer naming one enrolled subject. Doubles as the recognizer label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(pub i32);

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identifier {
    type Err = FaceGateError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<i32>()
            .map(Identifier)
            .map_err(|_| FaceGateError::InvalidIdentifier(s.to_string()))
    }
}

impl From<i32> for Identifier {
    fn from(value: i32) -> Self {
        Identifier(value)
    }
}

/// Storage key of one face sample, text form `user_<identifier>_<sequence>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleKey {
    pub identifier: Identifier,
    pub sequence: u32,
}

impl SampleKey {
    pub fn new(identifier: Identifier, sequence: u32) -> Self {
        Self { identifier, sequence }
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}_{}", KEY_PREFIX, self.identifier, self.sequence)
    }
}

impl FromStr for SampleKey {
    type Err = FaceGateError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || FaceGateError::InvalidSampleKey(s.to_string());

        let rest = s.strip_prefix(KEY_PREFIX).ok_or_else(invalid)?;
        let (id, seq) = rest.rsplit_once('_').ok_or_else(invalid)?;
        let identifier = id.parse::<i32>().map_err(|_| invalid())?;
        let sequence = seq.parse::<u32>().map_err(|_| invalid())?;

        Ok(Self::new(Identifier(identifier), sequence))
    }
}
