//! The two model families served side by side.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Latent-factor model trained with alternating least squares
    Als,
    /// Hybrid collaborative + content model with item genre features
    LightFm,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::Als, Family::LightFm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Als => "als",
            Family::LightFm => "lightfm",
        }
    }

    /// Blob key the artifact of this family is stored under
    pub fn blob_key(&self) -> &'static str {
        match self {
            Family::Als => "als_model.bin",
            Family::LightFm => "lightfm_model.bin",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "als" => Ok(Family::Als),
            "lightfm" => Ok(Family::LightFm),
            other => Err(ModelError::UnknownFamily(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_family() {
        assert_eq!("als".parse::<Family>().unwrap(), Family::Als);
        assert_eq!("LightFM".parse::<Family>().unwrap(), Family::LightFm);
        assert!("svd".parse::<Family>().is_err());
    }

    #[test]
    fn test_blob_keys_are_distinct() {
        assert_ne!(Family::Als.blob_key(), Family::LightFm.blob_key());
        assert_eq!(Family::LightFm.to_string(), "lightfm");
    }
}
