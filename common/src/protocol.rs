//! Wire types for the remote dashboard.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Coarse lifecycle phase pushed to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    CollectingImages,
    UploadingImages,
    EvaluatingResults,
}

impl Phase {
    /// Numeric code the dashboard API expects.
    pub fn code(self) -> u8 {
        match self {
            Self::CollectingImages => 0,
            Self::UploadingImages => 1,
            Self::EvaluatingResults => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CollectingImages => "collecting_images",
            Self::UploadingImages => "uploading_images",
            Self::EvaluatingResults => "evaluating_results",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown phase: {0}")]
pub struct UnknownPhase(String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collecting_images" => Ok(Self::CollectingImages),
            "uploading_images" => Ok(Self::UploadingImages),
            "evaluating_results" => Ok(Self::EvaluatingResults),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

/// Body of `PUT /api/v1/update_car_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub current_state: u8,
}

impl From<Phase> for StateUpdate {
    fn from(phase: Phase) -> Self {
        Self {
            current_state: phase.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_update_body() {
        let body = serde_json::to_string(&StateUpdate::from(Phase::UploadingImages)).unwrap();
        assert_eq!(body, r#"{"current_state":1}"#);
    }

    #[test]
    fn test_phase_codes() {
        assert_eq!(Phase::CollectingImages.code(), 0);
        assert_eq!(Phase::UploadingImages.code(), 1);
        assert_eq!(Phase::EvaluatingResults.code(), 2);
    }

    #[test]
    fn test_phase_names() {
        for phase in [
            Phase::CollectingImages,
            Phase::UploadingImages,
            Phase::EvaluatingResults,
        ] {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
            assert_eq!(
                serde_json::to_string(&phase).unwrap(),
                format!("\"{}\"", phase.as_str())
            );
        }
        assert!("parking".parse::<Phase>().is_err());
    }
}
