use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A member of the current home room, local or remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: String,
    pub display_name: String,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub mic_on: bool,
    #[serde(default)]
    pub webcam_on: bool,
    #[serde(default = "Utc::now")]
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(participant_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            display_name: display_name.into(),
            is_local: false,
            mic_on: false,
            webcam_on: false,
            joined_at: Utc::now(),
        }
    }
}
