use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

/// Non-empty set of media kinds carried by a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<MediaKind>", into = "Vec<MediaKind>")]
pub struct MediaKinds(BTreeSet<MediaKind>);

impl MediaKinds {
    pub fn new(kinds: impl IntoIterator<Item = MediaKind>) -> Result<Self> {
        let set: BTreeSet<MediaKind> = kinds.into_iter().collect();
        if set.is_empty() {
            return Err(AppError::InvalidInput(
                "At least one media kind is required".to_string(),
            ));
        }
        Ok(Self(set))
    }

    pub fn contains(&self, kind: MediaKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = MediaKind> + '_ {
        self.0.iter().copied()
    }
}

impl TryFrom<Vec<MediaKind>> for MediaKinds {
    type Error = AppError;

    fn try_from(kinds: Vec<MediaKind>) -> Result<Self> {
        Self::new(kinds)
    }
}

impl From<MediaKinds> for Vec<MediaKind> {
    fn from(kinds: MediaKinds) -> Self {
        kinds.0.into_iter().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    Pending,
    Accepted,
    Rejected,
    Active,
    Stopped,
    Errored,
}

impl RelayState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RelayState::Rejected | RelayState::Stopped | RelayState::Errored
        )
    }

    /// Allowed negotiation transitions. Any live state may also be cancelled
    /// to Stopped by a local stop or a room leave.
    pub fn can_transition_to(self, next: RelayState) -> bool {
        use RelayState::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Pending, Errored)
                | (Pending, Stopped)
                | (Accepted, Active)
                | (Accepted, Errored)
                | (Accepted, Stopped)
                | (Active, Stopped)
                | (Active, Errored)
        )
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelayState::Pending => "pending",
            RelayState::Accepted => "accepted",
            RelayState::Rejected => "rejected",
            RelayState::Active => "active",
            RelayState::Stopped => "stopped",
            RelayState::Errored => "errored",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    LocalStop,
    RemoteStop,
    Disconnect,
    RoomSwitched,
    Error,
}

/// Which end of the negotiation this participant holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayRole {
    Requester,
    Destination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayDecision {
    Accepted,
    Rejected,
}

/// A proposal to forward one participant's media into a second room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub request_id: String,
    pub role: RelayRole,
    pub source_room_id: String,
    pub destination_room_id: String,
    pub requester_participant_id: String,
    pub requester_display_name: String,
    pub kinds: MediaKinds,
    pub state: RelayState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelayRequest {
    pub fn outbound(
        source_room_id: String,
        destination_room_id: String,
        requester_participant_id: String,
        requester_display_name: String,
        kinds: MediaKinds,
    ) -> Self {
        let now = Utc::now();
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            role: RelayRole::Requester,
            source_room_id,
            destination_room_id,
            requester_participant_id,
            requester_display_name,
            kinds,
            state: RelayState::Pending,
            stop_reason: None,
            diagnostic: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Whether this relay has the given room at either end
    pub fn touches(&self, room_id: &str) -> bool {
        self.source_room_id == room_id || self.destination_room_id == room_id
    }

    /// Apply a transition if the state machine allows it.
    pub fn transition(&mut self, next: RelayState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "Relay {} cannot move from {} to {}",
                self.request_id, self.state, next
            )));
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn stop(&mut self, reason: StopReason) -> Result<()> {
        self.transition(RelayState::Stopped)?;
        self.stop_reason = Some(reason);
        Ok(())
    }

    pub fn fail(&mut self, diagnostic: impl Into<String>) -> Result<()> {
        self.transition(RelayState::Errored)?;
        self.stop_reason = Some(StopReason::Error);
        self.diagnostic = Some(diagnostic.into());
        Ok(())
    }
}
