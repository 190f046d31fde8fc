use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::watch;

use crate::models::Participant;

/// Participants of the current home room, keyed by participant id.
///
/// Only the session actor mutates it. Every mutation republishes an ordered
/// snapshot, and readers only ever see whole snapshots.
pub struct ParticipantRegistry {
    participants: DashMap<String, Participant>, // participant_id -> Participant
    snapshot: watch::Sender<Arc<Vec<Participant>>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            participants: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or update. An update keeps the first join time.
    pub fn upsert(&self, mut participant: Participant) {
        if let Some(existing) = self.participants.get(&participant.participant_id) {
            participant.joined_at = existing.joined_at;
        }
        self.participants
            .insert(participant.participant_id.clone(), participant);
        self.publish();
    }

    pub fn remove(&self, participant_id: &str) -> Option<Participant> {
        let removed = self.participants.remove(participant_id).map(|(_, v)| v);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    pub fn get(&self, participant_id: &str) -> Option<Participant> {
        self.snapshot
            .borrow()
            .iter()
            .find(|p| p.participant_id == participant_id)
            .cloned()
    }

    /// All participants ordered by join time
    pub fn all(&self) -> Vec<Participant> {
        self.snapshot.borrow().as_ref().clone()
    }

    /// Watch the ordered participant list
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Participant>>> {
        self.snapshot.subscribe()
    }

    /// Apply a capability change. Returns false for an unknown participant.
    pub fn set_media(&self, participant_id: &str, mic_on: bool, webcam_on: bool) -> bool {
        let found = match self.participants.get_mut(participant_id) {
            Some(mut p) => {
                p.mic_on = mic_on;
                p.webcam_on = webcam_on;
                true
            }
            None => false,
        };
        if found {
            self.publish();
        }
        found
    }

    /// Replace the whole room view with a fresh server snapshot.
    ///
    /// The server lists participants in join order; join times are restamped
    /// to keep that order.
    pub fn replace_all(&self, snapshot: Vec<Participant>) {
        let base = Utc::now() - Duration::microseconds(snapshot.len() as i64);
        self.participants.clear();
        for (i, mut participant) in snapshot.into_iter().enumerate() {
            participant.joined_at = base + Duration::microseconds(i as i64);
            self.participants
                .insert(participant.participant_id.clone(), participant);
        }
        self.publish();
    }

    pub fn clear(&self) {
        self.participants.clear();
        self.publish();
    }

    pub fn len(&self) -> usize {
        self.snapshot.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self) {
        let mut all: Vec<Participant> = self.participants.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.participant_id.cmp(&b.participant_id))
        });
        self.snapshot.send_replace(Arc::new(all));
    }
}

/// Flag the entry matching the local participant id in a server snapshot
pub(crate) fn mark_local(mut participants: Vec<Participant>, local_participant_id: &str) -> Vec<Participant> {
    for p in &mut participants {
        p.is_local = p.participant_id == local_participant_id;
    }
    participants
}

impl Default for ParticipantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn participant_at(id: &str, offset_secs: i64) -> Participant {
        let mut p = Participant::new(id, id.to_uppercase());
        p.joined_at = Utc::now() + Duration::seconds(offset_secs);
        p
    }

    #[test]
    fn test_upsert_get_remove() {
        let registry = ParticipantRegistry::new();
        registry.upsert(Participant::new("p1", "Alice"));

        assert_eq!(registry.get("p1").unwrap().display_name, "Alice");
        assert!(registry.get("nonexistent").is_none());

        let removed = registry.remove("p1");
        assert_eq!(removed.unwrap().participant_id, "p1");
        assert!(registry.is_empty());
        assert!(registry.remove("p1").is_none());
    }

    #[test]
    fn test_all_ordered_by_join_time() {
        let registry = ParticipantRegistry::new();
        registry.upsert(participant_at("late", 30));
        registry.upsert(participant_at("early", -30));
        registry.upsert(participant_at("middle", 0));

        let ids: Vec<String> = registry.all().into_iter().map(|p| p.participant_id).collect();
        assert_eq!(ids, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_upsert_keeps_join_time() {
        let registry = ParticipantRegistry::new();
        let first = participant_at("p1", -60);
        let joined_at = first.joined_at;
        registry.upsert(first);

        let mut update = participant_at("p1", 0);
        update.mic_on = true;
        registry.upsert(update);

        let stored = registry.get("p1").unwrap();
        assert_eq!(stored.joined_at, joined_at);
        assert!(stored.mic_on);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_set_media() {
        let registry = ParticipantRegistry::new();
        registry.upsert(Participant::new("p1", "Alice"));

        assert!(registry.set_media("p1", true, false));
        assert!(!registry.set_media("ghost", true, true));

        let p = registry.get("p1").unwrap();
        assert!(p.mic_on);
        assert!(!p.webcam_on);
    }

    #[test]
    fn test_replace_all() {
        let registry = ParticipantRegistry::new();
        registry.upsert(Participant::new("old", "Old"));

        registry.replace_all(vec![Participant::new("a", "A"), Participant::new("b", "B")]);

        assert_eq!(registry.len(), 2);
        assert!(registry.get("old").is_none());
    }

    #[test]
    fn test_replace_all_keeps_snapshot_order() {
        let registry = ParticipantRegistry::new();
        registry.replace_all(vec![
            Participant::new("zed", "Zed"),
            Participant::new("amy", "Amy"),
            Participant::new("mo", "Mo"),
        ]);
        registry.upsert(Participant::new("late", "Late"));

        let ids: Vec<String> = registry.all().into_iter().map(|p| p.participant_id).collect();
        assert_eq!(ids, vec!["zed", "amy", "mo", "late"]);
    }

    #[test]
    fn test_readers_see_whole_snapshots() {
        let registry = ParticipantRegistry::new();
        registry.replace_all(vec![Participant::new("a", "A"), Participant::new("b", "B")]);
        let mut watcher = registry.subscribe();
        watcher.borrow_and_update();

        registry.replace_all(vec![
            Participant::new("c", "C"),
            Participant::new("d", "D"),
            Participant::new("e", "E"),
        ]);

        // One rebuild is one change, never an empty or partial list
        assert!(watcher.has_changed().unwrap());
        let seen = watcher.borrow_and_update().clone();
        assert_eq!(seen.len(), 3);
        assert!(!watcher.has_changed().unwrap());
    }
}
