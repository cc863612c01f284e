use crate::core::geo::{self, Location};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub type ProximitySet = BTreeSet<String>;

type Entry = Arc<Mutex<ProximitySet>>;

/// Tracks which users are near which scooter.
///
/// The outer map is only write-locked to insert a new scooter; membership
/// changes take the per-scooter lock, so pings for different scooters never
/// block each other.
pub struct ProximityTracker {
    radius_meters: f64,
    entries: RwLock<HashMap<String, Entry>>,
}

impl ProximityTracker {
    pub fn new(radius_meters: f64) -> Self {
        Self {
            radius_meters,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    fn entry(&self, scooter_id: &str) -> Entry {
        if let Some(entry) = self.entries.read().get(scooter_id) {
            return entry.clone();
        }
        self.entries
            .write()
            .entry(scooter_id.to_string())
            .or_default()
            .clone()
    }

    /// Ensure an (empty) entry exists for a newly provisioned scooter.
    pub fn register(&self, scooter_id: &str) {
        self.entry(scooter_id);
    }

    /// Authoritative recomputation from a scooter ping.
    ///
    /// Replaces the stored set with every user within the radius and returns
    /// the new set.
    pub fn refresh_for_scooter<'a, I>(
        &self,
        scooter_id: &str,
        scooter_location: Location,
        users: I,
    ) -> ProximitySet
    where
        I: IntoIterator<Item = (&'a str, Location)>,
    {
        let close: ProximitySet = users
            .into_iter()
            .filter(|(_, location)| geo::within(*location, scooter_location, self.radius_meters))
            .map(|(username, _)| username.to_string())
            .collect();

        let entry = self.entry(scooter_id);
        *entry.lock() = close.clone();

        tracing::debug!(
            scooter = scooter_id,
            nearby = close.len(),
            "proximity refreshed from scooter ping"
        );
        close
    }

    /// Incremental adjustment from a user ping.
    ///
    /// Only touches the given user's membership; other members are left as
    /// they are until the scooter's next ping recomputes its set.
    pub fn adjust_for_user<'a, I>(&self, username: &str, user_location: Location, scooters: I)
    where
        I: IntoIterator<Item = (&'a str, Location)>,
    {
        for (scooter_id, scooter_location) in scooters {
            let near = geo::within(user_location, scooter_location, self.radius_meters);
            let entry = self.entry(scooter_id);
            let mut members = entry.lock();

            if near && !members.contains(username) {
                members.insert(username.to_string());
                tracing::debug!(scooter = scooter_id, user = username, "user entered proximity");
            } else if !near && members.remove(username) {
                tracing::debug!(scooter = scooter_id, user = username, "user left proximity");
            }
        }
    }

    /// Snapshot of the current set; empty for unknown scooters.
    pub fn members(&self, scooter_id: &str) -> ProximitySet {
        match self.entries.read().get(scooter_id) {
            Some(entry) => entry.lock().clone(),
            None => ProximitySet::new(),
        }
    }

    /// Startup initialisation from stored positions.
    pub fn seed<'a, S, U>(&self, scooters: S, users: U)
    where
        S: IntoIterator<Item = (&'a str, Location)>,
        U: IntoIterator<Item = (&'a str, Location)> + Clone,
    {
        let mut count = 0usize;
        for (scooter_id, location) in scooters {
            self.refresh_for_scooter(scooter_id, location, users.clone());
            count += 1;
        }
        tracing::info!("Seeded proximity for {} scooters", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::EARTH_RADIUS_METERS;

    fn north_of_origin(meters: f64) -> Location {
        let degrees = meters / (EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0);
        Location::new(degrees, 0.0)
    }

    #[test]
    fn refresh_includes_near_and_excludes_far() {
        let tracker = ProximityTracker::new(50.0);
        let users = vec![
            ("alice", north_of_origin(20.0)),
            ("bob", north_of_origin(1000.0)),
        ];

        let set = tracker.refresh_for_scooter("s1", Location::new(0.0, 0.0), users);

        assert!(set.contains("alice"));
        assert!(!set.contains("bob"));
        assert_eq!(tracker.members("s1"), set);
    }

    #[test]
    fn refresh_replaces_previous_set() {
        let tracker = ProximityTracker::new(50.0);
        let origin = Location::new(0.0, 0.0);
        tracker.refresh_for_scooter("s1", origin, vec![("alice", north_of_origin(5.0))]);

        let set = tracker.refresh_for_scooter("s1", origin, vec![("carol", north_of_origin(5.0))]);

        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec!["carol".to_string()]);
    }

    #[test]
    fn refresh_with_nobody_near_is_empty() {
        let tracker = ProximityTracker::new(50.0);
        let set = tracker.refresh_for_scooter(
            "s1",
            Location::new(0.0, 0.0),
            vec![("bob", north_of_origin(1000.0))],
        );
        assert!(set.is_empty());
    }

    #[test]
    fn adjust_adds_and_removes_only_that_user() {
        let tracker = ProximityTracker::new(50.0);
        let scooters = vec![("s1", Location::new(0.0, 0.0)), ("s2", north_of_origin(5000.0))];
        tracker.refresh_for_scooter("s1", Location::new(0.0, 0.0), vec![("carol", north_of_origin(1.0))]);

        tracker.adjust_for_user("alice", north_of_origin(10.0), scooters.clone());
        assert!(tracker.members("s1").contains("alice"));
        assert!(!tracker.members("s2").contains("alice"));

        tracker.adjust_for_user("alice", north_of_origin(5000.0), scooters);
        assert!(!tracker.members("s1").contains("alice"));
        assert!(tracker.members("s2").contains("alice"));
        assert!(tracker.members("s1").contains("carol"));
    }

    #[test]
    fn unknown_scooter_has_no_members() {
        let tracker = ProximityTracker::new(50.0);
        assert!(tracker.members("ghost").is_empty());
        tracker.register("ghost");
        assert!(tracker.members("ghost").is_empty());
    }

    #[test]
    fn seed_computes_every_scooter() {
        let tracker = ProximityTracker::new(50.0);
        let users = vec![("alice", north_of_origin(10.0))];
        tracker.seed(
            vec![("s1", Location::new(0.0, 0.0)), ("s2", north_of_origin(900.0))],
            users,
        );
        assert!(tracker.members("s1").contains("alice"));
        assert!(tracker.members("s2").is_empty());
    }

    #[test]
    fn concurrent_refreshes_on_different_scooters() {
        let tracker = Arc::new(ProximityTracker::new(50.0));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    let id = format!("s{}", i);
                    for _ in 0..100 {
                        tracker.refresh_for_scooter(
                            &id,
                            Location::new(0.0, 0.0),
                            vec![("alice", north_of_origin(1.0))],
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for i in 0..8 {
            assert!(tracker.members(&format!("s{}", i)).contains("alice"));
        }
    }
}
