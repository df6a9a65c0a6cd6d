//! The set of scopes the user has granted.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::debug;
use widget_config_and_utils::Clock;

/// A user's consent for one requester to access one data category.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsentGrant {
    /// Who asked for access.
    pub requester: String,
    /// Which data category is released.
    pub data_category: String,
    /// When the box was checked.
    pub granted_at: DateTime<Utc>,
    /// Reward offered for this grant, if any.
    pub reward: Option<String>,
}

/// Thread-safe ledger of granted scopes.
///
/// At most one grant exists per (requester, data_category) pair, and the
/// `granted` count is always exactly the cardinality of the set — it can
/// never go negative.
#[derive(Clone)]
pub struct GrantLedger {
    grants: Arc<Mutex<Vec<ConsentGrant>>>,
    clock: Arc<dyn Clock>,
}

impl GrantLedger {
    /// Create an empty ledger.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            grants: Arc::new(Mutex::new(Vec::new())),
            clock,
        }
    }

    /// Record a grant. Returns false (and changes nothing) when the
    /// (requester, data_category) pair is already granted.
    pub fn grant(&self, requester: &str, data_category: &str, reward: Option<&str>) -> bool {
        let mut grants = self.grants.lock().unwrap();
        if grants
            .iter()
            .any(|g| g.requester == requester && g.data_category == data_category)
        {
            debug!(requester = %requester, category = %data_category, "Grant already present");
            return false;
        }
        grants.push(ConsentGrant {
            requester: requester.to_string(),
            data_category: data_category.to_string(),
            granted_at: self.clock.now(),
            reward: reward.map(|r| r.to_string()),
        });
        true
    }

    /// Remove a grant. Returns whether it was present.
    pub fn revoke(&self, requester: &str, data_category: &str) -> bool {
        let mut grants = self.grants.lock().unwrap();
        let before = grants.len();
        grants.retain(|g| !(g.requester == requester && g.data_category == data_category));
        grants.len() != before
    }

    /// Whether a grant exists for the pair.
    pub fn contains(&self, requester: &str, data_category: &str) -> bool {
        self.grants
            .lock()
            .unwrap()
            .iter()
            .any(|g| g.requester == requester && g.data_category == data_category)
    }

    /// The running granted counter: exactly the set cardinality.
    pub fn granted(&self) -> usize {
        self.grants.lock().unwrap().len()
    }

    /// Whether nothing has been granted.
    pub fn is_empty(&self) -> bool {
        self.granted() == 0
    }

    /// Snapshot of the grant set.
    pub fn grants(&self) -> Vec<ConsentGrant> {
        self.grants.lock().unwrap().clone()
    }

    /// Drop every grant.
    pub fn clear(&self) {
        self.grants.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use widget_config_and_utils::ManualClock;

    fn ledger() -> GrantLedger {
        GrantLedger::new(Arc::new(ManualClock::at_system_now()))
    }

    #[test]
    fn starts_empty() {
        let ledger = ledger();
        assert!(ledger.is_empty());
        assert_eq!(ledger.granted(), 0);
    }

    #[test]
    fn grant_increments_counter() {
        let ledger = ledger();
        assert!(ledger.grant("acme", "interests", None));
        assert!(ledger.grant("acme", "watch-history", Some("0.25")));

        assert_eq!(ledger.granted(), 2);
        assert!(ledger.contains("acme", "interests"));
    }

    #[test]
    fn duplicate_pair_is_rejected() {
        let ledger = ledger();
        assert!(ledger.grant("acme", "interests", None));
        assert!(!ledger.grant("acme", "interests", Some("1.0")));

        // Counter stays exactly the set cardinality
        assert_eq!(ledger.granted(), 1);
        assert_eq!(ledger.grants().len(), 1);
    }

    #[test]
    fn same_category_different_requester_is_distinct() {
        let ledger = ledger();
        assert!(ledger.grant("acme", "interests", None));
        assert!(ledger.grant("globex", "interests", None));
        assert_eq!(ledger.granted(), 2);
    }

    #[test]
    fn toggle_on_then_off_restores_prior_state() {
        let ledger = ledger();
        ledger.grant("acme", "interests", None);
        let before = ledger.grants();

        ledger.grant("acme", "persona", None);
        assert!(ledger.revoke("acme", "persona"));

        assert_eq!(ledger.grants(), before);
        assert_eq!(ledger.granted(), 1);
    }

    #[test]
    fn revoke_absent_pair_never_goes_negative() {
        let ledger = ledger();
        assert!(!ledger.revoke("acme", "interests"));
        assert_eq!(ledger.granted(), 0);

        ledger.grant("acme", "interests", None);
        assert!(ledger.revoke("acme", "interests"));
        assert!(!ledger.revoke("acme", "interests"));
        assert_eq!(ledger.granted(), 0);
    }

    #[test]
    fn grant_records_clock_time_and_reward() {
        let clock = Arc::new(ManualClock::at_system_now());
        let stamp = clock.now();
        let ledger = GrantLedger::new(clock);

        ledger.grant("acme", "interests", Some("0.5"));

        let grants = ledger.grants();
        assert_eq!(grants[0].granted_at, stamp);
        assert_eq!(grants[0].reward.as_deref(), Some("0.5"));
    }

    #[test]
    fn clear_empties_the_set() {
        let ledger = ledger();
        ledger.grant("a", "x", None);
        ledger.grant("b", "y", None);
        ledger.clear();
        assert!(ledger.is_empty());
    }

    #[test]
    fn clones_share_state() {
        let ledger = ledger();
        ledger.clone().grant("acme", "interests", None);
        assert_eq!(ledger.granted(), 1);
    }
}
