use crate::model::Reservation;

pub const DEFAULT_PRIVILEGED_USER: &str = "superuser";

/// Who may change or cancel an existing reservation: its owner, or the
/// privileged identity. Callers are trusted to be who they say they are.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    privileged: String,
}

impl AccessPolicy {
    pub fn new(privileged: impl Into<String>) -> Self {
        Self {
            privileged: privileged.into(),
        }
    }

    pub fn is_privileged(&self, caller_id: &str) -> bool {
        caller_id == self.privileged
    }

    pub fn can_mutate(&self, caller_id: &str, reservation: &Reservation) -> bool {
        self.is_privileged(caller_id) || caller_id == reservation.owner_id
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PRIVILEGED_USER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ulid::Ulid;

    fn owned_by(owner: &str) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: Ulid::new(),
            resource_id: "room1".into(),
            owner_id: owner.into(),
            start_time: now,
            end_time: now + chrono::Duration::hours(1),
            created_at: now,
        }
    }

    #[test]
    fn owner_may_mutate() {
        let policy = AccessPolicy::default();
        assert!(policy.can_mutate("user1", &owned_by("user1")));
    }

    #[test]
    fn other_user_may_not() {
        let policy = AccessPolicy::default();
        assert!(!policy.can_mutate("user2", &owned_by("user1")));
        assert!(!policy.can_mutate("", &owned_by("user1")));
    }

    #[test]
    fn privileged_overrides_ownership() {
        let policy = AccessPolicy::default();
        assert!(policy.can_mutate("superuser", &owned_by("user1")));

        let custom = AccessPolicy::new("admin");
        assert!(custom.can_mutate("admin", &owned_by("user1")));
        assert!(!custom.can_mutate("superuser", &owned_by("user1")));
    }

    #[test]
    fn identity_match_is_exact() {
        let policy = AccessPolicy::default();
        assert!(!policy.can_mutate("User1", &owned_by("user1")));
        assert!(!policy.can_mutate("SUPERUSER", &owned_by("user1")));
    }
}
