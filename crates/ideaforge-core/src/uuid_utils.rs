//! UUID helpers.
//!
//! All primary keys are UUIDv7 (time-ordered), generated app-side so ids
//! sort chronologically and insert order is index-friendly.

use uuid::Uuid;

/// Generate a new UUIDv7.
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Whether a UUID is version 7.
pub fn is_v7(id: &Uuid) -> bool {
    id.get_version_num() == 7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_v7_is_version_7() {
        assert!(is_v7(&new_v7()));
        assert!(!is_v7(&Uuid::new_v4()));
    }

    #[test]
    fn new_v7_is_time_ordered() {
        let a = new_v7();
        let b = new_v7();
        assert!(a <= b);
    }
}
