//! Typed cache key builders
//!
//! All keys live under a versioned `v1:` namespace so the layout can change
//! without clashing with older deployments.

use std::fmt;

const NAMESPACE: &str = "v1";

pub mod breaker {
    use super::*;

    /// `v1:breaker:{name}:state`
    pub struct StateKey<'a> {
        name: &'a str,
    }

    impl<'a> StateKey<'a> {
        pub fn new(name: &'a str) -> Self {
            Self { name }
        }
    }

    impl fmt::Display for StateKey<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:breaker:{}:state", NAMESPACE, self.name)
        }
    }

    /// `v1:breaker:{name}:failures`
    pub struct FailuresKey<'a> {
        name: &'a str,
    }

    impl<'a> FailuresKey<'a> {
        pub fn new(name: &'a str) -> Self {
            Self { name }
        }
    }

    impl fmt::Display for FailuresKey<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:breaker:{}:failures", NAMESPACE, self.name)
        }
    }

    /// `v1:breaker:{name}:opened_at`
    pub struct OpenedAtKey<'a> {
        name: &'a str,
    }

    impl<'a> OpenedAtKey<'a> {
        pub fn new(name: &'a str) -> Self {
            Self { name }
        }
    }

    impl fmt::Display for OpenedAtKey<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:breaker:{}:opened_at", NAMESPACE, self.name)
        }
    }
}

pub mod payments {
    use super::*;

    /// `v1:payments:idempotency:{key}`
    pub struct IdempotencyKey<'a> {
        key: &'a str,
    }

    impl<'a> IdempotencyKey<'a> {
        pub fn new(key: &'a str) -> Self {
            Self { key }
        }
    }

    impl fmt::Display for IdempotencyKey<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:payments:idempotency:{}", NAMESPACE, self.key)
        }
    }
}

pub mod webhooks {
    use super::*;

    /// `v1:webhooks:event:{event_id}`
    pub struct EventKey<'a> {
        event_id: &'a str,
    }

    impl<'a> EventKey<'a> {
        pub fn new(event_id: &'a str) -> Self {
            Self { event_id }
        }
    }

    impl fmt::Display for EventKey<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:webhooks:event:{}", NAMESPACE, self.event_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_key_formats() {
        assert_eq!(
            breaker::StateKey::new("stripe").to_string(),
            "v1:breaker:stripe:state"
        );
        assert_eq!(
            breaker::FailuresKey::new("stripe").to_string(),
            "v1:breaker:stripe:failures"
        );
        assert_eq!(
            breaker::OpenedAtKey::new("stripe").to_string(),
            "v1:breaker:stripe:opened_at"
        );
    }

    #[test]
    fn test_idempotency_key_format() {
        assert_eq!(
            payments::IdempotencyKey::new("abc123").to_string(),
            "v1:payments:idempotency:abc123"
        );
    }

    #[test]
    fn test_webhook_event_key_format() {
        assert_eq!(
            webhooks::EventKey::new("evt_001").to_string(),
            "v1:webhooks:event:evt_001"
        );
    }
}
