//! Mirrored store: primary storage with the cookie jar as fallback.

use crate::{CookieJar, StorageArea, StorageResult};
use std::sync::Arc;
use tracing::warn;
use widget_config_and_utils::Clock;

/// Writes go to the primary store and the cookie jar; reads fall back to the
/// jar when the primary misses or fails.
///
/// A failed primary read degrades to the fallback, and a fully failed read
/// degrades to `None` — callers treat that as "no value", never an error.
#[derive(Clone)]
pub struct MirroredStore {
    primary: Arc<dyn StorageArea>,
    cookies: CookieJar,
    clock: Arc<dyn Clock>,
}

impl MirroredStore {
    /// Create a mirror over the given primary store.
    pub fn new(primary: Arc<dyn StorageArea>, cookies: CookieJar, clock: Arc<dyn Clock>) -> Self {
        Self {
            primary,
            cookies,
            clock,
        }
    }

    /// Access the cookie jar (for expiry-stamped session cookies).
    pub fn cookie_jar(&self) -> &CookieJar {
        &self.cookies
    }
}

impl StorageArea for MirroredStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        if let Err(e) = self.primary.set(key, value) {
            warn!(key = %key, error = %e, "Primary storage write failed, cookie mirror only");
        }
        self.cookies.set(key, value);
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match self.primary.get(key) {
            Ok(Some(value)) => Ok(Some(value)),
            Ok(None) => Ok(self.cookies.get(key, self.clock.now())),
            Err(e) => {
                warn!(key = %key, error = %e, "Primary storage read failed, falling back to cookies");
                Ok(self.cookies.get(key, self.clock.now()))
            }
        }
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let in_primary = match self.primary.remove(key) {
            Ok(present) => present,
            Err(e) => {
                warn!(key = %key, error = %e, "Primary storage remove failed");
                false
            }
        };
        let in_cookies = self.cookies.remove(key);
        Ok(in_primary || in_cookies)
    }

    fn clear(&self) -> StorageResult<()> {
        if let Err(e) = self.primary.clear() {
            warn!(error = %e, "Primary storage clear failed");
        }
        self.cookies.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStorage, StorageError};
    use widget_config_and_utils::SystemClock;

    /// Backend that fails every operation, for degradation tests.
    struct FailingStorage;

    impl StorageArea for FailingStorage {
        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Backend("write refused".into()))
        }

        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Backend("read refused".into()))
        }

        fn remove(&self, _key: &str) -> StorageResult<bool> {
            Err(StorageError::Backend("remove refused".into()))
        }

        fn clear(&self) -> StorageResult<()> {
            Err(StorageError::Backend("clear refused".into()))
        }
    }

    fn mirror_over(primary: Arc<dyn StorageArea>) -> MirroredStore {
        MirroredStore::new(primary, CookieJar::new(), Arc::new(SystemClock))
    }

    #[test]
    fn write_lands_in_both_channels() {
        let primary = Arc::new(MemoryStorage::new());
        let mirror = mirror_over(primary.clone());

        mirror.set("k", "v").unwrap();

        assert_eq!(primary.get("k").unwrap(), Some("v".to_string()));
        assert_eq!(
            mirror.cookie_jar().get("k", SystemClock.now()),
            Some("v".to_string())
        );
    }

    #[test]
    fn read_prefers_primary() {
        let primary = Arc::new(MemoryStorage::new());
        let mirror = mirror_over(primary.clone());

        primary.set("k", "primary").unwrap();
        mirror.cookie_jar().set("k", "cookie");

        assert_eq!(mirror.get("k").unwrap(), Some("primary".to_string()));
    }

    #[test]
    fn read_falls_back_to_cookie_on_miss() {
        let mirror = mirror_over(Arc::new(MemoryStorage::new()));
        mirror.cookie_jar().set("k", "cookie-only");

        assert_eq!(mirror.get("k").unwrap(), Some("cookie-only".to_string()));
    }

    #[test]
    fn failed_primary_degrades_to_cookie_never_errors() {
        let mirror = mirror_over(Arc::new(FailingStorage));

        // Write still reaches the cookie channel
        mirror.set("k", "v").unwrap();
        assert_eq!(mirror.get("k").unwrap(), Some("v".to_string()));

        // A fully missing value degrades to None
        assert_eq!(mirror.get("absent").unwrap(), None);
    }

    #[test]
    fn remove_clears_both_channels() {
        let primary = Arc::new(MemoryStorage::new());
        let mirror = mirror_over(primary.clone());

        mirror.set("k", "v").unwrap();
        assert!(mirror.remove("k").unwrap());

        assert_eq!(primary.get("k").unwrap(), None);
        assert!(mirror.cookie_jar().get("k", SystemClock.now()).is_none());
        assert!(!mirror.remove("k").unwrap());
    }

    #[test]
    fn clear_is_idempotent() {
        let mirror = mirror_over(Arc::new(MemoryStorage::new()));
        mirror.set("a", "1").unwrap();
        mirror.clear().unwrap();
        mirror.clear().unwrap();
        assert_eq!(mirror.get("a").unwrap(), None);
    }
}
