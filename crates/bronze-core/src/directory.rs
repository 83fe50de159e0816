//! Self id to caller lookup for every connected peer.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::api::ApiCaller;

/// Every connected peer, keyed by the self id learned at handshake.
///
/// Transports insert a caller after a successful handshake and remove it
/// when the connection drops. Owned by the runtime and shared with drivers
/// through [`DriverContext`](crate::driver::DriverContext).
#[derive(Default)]
pub struct CallerDirectory {
    callers: DashMap<i64, Arc<dyn ApiCaller>>,
}

impl CallerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `caller` under `self_id`, replacing any previous peer.
    pub fn insert(&self, self_id: i64, caller: Arc<dyn ApiCaller>) {
        if self.callers.insert(self_id, caller).is_some() {
            info!(bot_id = self_id, "replaced existing connection");
        } else {
            info!(bot_id = self_id, "bot connected");
        }
    }

    /// Removes the entry for `self_id` only if it still points at `caller`.
    ///
    /// A peer that reconnected under the same id keeps its new entry when
    /// the old connection's receive loop cleans up afterwards.
    pub fn remove(&self, self_id: i64, caller: &Arc<dyn ApiCaller>) -> bool {
        let removed = self
            .callers
            .remove_if(&self_id, |_, current| {
                std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(caller))
            })
            .is_some();
        if removed {
            info!(bot_id = self_id, "bot disconnected");
        }
        removed
    }

    pub fn get(&self, self_id: i64) -> Option<Arc<dyn ApiCaller>> {
        self.callers.get(&self_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, self_id: i64) -> bool {
        self.callers.contains_key(&self_id)
    }

    pub fn ids(&self) -> Vec<i64> {
        self.callers.iter().map(|entry| *entry.key()).collect()
    }

    /// Visits every peer until `f` returns false.
    ///
    /// Callers are cloned out first, so `f` may touch the directory.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(i64, &Arc<dyn ApiCaller>) -> bool,
    {
        let snapshot: Vec<_> = self
            .callers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        for (id, caller) in &snapshot {
            if !f(*id, caller) {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.callers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callers.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::any::Any;

    use async_trait::async_trait;

    use super::*;
    use crate::api::{ApiRequest, ApiResponse};
    use crate::error::ApiResult;

    pub(crate) struct NullCaller(pub i64);

    #[async_trait]
    impl ApiCaller for NullCaller {
        async fn call_api(&self, _request: ApiRequest) -> ApiResult<ApiResponse> {
            Ok(ApiResponse::ok(serde_json::Value::Null))
        }

        fn self_id(&self) -> i64 {
            self.0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_remove_ignores_replaced_peer() {
        let directory = CallerDirectory::new();
        let old: Arc<dyn ApiCaller> = Arc::new(NullCaller(1));
        let new: Arc<dyn ApiCaller> = Arc::new(NullCaller(1));

        directory.insert(1, old.clone());
        directory.insert(1, new.clone());
        assert!(!directory.remove(1, &old));
        assert!(directory.contains(1));

        assert!(directory.remove(1, &new));
        assert!(directory.is_empty());
    }

    #[test]
    fn test_range_stops_early() {
        let directory = CallerDirectory::new();
        for id in 1..=3 {
            directory.insert(id, Arc::new(NullCaller(id)));
        }
        let mut seen = 0;
        directory.range(|_, _| {
            seen += 1;
            seen < 2
        });
        assert_eq!(seen, 2);
        let caller = directory.get(2).unwrap();
        assert!(crate::api::downcast_caller::<NullCaller>(caller.as_ref()).is_some());
    }
}
