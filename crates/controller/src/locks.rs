//! Per-device serialization of read-decide-write sequences

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per device identifier, created on first use
#[derive(Debug, Default)]
pub struct DeviceLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held locks; released on drop
pub struct DeviceGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, device: &str) -> Arc<AsyncMutex<()>> {
        // The map holds no invariant a panic could break
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(device.to_string()).or_default().clone()
    }

    /// Lock a single device
    pub async fn lock(&self, device: &str) -> DeviceGuard {
        self.lock_many(&[device]).await
    }

    /// Lock several devices, always in sorted order so callers cannot deadlock
    pub async fn lock_many(&self, devices: &[&str]) -> DeviceGuard {
        let mut sorted: Vec<&str> = devices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for device in sorted {
            guards.push(self.handle(device).lock_owned().await);
        }
        DeviceGuard { _guards: guards }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_device_is_exclusive() {
        let locks = Arc::new(DeviceLocks::new());
        let guard = locks.lock("exhaust").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock("exhaust").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_devices_do_not_block() {
        let locks = DeviceLocks::new();
        let _exhaust = locks.lock("exhaust").await;
        let _pump = locks.lock("pump").await;
    }

    #[tokio::test]
    async fn test_duplicate_names_lock_once() {
        let locks = DeviceLocks::new();
        let _both = locks.lock_many(&["sprinkler", "exhaust", "sprinkler"]).await;
    }
}
