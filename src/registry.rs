//! One shared controller per device address.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use crate::address::Address;
use crate::config::ControllerConfig;
use crate::controller::DeviceController;

/// Hands out a single [`DeviceController`] per address.
///
/// Every caller asking for the same address gets the same controller, so all
/// of them share one connection and one reference count. Controllers live as
/// long as the registry.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use yeelight_rs::{Address, ControllerRegistry};
///
/// # async fn run() {
/// let registry = ControllerRegistry::new();
/// let address: Address = "192.168.1.20:55443".parse().unwrap();
/// let first = registry.controller(&address);
/// let second = registry.controller(&address);
/// assert!(Arc::ptr_eq(&first, &second));
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ControllerRegistry {
    config: ControllerConfig,
    controllers: Mutex<HashMap<Address, Arc<DeviceController>>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose controllers all use `config`.
    pub fn with_config(config: ControllerConfig) -> Self {
        ControllerRegistry {
            config,
            controllers: Mutex::default(),
        }
    }

    /// The controller for `address`, created on first request.
    ///
    /// Must be called from within the async runtime.
    pub fn controller(&self, address: &Address) -> Arc<DeviceController> {
        let mut controllers = self
            .controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let controller = controllers.entry(address.clone()).or_insert_with(|| {
            debug!("{address}: creating controller");
            Arc::new(DeviceController::new(address.clone(), self.config.clone()))
        });
        Arc::clone(controller)
    }

    pub fn len(&self) -> usize {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_address_shares_controller() {
        let registry = ControllerRegistry::new();
        let first = registry.controller(&Address::new("10.0.0.2", 55443));
        let second = registry.controller(&"10.0.0.2".parse().unwrap());
        let other = registry.controller(&Address::new("10.0.0.3", 55443));

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_controllers_use_registry_config() {
        let config = ControllerConfig::default().with_command_timeout(Duration::from_millis(10));
        let registry = ControllerRegistry::with_config(config.clone());
        let controller = registry.controller(&Address::new("10.0.0.2", 55443));
        assert_eq!(controller.config(), &config);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_requests_share_controller() {
        let registry = Arc::new(ControllerRegistry::new());
        let address = Address::new("10.0.0.4", 55443);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let address = address.clone();
                tokio::spawn(async move { registry.controller(&address) })
            })
            .collect();

        let mut controllers = Vec::new();
        for task in tasks {
            controllers.push(task.await.unwrap());
        }
        assert!(controllers.iter().all(|c| Arc::ptr_eq(c, &controllers[0])));
        assert_eq!(registry.len(), 1);
    }
}
