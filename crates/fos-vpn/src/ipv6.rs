//! System IPv6 Toggle
//!
//! Enables or disables IPv6 on the host's adapters. The platform calls are
//! blocking, so they run on the blocking thread pool.

use crate::config::LeakGuardSettings;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

/// Platform IPv6 binding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Ipv6ToggleError {
    #[error("Platform call failed with code {0}")]
    Platform(u32),

    #[error("Adapter not found: {0}")]
    AdapterNotFound(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Blocking platform calls that flip IPv6 bindings
pub trait Ipv6Toggle: Send + Sync {
    fn enable_on_all_adapters(&self, app_name: &str, adapter_id: &str) -> Result<(), Ipv6ToggleError>;

    fn disable_on_all_adapters(&self, app_name: &str, adapter_id: &str) -> Result<(), Ipv6ToggleError>;

    /// Enable IPv6 on the tunnel adapter only
    fn enable_on_adapter(&self, app_name: &str, adapter_id: &str) -> Result<(), Ipv6ToggleError>;
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Enable,
    Disable,
    EnableOnAdapter,
}

impl Action {
    fn describe(self) -> &'static str {
        match self {
            Action::Enable => "Enabling",
            Action::Disable => "Disabling",
            Action::EnableOnAdapter => "Enabling on VPN interface",
        }
    }
}

/// System IPv6 state, assumed enabled at startup
pub struct SystemIpv6 {
    toggle: Arc<dyn Ipv6Toggle>,
    app_name: String,
    adapter_id: String,
    enabled: AtomicBool,
}

impl SystemIpv6 {
    pub fn new(toggle: Arc<dyn Ipv6Toggle>, settings: &LeakGuardSettings) -> Self {
        Self {
            toggle,
            app_name: settings.app_name.clone(),
            adapter_id: settings.tunnel_adapter_id.clone(),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enable IPv6 on every adapter, returns true on success
    pub async fn enable(&self) -> bool {
        let ok = self.run(Action::Enable).await;
        if ok {
            self.enabled.store(true, Ordering::SeqCst);
        }
        ok
    }

    /// Disable IPv6 on every adapter except the tunnel
    pub async fn disable(&self) -> bool {
        let ok = self.run(Action::Disable).await;
        if ok {
            self.enabled.store(false, Ordering::SeqCst);
        }
        ok
    }

    pub async fn enable_on_tunnel_adapter(&self) -> bool {
        self.run(Action::EnableOnAdapter).await
    }

    async fn run(&self, action: Action) -> bool {
        let toggle = Arc::clone(&self.toggle);
        let app_name = self.app_name.clone();
        let adapter_id = self.adapter_id.clone();

        info!("IPv6: {}", action.describe());
        let result = tokio::task::spawn_blocking(move || match action {
            Action::Enable => toggle.enable_on_all_adapters(&app_name, &adapter_id),
            Action::Disable => toggle.disable_on_all_adapters(&app_name, &adapter_id),
            Action::EnableOnAdapter => toggle.enable_on_adapter(&app_name, &adapter_id),
        })
        .await
        .unwrap_or_else(|e| Err(Ipv6ToggleError::Task(e.to_string())));

        match result {
            Ok(()) => {
                info!("IPv6: {} succeeded", action.describe());
                true
            }
            Err(e) => {
                error!("IPv6: {} failed: {}", action.describe(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeToggle, ToggleCall};

    fn system(toggle: Arc<FakeToggle>) -> SystemIpv6 {
        SystemIpv6::new(toggle, &LeakGuardSettings::default())
    }

    #[tokio::test]
    async fn test_disable_then_enable() {
        let toggle = Arc::new(FakeToggle::default());
        let ipv6 = system(toggle.clone());
        assert!(ipv6.is_enabled());

        assert!(ipv6.disable().await);
        assert!(!ipv6.is_enabled());

        assert!(ipv6.enable().await);
        assert!(ipv6.is_enabled());
        assert_eq!(toggle.calls(), vec![ToggleCall::DisableAll, ToggleCall::EnableAll]);
    }

    #[tokio::test]
    async fn test_failure_keeps_state() {
        let toggle = Arc::new(FakeToggle::default());
        toggle.set_failing(true);
        let ipv6 = system(toggle.clone());

        assert!(!ipv6.disable().await);
        assert!(ipv6.is_enabled());
    }

    #[tokio::test]
    async fn test_adapter_only_does_not_touch_state() {
        let toggle = Arc::new(FakeToggle::default());
        let ipv6 = system(toggle.clone());
        ipv6.disable().await;

        assert!(ipv6.enable_on_tunnel_adapter().await);
        assert!(!ipv6.is_enabled());
        assert_eq!(toggle.adapter_ids(), vec!["wintun".to_string(); 2]);
    }
}
