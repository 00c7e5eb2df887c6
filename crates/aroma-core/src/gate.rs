//! Permission and adapter readiness checks.
//!
//! [`PermissionGate::ensure_ready`] must succeed before scanning. It requests
//! the platform's BLE permissions in order, then makes sure the adapter is
//! powered, turning it on where the platform allows.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::error::{AdapterUnavailableReason, Error, Result, TransportError};
use crate::platform::{Permission, Platform};
use crate::traits::{AdapterControl, AdapterState};

/// Outcome of the most recent readiness check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    /// No check has run yet.
    #[default]
    Unknown,
    /// Permissions are granted and the adapter is powered on.
    Ready,
    /// The last check failed.
    Denied,
}

/// Successful readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// Platform whose rules were applied.
    pub platform: Platform,
    /// Permissions that were requested and granted, in request order.
    pub granted: Vec<Permission>,
    /// Whether the adapter had to be turned on by this check.
    pub adapter_enabled: bool,
}

/// Gate in front of every scan.
///
/// Every call re-checks; nothing is cached except the last outcome, which
/// the scanner consults through [`PermissionGate::status`].
pub struct PermissionGate {
    adapter: Arc<dyn AdapterControl>,
    config: GateConfig,
    status: RwLock<GateStatus>,
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("platform", &self.adapter.platform())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl PermissionGate {
    pub fn new(adapter: Arc<dyn AdapterControl>, config: GateConfig) -> Self {
        Self {
            adapter,
            config,
            status: RwLock::new(GateStatus::Unknown),
        }
    }

    /// Outcome of the most recent [`ensure_ready`](Self::ensure_ready) call.
    pub fn status(&self) -> GateStatus {
        *self.status.read().expect("gate status lock poisoned")
    }

    /// Whether the most recent check succeeded.
    pub fn is_ready(&self) -> bool {
        self.status() == GateStatus::Ready
    }

    /// Request permissions and make sure the adapter is on.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] at the first refused permission.
    /// - [`Error::AdapterUnavailable`] if the adapter is off and could not be
    ///   turned on, or cannot be used at all.
    #[tracing::instrument(level = "info", skip_all, fields(platform = %self.adapter.platform()))]
    pub async fn ensure_ready(&self) -> Result<Readiness> {
        let result = self.check().await;
        let status = if result.is_ok() {
            GateStatus::Ready
        } else {
            GateStatus::Denied
        };
        *self.status.write().expect("gate status lock poisoned") = status;

        match &result {
            Ok(readiness) => info!(
                adapter_enabled = readiness.adapter_enabled,
                "Bluetooth ready"
            ),
            Err(e) => warn!(error = %e, "Bluetooth not ready"),
        }
        result
    }

    async fn check(&self) -> Result<Readiness> {
        let platform = self.adapter.platform();
        let settings_url = platform.bluetooth_settings_url();

        let mut granted = Vec::new();
        for &permission in platform.required_permissions() {
            let status = self
                .adapter
                .request_permission(permission)
                .await
                .map_err(|e| {
                    warn!(%permission, error = %e, "Permission request failed");
                    Error::PermissionDenied {
                        permission,
                        settings_url,
                    }
                })?;
            if !status.is_granted() {
                return Err(Error::PermissionDenied {
                    permission,
                    settings_url,
                });
            }
            debug!(%permission, "Permission granted");
            granted.push(permission);
        }

        let state = self
            .adapter
            .adapter_state()
            .await
            .map_err(|e| self.state_error(platform, e))?;
        debug!(?state, "Adapter state");

        let adapter_enabled = match state {
            AdapterState::PoweredOn => false,
            AdapterState::Unavailable => {
                return Err(Error::AdapterUnavailable {
                    reason: AdapterUnavailableReason::NoAdapter,
                    settings_url,
                });
            }
            AdapterState::PoweredOff | AdapterState::Unknown if platform.can_enable_adapter() => {
                self.enable_and_wait(settings_url).await?;
                true
            }
            AdapterState::PoweredOff | AdapterState::Unknown => {
                return Err(Error::AdapterUnavailable {
                    reason: AdapterUnavailableReason::ManualEnableRequired,
                    settings_url,
                });
            }
        };

        Ok(Readiness {
            platform,
            granted,
            adapter_enabled,
        })
    }

    async fn enable_and_wait(&self, settings_url: Option<&'static str>) -> Result<()> {
        info!("Bluetooth is off, requesting enable");
        self.adapter
            .enable_adapter()
            .await
            .map_err(|e| Error::AdapterUnavailable {
                reason: AdapterUnavailableReason::EnableFailed(e.to_string()),
                settings_url,
            })?;

        let limit = self.config.adapter_enable_timeout;
        let started = Instant::now();
        let wait = async {
            loop {
                match self.adapter.adapter_state().await {
                    Ok(AdapterState::PoweredOn) => return,
                    Ok(state) => debug!(?state, "Waiting for adapter"),
                    Err(e) => debug!(error = %e, "Adapter state poll failed"),
                }
                sleep(self.config.adapter_poll_interval).await;
            }
        };

        timeout(limit, wait).await.map_err(|_| Error::AdapterUnavailable {
            reason: AdapterUnavailableReason::EnableTimedOut(limit),
            settings_url,
        })?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Adapter powered on");
        Ok(())
    }

    fn state_error(&self, platform: Platform, error: TransportError) -> Error {
        if error.is_permission_denied() {
            Error::PermissionDenied {
                permission: platform
                    .required_permissions()
                    .first()
                    .copied()
                    .unwrap_or(Permission::Bluetooth),
                settings_url: platform.bluetooth_settings_url(),
            }
        } else {
            Error::AdapterUnavailable {
                reason: AdapterUnavailableReason::StateUnavailable(error.to_string()),
                settings_url: platform.bluetooth_settings_url(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::MockAdapter;
    use crate::platform::PermissionStatus;

    fn gate(adapter: &Arc<MockAdapter>) -> PermissionGate {
        PermissionGate::new(adapter.clone(), GateConfig::default())
    }

    #[tokio::test]
    async fn test_desktop_ready_without_permissions() {
        let adapter = Arc::new(MockAdapter::new(Platform::Desktop));
        let gate = gate(&adapter);
        assert_eq!(gate.status(), GateStatus::Unknown);

        let readiness = gate.ensure_ready().await.unwrap();
        assert!(readiness.granted.is_empty());
        assert!(!readiness.adapter_enabled);
        assert!(gate.is_ready());
        assert!(adapter.requested_permissions().is_empty());
    }

    #[tokio::test]
    async fn test_modern_android_requests_in_order() {
        let adapter = Arc::new(MockAdapter::new(Platform::Android { api_level: 33 }));
        let readiness = gate(&adapter).ensure_ready().await.unwrap();
        assert_eq!(
            adapter.requested_permissions(),
            vec![
                Permission::BluetoothScan,
                Permission::BluetoothConnect,
                Permission::BluetoothAdvertise,
            ]
        );
        assert_eq!(readiness.granted.len(), 3);
    }

    #[tokio::test]
    async fn test_stops_at_first_refusal() {
        let adapter = Arc::new(
            MockAdapter::builder()
                .platform(Platform::Android { api_level: 31 })
                .permission(Permission::BluetoothConnect, PermissionStatus::Denied)
                .build(),
        );
        let gate = gate(&adapter);
        let err = gate.ensure_ready().await.unwrap_err();

        assert!(matches!(
            err,
            Error::PermissionDenied {
                permission: Permission::BluetoothConnect,
                settings_url: Some("android.settings.BLUETOOTH_SETTINGS"),
            }
        ));
        assert_eq!(
            adapter.requested_permissions(),
            vec![Permission::BluetoothScan, Permission::BluetoothConnect]
        );
        assert_eq!(gate.status(), GateStatus::Denied);
    }

    #[tokio::test]
    async fn test_ios_adapter_off_needs_user() {
        let adapter = Arc::new(
            MockAdapter::builder()
                .platform(Platform::Ios)
                .adapter_state(AdapterState::PoweredOff)
                .build(),
        );
        let err = gate(&adapter).ensure_ready().await.unwrap_err();
        assert!(matches!(
            err,
            Error::AdapterUnavailable {
                reason: AdapterUnavailableReason::ManualEnableRequired,
                settings_url: Some("App-Prefs:Bluetooth"),
            }
        ));
        assert_eq!(adapter.enable_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_android_enables_adapter() {
        let adapter = Arc::new(
            MockAdapter::builder()
                .platform(Platform::Android { api_level: 30 })
                .adapter_state(AdapterState::PoweredOff)
                .enable_delay(Duration::from_secs(2))
                .build(),
        );
        let readiness = gate(&adapter).ensure_ready().await.unwrap();
        assert!(readiness.adapter_enabled);
        assert_eq!(readiness.granted, vec![Permission::FineLocation]);
        assert_eq!(adapter.enable_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_android_enable_times_out() {
        let adapter = Arc::new(
            MockAdapter::builder()
                .platform(Platform::Android { api_level: 34 })
                .adapter_state(AdapterState::PoweredOff)
                .enable_never_completes()
                .build(),
        );
        let gate = gate(&adapter);
        let err = gate.ensure_ready().await.unwrap_err();
        assert!(matches!(
            err,
            Error::AdapterUnavailable {
                reason: AdapterUnavailableReason::EnableTimedOut(d),
                ..
            } if d == Duration::from_secs(10)
        ));
        assert!(!gate.is_ready());
    }

    #[tokio::test]
    async fn test_rechecks_every_call() {
        let adapter = Arc::new(MockAdapter::new(Platform::Desktop));
        let gate = gate(&adapter);
        gate.ensure_ready().await.unwrap();

        adapter.set_adapter_state(AdapterState::PoweredOff);
        assert!(gate.ensure_ready().await.is_err());
        assert_eq!(gate.status(), GateStatus::Denied);

        adapter.set_adapter_state(AdapterState::PoweredOn);
        gate.ensure_ready().await.unwrap();
        assert_eq!(gate.status(), GateStatus::Ready);
    }

    #[tokio::test]
    async fn test_missing_adapter() {
        let adapter = Arc::new(
            MockAdapter::builder()
                .adapter_state(AdapterState::Unavailable)
                .build(),
        );
        let err = gate(&adapter).ensure_ready().await.unwrap_err();
        assert!(matches!(
            err,
            Error::AdapterUnavailable {
                reason: AdapterUnavailableReason::NoAdapter,
                settings_url: None,
            }
        ));
    }
}
