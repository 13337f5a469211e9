//! GPU load probe.
//!
//! With the `nvidia` feature the probe reads utilisation through NVML. Without
//! it, or when no NVIDIA driver/device is present, every reading reports the
//! GPU as unavailable and the sampler stores sentinels.

use crate::config::GpuConfig;
use crate::error::{MonitorError, Result};
use crate::metric::Metric;
use tracing::{debug, info};

#[cfg(feature = "nvidia")]
use nvml_wrapper::Nvml;

/// Reads the load of one GPU as a fraction in `[0, 1]`.
pub struct GpuProbe {
    #[cfg(feature = "nvidia")]
    nvml: Option<Nvml>,
    device_index: u32,
    enabled: bool,
}

impl std::fmt::Debug for GpuProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuProbe")
            .field("device_index", &self.device_index)
            .field("enabled", &self.enabled)
            .field("available", &self.is_available())
            .finish()
    }
}

impl GpuProbe {
    /// Probes for a GPU according to the configuration.
    pub fn detect(config: &GpuConfig) -> Self {
        if !config.enabled {
            info!("GPU sampling disabled by configuration.");
            return Self::disabled();
        }

        #[cfg(feature = "nvidia")]
        {
            let nvml = match Nvml::init() {
                Ok(nvml) => Some(nvml),
                Err(e) => {
                    info!(error = %e, "NVML not available, GPU will report as unavailable.");
                    None
                }
            };
            let probe = Self {
                nvml,
                device_index: config.device_index,
                enabled: true,
            };
            if probe.is_available() {
                info!(device_index = config.device_index, "GPU sampling via NVML enabled.");
            }
            probe
        }

        #[cfg(not(feature = "nvidia"))]
        {
            debug!("Built without a GPU backend, GPU will report as unavailable.");
            Self {
                device_index: config.device_index,
                enabled: true,
            }
        }
    }

    /// A probe that always reports the GPU as unavailable.
    pub fn disabled() -> Self {
        Self {
            #[cfg(feature = "nvidia")]
            nvml: None,
            device_index: 0,
            enabled: false,
        }
    }

    /// Returns `true` if a GPU backend is initialised and the configured
    /// device exists.
    pub fn is_available(&self) -> bool {
        #[cfg(feature = "nvidia")]
        {
            self.enabled
                && self
                    .nvml
                    .as_ref()
                    .is_some_and(|nvml| nvml.device_by_index(self.device_index).is_ok())
        }
        #[cfg(not(feature = "nvidia"))]
        {
            false
        }
    }

    /// Current GPU load as a fraction.
    pub fn load_fraction(&self) -> Result<f64> {
        if !self.enabled {
            return Err(MonitorError::unavailable(Metric::Gpu, "disabled by configuration"));
        }

        #[cfg(feature = "nvidia")]
        {
            let nvml = self
                .nvml
                .as_ref()
                .ok_or_else(|| MonitorError::unavailable(Metric::Gpu, "NVML not initialised"))?;
            let device = nvml
                .device_by_index(self.device_index)
                .map_err(|e| MonitorError::unavailable(Metric::Gpu, e.to_string()))?;
            let rates = device
                .utilization_rates()
                .map_err(|e| MonitorError::unavailable(Metric::Gpu, e.to_string()))?;
            debug!(device_index = self.device_index, gpu = rates.gpu, "GPU utilisation read.");
            Ok(f64::from(rates.gpu) / 100.0)
        }

        #[cfg(not(feature = "nvidia"))]
        {
            Err(MonitorError::unavailable(Metric::Gpu, "no GPU backend compiled in"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_probe_is_unavailable() {
        let probe = GpuProbe::disabled();
        assert!(!probe.is_available());
        let err = probe.load_fraction().unwrap_err();
        assert!(matches!(err, MonitorError::MetricUnavailable { metric: Metric::Gpu, .. }));
    }

    #[test]
    fn test_detect_respects_enabled_flag() {
        let probe = GpuProbe::detect(&GpuConfig {
            enabled: false,
            device_index: 0,
        });
        assert!(probe.load_fraction().is_err());
    }

    #[cfg(not(feature = "nvidia"))]
    #[test]
    fn test_no_backend_reports_unavailable() {
        let probe = GpuProbe::detect(&GpuConfig::default());
        assert!(!probe.is_available());
        assert!(probe.load_fraction().is_err());
    }
}
