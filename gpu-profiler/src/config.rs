//! PC sampling configuration

use crate::cupti::pcsampling::{CollectionMode, ConfigurationAttribute, OutputDataFormat};
use crate::error::{CuptiError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sampling parameters applied to a session before it starts
///
/// Missing fields take their defaults, so a config file only needs the values
/// it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Sampling period passed through to CUPTI
    pub sampling_period: u32,

    /// PC records retrieved per fill of the sampling buffer
    pub collect_num_pcs: usize,

    /// Host-side scratch buffer size in bytes
    pub scratch_buffer_size: usize,

    /// Device-side hardware buffer size in bytes
    pub hardware_buffer_size: usize,

    pub collection_mode: CollectionMode,

    /// Only sample between explicit start and stop calls
    pub enable_start_stop_control: bool,

    /// Stall reason indices to collect (None = all supported)
    pub stall_reasons: Option<Vec<u32>>,

    /// Sleep span of the CUPTI worker thread (None = vendor default)
    pub worker_thread_sleep_span_ms: Option<u32>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sampling_period: 10,
            collect_num_pcs: 4096,
            scratch_buffer_size: 1024 * 1024,
            hardware_buffer_size: 512 * 1024 * 1024,
            collection_mode: CollectionMode::Continuous,
            enable_start_stop_control: true,
            stall_reasons: None,
            worker_thread_sleep_span_ms: None,
        }
    }
}

impl SamplingConfig {
    /// Load a TOML or JSON file over the defaults
    ///
    /// `GPUSCOPE_*` environment variables (e.g. `GPUSCOPE_SAMPLING_PERIOD`)
    /// override values from the file.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("GPUSCOPE").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CuptiError::Config(format!("{}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sampling_period == 0 {
            return Err(CuptiError::Config(
                "sampling period must be greater than 0".to_string(),
            ));
        }

        if self.collect_num_pcs == 0 {
            return Err(CuptiError::Config(
                "collect_num_pcs must be greater than 0".to_string(),
            ));
        }

        if self.scratch_buffer_size == 0 || self.hardware_buffer_size == 0 {
            return Err(CuptiError::Config(
                "buffer sizes must be greater than 0".to_string(),
            ));
        }

        if matches!(&self.stall_reasons, Some(indices) if indices.is_empty()) {
            return Err(CuptiError::Config(
                "stall_reasons must list at least one index when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Attributes to pass to
    /// [`set_configuration_attribute`](crate::cupti::pcsampling::set_configuration_attribute)
    ///
    /// The sampling data buffer is bound separately since it lives at runtime.
    pub fn attributes(&self) -> Vec<ConfigurationAttribute> {
        let mut attributes = vec![
            ConfigurationAttribute::SamplingPeriod(self.sampling_period),
            ConfigurationAttribute::ScratchBufferSize(self.scratch_buffer_size),
            ConfigurationAttribute::HardwareBufferSize(self.hardware_buffer_size),
            ConfigurationAttribute::CollectionMode(self.collection_mode),
            ConfigurationAttribute::EnableStartStopControl(self.enable_start_stop_control),
            ConfigurationAttribute::OutputDataFormat(OutputDataFormat::Parsed),
        ];

        if let Some(indices) = &self.stall_reasons {
            attributes.push(ConfigurationAttribute::StallReasons(indices.clone()));
        }
        if let Some(span) = self.worker_thread_sleep_span_ms {
            attributes.push(ConfigurationAttribute::WorkerThreadPeriodicSleepSpan(span));
        }

        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_is_valid() {
        assert!(SamplingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let invalid = SamplingConfig {
            sampling_period: 0,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = SamplingConfig {
            collect_num_pcs: 0,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = SamplingConfig {
            hardware_buffer_size: 0,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = SamplingConfig {
            stall_reasons: Some(Vec::new()),
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_attributes() {
        let config = SamplingConfig {
            stall_reasons: Some(vec![1, 4]),
            worker_thread_sleep_span_ms: Some(5),
            ..Default::default()
        };
        let attributes = config.attributes();

        assert_eq!(attributes.len(), 8);
        assert_eq!(attributes[0], ConfigurationAttribute::SamplingPeriod(10));
        assert!(attributes.contains(&ConfigurationAttribute::StallReasons(vec![1, 4])));
        assert!(attributes.contains(&ConfigurationAttribute::WorkerThreadPeriodicSleepSpan(5)));
        assert_eq!(SamplingConfig::default().attributes().len(), 6);
    }

    #[test]
    fn test_load_toml_over_defaults() {
        let file = write_config(
            ".toml",
            r#"
sampling_period = 14
collection_mode = "kernel_serialized"
stall_reasons = [0, 2]
"#,
        );

        let config = SamplingConfig::load(file.path()).unwrap();
        assert_eq!(config.sampling_period, 14);
        assert_eq!(config.collection_mode, CollectionMode::KernelSerialized);
        assert_eq!(config.stall_reasons, Some(vec![0, 2]));
        assert_eq!(config.collect_num_pcs, 4096);
    }

    #[test]
    fn test_load_json() {
        let file = write_config(".json", r#"{ "collect_num_pcs": 64 }"#);
        let config = SamplingConfig::load(file.path()).unwrap();
        assert_eq!(config.collect_num_pcs, 64);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let file = write_config(".toml", "sampling_period = 0\n");
        let err = SamplingConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, CuptiError::Config(_)));
    }
}
