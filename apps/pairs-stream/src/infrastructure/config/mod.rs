//! Configuration Module
//!
//! Environment-driven configuration for the ingestion pipeline.

mod settings;

pub use settings::{
    AnalyticsSettings, ConfigError, PipelineConfig, RetentionSettings, StreamSettings,
};
