//! Runtime settings, from flags or `AURIS_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use auris_core::{AdapterSettings, PipelineConfig};

#[derive(Debug, Clone, Parser)]
#[command(name = "auris-server", about = "Real-time speech transcription relay")]
pub struct Settings {
    /// Bind address.
    #[arg(long, env = "AURIS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "AURIS_PORT", default_value_t = 8700)]
    pub port: u16,

    /// Transcription engine: cloud, offline or stub.
    #[arg(long, env = "AURIS_ENGINE", default_value = "stub")]
    pub engine: String,

    #[arg(long, env = "AURIS_LANGUAGE", default_value = "en")]
    pub language: String,

    /// Negotiated client capture rate in Hz.
    #[arg(long, env = "AURIS_SAMPLE_RATE", default_value_t = 16_000)]
    pub sample_rate_hz: u32,

    /// Always use the deterministic stub, whatever engine is configured.
    #[arg(long, env = "AURIS_FORCE_STUB")]
    pub force_stub: bool,

    #[arg(
        long,
        env = "AURIS_CLOUD_ENDPOINT",
        default_value = "wss://asr.example.com/v1/stream"
    )]
    pub cloud_endpoint: String,

    /// API key for the cloud engine.
    #[arg(long, env = "AURIS_CLOUD_API_KEY", hide_env_values = true)]
    pub cloud_api_key: Option<String>,

    /// Ask the cloud engine for automatic punctuation.
    #[arg(long, env = "AURIS_PUNCTUATE", default_value_t = true, action = clap::ArgAction::Set)]
    pub punctuate: bool,

    /// Offline recognizer model directory.
    #[arg(long, env = "AURIS_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Keepalive ping interval, seconds.
    #[arg(long, env = "AURIS_HEARTBEAT_SECS", default_value_t = 30)]
    pub heartbeat_secs: u64,

    /// Optional bound on shutdown drain, seconds. Unset reproduces the
    /// unbounded drain (a hung backend then stalls teardown).
    #[arg(long, env = "AURIS_DRAIN_TIMEOUT_SECS")]
    pub drain_timeout_secs: Option<u64>,

    /// Speaker label stamped on every transcript message.
    #[arg(long, env = "AURIS_SPEAKER_LABEL", default_value = "host")]
    pub speaker_label: String,
}

impl Settings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            engine: self.engine.trim().to_lowercase(),
            language: self.language.clone(),
            sample_rate_hz: self.sample_rate_hz,
            force_stub: self.force_stub,
            cloud_endpoint: self.cloud_endpoint.clone(),
            cloud_api_key: self
                .cloud_api_key
                .as_ref()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            punctuate: self.punctuate,
            model_path: self.model_path.clone(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            speaker_label: self.speaker_label.clone(),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            drain_timeout: self.drain_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Settings::command().debug_assert();
    }

    #[test]
    fn defaults_select_the_stub_engine() {
        let settings = Settings::try_parse_from(["auris-server"]).expect("defaults parse");
        assert_eq!(settings.engine, "stub");
        assert_eq!(settings.sample_rate_hz, 16_000);
        assert_eq!(settings.heartbeat_secs, 30);
        assert!(!settings.force_stub);
        assert!(settings.drain_timeout_secs.is_none());
    }

    #[test]
    fn adapter_settings_normalize_engine_and_blank_key() {
        let settings = Settings::try_parse_from([
            "auris-server",
            "--engine",
            " Cloud ",
            "--cloud-api-key",
            "   ",
        ])
        .expect("parse");
        let adapter = settings.adapter_settings();
        assert_eq!(adapter.engine, "cloud");
        assert_eq!(adapter.cloud_api_key, None, "blank keys count as missing");
    }

    #[test]
    fn pipeline_config_carries_the_drain_bound() {
        let settings =
            Settings::try_parse_from(["auris-server", "--drain-timeout-secs", "5"]).expect("parse");
        let config = settings.pipeline_config();
        assert_eq!(config.drain_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }
}
