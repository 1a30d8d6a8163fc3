//! Flag/environment resolution.

use std::path::PathBuf;

use protoplain_layout::LayoutOptions;

pub const CRF_ENV: &str = "PROTOPLAIN_CRF";
pub const PLAIN_SUFFIX_ENV: &str = "PROTOPLAIN_PLAIN_SUFFIX";
pub const LOG_ENV: &str = "PROTOPLAIN_LOG";

pub const DEFAULT_CRF_PATH: &str = "plain.crf.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub crf_path: PathBuf,
    pub layout: LayoutOptions,
}

impl CliConfig {
    /// Flags win over the environment, the environment over defaults.
    pub fn resolve(crf: Option<PathBuf>, plain_suffix: Option<String>) -> Self {
        Self::resolve_with(crf, plain_suffix, |key| std::env::var(key).ok())
    }

    pub fn resolve_with(
        crf: Option<PathBuf>,
        plain_suffix: Option<String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let non_empty = |v: String| if v.is_empty() { None } else { Some(v) };

        let crf_path = crf
            .or_else(|| env(CRF_ENV).and_then(non_empty).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CRF_PATH));

        let mut layout = LayoutOptions::default();
        if let Some(suffix) = plain_suffix.or_else(|| env(PLAIN_SUFFIX_ENV).and_then(non_empty)) {
            layout.plain_suffix = suffix;
        }

        Self { crf_path, layout }
    }
}
