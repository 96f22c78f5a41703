use {
    crate::infra::{self, config::file},
    anyhow::Context,
    std::path::Path,
    tokio::fs,
};

/// Loads the configuration from a TOML file. Missing fields take their
/// defaults.
pub async fn load(path: &Path) -> anyhow::Result<infra::Config> {
    let data = fs::read_to_string(path)
        .await
        .with_context(|| format!("I/O error while reading {path:?}"))?;
    parse(&data).with_context(|| format!("invalid configuration in {path:?}"))
}

fn parse(data: &str) -> anyhow::Result<infra::Config> {
    let config: file::Config = toml::de::from_str(data)?;
    Ok(config.into())
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Write, std::time::Duration};

    #[test]
    fn empty_file_uses_defaults() {
        assert_eq!(parse("").unwrap(), infra::Config::default());
        let config = infra::Config::default();
        assert_eq!(config.bidding.timeout_per_group, Duration::from_secs(5));
        assert_eq!(config.bidding.script_version, 3);
        assert_eq!(config.auction.id_generation_attempts, 10);
        assert_eq!(config.http.max_response_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(parse("[bidding]\ntimeout-per-grop = \"1s\"").is_err());
    }

    #[tokio::test]
    async fn loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [bidding]
            timeout-per-group = "250ms"
            script-version = 2
            data-version-header-enabled = true

            [auction]
            overall-timeout = "1m"
            contextual-ads-enabled = false

            [reporting]
            debug-reporting-enabled = true
            "#
        )
        .unwrap();

        let config = load(file.path()).await.unwrap();

        assert_eq!(config.bidding.timeout_per_group, Duration::from_millis(250));
        assert_eq!(config.bidding.timeout_per_buyer, Duration::from_secs(10));
        assert_eq!(config.bidding.script_version, 2);
        assert!(config.bidding.data_version_header_enabled);
        assert_eq!(config.auction.overall_timeout, Duration::from_secs(60));
        assert!(!config.auction.contextual_ads_enabled);
        assert!(config.reporting.debug_reporting_enabled);
        assert!(config.filtering.frequency_cap_enabled);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("missing.toml")).await.is_err());
    }
}
