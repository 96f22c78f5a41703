pub use load::load;
use {crate::infra, serde::Deserialize, std::time::Duration};

mod load;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    bidding: BiddingConfig,

    #[serde(default)]
    auction: AuctionConfig,

    #[serde(default)]
    filtering: FilteringConfig,

    #[serde(default)]
    reporting: ReportingConfig,

    #[serde(default)]
    http: HttpConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct BiddingConfig {
    /// How long a single buyer group may take to produce its bid.
    #[serde(with = "humantime_serde", default = "default_timeout_per_group")]
    timeout_per_group: Duration,

    /// How long all groups of a buyer may take together. Groups still running
    /// afterwards are cancelled.
    #[serde(with = "humantime_serde", default = "default_timeout_per_buyer")]
    timeout_per_buyer: Duration,

    /// The highest bidding logic version requested from buyers. Version 2 and
    /// below select the legacy calling convention and send no version
    /// header.
    #[serde(default = "default_script_version")]
    script_version: u64,

    /// Whether the `Data-Version` of trusted signals is passed to bidding
    /// scripts.
    #[serde(default)]
    data_version_header_enabled: bool,

    /// Whether ad costs returned by bidding scripts are kept.
    #[serde(default)]
    cpc_billing_enabled: bool,
}

impl Default for BiddingConfig {
    fn default() -> Self {
        Self {
            timeout_per_group: default_timeout_per_group(),
            timeout_per_buyer: default_timeout_per_buyer(),
            script_version: default_script_version(),
            data_version_header_enabled: false,
            cpc_billing_enabled: false,
        }
    }
}

fn default_timeout_per_group() -> Duration {
    Duration::from_secs(5)
}

fn default_timeout_per_buyer() -> Duration {
    Duration::from_secs(10)
}

fn default_script_version() -> u64 {
    3
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct AuctionConfig {
    /// Deadline of the whole auction, from validation up to persisting the
    /// winner.
    #[serde(with = "humantime_serde", default = "default_overall_timeout")]
    overall_timeout: Duration,

    /// How often a fresh auction id is drawn when the previous one is taken.
    #[serde(default = "default_id_generation_attempts")]
    id_generation_attempts: usize,

    #[serde(default = "default_true")]
    contextual_ads_enabled: bool,

    /// Reject auctions requested by apps in the background.
    #[serde(default = "default_true")]
    enforce_foreground: bool,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            overall_timeout: default_overall_timeout(),
            id_generation_attempts: default_id_generation_attempts(),
            contextual_ads_enabled: true,
            enforce_foreground: true,
        }
    }
}

fn default_overall_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_id_generation_attempts() -> usize {
    10
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FilteringConfig {
    #[serde(default = "default_true")]
    frequency_cap_enabled: bool,

    #[serde(default = "default_true")]
    app_install_enabled: bool,
}

impl Default for FilteringConfig {
    fn default() -> Self {
        Self {
            frequency_cap_enabled: true,
            app_install_enabled: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ReportingConfig {
    #[serde(default)]
    debug_reporting_enabled: bool,

    #[serde(default)]
    join_signaling_enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct HttpConfig {
    /// Responses larger than this are rejected.
    #[serde(default = "default_max_response_bytes")]
    max_response_bytes: usize,

    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_response_bytes: default_max_response_bytes(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_max_response_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

impl From<Config> for infra::Config {
    fn from(config: Config) -> Self {
        Self {
            bidding: infra::config::Bidding {
                timeout_per_group: config.bidding.timeout_per_group,
                timeout_per_buyer: config.bidding.timeout_per_buyer,
                script_version: config.bidding.script_version,
                data_version_header_enabled: config.bidding.data_version_header_enabled,
                cpc_billing_enabled: config.bidding.cpc_billing_enabled,
            },
            auction: infra::config::Auction {
                overall_timeout: config.auction.overall_timeout,
                id_generation_attempts: config.auction.id_generation_attempts,
                contextual_ads_enabled: config.auction.contextual_ads_enabled,
                enforce_foreground: config.auction.enforce_foreground,
            },
            filtering: infra::config::Filtering {
                frequency_cap_enabled: config.filtering.frequency_cap_enabled,
                app_install_enabled: config.filtering.app_install_enabled,
            },
            reporting: infra::config::Reporting {
                debug_reporting_enabled: config.reporting.debug_reporting_enabled,
                join_signaling_enabled: config.reporting.join_signaling_enabled,
            },
            http: infra::config::Http {
                max_response_bytes: config.http.max_response_bytes,
                request_timeout: config.http.request_timeout,
            },
        }
    }
}
