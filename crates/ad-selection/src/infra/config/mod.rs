use std::time::Duration;

pub mod file;

/// Runtime configuration of the auction pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bidding: Bidding,
    pub auction: Auction,
    pub filtering: Filtering,
    pub reporting: Reporting,
    pub http: Http,
}

impl Default for Config {
    fn default() -> Self {
        file::Config::default().into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bidding {
    /// Deadline of a single group's bidding pipeline.
    pub timeout_per_group: Duration,
    /// Deadline of all groups of one buyer.
    pub timeout_per_buyer: Duration,
    /// Highest bidding logic version requested from buyers.
    pub script_version: u64,
    /// Expose the trusted signals data version to bidding scripts.
    pub data_version_header_enabled: bool,
    pub cpc_billing_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Auction {
    pub overall_timeout: Duration,
    pub id_generation_attempts: usize,
    pub contextual_ads_enabled: bool,
    pub enforce_foreground: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filtering {
    pub frequency_cap_enabled: bool,
    pub app_install_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reporting {
    pub debug_reporting_enabled: bool,
    pub join_signaling_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Http {
    pub max_response_bytes: usize,
    pub request_timeout: Duration,
}
