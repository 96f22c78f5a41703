pub mod config;
pub mod engine;
pub mod executors;
pub mod observe;
pub mod overrides;
pub mod persistence;
pub mod script;
pub mod signature;
pub mod sinks;
pub mod time;
pub mod transport;
pub mod trusted_signals;

pub use {
    config::Config,
    engine::{BiddingEngine, BiddingInputs, Scorer},
    executors::Executors,
    overrides::DevOverrides,
    persistence::{AudienceStore, IdGenerator, Persistence},
    script::ScriptFetcher,
    signature::{BuyerKeyFetcher, SignatureVerifier},
    transport::Transport,
    trusted_signals::TrustedSignalsFetcher,
};
