#![forbid(unsafe_code)]

pub mod domain;
pub mod infra;
mod util;

pub use {
    domain::{
        bidding::{BidGenerator, BuyerBiddingRunner},
        selection::{AuctionOrchestrator, AuctionOutcome, Collaborators, Failure},
    },
    infra::{Config, Executors},
};
