//! Resolution of debug reporting URIs once the auction outcome is known.

use {
    super::{
        audience::AdTechIdentifier,
        bid::{Candidate, DebugReportUris, ScoredOutcome},
    },
    url::Url,
};

/// Auction outcome as exposed to debug reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostAuctionSignals {
    pub winning_bid: f64,
    pub winning_buyer: Option<AdTechIdentifier>,
    pub highest_other_bid: f64,
    pub highest_other_buyer: Option<AdTechIdentifier>,
}

impl PostAuctionSignals {
    /// Derives the signals from the scored candidates and the index of the
    /// winner. Only candidates that could have won, those with a positive
    /// score, count as runner-up.
    pub fn new(scored: &[ScoredOutcome], winner: usize) -> Self {
        let Some(winning) = scored.get(winner) else {
            return Self::default();
        };
        let runner_up = scored
            .iter()
            .enumerate()
            .filter(|(i, outcome)| *i != winner && outcome.score > 0.)
            .map(|(_, outcome)| outcome)
            .fold(None, |best: Option<&ScoredOutcome>, outcome| match best {
                Some(best) if best.score >= outcome.score => Some(best),
                _ => Some(outcome),
            });
        Self {
            winning_bid: winning.candidate.ad_with_bid().bid,
            winning_buyer: Some(winning.candidate.buyer().clone()),
            highest_other_bid: runner_up.map_or(0., |outcome| outcome.candidate.ad_with_bid().bid),
            highest_other_buyer: runner_up.map(|outcome| outcome.candidate.buyer().clone()),
        }
    }
}

/// Resolves the report of every on-device participant: its win URI if it
/// produced the winning ad, its loss URI otherwise. Participants without a
/// matching URI, or whose URI stops being valid after substitution, are
/// skipped.
pub fn resolve(scored: &[ScoredOutcome], winner: usize) -> Vec<Url> {
    let signals = PostAuctionSignals::new(scored, winner);
    scored
        .iter()
        .enumerate()
        .filter_map(|(i, outcome)| match &outcome.candidate {
            Candidate::OnDevice(bid) => Some((i == winner, bid.buyer(), &bid.debug_report)),
            Candidate::Contextual(_) => None,
        })
        .filter_map(|(won, buyer, uris)| report(won, buyer, uris, &signals))
        .collect()
}

fn report(
    won: bool,
    buyer: &AdTechIdentifier,
    uris: &DebugReportUris,
    signals: &PostAuctionSignals,
) -> Option<Url> {
    let uri = if won { uris.win.as_ref() } else { uris.loss.as_ref() }?;
    let (highest_other_bid, made_highest_other_bid) = if won {
        (
            signals.highest_other_bid,
            signals.highest_other_buyer.as_ref() == Some(buyer),
        )
    } else {
        (0., false)
    };
    substitute(
        uri,
        &[
            ("winningBid", format!("{:?}", signals.winning_bid)),
            (
                "madeWinningBid",
                (signals.winning_buyer.as_ref() == Some(buyer)).to_string(),
            ),
            ("highestScoringOtherBid", format!("{highest_other_bid:?}")),
            (
                "madeHighestScoringOtherBid",
                made_highest_other_bid.to_string(),
            ),
        ],
    )
}

/// Replaces `${name}` placeholders. Braces are percent encoded when they
/// appear in the path, so both forms are handled.
fn substitute(uri: &Url, values: &[(&str, String)]) -> Option<Url> {
    let uri = values.iter().fold(uri.to_string(), |uri, (name, value)| {
        uri.replace(&format!("${{{name}}}"), value)
            .replace(&format!("$%7B{name}%7D"), value)
    });
    Url::parse(&uri).ok()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::domain::{
            audience::{Ad, CustomAudienceSignals},
            bid::{AdWithBid, BidOutcome, BiddingInfo, ContextualBid},
            signals::Signals,
            version::ScriptVersion,
        },
        chrono::{DateTime, Utc},
        std::sync::Arc,
    };

    fn on_device(buyer: &str, bid: f64, score: f64, win: &str, loss: &str) -> ScoredOutcome {
        let info = BiddingInfo {
            bidding_logic_uri: "https://buyer.example/bidding".parse().unwrap(),
            script: String::new(),
            script_version: ScriptVersion::Legacy,
            custom_audience: CustomAudienceSignals {
                owner: "com.example".into(),
                buyer: buyer.into(),
                name: "shoes".into(),
                activation_time: DateTime::<Utc>::MIN_UTC,
                expiration_time: DateTime::<Utc>::MAX_UTC,
                user_bidding_signals: Signals::empty(),
            },
            trusted_bidding_signals: Signals::empty(),
            buyer_contextual_signals: Signals::empty(),
        };
        ScoredOutcome {
            candidate: Candidate::OnDevice(BidOutcome {
                ad_with_bid: AdWithBid::new(
                    Ad::new("https://buyer.example/ad".parse().unwrap(), "{}"),
                    bid,
                ),
                ad_cost: None,
                info: Arc::new(info),
                debug_report: DebugReportUris {
                    win: Some(win.parse().unwrap()),
                    loss: Some(loss.parse().unwrap()),
                },
            }),
            score,
            seller_contextual_signals: None,
        }
    }

    #[test]
    fn winner_gets_win_report_and_losers_loss_reports() {
        let scored = vec![
            on_device(
                "a.example",
                5.,
                10.,
                "https://a.example/win?bid=${winningBid}&other=${highestScoringOtherBid}&made=${madeHighestScoringOtherBid}",
                "https://a.example/loss",
            ),
            on_device(
                "b.example",
                3.,
                7.,
                "https://b.example/win",
                "https://b.example/loss/${winningBid}?won=${madeWinningBid}&other=${highestScoringOtherBid}",
            ),
        ];

        let uris: Vec<String> = resolve(&scored, 0).iter().map(Url::to_string).collect();

        assert_eq!(
            uris,
            [
                "https://a.example/win?bid=5.0&other=3.0&made=false",
                "https://b.example/loss/5.0?won=false&other=0.0",
            ]
        );
    }

    #[test]
    fn contextual_candidates_do_not_report() {
        let scored = vec![
            ScoredOutcome {
                candidate: Candidate::Contextual(ContextualBid {
                    buyer: "c.example".into(),
                    decision_logic_uri: "https://c.example/decide".parse().unwrap(),
                    buyer_signals: Signals::empty(),
                    ad_with_bid: AdWithBid::new(
                        Ad::new("https://c.example/ad".parse().unwrap(), "{}"),
                        9.,
                    ),
                }),
                score: 20.,
                seller_contextual_signals: None,
            },
            on_device(
                "a.example",
                5.,
                10.,
                "https://a.example/win",
                "https://a.example/loss?winner=${winningBid}&made=${madeWinningBid}",
            ),
        ];

        let uris: Vec<String> = resolve(&scored, 0).iter().map(Url::to_string).collect();

        assert_eq!(uris, ["https://a.example/loss?winner=9.0&made=false"]);
    }

    #[test]
    fn rejected_candidates_are_not_runner_up() {
        let scored = vec![
            on_device(
                "a.example",
                5.,
                10.,
                "https://a.example/win?other=${highestScoringOtherBid}&made=${madeHighestScoringOtherBid}",
                "https://a.example/loss",
            ),
            on_device(
                "b.example",
                8.,
                -1.,
                "https://b.example/win",
                "https://b.example/loss",
            ),
            on_device(
                "a.example",
                7.,
                0.,
                "https://a.example/win",
                "https://a.example/loss",
            ),
        ];

        let uris: Vec<String> = resolve(&scored, 0).iter().map(Url::to_string).collect();

        assert_eq!(
            uris,
            [
                "https://a.example/win?other=0.0&made=false",
                "https://b.example/loss",
                "https://a.example/loss",
            ]
        );
        assert_eq!(PostAuctionSignals::new(&scored, 0).highest_other_buyer, None);
    }
}
