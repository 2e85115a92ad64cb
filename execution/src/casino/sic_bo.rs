//! Sic Bo settlement for the multiplayer rounds.
//!
//! Supported bets:
//! - Small (4-10, 1:1) - loses on triple
//! - Big (11-17, 1:1) - loses on triple
//! - Single number appears (1:1 to 3:1) - number = 1-6
//!
//! Payouts are net of the stake: a losing bet is `-stake`, a winning one the
//! profit only. The stake itself is returned separately at settlement.

use parlor_types::casino::{BetOption, Outcome};
use std::collections::BTreeMap;

/// Net payout of one bet against a fixed outcome.
pub fn payout(option: BetOption, outcome: &Outcome, stake: i64) -> i64 {
    match option {
        BetOption::Big => {
            if outcome.is_big() {
                stake
            } else {
                -stake
            }
        }
        BetOption::Small => {
            if outcome.is_small() {
                stake
            } else {
                -stake
            }
        }
        BetOption::Single(number) => match outcome.count(number) {
            0 => -stake,
            matches => stake.saturating_mul(matches as i64),
        },
    }
}

/// What one account gets out of a settled round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountPayout {
    /// Total staked across every option.
    pub stake: i64,
    /// Sum of the per-bet net payouts.
    pub net: i64,
}

impl AccountPayout {
    /// Amount to credit back: the stakes plus the net result.
    ///
    /// Never negative, since a bet loses at most its own stake.
    pub fn credit(&self) -> i64 {
        self.stake.saturating_add(self.net).max(0)
    }
}

/// Combine every bet one account placed in a round.
pub fn account_payout(bets: &BTreeMap<BetOption, i64>, outcome: &Outcome) -> AccountPayout {
    bets.iter()
        .fold(AccountPayout::default(), |mut total, (&option, &stake)| {
            total.stake = total.stake.saturating_add(stake);
            total.net = total.net.saturating_add(payout(option, outcome, stake));
            total
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn outcome(dice: [u8; 3]) -> Outcome {
        Outcome::new(dice).unwrap()
    }

    #[test]
    fn test_single_number_payout() {
        let single = |n| BetOption::single(n).unwrap();

        assert_eq!(payout(single(1), &outcome([1, 1, 1]), 10), 30);
        assert_eq!(payout(single(1), &outcome([1, 1, 2]), 10), 20);
        assert_eq!(payout(single(1), &outcome([1, 2, 3]), 10), 10);
        assert_eq!(payout(single(1), &outcome([2, 2, 3]), 10), -10);
    }

    #[test]
    fn test_big_small_payout() {
        // Total 6 (non-triple)
        assert_eq!(payout(BetOption::Small, &outcome([1, 2, 3]), 100), 100);
        assert_eq!(payout(BetOption::Big, &outcome([1, 2, 3]), 100), -100);

        // Total 15 (non-triple)
        assert_eq!(payout(BetOption::Big, &outcome([4, 5, 6]), 100), 100);
        assert_eq!(payout(BetOption::Small, &outcome([4, 5, 6]), 100), -100);

        // Boundaries
        assert_eq!(payout(BetOption::Small, &outcome([1, 4, 5]), 1), 1);
        assert_eq!(payout(BetOption::Big, &outcome([1, 4, 6]), 1), 1);
    }

    #[test]
    fn test_triple_beats_big_and_small() {
        for face in 1..=6 {
            let triple = outcome([face; 3]);
            assert_eq!(payout(BetOption::Big, &triple, 50), -50);
            assert_eq!(payout(BetOption::Small, &triple, 50), -50);
            assert_eq!(payout(BetOption::Single(face), &triple, 50), 150);
        }
    }

    #[test]
    fn test_every_outcome_settles_consistently() {
        for outcome in Outcome::all() {
            let big = payout(BetOption::Big, &outcome, 1);
            let small = payout(BetOption::Small, &outcome, 1);
            if outcome.is_triple() {
                assert_eq!((big, small), (-1, -1), "{outcome}");
            } else {
                assert_eq!(big + small, 0, "{outcome}");
                assert_eq!(big == 1, (11..=17).contains(&outcome.total()));
            }

            // Singles: the winning numbers pay one unit per matching die.
            let singles: i64 = (1..=6)
                .map(|n| payout(BetOption::Single(n), &outcome, 1))
                .filter(|p| *p > 0)
                .sum();
            assert_eq!(singles, 3, "{outcome}");
        }
    }

    #[test]
    fn test_account_payout_scenario() {
        let rolled = outcome([4, 4, 3]);

        let a = BTreeMap::from([(BetOption::Big, 100)]);
        let b = BTreeMap::from([(BetOption::Big, 50), (BetOption::Single(3), 50)]);
        let c = BTreeMap::from([(BetOption::Small, 100)]);

        assert_eq!(
            account_payout(&a, &rolled),
            AccountPayout {
                stake: 100,
                net: 100
            }
        );
        assert_eq!(
            account_payout(&b, &rolled),
            AccountPayout {
                stake: 100,
                net: 100
            }
        );
        let c = account_payout(&c, &rolled);
        assert_eq!(c.net, -100);
        assert_eq!(c.credit(), 0);
    }

    #[test]
    fn test_credit_on_net_zero_with_winning_bet() {
        // Big wins, single 6 misses: net zero, but the winning stake returns.
        let rolled = outcome([4, 4, 3]);
        let bets = BTreeMap::from([(BetOption::Big, 100), (BetOption::Single(6), 100)]);
        let result = account_payout(&bets, &rolled);
        assert_eq!(result.net, 0);
        assert_eq!(result.credit(), 200);
    }

    #[test]
    fn test_account_payout_never_overflows() {
        let rolled = outcome([6, 6, 6]);
        let bets = BTreeMap::from([(BetOption::Single(6), i64::MAX), (BetOption::Big, i64::MAX)]);
        let result = account_payout(&bets, &rolled);
        assert_eq!(result.stake, i64::MAX);
        assert_eq!(result.credit(), i64::MAX);
    }

    proptest! {
        #[test]
        fn prop_loss_bounded_by_stake(
            a in 1u8..=6,
            b in 1u8..=6,
            c in 1u8..=6,
            stake in 1i64..1_000_000,
        ) {
            let rolled = outcome([a, b, c]);
            for option in BetOption::all() {
                let net = payout(option, &rolled, stake);
                prop_assert!(net == -stake || (net > 0 && net % stake == 0 && net <= 3 * stake));
            }
            let bets: BTreeMap<_, _> = BetOption::all().map(|o| (o, stake)).collect();
            let total = account_payout(&bets, &rolled);
            prop_assert_eq!(total.stake, 8 * stake);
            prop_assert!(total.credit() >= 0);
        }
    }
}
