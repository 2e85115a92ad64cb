use serde::{Deserialize, Serialize};
use std::fmt;

use crate::AccountId;

/// Why a balance changed. Recorded with every ledger adjustment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Initial,
    Daily,
    Transfer,
    #[serde(rename = "sicbo_bet")]
    SicBoBet,
    #[serde(rename = "sicbo_win")]
    SicBoWin,
    AdminAdd,
    AdminSub,
    Rob,
    Robbed,
    #[serde(rename = "counterattack")]
    CounterAttack,
    DuelWin,
    DuelLose,
    #[serde(rename = "allin_rob_win")]
    AllInRobWin,
    #[serde(rename = "allin_rob_lose")]
    AllInRobLose,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Initial => "initial",
            Category::Daily => "daily",
            Category::Transfer => "transfer",
            Category::SicBoBet => "sicbo_bet",
            Category::SicBoWin => "sicbo_win",
            Category::AdminAdd => "admin_add",
            Category::AdminSub => "admin_sub",
            Category::Rob => "rob",
            Category::Robbed => "robbed",
            Category::CounterAttack => "counterattack",
            Category::DuelWin => "duel_win",
            Category::DuelLose => "duel_lose",
            Category::AllInRobWin => "allin_rob_win",
            Category::AllInRobLose => "allin_rob_lose",
        }
    }

    /// Categories that count towards game rankings (transfers and rewards do not).
    pub fn is_game(&self) -> bool {
        matches!(
            self,
            Category::SicBoBet
                | Category::SicBoWin
                | Category::Rob
                | Category::Robbed
                | Category::CounterAttack
                | Category::DuelWin
                | Category::DuelLose
                | Category::AllInRobWin
                | Category::AllInRobLose
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded balance change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub sequence: u64,
    pub account: AccountId,
    pub amount: i64,
    pub category: Category,
    pub note: Option<String>,
    pub balance: i64,
}
