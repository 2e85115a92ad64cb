use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

use super::{BIG_MAX, BIG_MIN, DICE_PER_ROLL, DIE_FACES, SMALL_MAX, SMALL_MIN};

/// Rejected bet option or dice value.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown bet option: {0}")]
    UnknownOption(String),
    #[error("single number must be between 1 and 6 (got {0})")]
    NumberOutOfRange(u8),
    #[error("die value must be between 1 and 6 (got {0})")]
    DieOutOfRange(u8),
}

/// What a participant wagers on within a round.
///
/// The canonical key (`Display`) is `big`, `small` or `single:N`. Parsing also
/// accepts the bare number and `single_N` spellings used by the chat buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BetOption {
    /// Total 11-17, loses on any triple (1:1).
    Big,
    /// Total 4-10, loses on any triple (1:1).
    Small,
    /// Number appears on one, two or three dice (1:1, 2:1, 3:1).
    Single(u8),
}

impl BetOption {
    /// Build a single-number option, validating the face.
    pub fn single(number: u8) -> Result<Self, ParseError> {
        if !(1..=DIE_FACES).contains(&number) {
            return Err(ParseError::NumberOutOfRange(number));
        }
        Ok(Self::Single(number))
    }

    /// Every option a round accepts.
    pub fn all() -> impl Iterator<Item = BetOption> {
        [BetOption::Big, BetOption::Small]
            .into_iter()
            .chain((1..=DIE_FACES).map(BetOption::Single))
    }
}

impl fmt::Display for BetOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetOption::Big => f.write_str("big"),
            BetOption::Small => f.write_str("small"),
            BetOption::Single(n) => write!(f, "single:{n}"),
        }
    }
}

impl FromStr for BetOption {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "big" => return Ok(BetOption::Big),
            "small" => return Ok(BetOption::Small),
            _ => {}
        }
        let number = s
            .strip_prefix("single:")
            .or_else(|| s.strip_prefix("single_"))
            .unwrap_or(s);
        let number: u8 = number
            .parse()
            .map_err(|_| ParseError::UnknownOption(s.to_string()))?;
        BetOption::single(number)
    }
}

impl TryFrom<String> for BetOption {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BetOption> for String {
    fn from(option: BetOption) -> Self {
        option.to_string()
    }
}

/// Result of one roll: three dice, each 1-6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Outcome {
    dice: [u8; DICE_PER_ROLL],
}

impl Outcome {
    pub fn new(dice: [u8; DICE_PER_ROLL]) -> Result<Self, ParseError> {
        if let Some(&bad) = dice.iter().find(|d| !(1..=DIE_FACES).contains(*d)) {
            return Err(ParseError::DieOutOfRange(bad));
        }
        Ok(Self { dice })
    }

    /// Roll using `draw(n)`, which should return a value in `0..n`. Larger
    /// draws wrap, so the result is always a valid roll.
    pub fn roll(mut draw: impl FnMut(u8) -> u8) -> Self {
        Self {
            dice: std::array::from_fn(|_| draw(DIE_FACES) % DIE_FACES + 1),
        }
    }

    pub fn dice(&self) -> [u8; DICE_PER_ROLL] {
        self.dice
    }

    pub fn total(&self) -> u8 {
        self.dice.iter().sum()
    }

    /// All three dice show the same face.
    pub fn is_triple(&self) -> bool {
        self.dice[0] == self.dice[1] && self.dice[1] == self.dice[2]
    }

    /// Dice showing `number`.
    pub fn count(&self, number: u8) -> u8 {
        self.dice.iter().filter(|&&d| d == number).count() as u8
    }

    pub fn is_big(&self) -> bool {
        !self.is_triple() && (BIG_MIN..=BIG_MAX).contains(&self.total())
    }

    pub fn is_small(&self) -> bool {
        !self.is_triple() && (SMALL_MIN..=SMALL_MAX).contains(&self.total())
    }

    /// Every possible roll, in lexicographic order.
    pub fn all() -> impl Iterator<Item = Outcome> {
        (1..=DIE_FACES).flat_map(|a| {
            (1..=DIE_FACES)
                .flat_map(move |b| (1..=DIE_FACES).map(move |c| Outcome { dice: [a, b, c] }))
        })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.dice;
        write!(f, "{a}+{b}+{c}={}", self.total())
    }
}
