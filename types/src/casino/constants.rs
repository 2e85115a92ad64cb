/// Number of faces on each die.
pub const DIE_FACES: u8 = 6;

/// Number of dice rolled per sic bo round.
pub const DICE_PER_ROLL: usize = 3;

/// Lowest total that counts as small (3 is only reachable by a triple).
pub const SMALL_MIN: u8 = 4;

/// Highest total that counts as small.
pub const SMALL_MAX: u8 = 10;

/// Lowest total that counts as big.
pub const BIG_MIN: u8 = 11;

/// Highest total that counts as big (18 is only reachable by a triple).
pub const BIG_MAX: u8 = 17;

/// Default betting window of a multiplayer round, in seconds.
pub const DEFAULT_BETTING_SECS: u64 = 60;

/// Stake debited per bet button press.
pub const FIXED_BET_AMOUNT: i64 = 1_000;

/// Minimum balance to challenge (or be challenged to) an all-in duel.
pub const MIN_ALL_IN_BALANCE: i64 = 100;

/// Seconds a duel challenge stays pending before it expires.
pub const DUEL_TIMEOUT_SECS: u64 = 60;

/// Bounds of the amount moved by a robbery (inclusive).
pub const MIN_ROB_AMOUNT: i64 = 10;
pub const MAX_ROB_AMOUNT: i64 = 1_000;

/// Seconds a robber must wait between attempts.
pub const ROB_COOLDOWN_SECS: u64 = 21;

/// Consecutive successful robberies of one victim that trigger protection.
pub const ROB_PROTECTION_THRESHOLD: u32 = 3;

/// Minutes a victim stays protected once the threshold is reached.
pub const ROB_PROTECTION_MINS: u64 = 30;

/// Robbery outcome weights, out of 100.
pub const ROB_SUCCESS_CHANCE: u8 = 50;
pub const ROB_FAIL_CHANCE: u8 = 20;
pub const ROB_COUNTER_CHANCE: u8 = 30;

/// Seconds between all-in robbery attempts by the same account.
pub const ALL_IN_ROB_COOLDOWN_SECS: u64 = 60;

/// Chance, out of 100, that an all-in robbery succeeds.
pub const ALL_IN_SUCCESS_CHANCE: u8 = 50;

/// Most one account may stake across all options of a single round. A single
/// number pays at most 3:1, so stake plus payout always fits in an `i64`.
pub const MAX_ROUND_STAKE: i64 = i64::MAX / 4;
