pub const SLOTS_PER_EPOCH: u64 = 32;
pub const SECONDS_PER_SLOT: u64 = 12;
pub const SLOTS_PER_HISTORICAL_ROOT: u64 = 8192;

pub const EFFECTIVE_BALANCE_INCREMENT: u64 = 1_000_000_000;
pub const MAX_EFFECTIVE_BALANCE: u64 = 32_000_000_000;
pub const FAR_FUTURE_EPOCH: u64 = u64::MAX;

pub const BASE_REWARD_FACTOR: u64 = 64;
pub const BASE_REWARDS_PER_EPOCH: u64 = 4;

pub const TIMELY_SOURCE_FLAG_INDEX: usize = 0;
pub const TIMELY_TARGET_FLAG_INDEX: usize = 1;
pub const TIMELY_HEAD_FLAG_INDEX: usize = 2;
pub const NUM_FLAG_INDICES: usize = 3;

pub const TIMELY_SOURCE_WEIGHT: u64 = 14;
pub const TIMELY_TARGET_WEIGHT: u64 = 26;
pub const TIMELY_HEAD_WEIGHT: u64 = 14;
pub const PARTICIPATING_FLAG_WEIGHTS: [u64; NUM_FLAG_INDICES] =
    [TIMELY_SOURCE_WEIGHT, TIMELY_TARGET_WEIGHT, TIMELY_HEAD_WEIGHT];
pub const SYNC_REWARD_WEIGHT: u64 = 2;
pub const PROPOSER_WEIGHT: u64 = 8;
pub const WEIGHT_DENOMINATOR: u64 = 64;

pub const SYNC_COMMITTEE_SIZE: u64 = 512;
