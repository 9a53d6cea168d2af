use stakescope_consensus::{
    agnostic::AgnosticState,
    constants::{TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX},
};

use super::PgQuery;

const UPSERT: &str = r"
    INSERT INTO t_epochs (
        f_epoch, f_slot, f_num_active_vals, f_num_attesting_vals,
        f_total_effective_balance, f_total_balance,
        f_att_effective_balance_source, f_att_effective_balance_target,
        f_att_effective_balance_head, f_missing_source, f_missing_target,
        f_missing_head, f_missed_blocks)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ON CONFLICT (f_epoch) DO UPDATE SET
        f_slot = excluded.f_slot,
        f_num_active_vals = excluded.f_num_active_vals,
        f_num_attesting_vals = excluded.f_num_attesting_vals,
        f_total_effective_balance = excluded.f_total_effective_balance,
        f_total_balance = excluded.f_total_balance,
        f_att_effective_balance_source = excluded.f_att_effective_balance_source,
        f_att_effective_balance_target = excluded.f_att_effective_balance_target,
        f_att_effective_balance_head = excluded.f_att_effective_balance_head,
        f_missing_source = excluded.f_missing_source,
        f_missing_target = excluded.f_missing_target,
        f_missing_head = excluded.f_missing_head,
        f_missed_blocks = excluded.f_missed_blocks;
";

pub const DROP_FROM_EPOCH: &str = "DELETE FROM t_epochs WHERE f_epoch >= $1;";

/// Aggregated epoch facts derived from the end-of-epoch state.
#[derive(Debug, Clone)]
pub struct EpochRow {
    pub epoch: i64,
    pub slot: i64,
    pub num_active_vals: i64,
    pub num_attesting_vals: i64,
    pub total_effective_balance: i64,
    pub total_balance: i64,
    pub att_effective_balance_source: i64,
    pub att_effective_balance_target: i64,
    pub att_effective_balance_head: i64,
    pub missing_source: i64,
    pub missing_target: i64,
    pub missing_head: i64,
    pub missed_blocks: i64,
}

impl EpochRow {
    pub fn from_state(state: &AgnosticState) -> Self {
        EpochRow {
            epoch: state.epoch as i64,
            slot: state.slot as i64,
            num_active_vals: state.num_active_vals as i64,
            num_attesting_vals: state.num_attesting_vals as i64,
            total_effective_balance: state.total_active_balance as i64,
            total_balance: state.total_active_real_balance as i64,
            att_effective_balance_source: state.attesting_balance[TIMELY_SOURCE_FLAG_INDEX]
                as i64,
            att_effective_balance_target: state.attesting_balance[TIMELY_TARGET_FLAG_INDEX]
                as i64,
            att_effective_balance_head: state.attesting_balance[TIMELY_HEAD_FLAG_INDEX] as i64,
            missing_source: state.missing_flag_count(TIMELY_SOURCE_FLAG_INDEX) as i64,
            missing_target: state.missing_flag_count(TIMELY_TARGET_FLAG_INDEX) as i64,
            missing_head: state.missing_flag_count(TIMELY_HEAD_FLAG_INDEX) as i64,
            missed_blocks: state.missing_blocks().len() as i64,
        }
    }

    pub(crate) fn upsert(&self) -> PgQuery<'_> {
        sqlx::query(UPSERT)
            .bind(self.epoch)
            .bind(self.slot)
            .bind(self.num_active_vals)
            .bind(self.num_attesting_vals)
            .bind(self.total_effective_balance)
            .bind(self.total_balance)
            .bind(self.att_effective_balance_source)
            .bind(self.att_effective_balance_target)
            .bind(self.att_effective_balance_head)
            .bind(self.missing_source)
            .bind(self.missing_target)
            .bind(self.missing_head)
            .bind(self.missed_blocks)
    }
}
