//! Groups raw ledger entries into normalized transactions.
//!
//! A reward entry and the sell entry right after it (newest first) describe a
//! single sell. A `sell_order` partner is consumed and never produces a record
//! of its own; any other partner is still read for the pair and then grouped
//! in its own right. A reward at the very end of a slice cannot
//! be paired yet; it is handed back as [`Grouped::Partial`] so the caller can
//! fetch the partner from the next page.

use std::iter::FusedIterator;

use tracing::{debug, warn};

use crate::types::{NormalizedTransaction, RawEntry, ReasonCode, TransactionType};

#[derive(Debug, Clone, PartialEq)]
pub enum Grouped {
    Complete(NormalizedTransaction),
    /// Reward entry whose sell partner lies beyond the end of the slice.
    Partial(RawEntry),
}

/// Lazy single pass over a slice of entries. Yields in input order.
pub struct GroupEntries<'a> {
    entries: &'a [RawEntry],
    index: usize,
}

pub fn group_entries(entries: &[RawEntry]) -> GroupEntries<'_> {
    GroupEntries { entries, index: 0 }
}

/// Completes a partial reward with the first entry of the following page.
/// Same result as grouping the unsplit pair.
pub fn complete_pair(carry: RawEntry, partner: RawEntry) -> Option<NormalizedTransaction> {
    let pair = [carry, partner];
    group_entries(&pair).find_map(|g| match g {
        Grouped::Complete(tx) => Some(tx),
        Grouped::Partial(_) => None,
    })
}

impl Iterator for GroupEntries<'_> {
    type Item = Grouped;

    fn next(&mut self) -> Option<Grouped> {
        let entries = self.entries;
        while let Some(entry) = entries.get(self.index) {
            self.index += 1;

            match entry.reason_code() {
                ReasonCode::SellOrder => continue,
                ReasonCode::BuyOrder => return Some(Grouped::Complete(buy_record(entry))),
                ReasonCode::Reward => {
                    let Some(sell_order) = entries.get(self.index) else {
                        self.index = entries.len();
                        return Some(Grouped::Partial(entry.clone()));
                    };

                    if sell_order.reason_code() == &ReasonCode::SellOrder {
                        self.index += 1;
                    } else {
                        warn!(
                            reward_id = %entry.id,
                            partner_id = %sell_order.id,
                            partner_reason = %sell_order.reason_code(),
                            "reward paired with an entry that is not a sell_order"
                        );
                    }
                    return Some(Grouped::Complete(sell_record(entry, sell_order)));
                }
                ReasonCode::Other(code) => {
                    debug!(entry_id = %entry.id, reason_code = %code, "skipping entry with unhandled reason code");
                    continue;
                }
            }
        }
        None
    }
}

impl FusedIterator for GroupEntries<'_> {}

fn buy_record(entry: &RawEntry) -> NormalizedTransaction {
    NormalizedTransaction {
        id: entry.id.clone(),
        account: entry.account.clone(),
        transaction_type: TransactionType::Buy,
        status: entry.status.clone(),
        reward_amount: 0.0,
        sell_amount: 0.0,
        posted_amount: entry.posted_amount,
        buy_amount: entry.amount,
        running_balance: entry.running_balance,
        transaction_date: entry.created_at,
        sell_transaction_date: None,
        balance_before_reward: None,
    }
}

fn sell_record(reward: &RawEntry, sell_order: &RawEntry) -> NormalizedTransaction {
    let reward_amount = reward.amount;
    let sell_amount = sell_order.amount;

    NormalizedTransaction {
        id: reward.id.clone(),
        account: reward.account.clone(),
        transaction_type: TransactionType::Sell,
        status: reward.status.clone(),
        reward_amount,
        sell_amount,
        posted_amount: -(sell_amount - reward_amount),
        buy_amount: 0.0,
        running_balance: reward.running_balance,
        transaction_date: reward.created_at,
        sell_transaction_date: Some(sell_order.created_at),
        balance_before_reward: Some(sell_order.running_balance),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
