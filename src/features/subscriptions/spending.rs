use super::models::{BillingCycle, Subscription};
use serde::Serialize;
use std::collections::BTreeMap;

/// 年間の週数
const WEEKS_PER_YEAR: f64 = 52.0;

/// 年間の月数
const MONTHS_PER_YEAR: f64 = 12.0;

/// 支払いサイクルごとの金額を月額に換算する
///
/// # 引数
/// * `amount` - 1サイクルあたりの金額
/// * `cycle` - 支払いサイクル
///
/// # 戻り値
/// 月額換算値。周期の定義がない custom は換算できないため None
pub fn monthly_equivalent(amount: f64, cycle: BillingCycle) -> Option<f64> {
    match cycle {
        BillingCycle::Monthly => Some(amount),
        BillingCycle::Weekly => Some(amount * WEEKS_PER_YEAR / MONTHS_PER_YEAR),
        BillingCycle::Quarterly => Some(amount / 3.0),
        BillingCycle::Yearly => Some(amount / MONTHS_PER_YEAR),
        BillingCycle::Custom => None,
    }
}

/// 通貨精度（小数点以下2桁）に丸める
///
/// 集計の途中では使わず、表示直前に一度だけ適用する。
pub fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 月額合計の集計結果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySpend {
    /// 月額合計（小数点以下2桁に丸め済み）
    pub monthly_expenditure: f64,
    /// 合計に含めたサブスクリプション数
    pub counted_count: usize,
    /// custom サイクルのため合計から除外した数
    pub excluded_custom_count: usize,
}

/// 月額換算の合計を計算する
///
/// active / trial のサブスクリプションのみを対象とする。custom サイクルは合計に含めず、
/// 除外件数として返す。合計は全精度で計算し、最後に一度だけ丸める。
pub fn monthly_total<'a, I>(subscriptions: I) -> MonthlySpend
where
    I: IntoIterator<Item = &'a Subscription>,
{
    let mut total = 0.0;
    let mut counted_count = 0;
    let mut excluded_custom_count = 0;

    for subscription in subscriptions
        .into_iter()
        .filter(|s| s.status.is_billable())
    {
        match monthly_equivalent(subscription.amount, subscription.billing_cycle) {
            Some(monthly) => {
                total += monthly;
                counted_count += 1;
            }
            None => excluded_custom_count += 1,
        }
    }

    MonthlySpend {
        monthly_expenditure: round_currency(total),
        counted_count,
        excluded_custom_count,
    }
}

/// 分析画面向けの内訳
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingBreakdown {
    /// 状態ごとの件数（全件）
    pub status_counts: BTreeMap<String, usize>,
    /// 支払いサイクルごとの金額合計（全件・換算なし）
    pub amount_by_cycle: BTreeMap<String, f64>,
    /// 支払いサイクルごとの月額換算合計（active / trial のみ、custom を除く）
    pub monthly_by_cycle: BTreeMap<String, f64>,
}

/// 状態別件数とサイクル別金額の内訳を計算する
pub fn spending_breakdown(subscriptions: &[Subscription]) -> SpendingBreakdown {
    let mut status_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut amount_by_cycle: BTreeMap<String, f64> = BTreeMap::new();
    let mut monthly_by_cycle: BTreeMap<String, f64> = BTreeMap::new();

    for subscription in subscriptions {
        *status_counts
            .entry(subscription.status.to_string())
            .or_default() += 1;

        *amount_by_cycle
            .entry(subscription.billing_cycle.to_string())
            .or_default() += subscription.amount;

        if subscription.status.is_billable() {
            if let Some(monthly) =
                monthly_equivalent(subscription.amount, subscription.billing_cycle)
            {
                *monthly_by_cycle
                    .entry(subscription.billing_cycle.to_string())
                    .or_default() += monthly;
            }
        }
    }

    // 丸めは集計後に一度だけ
    amount_by_cycle
        .values_mut()
        .for_each(|v| *v = round_currency(*v));
    monthly_by_cycle
        .values_mut()
        .for_each(|v| *v = round_currency(*v));

    SpendingBreakdown {
        status_counts,
        amount_by_cycle,
        monthly_by_cycle,
    }
}
