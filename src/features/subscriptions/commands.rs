use super::models::{CreateSubscriptionDto, Subscription, SubscriptionStatus, UpdateSubscriptionDto};
use super::repository;
use super::spending::{monthly_total, spending_breakdown, MonthlySpend, SpendingBreakdown};
use super::upcoming::{find_upcoming, UpcomingRenewal, UpcomingWindow};
use crate::features::auth::Owner;
use crate::shared::errors::AppResult;
use crate::AppState;

/// サブスクリプションを作成する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `owner` - 認証済みの利用者
/// * `dto` - サブスクリプション作成用DTO
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
pub fn create_subscription(
    state: &AppState,
    owner: &Owner,
    dto: CreateSubscriptionDto,
) -> AppResult<Subscription> {
    // 検証はロック取得前に行う
    let new = dto.validate()?;

    let db = state.lock_db()?;
    repository::create(&db, &owner.id, new)
}

/// サブスクリプション一覧を取得する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `owner` - 認証済みの利用者
/// * `status` - 指定した場合はその状態のみ
pub fn get_subscriptions(
    state: &AppState,
    owner: &Owner,
    status: Option<SubscriptionStatus>,
) -> AppResult<Vec<Subscription>> {
    let db = state.lock_db()?;
    repository::find_all(&db, &owner.id, status)
}

/// 有効（active）なサブスクリプション一覧を取得する
pub fn get_active_subscriptions(state: &AppState, owner: &Owner) -> AppResult<Vec<Subscription>> {
    get_subscriptions(state, owner, Some(SubscriptionStatus::Active))
}

/// サブスクリプションを部分更新する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `owner` - 認証済みの利用者
/// * `id` - サブスクリプションID
/// * `dto` - 検証済みの更新内容
///
/// # 戻り値
/// 更新されたサブスクリプション、または失敗時はエラー
pub fn update_subscription(
    state: &AppState,
    owner: &Owner,
    id: &str,
    dto: UpdateSubscriptionDto,
) -> AppResult<Subscription> {
    let db = state.lock_db()?;
    repository::update(&db, &owner.id, id, dto)
}

/// サブスクリプションを削除する
pub fn delete_subscription(state: &AppState, owner: &Owner, id: &str) -> AppResult<()> {
    let db = state.lock_db()?;
    repository::delete(&db, &owner.id, id)
}

/// 課金中のサブスクリプションの月額合計を取得する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `owner` - 認証済みの利用者
///
/// # 戻り値
/// 月額合計と集計件数、または失敗時はエラー
pub fn get_monthly_subscription_total(state: &AppState, owner: &Owner) -> AppResult<MonthlySpend> {
    let subscriptions = get_subscriptions(state, owner, None)?;
    Ok(monthly_total(&subscriptions))
}

/// 状態別・サイクル別の内訳を取得する
pub fn get_spending_analytics(state: &AppState, owner: &Owner) -> AppResult<SpendingBreakdown> {
    let subscriptions = get_subscriptions(state, owner, None)?;
    Ok(spending_breakdown(&subscriptions))
}

/// 指定範囲内の更新予定を取得する
///
/// 基準日は設定されたタイムゾーンでの今日。
pub fn get_upcoming_renewals(
    state: &AppState,
    owner: &Owner,
    window: UpcomingWindow,
) -> AppResult<Vec<UpcomingRenewal>> {
    let today = state.config.today();
    let db = state.lock_db()?;
    find_upcoming(&db, &owner.id, today, window)
}
