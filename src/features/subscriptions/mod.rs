/// サブスクリプション機能モジュール
///
/// - サブスクリプションの作成、読み取り、更新、削除（利用者ごと）
/// - 更新日の繰り越し計算
/// - 月額換算の合計と内訳
/// - 更新予定の一覧
pub mod commands;
pub mod models;
pub mod renewal;
pub mod repository;
pub mod spending;
pub mod upcoming;

// 公開インターフェース
pub use commands::{
    create_subscription, delete_subscription, get_active_subscriptions,
    get_monthly_subscription_total, get_spending_analytics, get_subscriptions,
    get_upcoming_renewals, update_subscription,
};

pub use models::{
    BillingCycle, CreateSubscriptionDto, NewSubscription, Subscription, SubscriptionStatus,
    UpdateSubscriptionDto,
};

pub use renewal::{advance, Advancement, SkipReason};
pub use spending::{monthly_equivalent, monthly_total, round_currency, MonthlySpend};
pub use upcoming::{UpcomingRenewal, UpcomingWindow};
