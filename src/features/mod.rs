/// 機能別モジュール
///
/// 各機能モジュールは、その機能に関連するモデル・データベース操作・コマンドを含む。
pub mod auth;
pub mod renewals;
pub mod subscriptions;
