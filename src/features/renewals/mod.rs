/// 更新日の繰り越しジョブ
///
/// スケジューラーから定期的に呼び出され、更新日が到来したサブスクリプションを
/// 全利用者分まとめて繰り越す。
pub mod job;

pub use job::{renew_subscription, run_renewal_pass, RenewalOutcome, RenewalReport};
