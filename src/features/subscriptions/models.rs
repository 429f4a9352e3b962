use crate::shared::errors::{AppError, AppResult};
use chrono::{Datelike, NaiveDate};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// サービス名の最大文字数
pub const MAX_SERVICE_NAME_LENGTH: usize = 100;

/// 金額の上限（numeric(10,2) 相当）
pub const MAX_AMOUNT: f64 = 99_999_999.99;

/// 支払いサイクル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
    /// 周期が定義されていないサイクル（自動更新・月額換算の対象外）
    Custom,
}

impl BillingCycle {
    /// すべての支払いサイクル
    pub const ALL: [BillingCycle; 5] = [
        BillingCycle::Weekly,
        BillingCycle::Monthly,
        BillingCycle::Quarterly,
        BillingCycle::Yearly,
        BillingCycle::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Weekly => "weekly",
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::Yearly => "yearly",
            BillingCycle::Custom => "custom",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BillingCycle::ALL
            .into_iter()
            .find(|cycle| cycle.as_str() == s)
            .ok_or_else(|| {
                AppError::validation(format!(
                    "billingCycle は weekly, monthly, quarterly, yearly, custom のいずれかである必要があります: {s}"
                ))
            })
    }
}

/// サブスクリプションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Trial,
    Paused,
    Canceled,
}

impl SubscriptionStatus {
    /// すべての状態
    pub const ALL: [SubscriptionStatus; 4] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::Trial,
        SubscriptionStatus::Paused,
        SubscriptionStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// 課金が継続している状態かどうか（active / trial）
    ///
    /// 自動更新の対象判定と月額合計の集計対象判定の両方に使う。
    pub fn is_billable(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trial)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                AppError::validation(format!(
                    "status は active, trial, paused, canceled のいずれかである必要があります: {s}"
                ))
            })
    }
}

macro_rules! impl_sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse::<$ty>()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

impl_sql_text_enum!(BillingCycle);
impl_sql_text_enum!(SubscriptionStatus);

/// サブスクリプションデータモデル
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    #[serde(rename = "userId")]
    pub owner_id: String,
    pub service: String,
    pub plan: Option<String>,
    pub amount: f64,
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
    pub renewal_date: NaiveDate,
    pub created_at: String,
    pub updated_at: String,
}

/// サブスクリプション作成用DTO
///
/// 受信したJSONをそのまま受ける。検証は [`CreateSubscriptionDto::validate`] で行う。
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionDto {
    pub service: Option<String>,
    pub plan: Option<String>,
    pub amount: Option<f64>,
    pub billing_cycle: Option<String>,
    pub status: Option<String>,
    pub renewal_date: Option<String>,
}

/// 検証済みの新規サブスクリプション
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub service: String,
    pub plan: Option<String>,
    pub amount: f64,
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
    pub renewal_date: NaiveDate,
}

impl CreateSubscriptionDto {
    /// 入力値を検証して新規サブスクリプションに変換する
    ///
    /// # 戻り値
    /// 検証済みの値、または不正なフィールドを示すバリデーションエラー
    pub fn validate(self) -> AppResult<NewSubscription> {
        let service = validate_service(self.service.as_deref().unwrap_or(""))?;

        let amount = self
            .amount
            .ok_or_else(|| AppError::validation("amount を入力してください"))?;
        validate_amount(amount)?;

        let renewal_date = match self.renewal_date.as_deref() {
            Some(date) => parse_date(date)?,
            None => return Err(AppError::validation("renewalDate を入力してください")),
        };

        let billing_cycle = match self.billing_cycle.as_deref() {
            Some(cycle) => cycle.parse()?,
            None => BillingCycle::default(),
        };

        let status = match self.status.as_deref() {
            Some(status) => status.parse()?,
            None => SubscriptionStatus::default(),
        };

        // 空文字列のプランは未設定として扱う
        let plan = self
            .plan
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Ok(NewSubscription {
            service,
            plan,
            amount,
            billing_cycle,
            status,
            renewal_date,
        })
    }
}

/// サブスクリプション更新用DTO（部分更新）
///
/// `None` のフィールドは変更しない。`plan` は `Some(None)` でクリアする。
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateSubscriptionDto {
    pub service: Option<String>,
    pub plan: Option<Option<String>>,
    pub amount: Option<f64>,
    pub billing_cycle: Option<BillingCycle>,
    pub status: Option<SubscriptionStatus>,
    pub renewal_date: Option<NaiveDate>,
}

impl UpdateSubscriptionDto {
    /// JSONオブジェクトから更新対象のフィールドを取り出す
    ///
    /// 認識できないキーや型が一致しない値は無視する。認識したフィールドの値は検証し、
    /// 不正な場合はバリデーションエラーを返す。適用可能なフィールドが一つもない場合もエラー。
    pub fn from_json(body: &Value) -> AppResult<Self> {
        let object = body
            .as_object()
            .ok_or_else(|| AppError::validation("リクエストボディはJSONオブジェクトである必要があります"))?;

        let dto = Self {
            service: string_field(object, "service")
                .map(validate_service)
                .transpose()?,
            plan: match object.get("plan") {
                Some(Value::String(plan)) => {
                    let plan = plan.trim();
                    Some((!plan.is_empty()).then(|| plan.to_string()))
                }
                Some(Value::Null) => Some(None),
                _ => None,
            },
            amount: object
                .get("amount")
                .and_then(Value::as_f64)
                .map(|amount| validate_amount(amount).map(|_| amount))
                .transpose()?,
            billing_cycle: string_field(object, "billingCycle")
                .map(str::parse::<BillingCycle>)
                .transpose()?,
            status: string_field(object, "status")
                .map(str::parse::<SubscriptionStatus>)
                .transpose()?,
            renewal_date: string_field(object, "renewalDate")
                .map(parse_date)
                .transpose()?,
        };

        if dto.is_empty() {
            return Err(AppError::validation("更新可能なフィールドがありません"));
        }

        Ok(dto)
    }

    /// 更新対象のフィールドがないかどうか
    pub fn is_empty(&self) -> bool {
        self.service.is_none()
            && self.plan.is_none()
            && self.amount.is_none()
            && self.billing_cycle.is_none()
            && self.status.is_none()
            && self.renewal_date.is_none()
    }
}

fn string_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

/// サービス名のバリデーション
fn validate_service(service: &str) -> AppResult<String> {
    let service = service.trim();

    if service.is_empty() {
        return Err(AppError::validation("service を入力してください"));
    }

    if service.chars().count() > MAX_SERVICE_NAME_LENGTH {
        return Err(AppError::validation(format!(
            "service は{MAX_SERVICE_NAME_LENGTH}文字以内で入力してください"
        )));
    }

    Ok(service.to_string())
}

/// 金額のバリデーション
fn validate_amount(amount: f64) -> AppResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::validation("amount は正の数値である必要があります"));
    }

    if amount > MAX_AMOUNT {
        return Err(AppError::validation(format!(
            "amount は{MAX_AMOUNT}以下で入力してください"
        )));
    }

    Ok(())
}

/// 日付文字列（YYYY-MM-DD形式）を解析する
///
/// # 引数
/// * `date` - 日付文字列
///
/// # 戻り値
/// 解析された日付、または失敗時はバリデーションエラー
pub fn parse_date(date: &str) -> AppResult<NaiveDate> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("日付はYYYY-MM-DD形式で入力してください: {date}")))?;

    if !(1900..=2100).contains(&parsed.year()) {
        return Err(AppError::validation(
            "年は1900年から2100年の間で入力してください",
        ));
    }

    Ok(parsed)
}
