use crate::features::auth::models::AuthError;
use sha2::{Digest, Sha256};

/// スケジューラーからの呼び出しを検証する
///
/// バッチ処理の起動は利用者セッションとは別に、共有シークレットのみで認可する。
#[derive(Clone)]
pub struct SchedulerAuth {
    /// 共有シークレットのハッシュ（未設定時はすべて拒否）
    secret_digest: Option<[u8; 32]>,
}

impl SchedulerAuth {
    /// 新しいSchedulerAuthを作成する
    ///
    /// # 引数
    /// * `secret` - 共有シークレット。Noneの場合はすべての呼び出しを拒否する
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret_digest: secret.filter(|s| !s.is_empty()).map(digest),
        }
    }

    /// Bearerトークンが共有シークレットと一致するか検証する
    ///
    /// # 引数
    /// * `token` - Authorizationヘッダーから抽出したトークン
    ///
    /// # 戻り値
    /// 一致する場合はOk(())
    pub fn verify(&self, token: Option<&str>) -> Result<(), AuthError> {
        let Some(expected) = &self.secret_digest else {
            log::warn!("CRON_SECRETが未設定のためスケジューラー呼び出しを拒否しました");
            return Err(AuthError::AuthenticationRequired);
        };

        let token = token.ok_or(AuthError::AuthenticationRequired)?;

        if constant_time_eq(expected, &digest(token)) {
            Ok(())
        } else {
            log::warn!("スケジューラーのシークレットが一致しません");
            Err(AuthError::InvalidToken)
        }
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(value.as_bytes()));
    out
}

// 長さ固定のダイジェスト同士を比較するため、比較時間は入力に依存しない
fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
