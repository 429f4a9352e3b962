use crate::features::auth::models::{Session, SessionError};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

/// ナンスのバイト長
const NONCE_LEN: usize = 12;

/// セッションのデフォルト有効日数
pub const DEFAULT_SESSION_DAYS: i64 = 30;

/// セッション管理を行う構造体
#[derive(Clone)]
pub struct SessionManager {
    /// データベース接続
    db_connection: Arc<Mutex<Connection>>,
    /// 暗号化キー
    encryption_key: Vec<u8>,
}

impl SessionManager {
    /// 新しいSessionManagerを作成する
    ///
    /// # 引数
    /// * `db_connection` - データベース接続
    /// * `encryption_key` - セッション暗号化用のキー
    ///
    /// # 戻り値
    /// SessionManagerインスタンス
    pub fn new(db_connection: Arc<Mutex<Connection>>, encryption_key: &str) -> Self {
        // 暗号化キーを32バイトに調整（不足分は0で埋める）
        let mut key_bytes = encryption_key.as_bytes().to_vec();
        key_bytes.resize(32, 0);

        Self {
            db_connection,
            encryption_key: key_bytes,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SessionError> {
        self.db_connection
            .lock()
            .map_err(|e| SessionError::DatabaseError(format!("データベースロックエラー: {e}")))
    }

    /// セッションを作成する
    ///
    /// # 引数
    /// * `owner_id` - 利用者ID
    /// * `valid_days` - 有効日数
    ///
    /// # 戻り値
    /// 作成されたセッション情報
    pub fn create_session(&self, owner_id: &str, valid_days: i64) -> Result<Session, SessionError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + Duration::days(valid_days);

        let session = Session {
            id: session_id.clone(),
            owner_id: owner_id.to_string(),
            expires_at,
            created_at: now,
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (id, owner_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                owner_id,
                expires_at.to_rfc3339(),
                now.to_rfc3339()
            ],
        )?;

        log::info!("セッションを作成しました: owner_id={owner_id}, session_id={session_id}");
        Ok(session)
    }

    /// セッションを作成し、暗号化済みのトークンを返す
    ///
    /// # 引数
    /// * `owner_id` - 利用者ID
    /// * `valid_days` - 有効日数
    ///
    /// # 戻り値
    /// (セッション情報, Bearerトークン)
    pub fn issue_token(
        &self,
        owner_id: &str,
        valid_days: i64,
    ) -> Result<(Session, String), SessionError> {
        let session = self.create_session(owner_id, valid_days)?;
        let token = self.encrypt_session_id(&session.id)?;
        Ok((session, token))
    }

    /// セッションを検証する
    ///
    /// # 引数
    /// * `token` - 暗号化されたセッショントークン
    ///
    /// # 戻り値
    /// 検証されたセッション情報
    pub fn validate_session(&self, token: &str) -> Result<Session, SessionError> {
        let session_id = self.decrypt_token(token)?;

        let session = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT id, owner_id, expires_at, created_at FROM sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    let expires_at: String = row.get(2)?;
                    let created_at: String = row.get(3)?;
                    Ok(Session {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        expires_at: parse_timestamp(&expires_at, 2)?,
                        created_at: parse_timestamp(&created_at, 3)?,
                    })
                },
            )
            .optional()?
            .ok_or(SessionError::NotFound)?
        };

        // セッションの有効期限をチェック
        if session.expires_at < Utc::now() {
            if let Err(e) = self.invalidate_session(&session.id) {
                log::warn!("期限切れセッションの削除に失敗しました: {e}");
            }
            return Err(SessionError::Expired);
        }

        log::debug!(
            "セッションを検証しました: owner_id={}, session_id={}",
            session.owner_id,
            session.id
        );
        Ok(session)
    }

    /// セッションを無効化する
    ///
    /// # 引数
    /// * `session_id` - セッションID
    pub fn invalidate_session(&self, session_id: &str) -> Result<(), SessionError> {
        let conn = self.lock()?;
        let affected_rows =
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;

        if affected_rows > 0 {
            log::info!("セッションを無効化しました: session_id={session_id}");
        } else {
            log::warn!("無効化対象のセッションが見つかりませんでした: session_id={session_id}");
        }

        Ok(())
    }

    /// セッションIDを暗号化してトークンを生成する
    ///
    /// トークンは「ナンス(12バイト) + 暗号文」をBase64エンコードしたもの。
    pub fn encrypt_session_id(&self, session_id: &str) -> Result<String, SessionError> {
        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key)
            .map_err(|e| SessionError::EncryptionError(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, session_id.as_bytes())
            .map_err(|e| SessionError::EncryptionError(e.to_string()))?;

        let mut token_bytes = nonce_bytes.to_vec();
        token_bytes.extend_from_slice(&ciphertext);

        Ok(general_purpose::STANDARD.encode(&token_bytes))
    }

    /// トークンを復号化してセッションIDを取得する
    fn decrypt_token(&self, token: &str) -> Result<String, SessionError> {
        let token_bytes = general_purpose::STANDARD
            .decode(token)
            .map_err(|e| SessionError::DecryptionError(format!("Base64デコードエラー: {e}")))?;

        if token_bytes.len() <= NONCE_LEN {
            return Err(SessionError::DecryptionError(
                "トークンが短すぎます".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = token_bytes.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key)
            .map_err(|e| SessionError::DecryptionError(e.to_string()))?;

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| SessionError::DecryptionError(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| SessionError::DecryptionError(format!("UTF-8変換エラー: {e}")))
    }

    /// 期限切れセッションをクリーンアップする
    ///
    /// # 戻り値
    /// 削除されたセッション数
    pub fn cleanup_expired_sessions(&self) -> Result<usize, SessionError> {
        let now = Utc::now();
        let conn = self.lock()?;

        let affected_rows = conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            params![now.to_rfc3339()],
        )?;

        if affected_rows > 0 {
            log::info!("期限切れセッションを{affected_rows}件削除しました");
        }

        Ok(affected_rows)
    }

    /// 利用者のすべてのセッションを無効化する
    ///
    /// # 戻り値
    /// 削除されたセッション数
    pub fn invalidate_owner_sessions(&self, owner_id: &str) -> Result<usize, SessionError> {
        let conn = self.lock()?;

        let affected_rows =
            conn.execute("DELETE FROM sessions WHERE owner_id = ?1", params![owner_id])?;

        log::info!("利用者{owner_id}のセッションを{affected_rows}件無効化しました");
        Ok(affected_rows)
    }
}

fn parse_timestamp(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
