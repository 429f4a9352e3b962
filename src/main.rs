use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use subscription_tracker_lib::features::auth::DEFAULT_SESSION_DAYS;
use subscription_tracker_lib::features::renewals::run_renewal_pass;
use subscription_tracker_lib::features::subscriptions::models::parse_date;
use subscription_tracker_lib::shared::errors::{AppError, AppResult};
use subscription_tracker_lib::{initialize_app, open_state, server};

/// サブスクリプション管理APIサーバー
#[derive(Debug, Parser)]
#[command(name = "subscription-tracker", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// HTTP APIサーバーを起動する
    Serve {
        /// 待ち受けアドレス（省略時は BIND_ADDRESS）
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// 更新日の繰り越しを一度だけ実行する
    Renew {
        /// 基準日（YYYY-MM-DD、省略時は設定タイムゾーンの今日）
        #[arg(long)]
        today: Option<String>,
    },
    /// セッションを作成してBearerトークンを出力する
    IssueToken {
        #[arg(long)]
        user_id: String,
        /// 有効日数
        #[arg(long, default_value_t = DEFAULT_SESSION_DAYS)]
        days: i64,
    },
    /// 利用者のすべてのセッションを無効化する
    RevokeSessions {
        #[arg(long)]
        user_id: String,
    },
    /// 期限切れのセッションを削除する
    CleanupSessions,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e.details());
            eprintln!("エラー: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let config = initialize_app()?;

    match cli.command {
        Command::Serve { bind } => {
            let addr = bind.unwrap_or(config.bind_address);
            let state = Arc::new(open_state(config)?);
            let shutdown = server::shutdown_on_ctrl_c();
            server::serve(state, addr, shutdown).await?;
            log::info!("サーバーを停止しました");
        }
        Command::Renew { today } => {
            let today = match today {
                Some(date) => parse_date(&date)?,
                None => config.today(),
            };
            let state = open_state(config)?;
            let report = {
                let db = state.lock_db()?;
                run_renewal_pass(&db, today)?
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::IssueToken { user_id, days } => {
            if user_id.trim().is_empty() {
                return Err(AppError::validation("user-id を指定してください"));
            }
            let state = open_state(config)?;
            let (session, token) = state.sessions().issue_token(&user_id, days)?;
            log::info!("トークンを発行しました: expires_at={}", session.expires_at);
            println!("{token}");
        }
        Command::RevokeSessions { user_id } => {
            let state = open_state(config)?;
            let removed = state.sessions().invalidate_owner_sessions(&user_id)?;
            println!("{removed}件のセッションを無効化しました");
        }
        Command::CleanupSessions => {
            let state = open_state(config)?;
            let removed = state.sessions().cleanup_expired_sessions()?;
            println!("期限切れセッションを{removed}件削除しました");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_issue_token() {
        let cli = Cli::try_parse_from(["subscription-tracker", "issue-token", "--user-id", "alice"])
            .unwrap();
        match cli.command {
            Command::IssueToken { user_id, days } => {
                assert_eq!(user_id, "alice");
                assert_eq!(days, DEFAULT_SESSION_DAYS);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_cleanup_sessions() {
        let cli = Cli::try_parse_from(["subscription-tracker", "cleanup-sessions"]).unwrap();
        assert!(matches!(cli.command, Command::CleanupSessions));
    }
}
