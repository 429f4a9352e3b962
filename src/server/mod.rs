/// HTTP APIサーバー
pub mod router;

pub use router::{handle_request, MAX_BODY_BYTES};

use crate::shared::errors::AppResult;
use crate::AppState;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// 指定アドレスでHTTPサーバーを起動する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `addr` - 待ち受けアドレス
/// * `shutdown` - キャンセルされると新規接続の受け付けを停止する
pub async fn serve(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> AppResult<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(state, listener, shutdown).await
}

/// バインド済みのリスナーで接続を受け付ける
pub async fn serve_listener(
    state: Arc<AppState>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> AppResult<()> {
    log::info!("HTTPサーバーを開始しました: http://{}", listener.local_addr()?);

    if let Err(e) = state.sessions().cleanup_expired_sessions() {
        log::warn!("期限切れセッションの削除に失敗しました: {e}");
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("シャットダウン要求を受信したため、接続の受け付けを停止します");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    log::debug!("接続を受け付けました: {peer}");
                    let state = Arc::clone(&state);
                    tokio::spawn(handle_connection(stream, state));
                }
                Err(e) => {
                    log::error!("接続受け入れエラー: {e}");
                }
            }
        }
    }

    Ok(())
}

/// TCP接続を処理する
async fn handle_connection(stream: TcpStream, state: Arc<AppState>) {
    let io = TokioIo::new(stream);

    let service =
        service_fn(move |req: Request<Incoming>| handle_request(req, Arc::clone(&state)));

    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
        log::error!("HTTP接続処理エラー: {err}");
    }
}

/// Ctrl-Cでキャンセルされるトークンを作成する
pub fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => trigger.cancel(),
            Err(e) => log::error!("シグナルの待機に失敗しました: {e}"),
        }
    });

    token
}
