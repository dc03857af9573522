use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use weaver_core::ipc::{StoryRequest, StoryResponse};

use crate::router;
use crate::state::AppState;

/// Serve length-delimited MessagePack frames on a Unix socket until shutdown.
pub async fn run_unix_server(
    socket_path: &str,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC Server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                let state = state.clone();
                tokio::spawn(async move {
                    let (read, write) = stream.into_split();
                    // 4-byte little-endian length prefix + MessagePack payload
                    let le_codec = || LengthDelimitedCodec::builder().little_endian().new_codec();
                    let mut framed_read = FramedRead::new(read, le_codec());
                    let mut framed_write = FramedWrite::new(write, le_codec());

                    while let Some(frame) = framed_read.next().await {
                        let bytes_mut = match frame {
                            Ok(b) => b,
                            Err(e) => {
                                tracing::error!("Frame error: {}", e);
                                break;
                            }
                        };

                        let response = match rmp_serde::from_slice::<StoryRequest>(&bytes_mut) {
                            Ok(request) => router::handle_request(request, &state).await,
                            Err(e) => StoryResponse::err_with_code(
                                "bad_request",
                                format!("Deserialization error: {}", e),
                            ),
                        };

                        match rmp_serde::to_vec_named(&response) {
                            Ok(resp_bytes) => {
                                if let Err(e) = framed_write.send(Bytes::from(resp_bytes)).await {
                                    tracing::error!("Failed to send response: {}", e);
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to serialize response: {}", e);
                                break;
                            }
                        }
                    }
                });
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{characters_json, testing_state, ScriptedCompletion};
    use tokio::net::UnixStream;
    use tokio_util::codec::Framed;

    async fn roundtrip<S>(
        framed: &mut Framed<S, LengthDelimitedCodec>,
        request: &StoryRequest,
    ) -> StoryResponse
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let bytes = rmp_serde::to_vec_named(request).unwrap();
        framed.send(Bytes::from(bytes)).await.unwrap();
        let frame = framed.next().await.unwrap().unwrap();
        rmp_serde::from_slice(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_socket_serves_framed_requests() {
        let socket_path =
            std::env::temp_dir().join(format!("weaver-{}.sock", uuid::Uuid::new_v4()));
        let socket = socket_path.to_string_lossy().to_string();
        let completion = Arc::new(ScriptedCompletion::with_texts([characters_json(&[(
            "Alice", "stealth", "pride",
        )])]));
        let state = Arc::new(testing_state(completion, 10));
        let (tx, _rx) = broadcast::channel(1);

        let server = tokio::spawn({
            let socket = socket.clone();
            let shutdown = tx.subscribe();
            async move { run_unix_server(&socket, state, shutdown).await }
        });

        let mut stream = None;
        for _ in 0..50 {
            if let Ok(s) = UnixStream::connect(&socket_path).await {
                stream = Some(s);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let codec = LengthDelimitedCodec::builder().little_endian().new_codec();
        let mut framed = Framed::new(stream.unwrap(), codec);

        let pong = roundtrip(&mut framed, &StoryRequest::Ping).await;
        assert!(pong.is_ok());

        let started = roundtrip(&mut framed, &StoryRequest::StartSession).await;
        assert!(started.is_ok());
        assert_eq!(started.data.unwrap()["characters"][0]["character_name"], "Alice");

        framed.send(Bytes::from_static(b"\xc1 not msgpack")).await.unwrap();
        let frame = framed.next().await.unwrap().unwrap();
        let garbled: StoryResponse = rmp_serde::from_slice(&frame).unwrap();
        assert_eq!(garbled.code.as_deref(), Some("bad_request"));

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert!(!socket_path.exists());
    }
}
