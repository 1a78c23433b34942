use anyhow::{Context, Result};
use common::{Request, Response};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use crate::scheduler::{Cancellation, Command};

const NOT_RUNNING: &str = "Scheduler is not running";
/// Longest accepted request line, newline included.
const MAX_REQUEST_LEN: u64 = 1024;

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    if !addr.ip().is_loopback() {
        log::warn!("Control address {} is not a loopback address", addr);
    }
    TcpListener::bind(addr).await
        .with_context(|| format!("Failed to bind control listener on {}", addr))
}

/// Accepts clients until `cancel` fires. Each line on a connection is one
/// JSON `Request`, answered with one JSON `Response` line.
pub async fn serve(listener: TcpListener, commands: mpsc::Sender<Command>, mut cancel: Cancellation) {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Listening for control requests on {}", addr);
    }
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    let commands = commands.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, commands).await {
                            log::error!("Control connection from {} failed: {:#}", peer, e);
                        }
                    });
                }
                Err(e) => log::error!("Failed to accept control connection: {}", e),
            }
        }
    }
}

async fn handle_connection(socket: TcpStream, commands: mpsc::Sender<Command>) -> Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let mut buf = Vec::new();
        let n = (&mut reader).take(MAX_REQUEST_LEN).read_until(b'\n', &mut buf).await?;
        if n == 0 {
            break;
        }
        let oversized = buf.last() != Some(&b'\n') && n as u64 == MAX_REQUEST_LEN;
        let resp = if oversized {
            log::warn!("Dropping control request longer than {} bytes", MAX_REQUEST_LEN);
            Response::Error(format!("Request exceeds {} bytes", MAX_REQUEST_LEN))
        } else {
            let line = String::from_utf8_lossy(&buf);
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Request>(line.trim()) {
                Ok(req) => {
                    log::info!("Received request: {:?}", req);
                    dispatch(req, &commands).await
                }
                Err(e) => {
                    log::error!("failed to deserialize request; err = {:?}", e);
                    Response::Error(format!("Malformed request: {}", e))
                }
            }
        };

        let mut resp_bytes = serde_json::to_vec(&resp)?;
        resp_bytes.push(b'\n');
        writer.write_all(&resp_bytes).await?;
        if oversized {
            break;
        }
    }
    Ok(())
}

pub async fn dispatch(req: Request, commands: &mpsc::Sender<Command>) -> Response {
    match req {
        Request::SetOverride(mode) => {
            let (reply, rx) = oneshot::channel();
            if commands.send(Command::SetOverride { mode, reply }).await.is_err() {
                return Response::Error(NOT_RUNNING.to_string());
            }
            match rx.await {
                Ok(Ok(())) => Response::Ok,
                Ok(Err(e)) => Response::Error(e),
                Err(_) => Response::Error(NOT_RUNNING.to_string()),
            }
        }
        Request::ClearOverride => {
            let (reply, rx) = oneshot::channel();
            if commands.send(Command::ClearOverride { reply }).await.is_err() {
                return Response::Error(NOT_RUNNING.to_string());
            }
            match rx.await {
                Ok(()) => Response::Ok,
                Err(_) => Response::Error(NOT_RUNNING.to_string()),
            }
        }
        Request::Status => {
            let (reply, rx) = oneshot::channel();
            if commands.send(Command::Status { reply }).await.is_err() {
                return Response::Error(NOT_RUNNING.to_string());
            }
            match rx.await {
                Ok(status) => Response::Status(status),
                Err(_) => Response::Error(NOT_RUNNING.to_string()),
            }
        }
    }
}
