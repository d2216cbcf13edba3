//! End-to-end tests against a loopback `tokio-tungstenite` server.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::time::timeout;

use ws_relay::{
    Backoff, CloseReason, ConnectionState, InputSource, Relay, RelayConfig, RelayExit, Session,
    SessionOptions,
};

const WAIT: Duration = Duration::from_secs(10);

fn fast_options() -> SessionOptions {
    SessionOptions::new()
        .with_backoff(Backoff::new(
            Duration::from_millis(10),
            2.0,
            Duration::from_millis(50),
        ))
        .with_connect_timeout(Duration::from_secs(2))
}

async fn bind() -> Result<(TcpListener, String)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    Ok((listener, format!("ws://127.0.0.1:{port}/chat")))
}

/// Serves `connections` clients in turn, echoing text frames.
fn spawn_echo_server(listener: TcpListener, connections: usize) {
    tokio::spawn(async move {
        for _ in 0..connections {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() && ws.send(msg).await.is_err() {
                    break;
                }
            }
        }
    });
}

#[tokio::test]
async fn test_session_echo() -> Result<()> {
    let (listener, url) = bind().await?;
    spawn_echo_server(listener, 1);

    let session = Session::websocket(fast_options())?;
    session.start(&url)?;

    let state = timeout(WAIT, session.wait_for_state(ConnectionState::Open)).await?;
    assert_eq!(state, ConnectionState::Open);

    for text in ["first", "second", "third"] {
        session.send(text).await?;
    }
    for expected in ["first", "second", "third"] {
        let reply = timeout(WAIT, session.poll_inbound()).await??;
        assert_eq!(reply.text(), expected);
    }

    timeout(WAIT, session.shutdown()).await?;
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(session.close_reason(), Some(CloseReason::Shutdown));
    assert_eq!(
        session.event_log().states(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_session_reconnects_after_server_drop() -> Result<()> {
    let (listener, url) = bind().await?;

    // First connection is dropped right after the handshake; the second echoes.
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                let _ = ws.close(None).await;
            }
        }
        spawn_echo_server(listener, 1);
    });

    let session = Session::websocket(fast_options())?;
    session.start(&url)?;

    timeout(WAIT, async {
        loop {
            let states = session.event_log().states();
            if states.iter().filter(|s| **s == ConnectionState::Open).count() >= 2
                && session.state() == ConnectionState::Open
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .context("session never reopened")?;

    session.send("again").await?;
    let reply = timeout(WAIT, session.poll_inbound()).await??;
    assert_eq!(reply.text(), "again");

    let states = session.event_log().states();
    assert!(states.contains(&ConnectionState::Reconnecting), "{states:?}");

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server_exhausts_retry_budget() -> Result<()> {
    let (listener, url) = bind().await?;
    drop(listener);

    let session = Session::websocket(fast_options().with_max_retries(2))?;
    session.start(&url)?;

    let reason = timeout(WAIT, session.closed()).await?;
    assert_eq!(reason, CloseReason::RetryBudgetExhausted { attempts: 3 });

    let entries = session.event_log().entries();
    assert!(entries.iter().filter(|e| e.error.is_some()).count() >= 3);
    Ok(())
}

#[tokio::test]
async fn test_relay_round_trip() -> Result<()> {
    let (listener, url) = bind().await?;
    spawn_echo_server(listener, 1);

    let relay = Relay::new(RelayConfig::new(url).with_session(fast_options()))?;
    let (client, mut keyboard) = tokio::io::duplex(256);
    let mut output = Vec::new();

    let typing = async {
        keyboard.write_all(b"hello\r\n").await?;
        keyboard.write_all(b"world\n").await?;
        tokio::time::sleep(Duration::from_millis(200)).await;
        keyboard.write_all(b"/quit\n").await?;
        anyhow::Ok(keyboard)
    };

    let (exit, typed) = timeout(WAIT, async {
        tokio::join!(
            relay.run(
                InputSource::spawn(client, 4),
                &mut output,
                std::future::pending::<()>()
            ),
            typing
        )
    })
    .await?;
    typed?;

    assert_eq!(exit, RelayExit::Normal);
    assert_eq!(String::from_utf8(output)?, "hello\nworld\n");
    Ok(())
}
