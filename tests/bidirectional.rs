//! End-to-end scenarios driven against an in-process mock WSS peer: a plain
//! (non-TLS) `tokio-tungstenite` server speaking the same binary frames,
//! exercising the documented scenarios without network access or real
//! credentials.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::unbounded_channel;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use volcano_tts::codec::{self, events, Frame, MessageFlag, MessageType};
use volcano_tts::{Event, Request, TtsClient, TtsClientBuilder};

const DEADLINE: Duration = Duration::from_secs(5);

async fn spawn_mock_server<F, Fut>(script: F) -> u16
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        script(ws).await;
    });
    port
}

async fn recv_frame(ws: &mut WebSocketStream<TcpStream>) -> Frame {
    loop {
        match ws.next().await {
            Some(Ok(Message::Binary(data))) => return codec::parse(&data).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("expected a binary frame, got {other:?}"),
        }
    }
}

async fn send_frame(ws: &mut WebSocketStream<TcpStream>, frame: Frame) {
    ws.send(Message::Binary(codec::serialize(&frame).into()))
        .await
        .unwrap();
}

fn conn_started() -> Frame {
    Frame {
        msg_type: MessageType::FullServer,
        msg_flag: MessageFlag::WithEvent,
        event: Some(events::CONN_STARTED),
        error_code: None,
        session_id: None,
        connect_id: Some("C1".to_string()),
        payload: b"{}".to_vec(),
    }
}

fn session_started(session_id: &str) -> Frame {
    Frame {
        msg_type: MessageType::FullServer,
        msg_flag: MessageFlag::WithEvent,
        event: Some(events::SESSION_STARTED),
        error_code: None,
        session_id: Some(session_id.to_string()),
        connect_id: None,
        payload: b"{}".to_vec(),
    }
}

fn session_finished(session_id: &str) -> Frame {
    Frame {
        msg_type: MessageType::FullServer,
        msg_flag: MessageFlag::WithEvent,
        event: Some(events::SESSION_FINISHED),
        error_code: None,
        session_id: Some(session_id.to_string()),
        connect_id: None,
        payload: b"{}".to_vec(),
    }
}

fn sentence_start(session_id: &str, text: &str) -> Frame {
    Frame {
        msg_type: MessageType::FullServer,
        msg_flag: MessageFlag::WithEvent,
        event: Some(events::TTS_SENTENCE_START),
        error_code: None,
        session_id: Some(session_id.to_string()),
        connect_id: None,
        payload: serde_json::to_vec(&serde_json::json!({ "text": text })).unwrap(),
    }
}

fn audio(session_id: &str, data: &[u8]) -> Frame {
    Frame {
        msg_type: MessageType::AudioOnlyServer,
        msg_flag: MessageFlag::WithEvent,
        event: Some(events::TTS_RESPONSE),
        error_code: None,
        session_id: Some(session_id.to_string()),
        connect_id: None,
        payload: data.to_vec(),
    }
}

async fn recv_until<T>(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<Event>,
    mut f: impl FnMut(&Event) -> Option<T>,
) -> (Vec<Event>, T) {
    let mut seen = Vec::new();
    loop {
        let event = timeout(DEADLINE, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed early");
        if let Some(result) = f(&event) {
            seen.push(event);
            return (seen, result);
        }
        seen.push(event);
    }
}

#[tokio::test]
async fn happy_single_session() {
    let port = spawn_mock_server(|mut ws| async move {
        let start_conn = recv_frame(&mut ws).await;
        assert_eq!(start_conn.event, Some(events::START_CONN));
        send_frame(&mut ws, conn_started()).await;

        let start_session = recv_frame(&mut ws).await;
        assert_eq!(start_session.event, Some(events::START_SESSION));
        send_frame(&mut ws, session_started("s1")).await;
        send_frame(&mut ws, sentence_start("s1", "hello")).await;
        send_frame(&mut ws, audio("s1", b"PCMDATA")).await;
        send_frame(&mut ws, session_finished("s1")).await;

        let _ = ws.next().await; // client-initiated close
    })
    .await;

    let config = TtsClientBuilder::new("app")
        .access_key("key")
        .ws_url(format!("ws://127.0.0.1:{port}"))
        .build()
        .unwrap();
    let (tx, mut rx) = unbounded_channel();
    let client = TtsClient::new(config, move |e| {
        let _ = tx.send(e);
    });

    client.run();
    recv_until(&mut rx, |e| matches!(e, Event::Open { .. }).then_some(())).await;

    client.request(Request {
        session_id: "s1".to_string(),
        text: "hello".to_string(),
        speaker: "v1".to_string(),
    });

    let (seen, _) = recv_until(&mut rx, |e| matches!(e, Event::Audio { .. }).then_some(())).await;
    assert!(seen
        .iter()
        .any(|e| matches!(e, Event::Sentence { text, .. } if text == "hello")));
    assert!(seen
        .iter()
        .any(|e| matches!(e, Event::Audio { data, .. } if data.as_ref() == b"PCMDATA")));
    assert!(!seen.iter().any(|e| matches!(e, Event::Error { .. })));

    client.close();
    recv_until(&mut rx, |e| matches!(e, Event::Close { .. }).then_some(())).await;
}

#[tokio::test]
async fn malformed_inbound_closes_with_error() {
    let port = spawn_mock_server(|mut ws| async move {
        let _start_conn = recv_frame(&mut ws).await;
        ws.send(Message::Binary(vec![0x11, 0x90, 0x10].into()))
            .await
            .unwrap();
        let _ = ws.next().await;
    })
    .await;

    let config = TtsClientBuilder::new("app")
        .access_key("key")
        .ws_url(format!("ws://127.0.0.1:{port}"))
        .build()
        .unwrap();
    let (tx, mut rx) = unbounded_channel();
    let client = TtsClient::new(config, move |e| {
        let _ = tx.send(e);
    });

    client.run();
    let (seen, _) = recv_until(&mut rx, |e| matches!(e, Event::Close { .. }).then_some(())).await;
    assert!(seen.iter().any(|e| matches!(e, Event::Error { .. })));
}

#[tokio::test]
async fn implicit_session_switch_sends_finish_before_start() {
    let (order_tx, mut order_rx) = unbounded_channel::<&'static str>();

    let port = spawn_mock_server(move |mut ws| async move {
        let _start_conn = recv_frame(&mut ws).await;
        send_frame(&mut ws, conn_started()).await;

        let _start_session_1 = recv_frame(&mut ws).await;
        send_frame(&mut ws, session_started("s1")).await;

        let frame = recv_frame(&mut ws).await;
        order_tx.send(if frame.event == Some(events::FINISH_SESSION) {
            "finish"
        } else {
            "other"
        }).unwrap();
        assert_eq!(frame.event, Some(events::FINISH_SESSION));
        send_frame(&mut ws, session_finished("s1")).await;

        let frame = recv_frame(&mut ws).await;
        order_tx.send(if frame.event == Some(events::START_SESSION) {
            "start"
        } else {
            "other"
        }).unwrap();
        assert_eq!(frame.event, Some(events::START_SESSION));
        send_frame(&mut ws, session_started("s2")).await;

        let _ = ws.next().await;
    })
    .await;

    let config = TtsClientBuilder::new("app")
        .access_key("key")
        .ws_url(format!("ws://127.0.0.1:{port}"))
        .build()
        .unwrap();
    let (tx, mut rx) = unbounded_channel();
    let client = TtsClient::new(config, move |e| {
        let _ = tx.send(e);
    });

    client.run();
    recv_until(&mut rx, |e| matches!(e, Event::Open { .. }).then_some(())).await;

    client.request(Request {
        session_id: "s1".to_string(),
        text: String::new(),
        speaker: "v1".to_string(),
    });
    recv_until(&mut rx, |e| matches!(e, Event::SessionStarted { .. }).then_some(())).await;

    client.request(Request {
        session_id: "s2".to_string(),
        text: String::new(),
        speaker: "v2".to_string(),
    });
    recv_until(&mut rx, |e| matches!(e, Event::SessionStarted { .. }).then_some(())).await;

    assert_eq!(timeout(DEADLINE, order_rx.recv()).await.unwrap().unwrap(), "finish");
    assert_eq!(timeout(DEADLINE, order_rx.recv()).await.unwrap().unwrap(), "start");

    client.close();
}

#[tokio::test]
async fn force_close_mid_session_stops_further_audio() {
    let port = spawn_mock_server(|mut ws| async move {
        let _start_conn = recv_frame(&mut ws).await;
        send_frame(&mut ws, conn_started()).await;
        let _start_session = recv_frame(&mut ws).await;
        send_frame(&mut ws, session_started("s1")).await;
        // Keep streaming audio until the socket goes away.
        for i in 0..50u8 {
            if send_try(&mut ws, audio("s1", &[i])).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    async fn send_try(ws: &mut WebSocketStream<TcpStream>, frame: Frame) -> Result<(), ()> {
        ws.send(Message::Binary(codec::serialize(&frame).into()))
            .await
            .map_err(|_| ())
    }

    let config = TtsClientBuilder::new("app")
        .access_key("key")
        .ws_url(format!("ws://127.0.0.1:{port}"))
        .build()
        .unwrap();
    let (tx, mut rx) = unbounded_channel();
    let client = std::sync::Arc::new(TtsClient::new(config, move |e| {
        let _ = tx.send(e);
    }));
    let close_trigger = client.clone();
    let closed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let audio_after_close = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let closed_for_task = closed.clone();
    let audio_after_close_for_task = audio_after_close.clone();

    // Forwards events and tallies any Audio event observed strictly after
    // close() has already been invoked once.
    let forward = tokio::spawn(async move {
        loop {
            let event = match timeout(DEADLINE, rx.recv()).await {
                Ok(Some(e)) => e,
                Ok(None) | Err(_) => break,
            };
            match event {
                Event::Audio { .. } => {
                    if !closed_for_task.swap(true, std::sync::atomic::Ordering::SeqCst) {
                        close_trigger.close();
                    } else {
                        audio_after_close_for_task
                            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                }
                Event::Close { .. } => break,
                _ => {}
            }
        }
    });

    client.run();
    client.request(Request {
        session_id: "s1".to_string(),
        text: "long".to_string(),
        speaker: "v1".to_string(),
    });

    forward.await.unwrap();

    assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(
        audio_after_close.load(std::sync::atomic::Ordering::SeqCst),
        0,
        "no audio events should be delivered after close() was called"
    );
}
