//! Tests for the 'notify' command and the Telegram notifier

use offsite_backup::managers::notification::{completed_message, started_message, TelegramNotifier};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;
use test_utils::{NotificationConfig, Notifier};

/// Serve one request with `status` and hand back the request head
fn one_shot_server(status: &str) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    let status = status.to_string();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            head.extend_from_slice(&buf[..n]);
        }
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
            status
        );
        stream.write_all(response.as_bytes()).unwrap();
        String::from_utf8_lossy(&head).to_string()
    });

    (address, handle)
}

fn config(api_base: &str) -> NotificationConfig {
    NotificationConfig {
        telegram_bot_id: "123:abc".to_string(),
        telegram_chat_id: "-100200".to_string(),
        api_base: api_base.to_string(),
        accept_invalid_certs: false,
    }
}

#[test]
fn test_message_is_posted_to_the_bot() {
    let (address, server) = one_shot_server("200 OK");
    let notifier = TelegramNotifier::new(config(&address), Duration::from_secs(5)).unwrap();

    let status = notifier.notify("backup of edge1 & co done").unwrap();
    let head = server.join().unwrap();

    assert_eq!(status, Some(200));
    let request_line = head.lines().next().unwrap();
    assert!(request_line.starts_with("POST /bot123:abc/sendMessage?"));
    assert!(request_line.contains("chat_id=-100200"));
    // the text is URL-encoded
    assert!(request_line.contains("text=backup+of+edge1+%26+co+done"));
}

#[test]
fn test_rejection_status_is_returned() {
    let (address, server) = one_shot_server("401 Unauthorized");
    let notifier = TelegramNotifier::new(config(&address), Duration::from_secs(5)).unwrap();

    let status = notifier.notify("hello").unwrap();
    server.join().unwrap();

    assert_eq!(status, Some(401));
}

#[test]
fn test_unreachable_endpoint_is_an_error_without_token() {
    // bind then drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let notifier = TelegramNotifier::new(
        config(&format!("http://127.0.0.1:{}", port)),
        Duration::from_secs(5),
    )
    .unwrap();

    let err = notifier.notify("hello").unwrap_err();
    assert!(!format!("{:#}", err).contains("123:abc"));
}

#[test]
fn test_unconfigured_notifier_sends_nothing() {
    let notifier = TelegramNotifier::new(NotificationConfig::default(), Duration::from_secs(5)).unwrap();

    assert!(!notifier.is_enabled());
    assert_eq!(notifier.notify("hello").unwrap(), None);
}

#[test]
fn test_status_messages() {
    let started = started_message("edge1");
    let completed = completed_message("edge1");

    assert!(started.ends_with(": Backing Service for edge1 has started"));
    assert!(completed.ends_with(": Backing Service for edge1 has completed"));
    // `YYYY-MM-DD HH:MM:SS: ...`
    assert_eq!(started.find(": "), Some(19));
}
