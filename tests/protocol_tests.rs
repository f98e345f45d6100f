//! Integration tests for framing and message rendering

use relaychat::protocol::{frame_message, Message, ProtocolError, MAX_MESSAGE_SIZE};
use relaychat::server::connection::{read_frame, write_frame};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

#[test]
fn test_frame_layout() {
    let framed = frame_message(b"hello");
    assert_eq!(&framed[..4], &[0, 0, 0, 5]);
    assert_eq!(&framed[4..], b"hello");

    let empty = frame_message(b"");
    assert_eq!(empty, vec![0, 0, 0, 0]);
}

#[test]
fn test_message_rendering() {
    let chat = Message::chat("A", b"hi".to_vec());
    assert_eq!(&*chat.render(), b"[A]: hi");

    let join = Message::join("B");
    assert_eq!(&*join.render(), b"[SERVER] B has joined the chat.");

    let leave = Message::leave("B");
    assert_eq!(&*leave.render(), b"[SERVER] B has left the chat.");
}

#[test]
fn test_chat_rendering_keeps_binary_body() {
    let chat = Message::chat("bin", vec![0xff, 0x00, 0xfe]);
    let rendered = chat.render();
    assert!(rendered.starts_with(b"[bin]: "));
    assert_eq!(&rendered[7..], &[0xff, 0x00, 0xfe]);
}

#[test]
fn test_rendered_len_matches_render() {
    let messages = [
        Message::chat("Alice", b"hello there".to_vec()),
        Message::join("Alice"),
        Message::leave("Alice"),
    ];
    for message in &messages {
        assert_eq!(message.rendered_len(), message.render().len());
        assert!(message.fits_frame());
    }

    let huge = Message::chat("A", vec![b'x'; MAX_MESSAGE_SIZE as usize]);
    assert_eq!(huge.rendered_len(), MAX_MESSAGE_SIZE as usize + 5);
    assert!(!huge.fits_frame());
}

#[tokio::test]
async fn test_coalesced_frames_are_read_separately() {
    let (mut client, mut server) = tokio::io::duplex(1024);

    let mut bytes = frame_message(b"first");
    bytes.extend_from_slice(&frame_message(b"second"));
    client.write_all(&bytes).await.unwrap();

    let first = read_frame(&mut server, MAX_MESSAGE_SIZE).await.unwrap();
    let second = read_frame(&mut server, MAX_MESSAGE_SIZE).await.unwrap();

    assert_eq!(first.as_deref(), Some(&b"first"[..]));
    assert_eq!(second.as_deref(), Some(&b"second"[..]));
}

#[tokio::test]
async fn test_split_frame_is_reassembled() {
    let (mut client, mut server) = tokio::io::duplex(1024);
    let bytes = frame_message(b"split across writes");

    let reader = tokio::spawn(async move { read_frame(&mut server, MAX_MESSAGE_SIZE).await });

    for chunk in bytes.chunks(3) {
        client.write_all(chunk).await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let frame = timeout(Duration::from_secs(2), reader)
        .await
        .expect("read should finish")
        .unwrap()
        .unwrap();
    assert_eq!(frame.as_deref(), Some(&b"split across writes"[..]));
}

#[tokio::test]
async fn test_clean_close_is_end_of_stream() {
    let (client, mut server) = tokio::io::duplex(64);
    drop(client);

    let frame = read_frame(&mut server, MAX_MESSAGE_SIZE).await.unwrap();
    assert!(frame.is_none());
}

#[tokio::test]
async fn test_close_inside_frame_is_an_error() {
    let (mut client, mut server) = tokio::io::duplex(64);
    client.write_all(&[0, 0, 0, 10, b'a', b'b']).await.unwrap();
    drop(client);

    let result = read_frame(&mut server, MAX_MESSAGE_SIZE).await;
    assert!(matches!(result, Err(ProtocolError::TruncatedFrame)));
}

#[tokio::test]
async fn test_close_inside_length_prefix_is_an_error() {
    let (mut client, mut server) = tokio::io::duplex(64);
    client.write_all(&[0, 0]).await.unwrap();
    drop(client);

    let result = read_frame(&mut server, MAX_MESSAGE_SIZE).await;
    assert!(matches!(result, Err(ProtocolError::TruncatedFrame)));
}

#[tokio::test]
async fn test_oversized_frame_is_rejected() {
    let (mut client, mut server) = tokio::io::duplex(64);
    client.write_all(&1024u32.to_be_bytes()).await.unwrap();

    let result = read_frame(&mut server, 16).await;
    match result {
        Err(ProtocolError::MessageTooLarge { size, max }) => {
            assert_eq!(size, 1024);
            assert_eq!(max, 16);
        }
        other => panic!("Expected MessageTooLarge, got {:?}", other),
    }
}

#[tokio::test]
async fn test_write_frame_then_read_frame() {
    let (mut client, mut server) = tokio::io::duplex(1024);

    write_frame(&mut client, b"[A]: hi").await.unwrap();
    write_frame(&mut client, b"").await.unwrap();

    let chat = read_frame(&mut server, MAX_MESSAGE_SIZE).await.unwrap();
    let empty = read_frame(&mut server, MAX_MESSAGE_SIZE).await.unwrap();

    assert_eq!(chat.as_deref(), Some(&b"[A]: hi"[..]));
    assert_eq!(empty.as_deref(), Some(&b""[..]));
}
