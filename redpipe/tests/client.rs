//! Integration tests against a scripted in-process server.
//!
//! Each test binds a listener on `127.0.0.1:0` and spawns a task that plays
//! the server side of the exchange, so the suite runs without a live Redis.

use std::time::{Duration, Instant};

use redpipe::{Client, Command, Config, Error, Reply};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ── Helpers ─────────────────────────────────────────────────────────────

async fn listen() -> (TcpListener, Config) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, Config::new("127.0.0.1", port))
}

fn crlf_count(buf: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i..i + 2] == b"\r\n"[..] {
            count += 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    count
}

/// Read from the stream until `lines` CRLF-terminated rows have arrived.
async fn read_rows(stream: &mut TcpStream, lines: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while crlf_count(&buf) < lines {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    buf
}

// ── Synchronous mode ────────────────────────────────────────────────────

#[tokio::test]
async fn ping_gets_status_reply() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let rows = read_rows(&mut stream, 1).await;
        assert_eq!(rows, b"ping\r\n");
        stream.write_all(b"+PONG\r\n").await.unwrap();
        read_rows(&mut stream, 1).await;
        stream.write_all(b"+OK\r\n").await.unwrap();
    });

    let client = Client::connect(config).await.unwrap();
    let pong = client.send(Command::new("ping")).await.unwrap();
    assert_eq!(pong, Reply::status(b"PONG"));

    let ok = client.send(Command::new("ping")).await.unwrap();
    assert!(ok.is_ok());
}

#[tokio::test]
async fn get_missing_key_is_nil() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_rows(&mut stream, 1).await;
        stream.write_all(b"$-1\r\n").await.unwrap();
    });

    let client = Client::connect(config).await.unwrap();
    let reply = client
        .send(Command::inline("get", &[b"missing"]))
        .await
        .unwrap();
    assert_eq!(reply, Reply::Nil);
}

#[tokio::test]
async fn mget_multi_bulk_survives_arbitrary_read_splits() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_rows(&mut stream, 1).await;
        // Dribble the reply across several writes, split mid-header and
        // mid-body.
        for piece in [
            &b"*3\r\n$"[..],
            &b"1\r\nA\r"[..],
            &b"\n$-1\r\n$1"[..],
            &b"\r\nC\r\n"[..],
        ] {
            stream.write_all(piece).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let client = Client::connect(config).await.unwrap();
    let reply = client
        .send(Command::inline("mget", &[b"a", b"b", b"c"]))
        .await
        .unwrap();
    assert_eq!(
        reply,
        Reply::multi(vec![Reply::bulk(b"A"), Reply::Nil, Reply::bulk(b"C")])
    );
}

#[tokio::test]
async fn empty_bulk_is_an_empty_value() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_rows(&mut stream, 1).await;
        stream.write_all(b"$0\r\n\r\n").await.unwrap();
    });

    let client = Client::connect(config).await.unwrap();
    let reply = client.send(Command::inline("get", &[b"empty"])).await.unwrap();
    assert_eq!(reply, Reply::bulk(b""));
}

#[tokio::test]
async fn server_error_reply_is_data_not_failure() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_rows(&mut stream, 1).await;
        stream.write_all(b"-ERR unknown key type\r\n").await.unwrap();
    });

    let client = Client::connect(config).await.unwrap();
    let reply = client.send(Command::inline("incr", &[b"h"])).await.unwrap();
    assert_eq!(reply, Reply::error(b"ERR unknown key type"));
}

#[tokio::test]
async fn replies_match_submission_order() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        for i in 1..=5 {
            read_rows(&mut stream, 1).await;
            stream
                .write_all(Reply::integer(i).to_wire().as_slice())
                .await
                .unwrap();
        }
    });

    let client = Client::connect(config).await.unwrap();
    for i in 1..=5 {
        let reply = client
            .send(Command::inline("incr", &[b"counter"]))
            .await
            .unwrap();
        assert_eq!(reply, Reply::integer(i));
    }
}

#[tokio::test]
async fn set_payload_reads_back_identically() {
    let payload = b"binary\r\npayload";
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // `set k 15\r\nbinary\r\npayload\r\n` carries three CRLFs: the
        // length row, the one embedded in the payload, the terminator.
        let rows = read_rows(&mut stream, 3).await;
        assert_eq!(rows, b"set k 15\r\nbinary\r\npayload\r\n");
        stream.write_all(b"+OK\r\n").await.unwrap();

        read_rows(&mut stream, 1).await;
        stream
            .write_all(Reply::bulk(b"binary\r\npayload").to_wire().as_slice())
            .await
            .unwrap();
    });

    let client = Client::connect(config).await.unwrap();
    let set = client
        .send(Command::with_payload("set", "k", payload))
        .await
        .unwrap();
    assert!(set.is_ok());

    let value = client.send(Command::inline("get", &[b"k"])).await.unwrap();
    assert_eq!(value, Reply::bulk(payload));
}

// ── Pipelined mode ──────────────────────────────────────────────────────

#[tokio::test]
async fn pipelined_replies_collect_in_order() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_rows(&mut stream, 3).await;
        // Interleave the replies across writes.
        stream.write_all(b":1\r\n:2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        stream.write_all(b"\r\n:3\r\n").await.unwrap();
    });

    let client = Client::connect(config).await.unwrap();
    client.set_pipelining(true).await.unwrap();
    for _ in 0..3 {
        client
            .send_async(Command::inline("incr", &[b"k"]))
            .await
            .unwrap();
    }
    let replies = client.collect().await.unwrap();
    assert_eq!(
        replies,
        vec![Reply::integer(1), Reply::integer(2), Reply::integer(3)]
    );

    // The buffer was drained.
    let empty = client.collect().await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn collect_before_replies_arrive_waits_for_all() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_rows(&mut stream, 2).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        stream.write_all(b":1\r\n:2\r\n").await.unwrap();
    });

    let client = Client::connect(config).await.unwrap();
    client.set_pipelining(true).await.unwrap();
    client
        .send_async(Command::inline("incr", &[b"k"]))
        .await
        .unwrap();
    client
        .send_async(Command::inline("incr", &[b"k"]))
        .await
        .unwrap();

    // Nothing has arrived yet: this lands before the server replies and
    // must still deliver both.
    let replies = client.collect().await.unwrap();
    assert_eq!(replies, vec![Reply::integer(1), Reply::integer(2)]);
}

#[tokio::test]
async fn pipelined_send_acks_without_waiting() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_rows(&mut stream, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        stream.write_all(b":7\r\n").await.unwrap();
    });

    let client = Client::connect(config).await.unwrap();
    client.set_pipelining(true).await.unwrap();

    let started = Instant::now();
    let ack = client.send(Command::inline("incr", &[b"k"])).await.unwrap();
    assert!(ack.is_ok());
    assert!(started.elapsed() < Duration::from_millis(100));

    let replies = client.collect().await.unwrap();
    assert_eq!(replies, vec![Reply::integer(7)]);
}

// ── Timeouts ────────────────────────────────────────────────────────────

#[tokio::test]
async fn timed_out_caller_keeps_its_slot() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_rows(&mut stream, 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        stream.write_all(b":1\r\n:2\r\n").await.unwrap();
    });

    let client = Client::connect(config).await.unwrap();

    // First caller gives up before any reply exists.
    let timed_out = client
        .send_timeout(
            Command::inline("incr", &[b"a"]),
            Some(Duration::from_millis(10)),
        )
        .await;
    assert!(matches!(timed_out, Err(Error::Timeout)));

    // Its slot still consumes the first reply, so the second caller
    // receives the second one.
    let reply = client.send(Command::inline("incr", &[b"b"])).await.unwrap();
    assert_eq!(reply, Reply::integer(2));
}

#[tokio::test]
async fn blocking_pop_timeout_returns_nil() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let rows = read_rows(&mut stream, 1).await;
        // The server timeout travels as the last inline argument.
        assert_eq!(rows, b"blpop q 0.2\r\n");
        tokio::time::sleep(Duration::from_millis(50)).await;
        stream.write_all(b"$-1\r\n").await.unwrap();
    });

    let client = Client::connect(config).await.unwrap();
    let reply = client
        .send_blocking(Command::inline("blpop", &[b"q"]), 0.2)
        .await
        .unwrap();
    assert_eq!(reply, Reply::Nil);
}

// ── Lifecycle ───────────────────────────────────────────────────────────

#[tokio::test]
async fn disconnect_fails_every_pending_call() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Read the commands but never reply.
        read_rows(&mut stream, 2).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = Client::connect(config).await.unwrap();
    let c1 = client.clone();
    let first = tokio::spawn(async move {
        c1.send_timeout(Command::inline("get", &[b"a"]), None).await
    });
    let c2 = client.clone();
    let second = tokio::spawn(async move {
        c2.send_timeout(Command::inline("get", &[b"b"]), None).await
    });

    // Let both commands reach the wire before pulling the plug.
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.disconnect().await.unwrap();

    assert!(matches!(first.await.unwrap(), Err(Error::Closed)));
    assert!(matches!(second.await.unwrap(), Err(Error::Closed)));
}

#[tokio::test]
async fn operations_after_disconnect_fail_closed() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let client = Client::connect(config).await.unwrap();
    client.disconnect().await.unwrap();

    let result = client.send(Command::new("ping")).await;
    assert!(matches!(result, Err(Error::Closed)));
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    // Bind and drop a listener to get a port that refuses connections.
    let (listener, config) = listen().await;
    drop(listener);

    let result = Client::connect(config).await;
    assert!(matches!(result, Err(Error::Socket(_))));
}

#[tokio::test]
async fn reconnect_replays_select() {
    let (listener, mut config) = listen().await;
    config.db = 3;

    tokio::spawn(async move {
        // First connection: SELECT handshake, one command, then the server
        // drops the link.
        let (mut stream, _) = listener.accept().await.unwrap();
        let rows = read_rows(&mut stream, 1).await;
        assert_eq!(rows, b"select 3\r\n");
        stream.write_all(b"+OK\r\n").await.unwrap();
        read_rows(&mut stream, 1).await;
        stream.write_all(b"+PONG\r\n").await.unwrap();
        drop(stream);

        // Second connection: the client must replay SELECT before anything
        // else.
        let (mut stream, _) = listener.accept().await.unwrap();
        let rows = read_rows(&mut stream, 1).await;
        assert_eq!(rows, b"select 3\r\n");
        stream.write_all(b"+OK\r\n").await.unwrap();
        read_rows(&mut stream, 1).await;
        stream.write_all(b"+PONG\r\n").await.unwrap();
    });

    let client = Client::connect(config).await.unwrap();
    let first = client.send(Command::new("ping")).await.unwrap();
    assert_eq!(first, Reply::status(b"PONG"));

    // Give the actor time to observe the close.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = client.send(Command::new("ping")).await.unwrap();
    assert_eq!(second, Reply::status(b"PONG"));
}

#[tokio::test]
async fn info_maps_known_fields() {
    let body = b"redis_version:1.2.6\r\nuptime_in_seconds:120\r\n\
        connected_clients:4\r\nused_memory:4096\r\n\
        total_commands_processed:99\r\nweird_new_field:ignored\r\n";
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_rows(&mut stream, 1).await;
        stream
            .write_all(Reply::bulk(body).to_wire().as_slice())
            .await
            .unwrap();
    });

    let client = Client::connect(config).await.unwrap();
    let info = client.info().await.unwrap();
    assert_eq!(info.version.as_deref(), Some("1.2.6"));
    assert_eq!(info.uptime, Some(120));
    assert_eq!(info.clients, Some(4));
    assert_eq!(info.memory, Some(4096));
    assert_eq!(info.commands, Some(99));
    assert_eq!(info.slaves, None);
}
