use std::error::Error;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use buildcast::fabric::{LogFabric, observer};
use buildcast::types::{LogStream, Slug};
use buildcast_test_utils::harness::{TEST_GRACE, start_fabric};
use buildcast_test_utils::{TEST_TIMEOUT, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

async fn wait_for_observers(fabric: &LogFabric, slug: &Slug, n: usize) {
    while fabric.registry().connection_count(slug) != n {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn tcp_observer_receives_its_slug_lines() -> TestResult {
    init_tracing();
    let mut fabric = start_fabric();
    let addr = fabric.listen("127.0.0.1:0").await?;
    let slug = Slug::parse("tcp-app")?;
    let other = Slug::parse("other")?;

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"tcp-app\n").await?;
    with_timeout(wait_for_observers(&fabric, &slug, 1)).await;

    let publisher = fabric.publisher().clone();
    publisher.publish(&slug, LogStream::Stdout, "compiling");
    publisher.publish(&other, LogStream::Stdout, "not for you");
    publisher.publish(&slug, LogStream::Stderr, "warning: multi\nline");
    publisher.system(&slug, "done");

    let mut lines = BufReader::new(stream).lines();
    let mut got = Vec::new();
    for _ in 0..3 {
        got.push(with_timeout(lines.next_line()).await?.ok_or("connection closed")?);
    }
    assert_eq!(got, vec!["compiling", "warning: multi line", "done"]);

    fabric.shutdown(TEST_GRACE).await;
    // Shutdown closes the observer connection.
    assert_eq!(with_timeout(lines.next_line()).await?, None);
    Ok(())
}

#[tokio::test]
async fn disconnecting_observer_leaves_the_registry() -> TestResult {
    init_tracing();
    let mut fabric = start_fabric();
    let addr = fabric.listen("127.0.0.1:0").await?;
    let slug = Slug::parse("leaver")?;

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"leaver\n").await?;
    with_timeout(wait_for_observers(&fabric, &slug, 1)).await;

    drop(stream);
    with_timeout(wait_for_observers(&fabric, &slug, 0)).await;
    assert!(!fabric.registry().is_registered(&slug));

    fabric.shutdown(TEST_GRACE).await;
    Ok(())
}

#[tokio::test]
async fn invalid_slug_is_rejected() -> TestResult {
    init_tracing();
    let mut fabric = start_fabric();
    let addr = fabric.listen("127.0.0.1:0").await?;

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"logs:evil/slug\n").await?;
    let mut lines = BufReader::new(stream).lines();
    let reply = with_timeout(lines.next_line()).await?;
    assert_eq!(reply.as_deref(), Some("error: invalid slug"));
    assert_eq!(with_timeout(lines.next_line()).await?, None);
    assert_eq!(fabric.registry().slug_count(), 0);

    fabric.shutdown(TEST_GRACE).await;
    Ok(())
}

#[tokio::test]
async fn watch_client_streams_until_shutdown() -> TestResult {
    init_tracing();
    let mut fabric = start_fabric();
    let addr = fabric.listen("127.0.0.1:0").await?.to_string();
    let slug = Slug::parse("watched")?;

    let client_slug = slug.clone();
    let client = tokio::spawn(async move {
        let mut seen = Vec::new();
        observer::watch(&addr, &client_slug, |line| seen.push(line.to_string())).await?;
        Ok::<_, anyhow::Error>(seen)
    });

    with_timeout(wait_for_observers(&fabric, &slug, 1)).await;
    fabric.publisher().system(&slug, "Starting build process...");
    fabric.publisher().system(&slug, "Deployment finished successfully");
    fabric.shutdown(TEST_GRACE).await;

    let seen = with_timeout(client).await??;
    assert_eq!(seen, vec!["Starting build process...", "Deployment finished successfully"]);
    Ok(())
}

#[tokio::test]
async fn non_utf8_handshake_gets_the_invalid_slug_reply() -> TestResult {
    init_tracing();
    let mut fabric = start_fabric();
    let addr = fabric.listen("127.0.0.1:0").await?;

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"\xff\xfebuild\n").await?;
    let mut lines = BufReader::new(stream).lines();
    let reply = with_timeout(lines.next_line()).await?;
    assert_eq!(reply.as_deref(), Some("error: invalid slug"));
    assert_eq!(with_timeout(lines.next_line()).await?, None);
    assert_eq!(fabric.registry().slug_count(), 0);

    fabric.shutdown(TEST_GRACE).await;
    Ok(())
}

#[tokio::test]
async fn client_chatter_after_the_handshake_is_discarded() -> TestResult {
    init_tracing();
    let mut fabric = start_fabric();
    let addr = fabric.listen("127.0.0.1:0").await?;
    let slug = Slug::parse("chatty")?;

    let stream = TcpStream::connect(addr).await?;
    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(b"chatty\n").await?;
    with_timeout(wait_for_observers(&fabric, &slug, 1)).await;

    // A megabyte with no line break in it.
    let noise = vec![b'x'; 1024 * 1024];
    with_timeout(write_half.write_all(&noise)).await?;

    fabric.publisher().system(&slug, "still here");
    let mut lines = BufReader::new(read_half).lines();
    assert_eq!(with_timeout(lines.next_line()).await?.as_deref(), Some("still here"));
    assert_eq!(fabric.registry().connection_count(&slug), 1);

    fabric.shutdown(TEST_GRACE).await;
    assert_eq!(with_timeout(lines.next_line()).await?, None);
    Ok(())
}

#[test]
fn queued_lines_are_written_before_shutdown_returns() -> TestResult {
    use std::io::{BufRead, Write};

    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    let slug = Slug::parse("burst")?;

    let (fabric, addr) = runtime.block_on(async {
        let mut fabric = start_fabric();
        let addr = fabric.listen("127.0.0.1:0").await?;
        Ok::<_, anyhow::Error>((fabric, addr))
    })?;

    let mut stream = std::net::TcpStream::connect(addr)?;
    stream.write_all(b"burst\n")?;
    stream.set_read_timeout(Some(TEST_TIMEOUT))?;

    runtime.block_on(async {
        with_timeout(wait_for_observers(&fabric, &slug, 1)).await;
        let publisher = fabric.publisher().clone();
        for i in 0..500 {
            publisher.publish(&slug, LogStream::Stdout, format!("line-{i}"));
        }
        publisher.system(&slug, "Deployment finished successfully");
        fabric.shutdown(TEST_GRACE).await;
    });
    // Nothing may still be pending on a worker once the runtime is gone.
    drop(runtime);

    let lines: Vec<String> = std::io::BufReader::new(stream)
        .lines()
        .collect::<Result<_, _>>()?;
    let mut want: Vec<String> = (0..500).map(|i| format!("line-{i}")).collect();
    want.push("Deployment finished successfully".to_string());
    assert_eq!(lines, want);
    Ok(())
}
