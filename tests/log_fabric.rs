use std::error::Error;
use std::sync::Arc;

use buildcast::fabric::{ObserverConnection, SubscriptionRegistry, Transport};
use buildcast::types::{LogRecord, LogStream, Slug};
use buildcast_test_utils::fakes::FlakyTransport;
use buildcast_test_utils::harness::{Capture, TEST_GRACE, start_fabric, start_fabric_with, texts};
use buildcast_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn slug(s: &str) -> Slug {
    Slug::parse(s).unwrap()
}

fn record(slug: &Slug, text: &str) -> LogRecord {
    LogRecord {
        slug: slug.clone(),
        stream: LogStream::Stdout,
        text: text.to_string(),
        sequence: 0,
    }
}

#[tokio::test]
async fn observers_only_see_their_own_slug_in_order() -> TestResult {
    init_tracing();
    let fabric = start_fabric();
    let (a, b) = (slug("alpha"), slug("beta"));
    let cap_a = Capture::attach(fabric.registry(), &a);
    let cap_b = Capture::attach(fabric.registry(), &b);

    let publisher = fabric.publisher().clone();
    for i in 0..50 {
        publisher.publish(&a, LogStream::Stdout, format!("a-{i}"));
        publisher.publish(&b, LogStream::Stderr, format!("b-{i}"));
    }
    fabric.shutdown(TEST_GRACE).await;

    let got_a = with_timeout(cap_a.drain()).await;
    let got_b = with_timeout(cap_b.drain()).await;

    assert!(got_a.iter().all(|r| r.slug == a));
    assert!(got_b.iter().all(|r| r.slug == b));
    let want_a: Vec<String> = (0..50).map(|i| format!("a-{i}")).collect();
    let want_b: Vec<String> = (0..50).map(|i| format!("b-{i}")).collect();
    assert_eq!(texts(&got_a, LogStream::Stdout), want_a);
    assert_eq!(texts(&got_b, LogStream::Stderr), want_b);
    Ok(())
}

#[tokio::test]
async fn every_observer_of_a_slug_gets_every_line() -> TestResult {
    init_tracing();
    let fabric = start_fabric();
    let s = slug("shared");
    let first = Capture::attach(fabric.registry(), &s);
    let second = Capture::attach(fabric.registry(), &s);
    assert_eq!(fabric.registry().connection_count(&s), 2);

    fabric.publisher().system(&s, "one");
    fabric.publisher().system(&s, "two");
    fabric.shutdown(TEST_GRACE).await;

    let a = with_timeout(first.drain()).await;
    let b = with_timeout(second.drain()).await;
    assert_eq!(texts(&a, LogStream::System), vec!["one", "two"]);
    assert_eq!(a, b);
    Ok(())
}

#[tokio::test]
async fn late_observers_get_no_replay() -> TestResult {
    init_tracing();
    let fabric = start_fabric();
    let s = slug("late");
    let mut early = Capture::attach(fabric.registry(), &s);

    fabric.publisher().system(&s, "before");
    // Once the early observer has it, the line has passed the registry.
    let first = with_timeout(early.next()).await.ok_or("no line")?;
    assert_eq!(first.text, "before");

    let late = Capture::attach(fabric.registry(), &s);
    fabric.publisher().system(&s, "after");
    fabric.shutdown(TEST_GRACE).await;

    assert_eq!(texts(&with_timeout(late.drain()).await, LogStream::System), vec!["after"]);
    assert_eq!(texts(&with_timeout(early.drain()).await, LogStream::System), vec!["after"]);
    Ok(())
}

#[tokio::test]
async fn lines_without_observers_are_discarded() -> TestResult {
    init_tracing();
    let fabric = start_fabric();
    let s = slug("nobody");
    fabric.publisher().system(&s, "into the void");
    assert!(!fabric.registry().is_registered(&s));
    fabric.shutdown(TEST_GRACE).await;
    Ok(())
}

#[test]
fn rejoin_after_last_leave_starts_a_fresh_entry() {
    init_tracing();
    let registry = SubscriptionRegistry::new();
    let s = slug("cycle");

    let (conn, _rx) = ObserverConnection::channel(s.clone(), 4);
    let id = registry.join(conn);
    assert!(registry.leave(&s, id));
    assert!(!registry.is_registered(&s));
    assert_eq!(registry.slug_count(), 0);

    let (conn, mut rx) = ObserverConnection::channel(s.clone(), 4);
    let id = registry.join(conn);
    assert_eq!(registry.connection_count(&s), 1);

    let stats = registry.fanout(&s, &record(&s, "fresh"));
    assert_eq!(stats.delivered, 1);
    assert_eq!(rx.try_recv().map(|r| r.text).ok().as_deref(), Some("fresh"));

    // Leaving twice is harmless.
    assert!(registry.leave(&s, id));
    assert!(!registry.leave(&s, id));
    assert_eq!(registry.slug_count(), 0);
}

#[test]
fn dropped_observers_are_pruned_without_affecting_others() {
    init_tracing();
    let registry = SubscriptionRegistry::new();
    let s = slug("mixed");
    let (gone, gone_rx) = ObserverConnection::channel(s.clone(), 4);
    let (live, mut live_rx) = ObserverConnection::channel(s.clone(), 4);
    registry.join(gone);
    registry.join(live);
    drop(gone_rx);

    let stats = registry.fanout(&s, &record(&s, "x"));
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.pruned, 1);
    assert_eq!(registry.connection_count(&s), 1);
    assert_eq!(live_rx.try_recv().map(|r| r.text).ok().as_deref(), Some("x"));
}

#[tokio::test]
async fn transport_outage_drops_lines_but_keeps_publishing() -> TestResult {
    init_tracing();
    let transport = Arc::new(FlakyTransport::new(1024));
    let fabric = start_fabric_with(Arc::clone(&transport) as Arc<dyn Transport>);
    let s = slug("flaky");
    let mut capture = Capture::attach(fabric.registry(), &s);
    let publisher = fabric.publisher().clone();

    publisher.system(&s, "before");
    assert_eq!(with_timeout(capture.next()).await.ok_or("no line")?.text, "before");

    transport.set_broken(true);
    publisher.system(&s, "lost");
    publisher.system(&s, "lost-too");
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    transport.set_broken(false);

    publisher.system(&s, "after");
    fabric.shutdown(TEST_GRACE).await;

    let rest = with_timeout(capture.drain()).await;
    assert_eq!(texts(&rest, LogStream::System), vec!["after"]);
    // Sequence numbers keep counting through the outage.
    assert_eq!(rest[0].sequence, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_join_and_leave_never_miss_a_later_fanout() -> TestResult {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use tokio::sync::mpsc::error::TryRecvError;

    init_tracing();
    let registry = Arc::new(SubscriptionRegistry::new());
    let completed = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicBool::new(false));
    let s = slug("churn");

    let fanout = {
        let (registry, completed, stop, s) =
            (Arc::clone(&registry), Arc::clone(&completed), Arc::clone(&stop), s.clone());
        tokio::spawn(async move {
            let mut seq = 0u64;
            while !stop.load(Ordering::SeqCst) {
                let mut line = record(&s, "tick");
                line.sequence = seq;
                registry.fanout(&s, &line);
                seq += 1;
                completed.store(seq, Ordering::SeqCst);
                tokio::task::yield_now().await;
            }
        })
    };

    let mut workers = Vec::new();
    for _ in 0..8 {
        let (registry, completed, s) = (Arc::clone(&registry), Arc::clone(&completed), s.clone());
        workers.push(tokio::spawn(async move {
            for _ in 0..20 {
                let (conn, mut rx) = ObserverConnection::channel(s.clone(), 4096);
                let id = registry.join(conn);
                // Fanout `joined` may have locked the registry before us; every
                // later one starts after the join returned.
                let joined = completed.load(Ordering::SeqCst);
                while completed.load(Ordering::SeqCst) < joined + 3 {
                    tokio::task::yield_now().await;
                }
                assert!(registry.leave(&s, id));

                let mut seen = Vec::new();
                let end = loop {
                    match rx.try_recv() {
                        Ok(line) => seen.push(line.sequence),
                        Err(e) => break e,
                    }
                };
                assert_eq!(end, TryRecvError::Disconnected);
                assert!(seen.windows(2).all(|w| w[0] < w[1]), "out of order: {seen:?}");
                for want in [joined + 1, joined + 2] {
                    assert!(seen.contains(&want), "missed {want}: {seen:?}");
                }
            }
        }));
    }

    for worker in workers {
        with_timeout(worker).await?;
    }
    stop.store(true, Ordering::SeqCst);
    with_timeout(fanout).await?;

    assert_eq!(registry.slug_count(), 0);
    assert!(!registry.is_registered(&s));
    Ok(())
}
