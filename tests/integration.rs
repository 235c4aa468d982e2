//! Integration tests for the push engine

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use futures::StreamExt;
use pushweld::cursors::{LimitWhileTime, OnEmpty};
use pushweld::prelude::*;

fn sorted(mut items: Vec<i64>) -> Vec<i64> {
    items.sort();
    items
}

fn counts(items: &[i64]) -> HashMap<i64, usize> {
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(*item).or_insert(0) += 1;
    }
    counts
}

#[test]
fn test_range_request_yields_min_of_demand_and_remaining() {
    for n in 1..12 {
        let sink = CollectSink::new();
        let subscription = range(100, 110).subscribe(Box::new(sink.clone()));
        subscription.request(n);

        let expected: Vec<i64> = (100..100 + n.min(10)).collect();
        assert_eq!(sink.items(), expected);
        if n < 10 {
            assert_eq!(sink.completions(), 0, "spurious completion for n={}", n);
            assert!(subscription.is_open());
        } else {
            assert_eq!(sink.completions(), 1);
        }
    }
}

#[test]
fn test_invalid_demand_reports_once_per_call() {
    let sink = CollectSink::new();
    let subscription = range(0, 5).subscribe(Box::new(sink.clone()));
    subscription.request(2);
    subscription.request(0);
    subscription.request(-7);

    assert_eq!(subscription.requested(), 0);
    let errors = sink.errors();
    assert_eq!(errors.len(), 2);
    assert!(matches!(errors[0], Error::InvalidDemand { requested: 0 }));
    assert!(matches!(errors[1], Error::InvalidDemand { requested: -7 }));

    subscription.request(3);
    assert_eq!(sink.items(), vec![0, 1, 2, 3, 4]);
    assert_eq!(sink.completions(), 1);
}

#[test]
fn test_terminated_subscription_is_inert() {
    let sink = CollectSink::new();
    let subscription = range(0, 2).subscribe(Box::new(sink.clone()));
    subscription.request(5);
    subscription.request(5);
    subscription.request(0);
    subscription.cancel();
    assert_eq!(sink.items(), vec![0, 1]);
    assert_eq!(sink.completions(), 1);
    assert!(sink.errors().is_empty());
}

#[test]
fn test_cancel_during_bulk_pull_stops_emission() {
    let slot: Arc<OnceLock<Subscription>> = Arc::default();
    let sink = CollectSink::new();
    let subscription = {
        let slot = slot.clone();
        let sink = sink.clone();
        range(0, 1_000_000).subscribe_with(
            move |v| {
                sink.push(v);
                if v == 41 {
                    if let Some(subscription) = slot.get() {
                        subscription.cancel();
                    }
                }
            },
            |_| {},
            || {},
        )
    };
    let _ = slot.set(subscription.clone());
    subscription.request(UNBOUNDED);

    assert_eq!(sink.items(), (0..42).collect::<Vec<_>>());
    assert!(!subscription.is_open());
}

#[test]
fn test_concurrent_requests_never_overlap_callbacks() {
    let sink = CollectSink::new();
    let subscription = range(0, 20_000).subscribe(Box::new(sink.clone()));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let subscription = subscription.clone();
            thread::spawn(move || {
                for _ in 0..5_000 {
                    subscription.request(1);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(sink.wait(Duration::from_secs(5)));
    assert_eq!(sink.items(), (0..20_000).collect::<Vec<_>>());
    assert_eq!(sink.completions(), 1);
    assert_eq!(sink.max_concurrent_calls(), 1);
}

#[test]
fn test_flatten_single_element_children() {
    let sink = CollectSink::new();
    let subscription = of(vec![1i64, 2, 3])
        .flat_map(|i| of(vec![i]))
        .subscribe(Box::new(sink.clone()));
    subscription.request(UNBOUNDED);

    let mut items = sink.items();
    items.sort();
    assert_eq!(items, vec![1, 2, 3]);
    assert_eq!(sink.completions(), 1);
}

#[test]
fn test_flatten_background_children() {
    for _ in 0..50 {
        let sink = CollectSink::new();
        of(vec![0, 1, 2])
            .flat_map(|_| {
                let (handle, operator) = push_queue::<i64>();
                thread::spawn(move || {
                    handle.push(1);
                    handle.push(2);
                    handle.complete();
                });
                operator
            })
            .subscribe_all(Box::new(sink.clone()));

        assert!(sink.wait(Duration::from_secs(5)));
        let items = sink.items();
        assert_eq!(items.len(), 6);
        let counts = counts(&items);
        assert_eq!(counts[&1], 3);
        assert_eq!(counts[&2], 3);
        assert_eq!(sink.completions(), 1);
        assert_eq!(sink.max_concurrent_calls(), 1);
    }
}

#[test]
fn test_flatten_background_children_under_demand() {
    let sink = CollectSink::new();
    let subscription = of(vec![0, 1, 2])
        .flat_map(|_| {
            let (handle, operator) = push_queue::<i64>();
            thread::spawn(move || {
                handle.push(1);
                handle.push(2);
                handle.complete();
            });
            operator
        })
        .subscribe(Box::new(sink.clone()));

    let requester = {
        let subscription = subscription.clone();
        thread::spawn(move || {
            for _ in 0..6 {
                subscription.request(1);
                thread::sleep(Duration::from_millis(2));
            }
        })
    };
    requester.join().unwrap();

    assert!(sink.wait(Duration::from_secs(5)));
    assert_eq!(sink.items().len(), 6);
    assert_eq!(sink.completions(), 1);
}

#[test]
fn test_flatten_outer_fed_from_background_thread() {
    let (outer, operator) = push_queue::<i64>();
    let sink = CollectSink::new();
    let subscription = operator
        .flat_map(|i| of(vec![i * 10, i * 10 + 1]))
        .subscribe(Box::new(sink.clone()));
    subscription.request(5);

    let producer = thread::spawn(move || {
        for i in 0..3 {
            outer.push(i);
        }
        outer.complete();
    });
    producer.join().unwrap();

    assert_eq!(sink.items().len(), 5);
    assert_eq!(subscription.requested(), 0);
    assert_eq!(sink.completions(), 0);

    subscription.request(1);
    assert_eq!(sorted(sink.items()), vec![0, 1, 10, 11, 20, 21]);
    assert_eq!(sink.completions(), 1);
}

#[test]
fn test_flatten_fail_fast() {
    let handles: Arc<parking_lot::Mutex<Vec<PushHandle<i64>>>> = Arc::default();
    let sink = CollectSink::new();
    {
        let handles = handles.clone();
        range(0, 4)
            .flat_map(move |i| {
                let (handle, operator) = push_queue();
                if i == 2 {
                    handle.error(Error::custom("child 2 failed"));
                } else {
                    handles.lock().push(handle);
                }
                operator
            })
            .subscribe_all(Box::new(sink.clone()));
    }

    assert!(sink.wait(Duration::from_secs(1)));
    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "child 2 failed");
    assert_eq!(sink.completions(), 0);

    let handles = handles.lock();
    assert_eq!(handles.len(), 2);
    assert!(handles.iter().all(PushHandle::is_cancelled));
}

#[test]
fn test_cursor_wrappers_compose_under_operators() {
    let fallback = from_cursor(OnEmpty::new(VecCursor::<i64>::new(vec![]), -1));
    assert_eq!(fallback.to_vec().unwrap(), vec![-1]);

    let forwarded = from_cursor(VecCursor::new(vec![3, 4]).on_empty(0));
    assert_eq!(forwarded.to_vec().unwrap(), vec![3, 4]);

    let reversed = from_cursor(RangeCursor::new(0, 4).reversed());
    assert_eq!(reversed.to_vec().unwrap(), vec![3, 2, 1, 0]);
}

#[test]
fn test_time_limited_cursor_is_bounded_by_time() {
    let ticking = IterCursor::new((0i64..).map(|v| {
        thread::sleep(Duration::from_millis(1));
        v
    }));
    let limited: LimitWhileTime<_> = ticking.limit_while_time(Duration::from_millis(50));
    let items = from_cursor(limited).to_vec().unwrap();
    assert!(!items.is_empty());
    assert!(items.len() <= 60, "emitted {} items", items.len());
}

#[test]
fn test_copyable_cursor_forks_are_independent() {
    let mut original = VecCursor::new(vec!['a', 'b', 'c', 'd']);
    original.try_advance(&mut |_| {});
    let fork = original.copy();
    original.try_advance(&mut |_| {});

    assert_eq!(fork.into_iterator().collect::<String>(), "bcd");
    assert_eq!(original.into_iterator().collect::<String>(), "cd");
}

#[test]
fn test_producer_publisher_on_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let operator = bridge(ProducerPublisher::new(runtime.handle().clone(), || {
        StreamProducer::new(futures::stream::iter(0i64..20).boxed())
    }));

    let sink = CollectSink::new();
    let subscription = operator.subscribe(Box::new(sink.clone()));
    subscription.request(5);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(sink.items(), (0..5).collect::<Vec<_>>());

    subscription.request(UNBOUNDED);
    assert!(sink.wait(Duration::from_secs(5)));
    assert_eq!(sink.items(), (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_collect_async() -> Result<()> {
    let items = range(0, 5).map(|x| x * x).collect_async().await??;
    assert_eq!(items, vec![0, 1, 4, 9, 16]);
    Ok(())
}

#[tokio::test]
async fn test_collect_async_from_stream_producer() -> Result<()> {
    let operator = bridge(ProducerPublisher::new(
        tokio::runtime::Handle::current(),
        || StreamProducer::new(tokio_stream::iter(vec![1, 2, 3])),
    ));
    let items = operator.collect_async().await??;
    assert_eq!(items, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_generate_and_filter() {
    let operator = generate(|| {
        let mut next = 0u32;
        move || {
            next += 1;
            Ok((next <= 10).then_some(next))
        }
    })
    .filter(|x| x % 2 == 1);
    assert_eq!(operator.to_vec().unwrap(), vec![1, 3, 5, 7, 9]);
}

#[test]
fn test_boxed_operators_are_interchangeable() {
    let operators: Vec<BoxOperator<i64>> = vec![
        range(0, 2).boxed(),
        of(vec![7]).boxed(),
        empty().boxed(),
        from_iter(vec![5, 6]).boxed(),
    ];
    let collected: Vec<Vec<i64>> = operators
        .iter()
        .map(|operator| operator.to_vec().unwrap())
        .collect();
    assert_eq!(collected, vec![vec![0, 1], vec![7], vec![], vec![5, 6]]);
}
