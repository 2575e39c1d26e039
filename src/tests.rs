//! End-to-end properties of the pipeline engine: merging shapes, bounded
//! buffering, worker elasticity, cancellation and error delivery.

use crate::direct::{from_iter, from_kstream, DirectStreamExt};
use crate::error::StreamError;
use crate::kstream::{KStep, KStream};
use crate::merge::{coparallel, interleave, parallel, serial, zip_with};
use crate::svar::{SVar, SVarState, Style};
use crate::unfold::{finally, Unfold};
use futures::StreamExt;
use quickcheck::quickcheck;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn list<T: Send + 'static>(v: Vec<T>) -> KStream<T> {
    KStream::from_iter(v)
}

/// A producer that sleeps before each element.
fn slow_list<T: Send + 'static>(items: Vec<T>, delay: Duration) -> KStream<T> {
    fn go<T: Send + 'static>(mut iter: std::vec::IntoIter<T>, delay: Duration) -> KStream<T> {
        KStream::new(move |_| async move {
            match iter.next() {
                Some(x) => {
                    tokio::time::sleep(delay).await;
                    Ok(KStep::Yield(x, go(iter, delay)))
                }
                None => Ok(KStep::Stop),
            }
        })
    }
    go(items.into_iter(), delay)
}

fn sorted<T: Ord + Clone>(v: &[T]) -> Vec<T> {
    let mut v = v.to_vec();
    v.sort();
    v
}

quickcheck! {
    fn serial_is_concatenation(a: Vec<u32>, b: Vec<u32>) -> bool {
        rt().block_on(async {
            let expected: Vec<_> = a.iter().chain(b.iter()).copied().collect();
            serial(list(a), list(b)).to_vec().await.unwrap() == expected
        })
    }

    fn interleave_shape(a: Vec<u32>, b: Vec<u32>) -> bool {
        rt().block_on(async {
            let mut expected = Vec::new();
            let common = a.len().min(b.len());
            for i in 0..common {
                expected.push(a[i]);
                expected.push(b[i]);
            }
            expected.extend_from_slice(&a[common..]);
            expected.extend_from_slice(&b[common..]);
            interleave(list(a), list(b)).to_vec().await.unwrap() == expected
        })
    }

    fn parallel_delivers_exactly_once(a: Vec<u32>, b: Vec<u32>, c: Vec<u32>) -> bool {
        rt().block_on(async {
            let mut expected: Vec<_> = a.iter().chain(b.iter()).chain(c.iter()).copied().collect();
            expected.sort();
            let out = crate::merge::parallel_all(vec![list(a), list(b), list(c)])
                .to_vec()
                .await
                .unwrap();
            sorted(&out) == expected
        })
    }

    fn coparallel_delivers_exactly_once(a: Vec<u32>, b: Vec<u32>) -> bool {
        rt().block_on(async {
            let mut expected: Vec<_> = a.iter().chain(b.iter()).copied().collect();
            expected.sort();
            let out = coparallel(list(a), list(b)).to_vec().await.unwrap();
            sorted(&out) == expected
        })
    }

    fn zip_length_is_the_minimum(a: Vec<u32>, b: Vec<u32>) -> bool {
        rt().block_on(async {
            let n = a.len().min(b.len());
            zip_with(|x, y| (x, y), list(a), list(b)).to_vec().await.unwrap().len() == n
        })
    }

    fn fusion_bridges_are_identity(xs: Vec<u32>) -> bool {
        rt().block_on(async {
            let via_k = from_iter(xs.clone()).into_kstream().to_vec().await.unwrap();
            let via_d = from_kstream(list(xs.clone())).to_vec().await.unwrap();
            via_k == xs && via_d == xs
        })
    }
}

#[tokio::test]
async fn scenario_serial_concat() {
    let out = serial(list(vec![1, 2, 3]), list(vec![4, 5])).to_vec().await.unwrap();
    assert_eq!(out, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn scenario_interleave_uneven() {
    let out = interleave(list(vec![1, 2]), list(vec![3, 4, 5])).to_vec().await.unwrap();
    assert_eq!(out, vec![1, 3, 2, 4, 5]);
}

#[tokio::test]
async fn scenario_three_producers_tiny_buffer() {
    // three branches of [A, B, C] through a bound of two
    let sv = SVar::new(Style::PARALLEL_FIFO, 2, None);
    for _ in 0..3 {
        sv.push(list(vec!['A', 'B', 'C'])).unwrap();
    }
    sv.seal();
    let mut drain = sv.drain();
    let mut out = Vec::new();
    while let Some(x) = drain.next().await {
        out.push(x.unwrap());
        assert!(sv.buffered() <= 2, "buffer exceeded its bound");
    }
    assert_eq!(out.len(), 9);
    assert!(sv.max_buffered() <= 2);
}

#[tokio::test]
async fn scenario_zip_uneven() {
    let out = zip_with(|a, b| a + b, list(vec![1, 2, 3]), list(vec![10, 20]))
        .to_vec()
        .await
        .unwrap();
    assert_eq!(out, vec![11, 22]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_coparallel_runs_both_branches_concurrently() {
    let started = Instant::now();
    let slow = slow_list(vec![1, 2, 3], Duration::from_millis(30));
    let fast = list(vec![10, 20, 30]);
    let out = coparallel(slow, fast).to_vec().await.unwrap();
    let elapsed = started.elapsed();
    assert_eq!(sorted(&out), vec![1, 2, 3, 10, 20, 30]);
    // the fast branch must not wait for the slow one to finish
    let last_fast = out.iter().rposition(|x| *x >= 10).unwrap();
    let last_slow = out.iter().rposition(|x| *x < 10).unwrap();
    assert!(last_fast < last_slow, "fast branch was serialized: {:?}", out);
    assert!(
        elapsed < Duration::from_millis(250),
        "took {:?}, branches did not overlap",
        elapsed
    );
}

#[tokio::test]
async fn scenario_error_after_five_of_ten() {
    let producer = list((0..5).collect())
        .append(KStream::raise(StreamError::user(anyhow::anyhow!(
            "element five is broken"
        ))))
        .append(list((5..10).collect()));
    let sv = SVar::new(Style::PARALLEL_FIFO, 3, None);
    sv.push(producer).unwrap();
    sv.seal();
    let mut drain = sv.drain();
    let mut values = Vec::new();
    let mut errors = 0;
    while let Some(item) = drain.next().await {
        match item {
            Ok(x) => {
                assert!(x < 5, "value {} leaked past the error", x);
                values.push(x);
            }
            Err(e) => {
                assert!(matches!(e, StreamError::User(_)));
                errors += 1;
            }
        }
    }
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    assert_eq!(errors, 1);
    assert_eq!(sv.state(), SVarState::Closed);
    assert_eq!(sv.active_workers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn demand_driven_stays_single_under_a_slow_consumer() {
    let sv = SVar::new(Style::PARALLEL_LIFO, 4, None);
    sv.push(list((0..12).collect())).unwrap();
    sv.push(list((100..112).collect())).unwrap();
    sv.seal();
    // let the seed worker fill the buffer before the consumer shows up, as
    // a backlogged downstream would
    while sv.buffered() < 4 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let mut drain = sv.drain();
    let mut out = Vec::new();
    let mut max_active = 0;
    while let Some(x) = drain.next().await {
        out.push(x.unwrap());
        max_active = max_active.max(sv.active_workers());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(max_active <= 2, "spawned {} workers for a slow consumer", max_active);
    // left bias: the seeded branch finishes before the parked one starts
    let first_right = out.iter().position(|x| *x >= 100).unwrap();
    let last_left = out.iter().rposition(|x| *x < 100).unwrap();
    assert!(last_left < first_right, "demand-driven merge lost its left bias: {:?}", out);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fair_parallel_rotates_across_branches() {
    let delay = Duration::from_millis(8);
    let branches: Vec<KStream<u32>> = (0..3)
        .map(|b| slow_list((0..12).map(|i| b * 100 + i).collect(), delay))
        .collect();
    let out = crate::merge::parallel_all(branches).to_vec().await.unwrap();
    assert_eq!(out.len(), 36);
    // uniform producers should stay roughly abreast of each other
    let mut per_branch = BTreeMap::new();
    for x in &out[..18] {
        *per_branch.entry(x / 100).or_insert(0u32) += 1;
    }
    for b in 0..3 {
        let n = per_branch.get(&b).copied().unwrap_or(0);
        assert!(n >= 3, "branch {} only produced {} of the first half: {:?}", b, n, out);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_runs_release_hooks_of_all_workers() {
    let released = Arc::new(AtomicUsize::new(0));
    let mk_branch = |offset: u64| {
        let released = released.clone();
        KStream::from_unfold(
            finally(
                move || {
                    released.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                Unfold::enumerate(1u64),
            ),
            offset,
        )
    };
    let sv = SVar::new(Style::PARALLEL_FIFO, 4, None);
    for b in 0..3 {
        sv.push(mk_branch(b * 1000)).unwrap();
    }
    sv.seal();
    // pull until every branch has demonstrably acquired its resource, then
    // walk away mid-stream
    let mut drain = sv.drain();
    let mut seen_branches = std::collections::BTreeSet::new();
    while seen_branches.len() < 3 {
        let x = drain.next().await.unwrap().unwrap();
        seen_branches.insert(x / 1000);
    }
    drop(drain);
    assert_eq!(sv.state(), SVarState::Closed);
    // aborted tasks release on their executor threads shortly after
    tokio::time::timeout(Duration::from_secs(2), async {
        while released.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("release hooks did not all run after cancellation");
    assert_eq!(sv.active_workers(), 0);
    assert_eq!(sv.queued_work(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn randomized_jitter_preserves_exactly_once_delivery() {
    let mut rng = rand::thread_rng();
    let mut expected = Vec::new();
    let mut branches = Vec::new();
    for b in 0..4u32 {
        let len = rng.gen_range(0..20u32);
        let items: Vec<u32> = (0..len).map(|i| b * 1000 + i).collect();
        expected.extend(items.iter().copied());
        let delay = Duration::from_millis(rng.gen_range(0..3));
        branches.push(slow_list(items, delay));
    }
    expected.sort();
    let out = crate::merge::parallel_all(branches).to_vec().await.unwrap();
    assert_eq!(sorted(&out), expected);
}

#[tokio::test]
async fn no_leaks_after_normal_completion() {
    let out = parallel(list((0..200).collect()), list((200..400).collect()))
        .to_vec()
        .await
        .unwrap();
    assert_eq!(out.len(), 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_producer_does_not_wedge_the_consumer() {
    let bad: KStream<u32> = KStream::new(|_| async { panic!("worker went off the rails") });
    let sv = SVar::new(Style::PARALLEL_FIFO, 8, None);
    sv.push(list((0..5).collect())).unwrap();
    sv.push(bad).unwrap();
    sv.seal();
    let out: Vec<_> = tokio::time::timeout(Duration::from_secs(2), async {
        sv.drain().map(|x| x.unwrap()).collect::<Vec<_>>().await
    })
    .await
    .expect("consumer hung after a producer panic");
    assert_eq!(sorted(&out), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn interleave_copes_with_an_infinite_branch() {
    let out = interleave(KStream::from_iter(0u64..), list(vec![100, 101]))
        .take(6)
        .to_vec()
        .await
        .unwrap();
    assert_eq!(out, vec![0, 100, 1, 101, 2, 3]);
}

#[tokio::test]
async fn bind_laws_hold_for_both_serial_disciplines() {
    let serial_out = crate::style::Serial::from_iter(vec![1, 2])
        .bind(|x| list(vec![10, 20]).map(move |y| x + y))
        .to_vec()
        .await
        .unwrap();
    assert_eq!(serial_out, vec![11, 21, 12, 22]);
    let inter_out = crate::style::Interleave::from_iter(vec![1, 2])
        .bind(|x| list(vec![10, 20]).map(move |y| x + y))
        .to_vec()
        .await
        .unwrap();
    assert_eq!(inter_out, vec![11, 12, 21, 22]);
}
