//! Interval partitioning for parallel-for style loops over a contiguous
//! index range, plus the scoped-closure driver built on `rayon`.
//!
//! The source engine hands each interval to a raw `std::thread`; here a
//! `rayon::scope` plays the same role without introducing any persistent
//! thread-pool state or interior mutability (§9 design note).

/// Splits `[range_begin, range_end)` into `num_intervals` contiguous
/// sub-ranges whose sizes differ by at most one element, front-loaded:
/// the first `remainder` intervals get one extra element.
pub fn split_into_intervals(range_begin: usize, range_end: usize, num_intervals: usize) -> Vec<usize> {
    assert!(num_intervals > 0);
    let total = range_end - range_begin;
    let interval_size = total / num_intervals;
    let remainder = total - interval_size * num_intervals;

    let mut bounds = Vec::with_capacity(num_intervals + 1);
    bounds.push(range_begin);
    let mut begin = range_begin;
    for i in 0..num_intervals {
        let mut end = begin + interval_size;
        if i < remainder {
            end += 1;
        }
        bounds.push(end);
        begin = end;
    }
    bounds
}

/// Number of worker threads to use for a loop over `work_items` elements:
/// never more than the available hardware parallelism, never more than the
/// work itself (a single-item loop should not spawn a thread).
pub fn thread_count_for(work_items: usize) -> usize {
    let hw = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    hw.min(work_items.max(1))
}

/// Runs `body(start, end)` once per contiguous interval of `[0, len)`,
/// in parallel, and blocks until every interval has completed. `body` must
/// only touch index range `[start, end)` of whatever it closes over, so
/// that concurrent invocations never alias a mutable location.
pub fn for_each_interval<F>(len: usize, body: F)
where
    F: Fn(usize, usize) + Sync,
{
    if len == 0 {
        return;
    }
    let threads = thread_count_for(len);
    let bounds = split_into_intervals(0, len, threads);
    let body_ref = &body;
    rayon::scope(|scope| {
        for w in bounds.windows(2) {
            let (start, end) = (w[0], w[1]);
            if start == end {
                continue;
            }
            scope.spawn(move |_| body_ref(start, end));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_cover_range_exactly_once() {
        let bounds = split_into_intervals(0, 17, 4);
        assert_eq!(bounds.first().copied(), Some(0));
        assert_eq!(bounds.last().copied(), Some(17));
        let sizes: Vec<usize> = bounds.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 17);
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
    }

    #[test]
    fn for_each_interval_visits_every_index_exactly_once() {
        let len = 1000;
        let mut seen = vec![0u32; len];
        let ptr = std::sync::Mutex::new(&mut seen);
        for_each_interval(len, |start, end| {
            let mut guard = ptr.lock().unwrap();
            for i in start..end {
                guard[i] += 1;
            }
        });
        assert!(seen.iter().all(|&c| c == 1));
    }
}
