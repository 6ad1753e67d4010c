use lognote::collapse::{DisplayList, collapse};
use lognote::config::Config;
use lognote::filter::{FilterConfig, FilterPipeline, LevelSet};
use lognote::record::{LogLevel, LogRecord};
use lognote::viewport::{ViewportRenderer, ViewportWindow, visible_slice};
use std::sync::Arc;
use std::time::Instant;

const RECORDS: usize = 100_000;

/// Measures execution time of a function in nanoseconds
fn measure_time<F, R>(iterations: usize, mut f: F) -> u128
where
    F: FnMut() -> R,
{
    let start = Instant::now();
    for _ in 0..iterations {
        std::hint::black_box(f());
    }
    start.elapsed().as_nanos() / iterations as u128
}

/// A mix of levels with runs of tagged lines every few hundred rows.
fn sample_records() -> Vec<Arc<LogRecord>> {
    let lines: Vec<String> = (0..RECORDS)
        .map(|i| match i % 400 {
            0..=9 => format!("2024.05.01 20:00:00 Log        -  [Network] retry {}", i),
            n if n % 7 == 0 => format!("2024.05.01 20:00:00 Error      -  request {} failed", i),
            n if n % 5 == 0 => format!("2024.05.01 20:00:00 Warning    -  slow response {}", i),
            _ => format!("2024.05.01 20:00:00 Log        -  handled request id={} user=u{}", i, i % 97),
        })
        .collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let parser = Config::default().build_parser().unwrap();
    parser.parse_lines(&refs)
}

fn collapsed_list() -> Arc<DisplayList> {
    Arc::new(collapse(sample_records(), 3))
}

#[test]
fn perf_visible_slice() {
    let list = collapsed_list();
    let window = ViewportWindow {
        offset: list.len() / 2,
        length: 60,
    };

    let iterations = 100000;
    let avg_time_max = 200;

    let avg_time = measure_time(iterations, || visible_slice(&list, window).len());

    println!("visible_slice: {} ns/iteration", avg_time);

    assert!(
        avg_time < avg_time_max,
        "visible_slice is too slow: {} ns (max allowed: {} ns)",
        avg_time,
        avg_time_max
    );
}

#[test]
fn test_visible_slice_matches_clamped_range_at_scale() {
    let list = Arc::new(DisplayList::plain(sample_records()));
    let records = list.records();
    assert_eq!(records.len(), RECORDS);

    let windows = [
        (0, 60),
        (RECORDS / 2, 60),
        (RECORDS - 10, 60),
        (RECORDS, 5),
        (7, 0),
        (0, RECORDS),
    ];
    for (offset, length) in windows {
        let slice = visible_slice(&list, ViewportWindow { offset, length });
        let start = offset.min(RECORDS);
        let end = (offset + length).min(RECORDS);
        assert_eq!(slice.len(), end - start);
        assert!(slice.iter().zip(&records[start..end]).all(|(a, b)| Arc::ptr_eq(a, b)));
    }
}

#[test]
fn perf_visible_rows_folded() {
    let mut renderer = ViewportRenderer::new();
    renderer.set_list(collapsed_list());
    let window = ViewportWindow {
        offset: renderer.folded_len() / 2,
        length: 60,
    };

    let iterations = 10000;
    let avg_time_max = 50_000;

    let avg_time = measure_time(iterations, || renderer.visible_rows(window));

    println!("visible_rows (folded): {} ns/iteration", avg_time);

    assert!(
        avg_time < avg_time_max,
        "visible_rows (folded) is too slow: {} ns (max allowed: {} ns)",
        avg_time,
        avg_time_max
    );
}

#[test]
fn perf_filter_pipeline() {
    let records = sample_records();
    let config = FilterConfig::new(
        [LogLevel::Error, LogLevel::Warning].into_iter().collect::<LevelSet>(),
        Some("request".to_string()),
        true,
        3,
    )
    .unwrap();

    let iterations = 10;
    let avg_time_max = 2_000_000_000;

    let avg_time = measure_time(iterations, || FilterPipeline::apply(&records, &config));

    println!("filter pipeline ({} records): {} ns/iteration", RECORDS, avg_time);

    assert!(
        avg_time < avg_time_max,
        "filter pipeline is too slow: {} ns (max allowed: {} ns)",
        avg_time,
        avg_time_max
    );
}

#[test]
fn test_filter_is_idempotent_at_scale() {
    let records = sample_records();
    let config = FilterConfig::new(LevelSet::all(), None, true, 3).unwrap();
    let first = FilterPipeline::apply(&records, &config);
    let second = FilterPipeline::apply(&records, &config);

    assert_eq!(first.len(), second.len());
    assert_eq!(first.spans(), second.spans());
    assert_eq!(first.member_rows(), RECORDS);
}
