use commbench::communicator::Communicator;
use commbench::local_group;
use commbench_benchmarks::{
    run_benchmarks, BenchError, BenchmarkConfig, BenchmarkOptions, Dtype, MetricSample, OpKind,
    Reporter, Result,
};
use std::thread;

fn scan_options(ops: Vec<OpKind>) -> BenchmarkOptions {
    BenchmarkOptions {
        ops,
        scan: true,
        min_exponent: 2,
        max_exponent: 6,
        stride: 2,
        warmups: 1,
        trials: 3,
        raw: true,
        ..BenchmarkOptions::default()
    }
}

/// Run the benchmarks on `size` local ranks, returning each rank's samples
/// and printed output.
fn run_local(size: usize, config: &BenchmarkConfig) -> Vec<(Result<Vec<MetricSample>>, String)> {
    let group = local_group(size).unwrap();
    thread::scope(|s| {
        let handles: Vec<_> = group
            .into_iter()
            .map(|ctx| {
                s.spawn(move || {
                    let mut reporter = Reporter::for_rank(Vec::new(), config.formatter(), ctx.rank());
                    let result = run_benchmarks(&ctx, config, &mut reporter);
                    (result, String::from_utf8(reporter.into_inner()).unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn every_op_sweeps_on_four_ranks() {
    let config = BenchmarkConfig::from_options(scan_options(vec![])).unwrap();
    let results = run_local(4, &config);

    let (rank0, out0) = &results[0];
    let samples = rank0.as_ref().unwrap();
    assert_eq!(samples.len(), OpKind::ALL.len() * 3);
    for op in OpKind::ALL {
        let sizes: Vec<usize> = samples.iter().filter(|s| s.op == op).map(|s| s.elements).collect();
        let shard = if op == OpKind::AllToAll { 4 } else { 1 };
        assert_eq!(sizes, vec![4 * shard, 16 * shard, 64 * shard], "{}", op);
        assert!(out0.contains(&format!("Performing {} benchmark", op)));
    }
    assert!(samples.iter().all(|s| s.duration > 0.0 && s.bus_bandwidth > 0.0));

    // Measurement runs everywhere, only rank 0 prints.
    for (result, out) in &results[1..] {
        assert_eq!(result.as_ref().unwrap().len(), samples.len());
        assert!(out.is_empty());
    }
}

#[test]
fn rows_follow_each_header() {
    let config = BenchmarkConfig::from_options(scan_options(vec![OpKind::AllGather])).unwrap();
    let results = run_local(2, &config);
    let out = &results[0].1;

    let rows: Vec<&str> = out
        .lines()
        .skip_while(|line| !line.starts_with("-----"))
        .skip(1)
        .collect();
    assert_eq!(rows.len(), 3);
    let sizes: Vec<&str> = rows.iter().filter_map(|row| row.split_whitespace().next()).collect();
    assert_eq!(sizes, vec!["32", "128", "512"]);
    assert!(rows[0].contains("4x4"));
}

#[test]
fn async_mode_with_wider_elements() {
    let mut opts = scan_options(vec![OpKind::AllReduce, OpKind::Pt2pt]);
    opts.async_op = true;
    opts.dtype = Dtype::F64;
    let config = BenchmarkConfig::from_options(opts).unwrap();
    let results = run_local(3, &config);

    let samples = results[0].0.as_ref().unwrap();
    assert_eq!(samples.len(), 6);
    assert!(samples.iter().all(|s| s.element_size == 8));
    let pt2pt: Vec<&MetricSample> = samples.iter().filter(|s| s.op == OpKind::Pt2pt).collect();
    assert!(pt2pt.iter().all(|s| s.world_size == 2));
}

#[test]
fn fixed_payload_runs_once_per_op() {
    let opts = BenchmarkOptions {
        ops: vec![OpKind::Broadcast],
        elements_exponent: 10,
        warmups: 0,
        trials: 2,
        ..BenchmarkOptions::default()
    };
    let config = BenchmarkConfig::from_options(opts).unwrap();
    let results = run_local(2, &config);
    let samples = results[0].0.as_ref().unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].elements, 1024);
    assert_eq!(samples[0].bytes, 4096);
}

#[test]
fn single_rank_is_a_configuration_error() {
    let config = BenchmarkConfig::from_options(scan_options(vec![OpKind::Broadcast])).unwrap();
    let results = run_local(1, &config);
    assert!(matches!(results[0].0, Err(BenchError::Configuration(_))));
    assert!(results[0].1.is_empty());
}

#[test]
fn debug_dump_prints_each_ranks_buffers() {
    let opts = BenchmarkOptions {
        ops: vec![OpKind::AllGather],
        elements_exponent: 1,
        warmups: 1,
        trials: 2,
        debug: true,
        ..BenchmarkOptions::default()
    };
    let config = BenchmarkConfig::from_options(opts).unwrap();
    let results = run_local(3, &config);

    for (rank, (result, out)) in results.iter().enumerate() {
        assert_eq!(result.as_ref().unwrap().len(), 1);
        let input = format!("all_gather input at rank {}: [{:?}, {:?}]", rank, rank as f32, rank as f32);
        assert!(out.contains(&input), "rank {} output: {}", rank, out);
        assert!(out.contains(&format!(
            "all_gather result at rank {}: [0.0, 0.0, 1.0, 1.0, 2.0, 2.0]",
            rank
        )));
        for other in (0..3).filter(|r| *r != rank) {
            assert!(!out.contains(&format!("at rank {}:", other)));
        }
    }
}

#[test]
fn samples_are_exported_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.json");
    let mut opts = scan_options(vec![OpKind::AllGather, OpKind::Broadcast]);
    opts.output_json = Some(path.clone());
    let config = BenchmarkConfig::from_options(opts).unwrap();
    run_local(2, &config);

    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let samples = value.as_array().unwrap();
    assert_eq!(samples.len(), 6);
    assert_eq!(samples[0]["op"], "all_gather");
    assert_eq!(samples[0]["world_size"], 2);
    assert_eq!(samples[5]["op"], "broadcast");
}
