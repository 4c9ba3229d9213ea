// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_realsense::{synthetic::SyntheticDriver, Filter, Session, StageKind};
use std::sync::Arc;

pub fn benchmark_filters(c: &mut Criterion) {
    let kinds = [
        StageKind::Decimation,
        StageKind::Spatial,
        StageKind::Temporal,
        StageKind::HoleFilling,
        StageKind::Colorizer,
    ];
    let dims = [(424, 240), (640, 480), (848, 480), (1280, 720)];
    let driver = Arc::new(SyntheticDriver::new());
    let session = Session::with_driver(driver.clone()).unwrap();

    for kind in kinds {
        let mut group = c.benchmark_group(format!("filter/{}", kind));
        let mut filter = Filter::new(&session, kind).unwrap();
        for (width, height) in dims {
            let frame = driver.depth_frame(width, height, |x, y| ((x * 7 + y * 3) % 4000) as u16);
            group.bench_function(format!("{}x{}", width, height), |b| {
                b.iter(|| filter.process(&frame).unwrap())
            });
        }
        group.finish();
    }
}

pub fn benchmark_chain(c: &mut Criterion) {
    let driver = Arc::new(SyntheticDriver::new());
    let session = Session::with_driver(driver.clone()).unwrap();
    let mut chain = [
        StageKind::Decimation,
        StageKind::Spatial,
        StageKind::Temporal,
        StageKind::HoleFilling,
    ]
    .map(|kind| Filter::new(&session, kind).unwrap());
    let mut colorizer = Filter::colorizer(&session).unwrap();
    let frame = driver.depth_frame(848, 480, |x, y| ((x + y) % 4000) as u16);

    c.bench_function("chain/848x480", |b| {
        b.iter(|| {
            let mut depth = frame.try_clone().unwrap();
            for filter in chain.iter_mut() {
                depth = filter.process(&depth).unwrap();
            }
            colorizer.process(&depth).unwrap()
        })
    });
}

criterion_group!(benches, benchmark_filters, benchmark_chain);
criterion_main!(benches);
