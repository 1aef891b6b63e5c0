use std::sync::atomic::{AtomicUsize, Ordering};

use bvhkit::bvh::{BoxBlock, PrimRef, BOX_BLOCK_SIZE};
use bvhkit::math::{Aabb3, Point3};
use bvhkit::{build_bvh, BoxSource, BuilderKind, Config, LazySubtree, NodeRef};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn patch(offset: f64, count: usize) -> BoxSource {
    let boxes = (0..count)
        .map(|i| {
            let x = offset + i as f64;
            let y = (i % 7) as f64;
            Aabb3::new(Point3::new(x, y, 0.0), Point3::new(x + 0.8, y + 0.8, 0.8))
        })
        .collect();
    BoxSource::new(vec![boxes, Vec::new(), vec![Aabb3::empty()]])
}

#[test]
fn test_both_builders_from_config() {
    init_logging();
    let source = patch(0.0, 500);
    for builder in [BuilderKind::BinnedSah, BuilderKind::Morton] {
        let config = Config {
            threads: Some(3),
            builder,
            ..Default::default()
        };
        let pool = config.worker_pool().unwrap();
        let bvh = build_bvh::<_, 4>(&config, &pool, &source).unwrap();
        assert_eq!(bvh.prim_count(), 500);
        bvh.validate(BoxBlock::bounds).unwrap();
        let stored: usize = bvh.blocks().iter().map(BoxBlock::len).sum();
        assert_eq!(stored, 500);
    }
}

#[test]
fn test_config_file_drives_build() {
    init_logging();
    let dir = std::env::temp_dir().join(format!("bvhkit-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bvhkit.toml");
    std::fs::write(&path, "threads = 2\nbuilder = \"morton\"\n[morton]\nleaf_size = 2\n").unwrap();

    let config = Config::load(&path).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();
    assert_eq!(config.builder, BuilderKind::Morton);

    let pool = config.worker_pool().unwrap();
    let bvh = build_bvh::<_, 2>(&config, &pool, &patch(0.0, 64)).unwrap();
    for (leaf, _) in bvh.leaves() {
        if let NodeRef::Leaf { count, .. } = leaf {
            assert!(count as usize <= 2);
        }
    }
}

#[test]
fn test_cached_subtree_blocks() {
    init_logging();
    let config = Config {
        threads: Some(2),
        ..Default::default()
    };
    let pool = config.worker_pool().unwrap();
    let cache = config.subtree_cache::<BoxBlock>().unwrap();
    let builds = AtomicUsize::new(0);

    let patches: Vec<BoxSource> = (0..4).map(|i| patch(1000.0 * i as f64, 40)).collect();
    // 40 boxes repacked into full blocks.
    let blocks_needed = 40 / BOX_BLOCK_SIZE;
    for _round in 0..3 {
        for (key, source) in patches.iter().enumerate() {
            let prims = cache
                .get_or_build(
                    key as u64,
                    1,
                    blocks_needed,
                    || {
                        builds.fetch_add(1, Ordering::SeqCst);
                        let bvh = build_bvh::<_, 4>(&config, &pool, source).unwrap();
                        let prims: Vec<PrimRef> = bvh
                            .blocks()
                            .iter()
                            .flat_map(|b| b.prims().iter().copied())
                            .collect();
                        prims.chunks(BOX_BLOCK_SIZE).map(BoxBlock::from_refs).collect()
                    },
                    |blocks| blocks.iter().map(BoxBlock::len).sum::<usize>(),
                )
                .unwrap();
            assert_eq!(prims, 40);
        }
    }
    assert_eq!(builds.load(Ordering::SeqCst), 4);
    assert_eq!(cache.stats().snapshot().builds, 4);
}

#[test]
fn test_lazy_root_shared_across_threads() {
    let config = Config {
        threads: Some(2),
        builder: BuilderKind::Morton,
        ..Default::default()
    };
    let pool = config.worker_pool().unwrap();
    let source = patch(0.0, 200);
    let lazy = LazySubtree::new();
    let builds = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let bvh = lazy.get_or_build(|| {
                    builds.fetch_add(1, Ordering::SeqCst);
                    build_bvh::<_, 4>(&config, &pool, &source).unwrap()
                });
                assert_eq!(bvh.prim_count(), 200);
            });
        }
    });
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}
