use anyhow::{ensure, Context, Result};
use lifetime_memory::{
    depth, export, scoped_lifetime, tracked_alloc, with_stack, Block, LifetimeGuard, ALLOCATOR,
};
use log::info;

fn main() -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        // Still single threaded, nothing else reads the environment yet.
        unsafe { std::env::set_var("RUST_LOG", "debug") };
    }
    pretty_env_logger::init();

    let kept = export_from_small_scope()?;
    info!("Kept {} byte block at {:p}", kept.len(), kept.as_ptr());
    drop(kept);

    let total = summarize(&[3, 1, 4, 1, 5, 9, 2, 6]);
    info!("Summed scratch buffers to {total}");

    ensure!(depth() == 0, "scopes left open");
    ensure!(ALLOCATOR.get_count() == 0, "blocks leaked: {:?}", ALLOCATOR.stats());
    info!("All blocks released");

    Ok(())
}

/// Three allocations in an array scope of capacity 2, the middle one
/// exported before the scope closes.
fn export_from_small_scope() -> Result<Block> {
    let _scope = LifetimeGuard::new(2);

    let p1 = tracked_alloc(16);
    let p2 = tracked_alloc(16);
    let p3 = tracked_alloc(16);
    with_stack(|stack| {
        let pointers = stack.current_frame();
        info!(
            "Scope holds {} blocks in a {} of capacity {:?}",
            pointers.len(),
            pointers.kind(),
            pointers.capacity()
        );
    });
    info!("Allocated {p1:p}, {p2:p} and {p3:p}");

    let mut kept = export(p2).context("p2 was not tracked by the open scope")?;
    kept.as_mut_slice().fill(0x2A);

    Ok(kept)
}

#[scoped_lifetime(40)]
fn summarize(values: &[u8]) -> u64 {
    values
        .iter()
        .map(|&value| {
            let ptr = tracked_alloc(usize::from(value));
            let bytes = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), usize::from(value)) };
            bytes.fill(1);
            bytes.iter().map(|&b| u64::from(b)).sum::<u64>()
        })
        .sum()
}
