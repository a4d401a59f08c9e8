//! Using groups of `GlobalPool` to give each worker thread private storage for the same type.

use std::thread;

use block_pool::GlobalPool;

enum Producer {}
enum Consumer {}

fn fill<G: 'static>(name: &str) {
    let pool = GlobalPool::<u64, G>::new();

    let ptrs: Vec<_> = (0..1000).map(|n| pool.insert(n).unwrap()).collect();

    println!(
        "{name}: {} objects in {} slab(s)",
        pool.len(),
        pool.slab_count()
    );

    for ptr in ptrs {
        // SAFETY: Inserted into this storage, removed once.
        drop(unsafe { pool.remove(ptr) });
    }
}

fn main() {
    println!("=== Block Pool Groups Example ===");

    // The two threads allocate u64 values from separate storage and never share a lock.
    let producer = thread::spawn(|| fill::<Producer>("producer"));
    let consumer = thread::spawn(|| fill::<Consumer>("consumer"));

    producer.join().unwrap();
    consumer.join().unwrap();

    println!(
        "Remaining slabs: producer {}, consumer {}",
        GlobalPool::<u64, Producer>::new().slab_count(),
        GlobalPool::<u64, Consumer>::new().slab_count()
    );
}
