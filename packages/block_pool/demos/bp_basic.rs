//! Basic usage of `BlockPool`: allocate, use and give back objects.

use block_pool::BlockPool;

fn main() {
    println!("=== Block Pool Basic Example ===");

    let mut pool = BlockPool::<String>::new();

    // Inserting a value gives you a pointer to where it lives in the pool.
    let alice = pool.insert("Alice".to_string()).unwrap();
    let bob = pool.insert("Bob".to_string()).unwrap();

    // SAFETY: Both values were inserted into this pool and are still there.
    unsafe {
        println!("Stored: {} and {}", alice.as_ref(), bob.as_ref());
    }

    println!(
        "Pool holds {} objects in {} slab(s), room for {}",
        pool.len(),
        pool.slab_count(),
        pool.capacity()
    );

    // SAFETY: Inserted into this pool, removed once.
    let bob = unsafe { pool.remove(bob) };
    println!("Removed: {bob}");

    // The slot Bob occupied is the first to be reused.
    let charlie = pool.insert("Charlie".to_string()).unwrap();
    println!("Charlie reuses a freed slot");

    // Modify in place.
    // SAFETY: Inserted into this pool and not removed; we hold no other reference.
    unsafe {
        (*alice.as_ptr()).push_str(" Smith");
        println!("Modified: {}", alice.as_ref());
    }

    // SAFETY: Inserted into this pool, removed once.
    unsafe {
        drop(pool.remove(alice));
        drop(pool.remove(charlie));
    }

    println!("Slabs after removing everything: {}", pool.slab_count());
}
