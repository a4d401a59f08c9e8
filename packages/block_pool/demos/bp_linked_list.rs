//! A linked list whose nodes come from a `BlockPool` instead of individual heap allocations.

use std::ptr::NonNull;

use block_pool::{BlockPool, DropPolicy};

struct Node {
    value: u32,
    next: Option<NonNull<Node>>,
}

struct List {
    head: Option<NonNull<Node>>,
    nodes: BlockPool<Node>,
}

impl List {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            head: None,
            nodes: BlockPool::builder()
                .drop_policy(DropPolicy::MustNotDropAllocations)
                .reserve(capacity)
                .build()
                .unwrap(),
        }
    }

    fn push_front(&mut self, value: u32) {
        let node = self
            .nodes
            .insert(Node {
                value,
                next: self.head,
            })
            .unwrap();

        self.head = Some(node);
    }

    fn pop_front(&mut self) -> Option<u32> {
        let node = self.head?;

        // SAFETY: Every node in the list came from our pool and is removed once.
        let node = unsafe { self.nodes.remove(node) };
        self.head = node.next;

        Some(node.value)
    }

    fn sum(&self) -> u64 {
        let mut total = 0;
        let mut current = self.head;

        while let Some(node) = current {
            // SAFETY: Nodes are alive for as long as they are in the list.
            let node = unsafe { node.as_ref() };
            total += u64::from(node.value);
            current = node.next;
        }

        total
    }
}

impl Drop for List {
    fn drop(&mut self) {
        while self.pop_front().is_some() {}
    }
}

fn main() {
    println!("=== Block Pool Linked List Example ===");

    let mut list = List::with_capacity(10_000);
    let reserved_slabs = list.nodes.slab_count();

    for value in 1..=10_000 {
        list.push_front(value);
    }

    println!("Sum of 1..=10000: {}", list.sum());
    println!(
        "Slabs reserved up front: {reserved_slabs}, slabs in use: {}",
        list.nodes.slab_count()
    );

    for _ in 0..5_000 {
        list.pop_front();
    }

    println!(
        "After popping half: {} nodes in {} slab(s)",
        list.nodes.len(),
        list.nodes.slab_count()
    );
}
