//! Synchronization primitives for a uniprocessor kernel.

mod lazy;
mod spinlock;

pub use lazy::LazyLock;
pub use spinlock::{SpinLock, SpinLockGuard};
