use tokio::sync::mpsc;

/// The bounded in-memory channel of pending file ids (§4.9). Single
/// producer (the scanner task), multiple consumers (the worker pool).
/// FIFO within the channel, no priority.
pub type Dispatcher = mpsc::Sender<i64>;
pub type WorkQueue = mpsc::Receiver<i64>;

/// Capacity is at least `worker_count` so a full channel never forces
/// more backpressure than the pool can itself absorb in flight.
pub fn channel(worker_count: usize) -> (Dispatcher, WorkQueue) {
    mpsc::channel(worker_count.max(1))
}
