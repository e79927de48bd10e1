//! Bounded packet queue
//!
//! Mutex + condvar FIFO shared by the demux thread (sole producer) and one
//! decoder. The byte cap is advisory: `push` never refuses a packet, the
//! demux thread polls [`PacketQueue::is_over_cap`] and backs off instead.
//!
//! Aborting the queue wakes every waiter so shutdown never depends on how
//! many packets are queued.
//!
//! A popped packet still counts against [`PacketQueue::is_drained`] until
//! the consumer comes back for the next one, so "nothing queued" and
//! "nothing in flight" are decided under the same lock.

use super::packet::Packet;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Outcome of a pop
#[derive(Debug, PartialEq, Eq)]
pub enum PopResult {
    Packet(Packet),
    /// Non-blocking pop (or timed pop) found nothing
    Empty,
    /// Session is shutting down
    Quit,
}

struct QueueState {
    packets: VecDeque<Packet>,
    /// Sum of `Packet::size` over `packets`
    size: usize,
    aborted: bool,
    /// Consumer took a packet and has not asked for another yet
    in_flight: bool,
}

pub struct PacketQueue {
    name: &'static str,
    byte_cap: usize,
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl PacketQueue {
    pub fn new(name: &'static str, byte_cap: usize) -> Self {
        Self {
            name,
            byte_cap,
            state: Mutex::new(QueueState {
                packets: VecDeque::new(),
                size: 0,
                aborted: false,
                in_flight: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Append a packet and wake one waiting consumer
    pub fn push(&self, packet: Packet) {
        let mut state = self.lock();
        state.size += packet.size();
        state.packets.push_back(packet);
        drop(state);
        self.cond.notify_one();
    }

    /// Take the oldest packet
    ///
    /// With `block`, waits until a packet arrives or the queue is aborted.
    pub fn pop(&self, block: bool) -> PopResult {
        let mut state = self.lock();
        state.in_flight = false;
        loop {
            if state.aborted {
                return PopResult::Quit;
            }
            if let Some(packet) = Self::take_front(&mut state) {
                return PopResult::Packet(packet);
            }
            if !block {
                return PopResult::Empty;
            }
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocking pop that gives up after `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> PopResult {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        state.in_flight = false;
        loop {
            if state.aborted {
                return PopResult::Quit;
            }
            if let Some(packet) = Self::take_front(&mut state) {
                return PopResult::Packet(packet);
            }
            let now = Instant::now();
            if now >= deadline {
                return PopResult::Empty;
            }
            state = self
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn take_front(state: &mut QueueState) -> Option<Packet> {
        let packet = state.packets.pop_front()?;
        state.size = state.size.saturating_sub(packet.size());
        state.in_flight = true;
        Some(packet)
    }

    /// Drop every queued packet, returning how many were discarded
    pub fn flush(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.packets.len();
        state.packets.clear();
        state.size = 0;
        dropped
    }

    /// Drop every queued packet and leave a single flush marker behind
    ///
    /// Done under one lock so a consumer can never observe the emptied
    /// queue without the marker and race ahead with stale decoder state.
    pub fn flush_with_marker(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.packets.len();
        state.packets.clear();
        state.packets.push_back(Packet::FlushMarker);
        state.size = 0;
        drop(state);
        self.cond.notify_one();
        dropped
    }

    /// Wake all waiters with [`PopResult::Quit`], now and for every later pop
    pub fn abort(&self) {
        self.lock().aborted = true;
        self.cond.notify_all();
    }

    /// Bytes currently queued
    pub fn size(&self) -> usize {
        self.lock().size
    }

    /// Packets (including flush markers) currently queued
    pub fn len(&self) -> usize {
        self.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().packets.is_empty()
    }

    /// Nothing queued and the consumer is back waiting, i.e. the last
    /// packet it took has been fully handled
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.packets.is_empty() && !state.in_flight
    }

    pub fn byte_cap(&self) -> usize {
        self.byte_cap
    }

    /// True while the producer should hold off
    pub fn is_over_cap(&self) -> bool {
        self.size() > self.byte_cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::CodedPacket;
    use std::sync::Arc;
    use std::thread;

    fn data(stream_index: usize, len: usize) -> Packet {
        Packet::Data(CodedPacket::new(stream_index, vec![0u8; len]))
    }

    fn popped_size(result: PopResult) -> usize {
        match result {
            PopResult::Packet(packet) => packet.size(),
            other => panic!("expected packet, got {:?}", other),
        }
    }

    #[test]
    fn test_fifo_and_size_accounting() {
        let queue = PacketQueue::new("test", 1000);
        for len in [100, 200, 300] {
            queue.push(data(0, len));
        }
        assert_eq!(queue.size(), 600);
        assert_eq!(queue.len(), 3);

        assert_eq!(popped_size(queue.pop(false)), 100);
        assert_eq!(queue.size(), 500);
        assert_eq!(popped_size(queue.pop(false)), 200);
        assert_eq!(popped_size(queue.pop(false)), 300);
        assert_eq!(queue.size(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_nonblocking_pop_on_empty_leaves_state() {
        let queue = PacketQueue::new("test", 1000);
        assert_eq!(queue.pop(false), PopResult::Empty);
        assert_eq!(queue.size(), 0);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_interleaved_push_pop_keeps_order() {
        let queue = PacketQueue::new("test", usize::MAX);
        let mut popped = Vec::new();
        for i in 1..=10 {
            queue.push(data(0, i));
            if i % 3 == 0 {
                popped.push(popped_size(queue.pop(false)));
            }
        }
        while let PopResult::Packet(p) = queue.pop(false) {
            popped.push(p.size());
        }
        assert_eq!(popped, (1..=10).collect::<Vec<_>>());
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_flush_resets_size() {
        let queue = PacketQueue::new("test", 1000);
        queue.push(data(0, 400));
        queue.push(data(0, 700));
        assert!(queue.is_over_cap());

        assert_eq!(queue.flush(), 2);
        assert_eq!(queue.size(), 0);
        assert!(!queue.is_over_cap());
        assert_eq!(queue.pop(false), PopResult::Empty);
    }

    #[test]
    fn test_flush_with_marker_leaves_one_marker() {
        let queue = PacketQueue::new("test", 1000);
        queue.push(data(0, 10));
        queue.push(Packet::FlushMarker);
        queue.push(data(0, 20));

        assert_eq!(queue.flush_with_marker(), 3);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.size(), 0);
        assert_eq!(queue.pop(false), PopResult::Packet(Packet::FlushMarker));
    }

    #[test]
    fn test_over_cap_is_strictly_greater() {
        let queue = PacketQueue::new("test", 100);
        queue.push(data(0, 100));
        assert!(!queue.is_over_cap());
        queue.push(data(0, 1));
        assert!(queue.is_over_cap());
    }

    #[test]
    fn test_blocking_pop_wakes_on_push() {
        let queue = Arc::new(PacketQueue::new("test", 1000));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop(true))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(data(3, 42));

        match consumer.join().unwrap() {
            PopResult::Packet(Packet::Data(p)) => {
                assert_eq!(p.stream_index, 3);
                assert_eq!(p.size(), 42);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_abort_wakes_all_waiters() {
        let queue = Arc::new(PacketQueue::new("test", 1000));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop(true))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        queue.abort();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), PopResult::Quit);
        }
        assert_eq!(queue.pop(false), PopResult::Quit);
    }

    #[test]
    fn test_popped_packet_blocks_drain_until_next_pop() {
        let queue = PacketQueue::new("test", 1000);
        assert!(queue.is_drained());

        queue.push(data(0, 10));
        assert!(!queue.is_drained());
        assert_eq!(popped_size(queue.pop(false)), 10);
        // empty, but the consumer is still working on the packet
        assert!(queue.is_empty());
        assert!(!queue.is_drained());

        assert_eq!(queue.pop(false), PopResult::Empty);
        assert!(queue.is_drained());

        queue.push(data(0, 20));
        assert_eq!(popped_size(queue.pop_timeout(Duration::from_millis(5))), 20);
        assert!(!queue.is_drained());
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)), PopResult::Empty);
        assert!(queue.is_drained());
    }

    #[test]
    fn test_blocked_consumer_counts_as_drained() {
        let queue = Arc::new(PacketQueue::new("test", 1000));
        queue.push(data(0, 10));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let first = queue.pop(true);
                let second = queue.pop(true);
                (first, second)
            })
        };
        let deadline = Instant::now() + Duration::from_secs(2);
        while !queue.is_drained() {
            assert!(Instant::now() < deadline, "consumer never came back");
            thread::sleep(Duration::from_millis(2));
        }
        queue.abort();
        let (first, second) = consumer.join().unwrap();
        assert_eq!(popped_size(first), 10);
        assert_eq!(second, PopResult::Quit);
    }

    #[test]
    fn test_pop_timeout_expires() {
        let queue = PacketQueue::new("test", 1000);
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(15)), PopResult::Empty);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
