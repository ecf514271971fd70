use std::cmp::Ordering;
use std::collections::BinaryHeap;

use uuid::Uuid;

/// Heap entry: higher priority first, FIFO (by enqueue sequence) among
/// equal priorities.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueuedTask {
    priority: i32,
    seq: u64,
    task_id: Uuid,
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending-task queue for one task type.
///
/// Entries for cancelled tasks are not removed eagerly; the scheduler skips
/// them at pop time by checking the task table. The sequence counter lives
/// here so re-queued tasks keep their priority but join the back of their
/// priority class.
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task_id: Uuid, priority: i32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedTask {
            priority,
            seq,
            task_id,
        });
    }

    pub fn peek(&self) -> Option<Uuid> {
        self.heap.peek().map(|q| q.task_id)
    }

    pub fn pop(&mut self) -> Option<Uuid> {
        self.heap.pop().map(|q| q.task_id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_by_priority() {
        let mut queue = TaskQueue::new();
        let low = Uuid::new_v4();
        let high = Uuid::new_v4();
        queue.push(low, 1);
        queue.push(high, 9);

        assert_eq!(queue.pop(), Some(high));
        assert_eq!(queue.pop(), Some(low));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn fifo_within_equal_priority() {
        let mut queue = TaskQueue::new();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            queue.push(*id, 5);
        }
        for id in &ids {
            assert_eq!(queue.pop(), Some(*id));
        }
    }

    #[test]
    fn peek_does_not_remove() {
        let mut queue = TaskQueue::new();
        let id = Uuid::new_v4();
        queue.push(id, 5);
        assert_eq!(queue.peek(), Some(id));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Some(id));
        assert!(queue.is_empty());
    }

    #[test]
    fn requeued_task_joins_back_of_its_class() {
        let mut queue = TaskQueue::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        queue.push(first, 5);
        queue.push(second, 5);

        let popped = queue.pop().unwrap();
        assert_eq!(popped, first);
        queue.push(first, 5);

        assert_eq!(queue.pop(), Some(second));
        assert_eq!(queue.pop(), Some(first));
    }
}
