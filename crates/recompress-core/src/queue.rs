//! Unbounded FIFO queues connecting the dispatcher, workers and aggregator.
//!
//! Pushes never block. Pops block until an item arrives. Shutdown is an
//! explicit message in the item type rather than a null path; a receiver whose
//! senders have all been dropped also observes that message, so a vanished
//! producer can never strand a consumer.

use crossbeam_channel::{unbounded, Receiver, Sender};
use eyre::{eyre, Result};
use std::path::PathBuf;

/// Item type with a distinguished shutdown value.
pub trait Sentinel {
    fn sentinel() -> Self;
}

/// Unit of work handed to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Process(PathBuf),
    Stop,
}

impl Sentinel for Task {
    fn sentinel() -> Self {
        Task::Stop
    }
}

/// Size reported by a worker for a path it is about to rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultMessage {
    Record(ResultRecord),
    Finish,
}

impl Sentinel for ResultMessage {
    fn sentinel() -> Self {
        ResultMessage::Finish
    }
}

pub struct QueueSender<T> {
    tx: Sender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    pub fn push(&self, item: T) -> Result<()> {
        self.tx
            .send(item)
            .map_err(|_| eyre!("queue receiver dropped"))
    }

    /// Items pushed but not yet popped.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl QueueSender<Task> {
    /// Queue one stop message per worker.
    pub fn push_stops(&self, workers: usize) -> Result<()> {
        for _ in 0..workers {
            self.push(Task::Stop)?;
        }
        Ok(())
    }
}

/// Consuming end. Clones share the same FIFO: each item goes to one receiver.
pub struct QueueReceiver<T> {
    rx: Receiver<T>,
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T: Sentinel> QueueReceiver<T> {
    /// Block until an item is available.
    pub fn pop(&self) -> T {
        self.rx.recv().unwrap_or_else(|_| T::sentinel())
    }
}

pub fn queue<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = unbounded();
    (QueueSender { tx }, QueueReceiver { rx })
}

pub type TaskSender = QueueSender<Task>;
pub type TaskReceiver = QueueReceiver<Task>;
pub type ResultSender = QueueSender<ResultMessage>;
pub type ResultReceiver = QueueReceiver<ResultMessage>;

pub fn work_queue() -> (TaskSender, TaskReceiver) {
    queue()
}

pub fn result_queue() -> (ResultSender, ResultReceiver) {
    queue()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn pops_in_fifo_order() {
        let (tx, rx) = work_queue();
        tx.push(Task::Process("a".into())).expect("push");
        tx.push(Task::Process("b".into())).expect("push");
        tx.push_stops(1).expect("stops");
        assert_eq!(tx.len(), 3);

        assert_eq!(rx.pop(), Task::Process("a".into()));
        assert_eq!(rx.pop(), Task::Process("b".into()));
        assert_eq!(rx.pop(), Task::Stop);
        assert!(tx.is_empty());
    }

    #[test]
    fn disconnected_receiver_sees_sentinel() {
        let (tx, rx) = result_queue();
        drop(tx);
        assert_eq!(rx.pop(), ResultMessage::Finish);
    }

    #[test]
    fn push_fails_once_consumers_are_gone() {
        let (tx, rx) = work_queue();
        drop(rx);
        assert!(tx.push(Task::Stop).is_err());
    }

    #[test]
    fn each_item_is_delivered_to_exactly_one_consumer() {
        let (tx, rx) = work_queue();
        for i in 0..500 {
            tx.push(Task::Process(format!("f{i}").into())).expect("push");
        }
        tx.push_stops(4).expect("stops");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let rx = rx.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Task::Process(path) = rx.pop() {
                        seen.push(path);
                    }
                    seen
                })
            })
            .collect();

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.join().expect("consumer"));
        }
        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), 500);
        assert_eq!(unique.len(), 500);
    }
}
