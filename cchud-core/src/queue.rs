//! Delivery queue between the output readers and the display consumer
//!
//! Producers append text tagged with their job. Consecutive appends are
//! coalesced into blocks of at most `block_size` characters so that a
//! single display update never carries an oversized write. The consumer
//! pops one block at a time and is expected to yield to its host scheduler
//! between pops.
//!
//! One mutex guards the blocks, the active job tag and the pending
//! completion. Critical sections are append-and-check or pop-one; the lock
//! is never held while the consumer renders.

use crate::job::JobId;
use crate::lock;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::debug;

/// Characters per block unless configured otherwise
pub const DEFAULT_BLOCK_SIZE: usize = 16_384;

/// Outcome of an append or completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    Accepted,
    /// Tagged with a job other than the active one; the data was dropped and
    /// the caller must cancel the producing job
    Stale,
}

/// Terminal notice for a run, delivered after all of its text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// `None` for runs that never produced a process (spawn failure)
    pub job: Option<JobId>,
    pub exit_code: Option<i32>,
}

/// One unit of work for the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Text(String),
    Finished(Completion),
}

#[derive(Debug)]
struct Block {
    text: String,
    chars: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    blocks: VecDeque<Block>,
    active: Option<JobId>,
    completion: Option<Completion>,
}

impl QueueState {
    fn is_stale(&self, tag: Option<JobId>) -> bool {
        tag.is_some() && tag != self.active
    }
}

#[derive(Debug)]
pub struct DeliveryQueue {
    state: Mutex<QueueState>,
    wake: Notify,
    block_size: usize,
}

impl DeliveryQueue {
    /// A `block_size` of 0 selects [`DEFAULT_BLOCK_SIZE`]
    pub fn new(block_size: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            block_size: if block_size == 0 { DEFAULT_BLOCK_SIZE } else { block_size },
        }
    }

    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Drop everything queued and make `active` the only accepted producer
    pub fn reset(&self, active: Option<JobId>) {
        let mut state = lock(&self.state);
        state.blocks.clear();
        state.completion = None;
        state.active = active;
    }

    pub fn active(&self) -> Option<JobId> {
        lock(&self.state).active
    }

    /// Queue `text` produced by `tag`. An untagged append is always accepted.
    pub fn append(&self, tag: Option<JobId>, text: &str) -> Append {
        {
            let mut state = lock(&self.state);
            if state.is_stale(tag) {
                debug!(tag = ?tag, active = ?state.active, "discarding output from stale job");
                return Append::Stale;
            }
            self.push_text(&mut state, text);
        }
        self.wake.notify_one();
        Append::Accepted
    }

    /// Record that `tag` finished; delivered once all queued text is popped
    pub fn finish(&self, tag: Option<JobId>, exit_code: Option<i32>) -> Append {
        {
            let mut state = lock(&self.state);
            if state.is_stale(tag) {
                debug!(tag = ?tag, active = ?state.active, "discarding completion from stale job");
                return Append::Stale;
            }
            state.completion = Some(Completion { job: tag, exit_code });
        }
        self.wake.notify_one();
        Append::Accepted
    }

    /// Remove the oldest unit of work
    pub fn pop(&self) -> Option<Delivery> {
        let mut state = lock(&self.state);
        if let Some(block) = state.blocks.pop_front() {
            return Some(Delivery::Text(block.text));
        }
        state.completion.take().map(Delivery::Finished)
    }

    pub fn has_pending(&self) -> bool {
        let state = lock(&self.state);
        !state.blocks.is_empty() || state.completion.is_some()
    }

    /// Suspend until something is appended or finished.
    ///
    /// A wake-up sent while nobody was waiting is kept, so checking
    /// [`DeliveryQueue::pop`] and then awaiting this cannot miss work.
    pub async fn wait_for_work(&self) {
        self.wake.notified().await;
    }

    fn push_text(&self, state: &mut QueueState, text: &str) {
        let mut rest = text;
        while !rest.is_empty() {
            let room = match state.blocks.back() {
                Some(last) if last.chars < self.block_size => self.block_size - last.chars,
                _ => {
                    state.blocks.push_back(Block {
                        text: String::new(),
                        chars: 0,
                    });
                    self.block_size
                }
            };

            let split = rest.char_indices().nth(room).map_or(rest.len(), |(i, _)| i);
            let (head, tail) = rest.split_at(split);
            if let Some(last) = state.blocks.back_mut() {
                last.text.push_str(head);
                last.chars += head.chars().count();
            }
            rest = tail;
        }
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain_text(queue: &DeliveryQueue) -> Vec<String> {
        let mut blocks = Vec::new();
        while let Some(Delivery::Text(text)) = queue.pop() {
            blocks.push(text);
        }
        blocks
    }

    #[test]
    fn test_small_appends_are_coalesced() {
        let queue = DeliveryQueue::new(16);
        queue.reset(Some(JobId::new(1)));
        queue.append(Some(JobId::new(1)), "abc");
        queue.append(Some(JobId::new(1)), "def");
        assert_eq!(drain_text(&queue), vec!["abcdef"]);
    }

    #[test]
    fn test_large_append_is_split_at_block_size() {
        let queue = DeliveryQueue::new(4);
        queue.append(None, "abcdefghij");
        assert_eq!(drain_text(&queue), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_block_size_counts_characters() {
        let queue = DeliveryQueue::new(2);
        queue.append(None, "ééé");
        assert_eq!(drain_text(&queue), vec!["éé", "é"]);
    }

    #[test]
    fn test_full_block_starts_new_one() {
        let queue = DeliveryQueue::new(3);
        queue.append(None, "abc");
        queue.append(None, "d");
        assert_eq!(drain_text(&queue), vec!["abc", "d"]);
    }

    #[test]
    fn test_stale_append_is_discarded() {
        let queue = DeliveryQueue::default();
        queue.reset(Some(JobId::new(2)));
        assert_eq!(queue.append(Some(JobId::new(1)), "old"), Append::Stale);
        assert_eq!(queue.append(Some(JobId::new(2)), "new"), Append::Accepted);
        assert_eq!(drain_text(&queue), vec!["new"]);
    }

    #[test]
    fn test_untagged_append_is_always_accepted() {
        let queue = DeliveryQueue::default();
        queue.reset(Some(JobId::new(7)));
        assert_eq!(queue.append(None, "diagnostic"), Append::Accepted);
        assert_eq!(drain_text(&queue), vec!["diagnostic"]);
    }

    #[test]
    fn test_reset_clears_queued_blocks_and_completion() {
        let queue = DeliveryQueue::new(2);
        queue.reset(Some(JobId::new(1)));
        queue.append(Some(JobId::new(1)), "stale text");
        queue.finish(Some(JobId::new(1)), Some(0));

        queue.reset(Some(JobId::new(2)));
        assert!(!queue.has_pending());
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.active(), Some(JobId::new(2)));
    }

    #[test]
    fn test_completion_follows_all_text() {
        let queue = DeliveryQueue::new(3);
        let job = Some(JobId::new(1));
        queue.reset(job);
        queue.append(job, "abcdef");
        queue.finish(job, Some(1));

        assert_eq!(queue.pop(), Some(Delivery::Text("abc".to_string())));
        assert_eq!(queue.pop(), Some(Delivery::Text("def".to_string())));
        assert_eq!(
            queue.pop(),
            Some(Delivery::Finished(Completion { job, exit_code: Some(1) }))
        );
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let queue = DeliveryQueue::default();
        queue.reset(Some(JobId::new(2)));
        assert_eq!(queue.finish(Some(JobId::new(1)), None), Append::Stale);
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_zero_block_size_uses_default() {
        assert_eq!(DeliveryQueue::new(0).block_size(), DEFAULT_BLOCK_SIZE);
    }

    #[tokio::test]
    async fn test_wake_before_wait_is_not_lost() {
        let queue = DeliveryQueue::default();
        queue.append(None, "x");
        tokio::time::timeout(std::time::Duration::from_secs(1), queue.wait_for_work())
            .await
            .unwrap();
    }

    proptest! {
        #[test]
        fn blocks_respect_cap_and_preserve_text(
            block_size in 1usize..32,
            appends in prop::collection::vec("[a-zé→\n ]{0,40}", 0..20),
        ) {
            let queue = DeliveryQueue::new(block_size);
            for text in &appends {
                queue.append(None, text);
            }
            let blocks = drain_text(&queue);
            for block in &blocks {
                prop_assert!(block.chars().count() <= block_size);
                prop_assert!(!block.is_empty());
            }
            prop_assert_eq!(blocks.concat(), appends.concat());
        }

        #[test]
        fn stale_appends_never_reach_consumer(
            appends in prop::collection::vec((any::<bool>(), "[a-z]{1,8}"), 0..20),
        ) {
            let active = JobId::new(2);
            let queue = DeliveryQueue::new(8);
            queue.reset(Some(active));
            let mut expected = String::new();
            for (is_active, text) in &appends {
                let tag = if *is_active { active } else { JobId::new(1) };
                if queue.append(Some(tag), text) == Append::Accepted {
                    expected.push_str(text);
                }
            }
            let delivered = drain_text(&queue).concat();
            prop_assert_eq!(&delivered, &expected);
            let expected_active: String = appends
                .iter()
                .filter(|(is_active, _)| *is_active)
                .map(|(_, text)| text.as_str())
                .collect();
            prop_assert_eq!(delivered, expected_active);
        }
    }
}
