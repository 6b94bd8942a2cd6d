/*!
Fork resolution

The [`Arbiter`] is the only writer of the [`Chain`]. It receives the blocks
published by both mining pools, decides where each one belongs, and publishes
a [`ChainView`] after every decision so that miners can follow the public
chain.

# Forks
When a block arrives for the depth of the current chain head from the other
pool, neither block wins yet: the new block starts a shadow branch and a
[`ForkContext`] is opened. The fork is settled by the next block one past
the head:
- from the shadow side, extending the shadow branch: the shadow branch is
  adopted and the contested canonical block becomes a stale candidate.
- from the origin side, extending the canonical head: the canonical branch
  wins and the first shadow block becomes a stale candidate.
*/

use std::{collections::HashMap, time::Duration};

use tokio::sync::{
    mpsc::{self, error::TryRecvError},
    watch,
};
use tracing::{debug, info, trace, warn};

use crate::{
    block::{Block, BlockId, Producer},
    blockchain::{Chain, ChainView, ForkView, LedgerError},
};

/// Number of parent links followed when looking for the canonical ancestor of
/// a late block.
pub const STALE_ANCESTOR_LINKS: usize = 3;

/// Progress is logged every time the chain grows by this many blocks.
const PROGRESS_INTERVAL: usize = 100;

/// Bookkeeping for a contested chain tip.
#[derive(Debug, Clone, PartialEq)]
pub struct ForkContext {
    /// Depth at which the two branches diverge.
    pub fork_depth: u64,
    /// Producer of the canonical block at `fork_depth` when the fork opened.
    pub origin_side: Producer,
    /// Non-canonical branch starting at `fork_depth`. Never empty.
    pub shadow_branch: Vec<Block>,
}

impl ForkContext {
    /// Producer of the shadow branch.
    #[inline]
    pub fn shadow_side(&self) -> Producer {
        self.origin_side.opposite()
    }

    /// Last block of the shadow branch.
    #[inline]
    pub fn shadow_tip(&self) -> &Block {
        &self.shadow_branch[self.shadow_branch.len() - 1]
    }

    /// Whether the shadow branch followed by `next` starts at the fork depth
    /// and links every block to the one before it.
    fn is_spliceable(&self, next: &Block) -> bool {
        let starts_at_fork = self
            .shadow_branch
            .first()
            .is_some_and(|first| first.depth == self.fork_depth);

        starts_at_fork
            && self
                .shadow_branch
                .iter()
                .chain(std::iter::once(next))
                .collect::<Vec<_>>()
                .windows(2)
                .all(|pair| {
                    pair[1].depth == pair[0].depth + 1
                        && pair[1].parent_id == Some(pair[0].id)
                })
    }

    fn view(&self) -> ForkView {
        ForkView {
            shadow_side: self.shadow_side(),
            shadow_tip: self.shadow_tip().to_ref(),
        }
    }
}

/// What the [`Arbiter`] did with a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Appended to the canonical chain.
    Accepted,
    /// Started a shadow branch at the depth of the chain head.
    ForkOpened,
    /// Settled a fork in favor of the shadow branch, displacing the given
    /// number of canonical blocks.
    Adopted { displaced: usize },
    /// Settled a fork in favor of the canonical branch.
    OriginWon,
    /// Handled as a late stale block; `registered` is true if a stale
    /// candidate was recorded.
    Stale { registered: bool },
    /// Discarded.
    Dropped(DropReason),
}

/// Why the [`Arbiter`] discarded a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The block does not extend the branch its depth and producer place it
    /// on.
    WrongParent,
    /// The block is more than one block past the chain head.
    Gap,
    /// The block belongs to the canonical side of an open fork and arrived
    /// below the next depth.
    Late,
    /// The ledger refused the block.
    Rejected(LedgerError),
}

/// Everything the [`Arbiter`] hands back once it stops.
#[derive(Debug, Clone)]
pub struct ArbiterReport {
    pub chain: Chain,
    /// Number of blocks received from each producer.
    pub published: HashMap<Producer, usize>,
    /// Number of blocks discarded.
    pub dropped: usize,
}

/// Single writer of the [`Chain`] and of the fork state.
#[derive(Debug)]
pub struct Arbiter {
    chain: Chain,
    fork: Option<ForkContext>,
    /// Every block received recently, for walking the ancestry of late blocks.
    delivered: HashMap<BlockId, Block>,
    published: HashMap<Producer, usize>,
    dropped: usize,
    view_tx: watch::Sender<ChainView>,
}

impl Arbiter {
    /// Creates an arbiter which takes ownership of `chain`.
    pub fn new(chain: Chain) -> Self {
        let (view_tx, _) = watch::channel(chain.view());

        Arbiter {
            chain,
            fork: None,
            delivered: HashMap::new(),
            published: HashMap::new(),
            dropped: 0,
            view_tx,
        }
    }

    /// Returns a receiver of the [`ChainView`]s published by this arbiter.
    pub fn subscribe(&self) -> watch::Receiver<ChainView> {
        self.view_tx.subscribe()
    }

    #[inline]
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Returns the open fork, if any.
    #[inline]
    pub fn fork(&self) -> Option<&ForkContext> {
        self.fork.as_ref()
    }

    /// Returns the current public state.
    pub fn view(&self) -> ChainView {
        let mut view = self.chain.view();
        view.fork = self.fork.as_ref().map(ForkContext::view);
        view
    }

    /// Receives blocks from both pools until the chain reaches
    /// `target_length` blocks (genesis included), or until both pools stop.
    ///
    /// Neither channel is favored: the channel polled first alternates on
    /// every iteration. When no block is pending the arbiter sleeps for
    /// `poll_interval`.
    pub async fn run(
        mut self,
        mut selfish_rx: mpsc::Receiver<Block>,
        mut honest_rx: mpsc::Receiver<Block>,
        target_length: usize,
        poll_interval: Duration,
    ) -> ArbiterReport {
        let mut honest_first = false;
        let mut logged = self.chain.len() / PROGRESS_INTERVAL;

        while self.chain.len() < target_length {
            let (first, second) = if honest_first {
                (&mut honest_rx, &mut selfish_rx)
            } else {
                (&mut selfish_rx, &mut honest_rx)
            };
            honest_first = !honest_first;

            let received = match first.try_recv() {
                Ok(block) => Some(block),
                Err(first_err) => match second.try_recv() {
                    Ok(block) => Some(block),
                    Err(TryRecvError::Disconnected)
                        if first_err == TryRecvError::Disconnected =>
                    {
                        warn!(
                            len = self.chain.len(),
                            target_length,
                            "both pools stopped before the target length"
                        );
                        break;
                    }
                    Err(_) => None,
                },
            };

            match received {
                Some(block) => {
                    self.process(block);
                }
                None => tokio::time::sleep(poll_interval).await,
            }

            let progress = self.chain.len() / PROGRESS_INTERVAL;
            if progress > logged {
                logged = progress;
                info!(len = self.chain.len(), "chain progress");
                self.prune_delivered();
            }
        }

        self.into_report()
    }

    /// Stops the arbiter, returning the chain and the delivery counts.
    pub fn into_report(self) -> ArbiterReport {
        ArbiterReport {
            chain: self.chain,
            published: self.published,
            dropped: self.dropped,
        }
    }

    /// Decides where `block` belongs and updates the chain accordingly.
    pub fn process(&mut self, block: Block) -> Outcome {
        let (id, depth, producer) = (block.id, block.depth, block.producer);

        *self.published.entry(producer).or_default() += 1;
        self.delivered.insert(id, block.clone());

        let outcome = match self.fork.take() {
            None => self.process_uncontested(block),
            Some(fork) => self.process_contested(fork, block),
        };

        match outcome {
            Outcome::Dropped(DropReason::Late) => {
                self.dropped += 1;
                debug!(%id, depth, %producer, "dropped late block");
            }
            Outcome::Dropped(reason) => {
                self.dropped += 1;
                warn!(%id, depth, %producer, ?reason, "dropped block");
            }
            _ => trace!(%id, depth, %producer, ?outcome, "processed block"),
        }

        self.view_tx.send_replace(self.view());
        outcome
    }

    fn process_uncontested(&mut self, block: Block) -> Outcome {
        let head = self.chain.head().to_ref();

        if block.depth == head.depth + 1 {
            return self.accept(block);
        }

        if block.depth == head.depth && block.producer != head.producer {
            debug!(depth = block.depth, shadow = %block.producer, "fork opened");
            self.fork = Some(ForkContext {
                fork_depth: block.depth,
                origin_side: head.producer,
                shadow_branch: vec![block],
            });
            return Outcome::ForkOpened;
        }

        if block.depth <= head.depth {
            return self.recover_stale(block);
        }

        Outcome::Dropped(DropReason::Gap)
    }

    fn process_contested(&mut self, fork: ForkContext, block: Block) -> Outcome {
        let head = self.chain.head().to_ref();
        let shadow_tip = fork.shadow_tip();
        let extends_shadow = block.parent_id == Some(shadow_tip.id)
            && block.depth == shadow_tip.depth + 1;
        let from_shadow = block.producer == fork.shadow_side();

        if block.depth > head.depth + 1 {
            self.fork = Some(fork);
            return Outcome::Dropped(DropReason::Gap);
        }

        if block.depth == head.depth + 1 {
            if from_shadow && extends_shadow {
                return self.adopt(fork, block);
            }
            if !from_shadow && block.parent_id == Some(head.id) {
                return self.settle_for_origin(fork, block);
            }

            self.fork = Some(fork);
            return Outcome::Dropped(DropReason::WrongParent);
        }

        if !from_shadow {
            self.fork = Some(fork);
            return Outcome::Dropped(DropReason::Late);
        }

        self.fork = Some(fork);
        self.recover_stale(block)
    }

    fn accept(&mut self, block: Block) -> Outcome {
        match self.chain.append_accepted(block) {
            Ok(_) => Outcome::Accepted,
            Err(err) => Outcome::Dropped(DropReason::Rejected(err)),
        }
    }

    /// Replaces the canonical blocks from the fork depth onward with the
    /// shadow branch followed by `block`.
    ///
    /// The chain is left untouched unless the shadow branch and `block` form
    /// a continuous run of depths and parent links from the fork depth.
    fn adopt(&mut self, fork: ForkContext, block: Block) -> Outcome {
        if !fork.is_spliceable(&block) {
            self.fork = Some(fork);
            return Outcome::Dropped(DropReason::WrongParent);
        }

        let ForkContext { fork_depth, mut shadow_branch, .. } = fork;

        let displaced = match self.chain.displace(fork_depth) {
            Ok(displaced) => displaced.len(),
            Err(err) => return Outcome::Dropped(DropReason::Rejected(err)),
        };

        let parent = self.chain.head().id;
        if let Some(first) = shadow_branch.first_mut() {
            if first.parent_id != Some(parent) {
                debug!(id = %first.id, %parent, "re-parenting shadow branch");
                first.parent_id = Some(parent);
            }
        }

        shadow_branch.push(block);
        for shadow in shadow_branch {
            if let Err(err) = self.chain.append_accepted(shadow) {
                warn!(%err, "dropped block while splicing shadow branch");
                self.dropped += 1;
            }
        }

        debug!(fork_depth, displaced, "fork resolved for shadow branch");
        Outcome::Adopted { displaced }
    }

    /// Closes the fork in favor of the canonical branch, which `block`
    /// extends.
    fn settle_for_origin(&mut self, fork: ForkContext, block: Block) -> Outcome {
        let fork_depth = fork.fork_depth;

        // The contested sibling can be credited by `block` itself
        if let Some(first) = fork.shadow_branch.into_iter().next() {
            self.recover_stale(first);
        }

        match self.accept(block) {
            Outcome::Accepted => {
                debug!(fork_depth, "fork resolved for canonical branch");
                Outcome::OriginWon
            }
            outcome => outcome,
        }
    }

    /// Records the closest ancestor of `block` (`block` included) whose
    /// parent is canonical as a stale candidate, following at most
    /// [`STALE_ANCESTOR_LINKS`] parent links.
    fn recover_stale(&mut self, block: Block) -> Outcome {
        let mut current = block;

        for _ in 0..=STALE_ANCESTOR_LINKS {
            if self.in_shadow_branch(current.id) {
                break;
            }

            let parent_canonical = current
                .depth
                .checked_sub(1)
                .and_then(|depth| self.chain.get(depth))
                .is_some_and(|parent| Some(parent.id) == current.parent_id);

            if parent_canonical {
                let registered = self.chain.register_stale(current);
                return Outcome::Stale { registered };
            }

            match current.parent_id.and_then(|id| self.delivered.get(&id)) {
                Some(parent) => current = parent.clone(),
                None => break,
            }
        }

        Outcome::Stale { registered: false }
    }

    fn in_shadow_branch(&self, id: BlockId) -> bool {
        self.fork
            .as_ref()
            .is_some_and(|fork| fork.shadow_branch.iter().any(|b| b.id == id))
    }

    /// Forgets delivered blocks too old to ever become stale candidates.
    fn prune_delivered(&mut self) {
        let horizon = self
            .chain
            .schedule()
            .window
            .saturating_add(STALE_ANCESTOR_LINKS as u64 + 1);
        let head = self.chain.head().depth;

        self.delivered
            .retain(|_, block| block.depth.saturating_add(horizon) >= head);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::reward::aggregate_rewards;

    fn child(parent: &Block, id: u64, producer: Producer) -> Block {
        Block::extending(id.into(), &parent.to_ref(), producer)
    }

    /// Arbiter whose chain holds `n` honest blocks with ids `1..=n`.
    fn arbiter_with(n: u64) -> Arbiter {
        let mut arbiter = Arbiter::new(Chain::default());
        for id in 1..=n {
            let block = child(arbiter.chain().head(), id, Producer::Honest);
            assert_eq!(arbiter.process(block), Outcome::Accepted);
        }
        arbiter
    }

    fn at(arbiter: &Arbiter, depth: u64) -> Block {
        arbiter.chain().get(depth).unwrap().clone()
    }

    fn assert_depths(chain: &Chain) {
        for (i, block) in chain.blocks().iter().enumerate() {
            assert_eq!(block.depth, i as u64);
            if i > 0 {
                assert_eq!(block.parent_id, Some(chain.blocks()[i - 1].id));
            }
        }
    }

    #[test]
    fn sequential_blocks_are_accepted() {
        let arbiter = arbiter_with(3);
        let report = arbiter.into_report();

        assert_eq!(report.chain.len(), 4);
        assert_eq!(report.published[&Producer::Honest], 3);
        assert_eq!(report.dropped, 0);
        assert_depths(&report.chain);
    }

    #[test]
    fn selfish_shadow_branch_overtakes() {
        let mut arbiter = arbiter_with(4);
        let h4 = at(&arbiter, 4);

        let h5 = child(&h4, 5, Producer::Honest);
        assert_eq!(arbiter.process(h5.clone()), Outcome::Accepted);

        let s5 = child(&h4, 50, Producer::Selfish);
        assert_eq!(arbiter.process(s5.clone()), Outcome::ForkOpened);
        assert_eq!(arbiter.chain().head().id, h5.id);

        let fork = arbiter.fork().unwrap();
        assert_eq!(fork.fork_depth, 5);
        assert_eq!(fork.origin_side, Producer::Honest);
        assert_eq!(fork.shadow_side(), Producer::Selfish);

        let s6 = child(&s5, 51, Producer::Selfish);
        assert_eq!(arbiter.process(s6), Outcome::Adopted { displaced: 1 });
        assert!(arbiter.fork().is_none());

        let chain = arbiter.chain();
        assert_eq!(at(&arbiter, 5).id, s5.id);
        assert_eq!(chain.head().uncles, vec![h5.id]);

        let b = chain.schedule().block_reward;
        let uncle = &chain.referenced_stale()[0];
        assert_eq!(uncle.id, h5.id);
        assert_eq!(uncle.reward.uncle, 5.0 / 6.0 * b);
        assert_depths(chain);
    }

    #[test]
    fn canonical_selfish_block_wins_tie() {
        let mut arbiter = arbiter_with(4);
        let h4 = at(&arbiter, 4);

        let s5 = child(&h4, 50, Producer::Selfish);
        assert_eq!(arbiter.process(s5.clone()), Outcome::Accepted);
        let h5 = child(&h4, 5, Producer::Honest);
        assert_eq!(arbiter.process(h5.clone()), Outcome::ForkOpened);

        let s6 = child(&s5, 51, Producer::Selfish);
        assert_eq!(arbiter.process(s6), Outcome::OriginWon);
        assert!(arbiter.fork().is_none());

        let chain = arbiter.chain();
        assert_eq!(chain.head().uncles, vec![h5.id]);
        assert_eq!(
            chain.referenced_stale()[0].reward.uncle,
            5.0 / 6.0 * chain.schedule().block_reward
        );
        assert_depths(chain);
    }

    #[test]
    fn honest_branch_wins_tie() {
        let mut arbiter = arbiter_with(4);
        let h4 = at(&arbiter, 4);

        let h5 = child(&h4, 5, Producer::Honest);
        arbiter.process(h5.clone());
        let s5 = child(&h4, 50, Producer::Selfish);
        arbiter.process(s5.clone());

        let h6 = child(&h5, 6, Producer::Honest);
        assert_eq!(arbiter.process(h6), Outcome::OriginWon);
        assert_eq!(arbiter.chain().head().uncles, vec![s5.id]);

        let tots = aggregate_rewards(arbiter.chain());
        assert!(tots.uncle_selfish > 0.0);
        assert_eq!(tots.mined_selfish, 0.0);
    }

    #[test]
    fn honest_shadow_branch_overtakes() {
        let mut arbiter = arbiter_with(4);
        let h4 = at(&arbiter, 4);

        let s5 = child(&h4, 50, Producer::Selfish);
        arbiter.process(s5.clone());
        let h5 = child(&h4, 5, Producer::Honest);
        arbiter.process(h5.clone());

        let view = arbiter.subscribe().borrow().clone();
        assert_eq!(view.tip_for(Producer::Honest).id, h5.id);
        assert_eq!(view.tip_for(Producer::Selfish).id, s5.id);

        let h6 = child(&h5, 6, Producer::Honest);
        assert_eq!(arbiter.process(h6), Outcome::Adopted { displaced: 1 });
        assert_eq!(arbiter.chain().head().uncles, vec![s5.id]);
        assert_eq!(arbiter.subscribe().borrow().fork, None);
    }

    #[test]
    fn adoption_reparents_shadow_branch() {
        let mut arbiter = arbiter_with(4);
        let h3 = at(&arbiter, 3);
        let h4 = at(&arbiter, 4);

        // Selfish block built on a stale sibling of h4
        let stale = child(&h3, 40, Producer::Selfish);
        let s5 = child(&stale, 50, Producer::Selfish);
        let h5 = child(&h4, 5, Producer::Honest);
        arbiter.process(h5);
        assert_eq!(arbiter.process(s5.clone()), Outcome::ForkOpened);

        let s6 = child(&s5, 51, Producer::Selfish);
        assert_eq!(arbiter.process(s6), Outcome::Adopted { displaced: 1 });
        assert_eq!(at(&arbiter, 5).parent_id, Some(h4.id));
        assert_depths(arbiter.chain());
    }

    #[test]
    fn mismatched_parent_is_dropped() {
        let mut arbiter = arbiter_with(3);
        let h2 = at(&arbiter, 2);

        let mut orphan = child(&h2, 9, Producer::Honest);
        orphan.depth = 4;
        assert_eq!(
            arbiter.process(orphan),
            Outcome::Dropped(DropReason::Rejected(LedgerError::ParentMismatch {
                id: 9.into(),
                head: 3.into()
            }))
        );

        let h3 = at(&arbiter, 3);
        let mut gap = child(&h3, 10, Producer::Honest);
        gap.depth = 6;
        assert_eq!(arbiter.process(gap), Outcome::Dropped(DropReason::Gap));

        let report = arbiter.into_report();
        assert_eq!(report.chain.len(), 4);
        assert_eq!(report.dropped, 2);
    }

    #[test]
    fn fork_survives_invalid_blocks() {
        let mut arbiter = arbiter_with(4);
        let h4 = at(&arbiter, 4);
        let h5 = child(&h4, 5, Producer::Honest);
        arbiter.process(h5.clone());
        let s5 = child(&h4, 50, Producer::Selfish);
        arbiter.process(s5);

        // Selfish block extending the canonical head instead of its branch
        let wrong = child(&h5, 51, Producer::Selfish);
        assert_eq!(
            arbiter.process(wrong),
            Outcome::Dropped(DropReason::WrongParent)
        );

        // Honest sibling of the contested head
        let late = child(&h4, 6, Producer::Honest);
        assert_eq!(arbiter.process(late), Outcome::Dropped(DropReason::Late));

        assert!(arbiter.fork().is_some());
        assert_eq!(arbiter.chain().head().id, h5.id);
    }

    #[test]
    fn malformed_shadow_block_cannot_reorganise() {
        let mut arbiter = arbiter_with(4);
        let h4 = at(&arbiter, 4);
        let h5 = child(&h4, 5, Producer::Honest);
        arbiter.process(h5.clone());
        let s5 = child(&h4, 50, Producer::Selfish);
        assert_eq!(arbiter.process(s5.clone()), Outcome::ForkOpened);

        // Claims s5 as parent but sits at the contested depth
        let mut bad = child(&s5, 51, Producer::Selfish);
        bad.depth = 5;
        assert_eq!(
            arbiter.process(bad.clone()),
            Outcome::Stale { registered: false }
        );
        assert_eq!(arbiter.fork().unwrap().shadow_branch.len(), 1);
        assert_eq!(arbiter.chain().stale_candidates().count(), 0);

        let after_bad = child(&bad, 52, Producer::Selfish);
        assert_eq!(
            arbiter.process(after_bad),
            Outcome::Dropped(DropReason::WrongParent)
        );

        assert!(arbiter.fork().is_some());
        assert_eq!(arbiter.chain().head().id, h5.id);
        assert_eq!(arbiter.chain().len(), 6);
        assert_depths(arbiter.chain());

        // The well-formed shadow branch still settles the fork
        let s6 = child(&s5, 53, Producer::Selfish);
        assert_eq!(arbiter.process(s6), Outcome::Adopted { displaced: 1 });
        assert_eq!(at(&arbiter, 5).id, s5.id);
    }

    #[test]
    fn shadow_branch_must_be_continuous_to_splice() {
        let chain = Chain::default();
        let genesis = chain.head().clone();
        let s1 = child(&genesis, 10, Producer::Selfish);
        let s2 = child(&s1, 11, Producer::Selfish);

        let fork = ForkContext {
            fork_depth: 1,
            origin_side: Producer::Honest,
            shadow_branch: vec![s1.clone()],
        };
        assert!(fork.is_spliceable(&s2));

        let mut skipped = s2.clone();
        skipped.depth = 3;
        assert!(!fork.is_spliceable(&skipped));

        let mut same_depth = s1.clone();
        same_depth.id = 12.into();
        same_depth.depth = 1;
        same_depth.parent_id = Some(s1.id);
        let broken = ForkContext {
            shadow_branch: vec![s1, same_depth],
            ..fork.clone()
        };
        assert!(!broken.is_spliceable(&s2));

        let misplaced = ForkContext { fork_depth: 2, ..fork };
        assert!(!misplaced.is_spliceable(&s2));
    }

    #[test]
    fn late_block_becomes_stale_candidate() {
        let mut arbiter = arbiter_with(6);
        let h2 = at(&arbiter, 2);

        let late = child(&h2, 30, Producer::Selfish);
        assert_eq!(
            arbiter.process(late.clone()),
            Outcome::Stale { registered: true }
        );

        let h6 = at(&arbiter, 6);
        arbiter.process(child(&h6, 7, Producer::Honest));

        let chain = arbiter.chain();
        assert_eq!(chain.head().uncles, vec![late.id]);
        assert_eq!(
            chain.referenced_stale()[0].reward.uncle,
            2.0 / 6.0 * chain.schedule().block_reward
        );
    }

    #[test]
    fn same_side_sibling_is_not_a_fork() {
        let mut arbiter = arbiter_with(3);
        let h2 = at(&arbiter, 2);

        let sibling = child(&h2, 30, Producer::Honest);
        assert_eq!(
            arbiter.process(sibling),
            Outcome::Stale { registered: true }
        );
        assert!(arbiter.fork().is_none());
    }

    #[test]
    fn stale_recovery_walks_ancestors() {
        let mut arbiter = arbiter_with(4);
        let h2 = at(&arbiter, 2);

        let x3 = child(&h2, 30, Producer::Selfish);
        let y3 = child(&h2, 31, Producer::Selfish);
        assert_eq!(arbiter.process(x3), Outcome::Stale { registered: true });
        assert_eq!(arbiter.process(y3.clone()), Outcome::Stale { registered: false });

        // x3 is referenced, freeing depth 3 for y3
        let h4 = at(&arbiter, 4);
        arbiter.process(child(&h4, 5, Producer::Honest));

        let z4 = child(&y3, 32, Producer::Selfish);
        assert_eq!(arbiter.process(z4), Outcome::Stale { registered: true });

        let candidates: Vec<_> =
            arbiter.chain().stale_candidates().map(|b| b.id).collect();
        assert_eq!(candidates, vec![y3.id]);
    }

    #[test]
    fn lost_race_is_not_referenced_twice() {
        let mut arbiter = arbiter_with(3);
        let h2 = at(&arbiter, 2);
        let h3 = at(&arbiter, 3);

        let s3 = child(&h2, 30, Producer::Selfish);
        assert_eq!(arbiter.process(s3.clone()), Outcome::ForkOpened);
        let h4 = child(&h3, 4, Producer::Honest);
        assert_eq!(arbiter.process(h4.clone()), Outcome::OriginWon);

        // Selfish pool keeps mining on its lost block
        let s4 = child(&s3, 40, Producer::Selfish);
        assert_eq!(arbiter.process(s4), Outcome::ForkOpened);
        let h5 = child(&h4, 5, Producer::Honest);
        assert_eq!(arbiter.process(h5), Outcome::OriginWon);

        let chain = arbiter.chain();
        let referenced: Vec<_> =
            chain.referenced_stale().iter().map(|b| b.id).collect();
        assert_eq!(referenced, vec![s3.id]);
        assert_eq!(chain.stale_candidates().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_at_target_length() {
        let arbiter = Arbiter::new(Chain::default());
        let (selfish_tx, selfish_rx) = mpsc::channel(1);
        let (honest_tx, honest_rx) = mpsc::channel(1);

        let feeder = tokio::spawn(async move {
            let mut parent = Block::genesis();
            for id in 1..=5 {
                let block = child(&parent, id, Producer::Honest);
                parent = block.clone();
                if honest_tx.send(block).await.is_err() {
                    break;
                }
            }
            drop(selfish_tx);
        });

        let report = arbiter
            .run(selfish_rx, honest_rx, 4, Duration::from_millis(50))
            .await;
        feeder.abort();

        assert_eq!(report.chain.len(), 4);
        assert_depths(&report.chain);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_pools_disconnect() {
        let arbiter = Arbiter::new(Chain::default());
        let (selfish_tx, selfish_rx) = mpsc::channel(1);
        let (honest_tx, honest_rx) = mpsc::channel(1);
        drop(selfish_tx);
        drop(honest_tx);

        let report = arbiter
            .run(selfish_rx, honest_rx, 10, Duration::from_millis(50))
            .await;

        assert_eq!(report.chain.len(), 1);
    }
}
