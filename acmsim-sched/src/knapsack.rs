//! ## acmsim-sched::knapsack
//! **Knapsack frame filling**
//!
//! A state is a candidate frame content: how many head packets of each
//! eligible queue it takes, its volume and its interest. The search starts
//! from the empty state and expands states by increasing volume, each
//! expansion adding the next packet of one queue if it still fits.
//!
//! - [`KnapsackMode::Exhaustive`] keeps one state per composition, so every
//!   feasible composition is visited and the result is optimal.
//! - [`KnapsackMode::Bounded`] keeps one state per volume. A later state with
//!   the same volume replaces it only if its interest is higher; equal
//!   interests bump the `choice_count` of the kept state.
//!
//! Both modes stop with [`ScheduleError::CapacityExceeded`] once the state
//! table would grow past `max_states`.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::acm::{ScheduleContext, ScheduleStrategy};
use crate::error::ScheduleError;
use crate::plan::FillPlan;
use acmsim_core::queue::PduQueue;
use acmsim_link::ModcodId;

/// Default bound of the state table.
pub const DEFAULT_MAX_STATES: usize = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KnapsackMode {
    #[default]
    Exhaustive,
    Bounded,
}

/// Counters of the last `schedule` call, summed over MODCODs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStats {
    pub states: usize,
    pub expanded: usize,
    pub ties: u32,
}

#[derive(Debug, Clone)]
struct State {
    counts: Vec<usize>,
    volume: usize,
    interest: f64,
    choice_count: u32,
    visited: bool,
}

impl State {
    fn better_than(&self, other: &State) -> bool {
        self.interest > other.interest
            || (self.interest == other.interest && self.volume > other.volume)
    }
}

/// Outcome of one search: every state kept and the index of the best one.
struct Search {
    eligible: Vec<(ModcodId, usize)>,
    states: Vec<State>,
    best: usize,
}

#[derive(Debug, Clone)]
pub struct Knapsack {
    mode: KnapsackMode,
    max_states: usize,
    last: SearchStats,
}

impl Knapsack {
    pub fn new(mode: KnapsackMode, max_states: usize) -> Result<Self, ScheduleError> {
        if max_states == 0 {
            return Err(ScheduleError::InvalidConfiguration(
                "knapsack state table cannot be empty".into(),
            ));
        }
        Ok(Self {
            mode,
            max_states,
            last: SearchStats::default(),
        })
    }

    pub fn mode(&self) -> KnapsackMode {
        self.mode
    }

    pub fn last_search(&self) -> &SearchStats {
        &self.last
    }

    /// Best plan for a frame of `frame`, `None` if nothing fits.
    pub fn solve_for(
        &mut self,
        ctx: &ScheduleContext<'_>,
        frame: ModcodId,
    ) -> Result<Option<FillPlan>, ScheduleError> {
        let search = self.search(ctx, frame)?;
        self.last.states += search.states.len();
        self.last.expanded += search.states.iter().filter(|s| s.visited).count();
        self.last.ties += search.states.iter().map(|s| s.choice_count).sum::<u32>();

        let best = &search.states[search.best];
        if best.volume == 0 {
            return Ok(None);
        }
        let mut plan = ctx.plan(frame);
        for ((m, q), count) in search.eligible.iter().zip(&best.counts) {
            let queue = ctx.queues.queue(*m, *q);
            let derivative = ctx.qos.derivative(*m, *q);
            for nth in 1..=*count {
                if let Some(size) = queue.size_of(nth) {
                    plan.add(*m, *q, size, size as f64 * 8.0 * derivative);
                }
            }
        }
        plan.set_choice_count(best.choice_count);
        plan.mark_visited();
        Ok(Some(plan))
    }

    fn search(&self, ctx: &ScheduleContext<'_>, frame: ModcodId) -> Result<Search, ScheduleError> {
        let capacity = ctx.capacity(frame);
        let eligible = ctx
            .eligible(frame)
            .into_iter()
            .filter(|(m, q)| !ctx.queues.queue(*m, *q).is_empty())
            .collect::<Vec<_>>();
        let derivatives = eligible
            .iter()
            .map(|(m, q)| ctx.qos.derivative(*m, *q))
            .collect::<Vec<_>>();

        let empty = State {
            counts: vec![0; eligible.len()],
            volume: 0,
            interest: 0.0,
            choice_count: 0,
            visited: false,
        };
        let mut by_counts = HashMap::new();
        let mut by_volume = HashMap::new();
        match self.mode {
            KnapsackMode::Exhaustive => by_counts.insert(empty.counts.clone(), 0),
            KnapsackMode::Bounded => by_volume.insert(0, 0),
        };
        let mut states = vec![empty];
        let mut frontier = BTreeSet::from([(0usize, 0usize)]);
        let mut best = 0;

        while let Some((volume, current)) = frontier.pop_first() {
            states[current].visited = true;
            for (e, (m, q)) in eligible.iter().enumerate() {
                let next = states[current].counts[e] + 1;
                let Some(size) = ctx.queues.queue(*m, *q).size_of(next) else {
                    continue;
                };
                if volume + size > capacity {
                    continue;
                }
                let mut counts = states[current].counts.clone();
                counts[e] += 1;
                let interest = states[current].interest + size as f64 * 8.0 * derivatives[e];
                let volume = volume + size;

                let existing = match self.mode {
                    KnapsackMode::Exhaustive if by_counts.contains_key(&counts) => continue,
                    KnapsackMode::Exhaustive => None,
                    KnapsackMode::Bounded => by_volume.get(&volume).copied(),
                };
                let target = match existing {
                    Some(slot) => {
                        let state: &mut State = &mut states[slot];
                        debug_assert!(!state.visited, "volume {volume} already expanded");
                        if interest > state.interest {
                            state.counts = counts;
                            state.interest = interest;
                        } else if interest == state.interest {
                            state.choice_count += 1;
                        }
                        slot
                    }
                    None => {
                        if states.len() >= self.max_states {
                            return Err(ScheduleError::CapacityExceeded {
                                modcod: frame,
                                limit: self.max_states,
                            });
                        }
                        let slot = states.len();
                        match self.mode {
                            KnapsackMode::Exhaustive => by_counts.insert(counts.clone(), slot),
                            KnapsackMode::Bounded => by_volume.insert(volume, slot),
                        };
                        frontier.insert((volume, slot));
                        states.push(State {
                            counts,
                            volume,
                            interest,
                            choice_count: 0,
                            visited: false,
                        });
                        slot
                    }
                };
                if states[target].better_than(&states[best]) {
                    best = target;
                }
            }
        }

        Ok(Search {
            eligible,
            states,
            best,
        })
    }
}

impl Default for Knapsack {
    fn default() -> Self {
        Self {
            mode: KnapsackMode::default(),
            max_states: DEFAULT_MAX_STATES,
            last: SearchStats::default(),
        }
    }
}

impl ScheduleStrategy for Knapsack {
    fn name(&self) -> &'static str {
        match self.mode {
            KnapsackMode::Exhaustive => "knapsack",
            KnapsackMode::Bounded => "knapsack-bounded",
        }
    }

    fn schedule(
        &mut self,
        ctx: &mut ScheduleContext<'_>,
    ) -> Result<Option<FillPlan>, ScheduleError> {
        self.last = SearchStats::default();
        let modcods = ctx.modcods;
        let mut best: Option<FillPlan> = None;
        for frame in modcods.ids() {
            let Some(plan) = self.solve_for(ctx, frame)? else {
                continue;
            };
            if best.as_ref().map_or(true, |b| plan.better_than(b)) {
                best = Some(plan);
            }
        }
        if let Some(plan) = &best {
            debug!(
                modcod = ?plan.modcod(),
                volume = plan.volume(),
                interest = plan.interest(),
                states = self.last.states,
                "knapsack plan"
            );
        }
        Ok(best)
    }

    fn on_reset(&mut self) {
        self.last = SearchStats::default();
    }
}
