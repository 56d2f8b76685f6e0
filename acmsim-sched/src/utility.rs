//! Greedy filling by marginal utility.
//!
//! For each candidate MODCOD the frame is filled queue by queue: the eligible
//! queue with the steepest utility derivative whose head still fits goes
//! first and gives as many packets as fit, then the next one, until nothing
//! fits. Ties between queues are broken at random. The best frame across
//! MODCODs wins.

use rand::Rng;
use tracing::debug;

use crate::acm::{ScheduleContext, ScheduleStrategy};
use crate::error::ScheduleError;
use crate::plan::FillPlan;
use acmsim_core::queue::PduQueue;
use acmsim_link::ModcodId;

#[derive(Debug, Default, Clone)]
pub struct UtilityGreedy {
    decisions: u64,
}

impl UtilityGreedy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of plans computed since the last reset.
    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    /// Greedy plan for a frame of `frame`.
    pub fn fill(&self, ctx: &mut ScheduleContext<'_>, frame: ModcodId) -> FillPlan {
        let capacity = ctx.capacity(frame);
        let mut plan = ctx.plan(frame);
        let mut candidates = ctx.eligible(frame);

        loop {
            let fitting = candidates
                .iter()
                .enumerate()
                .filter(|(_, (m, q))| {
                    let next = plan.count(*m, *q) + 1;
                    ctx.queues
                        .queue(*m, *q)
                        .size_of(next)
                        .is_some_and(|size| plan.fits(size, capacity))
                })
                .map(|(i, (m, q))| (i, ctx.qos.derivative(*m, *q)))
                .collect::<Vec<_>>();
            let Some(steepest) = fitting.iter().map(|(_, d)| *d).reduce(f64::max) else {
                break;
            };
            let ties = fitting
                .iter()
                .filter(|(_, d)| *d == steepest)
                .map(|(i, _)| *i)
                .collect::<Vec<_>>();
            let chosen = ties[ctx.rng.random_range(0..ties.len())];
            let (m, q) = candidates.swap_remove(chosen);

            let queue = ctx.queues.queue(m, q);
            while let Some(size) = queue.size_of(plan.count(m, q) + 1) {
                if !plan.fits(size, capacity) {
                    break;
                }
                plan.add(m, q, size, size as f64 * 8.0 * steepest);
            }
            plan.set_choice_count(plan.choice_count() + ties.len() as u32 - 1);
        }
        plan
    }
}

impl ScheduleStrategy for UtilityGreedy {
    fn name(&self) -> &'static str {
        "utility"
    }

    fn schedule(
        &mut self,
        ctx: &mut ScheduleContext<'_>,
    ) -> Result<Option<FillPlan>, ScheduleError> {
        let modcods = ctx.modcods;
        let mut best: Option<FillPlan> = None;
        for frame in modcods.ids() {
            let plan = self.fill(ctx, frame);
            if plan.is_empty() {
                continue;
            }
            if best.as_ref().map_or(true, |b| plan.better_than(b)) {
                best = Some(plan);
            }
        }
        self.decisions += 1;
        if let Some(plan) = &best {
            debug!(
                modcod = ?plan.modcod(),
                volume = plan.volume(),
                interest = plan.interest(),
                "utility plan"
            );
        }
        Ok(best)
    }

    fn on_reset(&mut self) {
        self.decisions = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acm::tests::{fill, two_modcods};
    use crate::acm::{AcmConfig, AcmCore};
    use crate::qos::{QosDescriptor, UtilityKind};

    fn core(downgrade: bool) -> AcmCore {
        AcmCore::new(
            two_modcods(),
            AcmConfig {
                nb_qos: 2,
                downgrade,
                ..AcmConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn steepest_queue_goes_first() {
        let mut core = core(false);
        fill(&mut core, 0, 0, &[1000, 1000]);
        fill(&mut core, 0, 1, &[800, 800]);
        let mut qos = core.qos().clone();
        qos.set(ModcodId::new(0), 1, QosDescriptor::new(UtilityKind::Linear, 3.0, 0.0));
        let mut rng = rand::SeedableRng::seed_from_u64(0);
        let mut ctx = ScheduleContext {
            now: 0.0,
            modcods: core.modcods(),
            queues: core.queues(),
            qos: &qos,
            rng: &mut rng,
            downgrade: false,
        };

        let plan = UtilityGreedy::new().fill(&mut ctx, ModcodId::new(0));
        // Both 800-byte packets of the steeper queue, then nothing else fits.
        assert_eq!(plan.count(ModcodId::new(0), 1), 2);
        assert_eq!(plan.count(ModcodId::new(0), 0), 0);
        assert_eq!(plan.volume(), 1600);
        assert_eq!(plan.interest(), 1600.0 * 8.0 * 3.0);
    }

    #[test]
    fn plans_never_exceed_capacity() {
        let mut core = core(true);
        fill(&mut core, 0, 0, &[64, 64, 1500]);
        fill(&mut core, 0, 1, &[1500, 1500, 64]);
        fill(&mut core, 1, 0, &[1500, 64, 1500]);
        fill(&mut core, 1, 1, &[64, 1500, 64]);
        let mut strategy = UtilityGreedy::new();
        let mut ctx = core.context(0.0);
        for frame in ctx.modcods.ids().collect::<Vec<_>>() {
            let plan = strategy.fill(&mut ctx, frame);
            assert!(plan.volume() <= ctx.capacity(frame));
            assert!(!plan.is_empty());
        }
        // Both fast queues give more than the robust frame can hold.
        let best = strategy.schedule(&mut ctx).unwrap().unwrap();
        assert_eq!(best.modcod(), Some(ModcodId::new(1)));
        assert!(best.volume() >= 3128);
        assert_eq!(strategy.decisions(), 1);
    }

    #[test]
    fn empty_queues_give_no_plan() {
        let mut core = core(true);
        let plan = UtilityGreedy::new().schedule(&mut core.context(0.0)).unwrap();
        assert!(plan.is_none());
    }
}
