//! Fitness evaluation with per-session budget enforcement.
//!
//! Every evaluation reserves budget before it starts. A reservation is
//! refused when `consumed + reserved + estimated_cost > budget`, where the
//! estimate is the largest cost reported so far in the run.
//!
//! Concurrency ramps up like a slow start. Until a cost has been observed,
//! evaluations run one at a time. Each evaluation that costs no more than its
//! reservation widens the window by one, and an evaluation that costs more
//! collapses it back to one, so rising costs fall back to serial evaluation.

use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::errors::{OptimizationError, OptimizationResult};
use crate::domain::models::{Genome, ScoredGenome};
use crate::domain::ports::PromptModule;

#[derive(Debug)]
struct LedgerState {
    consumed: f64,
    reserved: f64,
    max_observed_cost: Option<f64>,
    window: usize,
}

/// Running total of evaluation cost for one run.
#[derive(Debug)]
pub struct BudgetLedger {
    budget: f64,
    state: Mutex<LedgerState>,
}

/// Budget set aside for one in-flight evaluation.
#[derive(Debug)]
#[must_use]
pub struct Reservation {
    amount: f64,
    calibrated: bool,
}

impl BudgetLedger {
    /// Create a ledger; `consumed` carries spending already recorded on the session.
    pub const fn new(budget: f64, consumed: f64) -> Self {
        Self {
            budget,
            state: Mutex::new(LedgerState {
                consumed,
                reserved: 0.0,
                max_observed_cost: None,
                window: 1,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn consumed(&self) -> f64 {
        self.lock().consumed
    }

    /// Evaluations that may be in flight at once, never more than `cap`.
    pub fn concurrency_window(&self, cap: usize) -> usize {
        let state = self.lock();
        if state.max_observed_cost.is_none() {
            1
        } else {
            state.window.clamp(1, cap.max(1))
        }
    }

    /// Reserve budget for the next evaluation.
    ///
    /// # Errors
    /// `BudgetExhausted` when the next evaluation would exceed the budget.
    pub fn try_reserve(&self) -> OptimizationResult<Reservation> {
        let mut state = self.lock();
        let estimate = state.max_observed_cost.unwrap_or(0.0);
        let committed = state.consumed + state.reserved;

        if committed >= self.budget || committed + estimate > self.budget {
            return Err(OptimizationError::BudgetExhausted {
                consumed: state.consumed,
                budget: self.budget,
            });
        }

        state.reserved += estimate;
        Ok(Reservation {
            amount: estimate,
            calibrated: state.max_observed_cost.is_some(),
        })
    }

    /// Replace a reservation by the cost the evaluation actually reported.
    pub fn settle(&self, reservation: Reservation, cost: f64) {
        let cost = if cost.is_finite() && cost > 0.0 {
            cost
        } else {
            0.0
        };
        let mut state = self.lock();
        state.reserved = (state.reserved - reservation.amount).max(0.0);
        state.consumed += cost;
        state.max_observed_cost = Some(state.max_observed_cost.map_or(cost, |max| max.max(cost)));

        if cost > reservation.amount {
            state.window = 1;
        } else if reservation.calibrated {
            state.window = state.window.saturating_add(1);
        }
    }

    /// Drop a reservation without recording any cost.
    pub fn release(&self, reservation: Reservation) {
        let mut state = self.lock();
        state.reserved = (state.reserved - reservation.amount).max(0.0);
    }
}

/// Scores of one population plus budget bookkeeping.
#[derive(Debug)]
pub struct EvaluationBatch {
    /// One entry per input genome, in input order
    pub scored: Vec<ScoredGenome>,
    /// Evaluations that were started
    pub evaluations: usize,
    /// True when at least one genome was skipped for lack of budget
    pub budget_exhausted: bool,
}

/// Scores genomes through a module's evaluation capability.
pub struct FitnessEvaluator {
    module: Arc<dyn PromptModule>,
    ledger: Arc<BudgetLedger>,
    max_concurrency: usize,
}

impl FitnessEvaluator {
    pub fn new(module: Arc<dyn PromptModule>, ledger: Arc<BudgetLedger>, max_concurrency: usize) -> Self {
        Self {
            module,
            ledger,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Score a single genome.
    ///
    /// # Errors
    /// - `BudgetExhausted` if the evaluation would exceed the budget
    /// - `EvaluationError` if the capability fails
    pub async fn evaluate(&self, genome: Genome) -> OptimizationResult<ScoredGenome> {
        let reservation = self.ledger.try_reserve()?;
        score_genome(self.module.as_ref(), &self.ledger, reservation, genome).await
    }

    /// Score a population with at most `max_concurrency` evaluations in flight.
    ///
    /// A failed evaluation yields a `Failed` genome with the worst fitness.
    /// Once the budget is exhausted the remaining genomes are `Skipped`.
    pub async fn evaluate_population(&self, genomes: Vec<Genome>) -> EvaluationBatch {
        let total = genomes.len();
        let mut slots: Vec<Option<ScoredGenome>> = vec![None; total];
        let mut submitted: Vec<Option<Genome>> = vec![None; total];
        let mut running: FuturesUnordered<JoinHandle<(usize, ScoredGenome)>> = FuturesUnordered::new();
        let mut evaluations = 0;
        let mut budget_exhausted = false;

        let mut pending = genomes.into_iter().enumerate();
        while let Some((idx, genome)) = pending.next() {
            while running.len() >= self.ledger.concurrency_window(self.max_concurrency) {
                collect_next(&mut running, &mut slots).await;
            }

            let reservation = match self.ledger.try_reserve() {
                Ok(reservation) => reservation,
                Err(err) => {
                    debug!(error = %err, genome_index = idx, "stopping evaluations");
                    slots[idx] = Some(ScoredGenome::skipped(genome));
                    budget_exhausted = true;
                    break;
                }
            };

            evaluations += 1;
            submitted[idx] = Some(genome.clone());
            let module = Arc::clone(&self.module);
            let ledger = Arc::clone(&self.ledger);
            running.push(tokio::spawn(async move {
                let scored = match score_genome(module.as_ref(), &ledger, reservation, genome.clone()).await {
                    Ok(scored) => scored,
                    Err(err) => {
                        warn!(error = %err, "genome evaluation failed, assigning worst fitness");
                        ScoredGenome::failed(genome)
                    }
                };
                (idx, scored)
            }));
        }

        for (idx, genome) in pending {
            slots[idx] = Some(ScoredGenome::skipped(genome));
        }
        while !running.is_empty() {
            collect_next(&mut running, &mut slots).await;
        }

        // Aborted tasks never reported back
        let scored = slots
            .into_iter()
            .zip(submitted)
            .filter_map(|(slot, genome)| slot.or_else(|| genome.map(ScoredGenome::failed)))
            .collect();

        EvaluationBatch {
            scored,
            evaluations,
            budget_exhausted,
        }
    }
}

async fn collect_next(
    running: &mut FuturesUnordered<JoinHandle<(usize, ScoredGenome)>>,
    slots: &mut [Option<ScoredGenome>],
) {
    match running.next().await {
        Some(Ok((idx, scored))) => slots[idx] = Some(scored),
        Some(Err(err)) => warn!(error = %err, "evaluation task aborted"),
        None => {}
    }
}

async fn score_genome(
    module: &dyn PromptModule,
    ledger: &BudgetLedger,
    reservation: Reservation,
    genome: Genome,
) -> OptimizationResult<ScoredGenome> {
    match module.evaluate(&genome).await {
        Ok(evaluation) if evaluation.score.is_finite() => {
            ledger.settle(reservation, evaluation.cost);
            Ok(ScoredGenome::scored(genome, evaluation.score, evaluation.cost))
        }
        Ok(evaluation) => {
            ledger.settle(reservation, evaluation.cost);
            Err(OptimizationError::EvaluationError(format!(
                "non-finite score {}",
                evaluation.score
            )))
        }
        Err(err) => {
            ledger.release(reservation);
            Err(OptimizationError::EvaluationError(err.to_string()))
        }
    }
}
