//! Genetic operators: tournament selection, per-parameter crossover,
//! reflection-driven mutation and elitism.
//!
//! All random decisions come from one seeded [`StdRng`] and are drawn in a
//! fixed order, so a run is reproducible for a given seed even though the
//! reflection calls of a generation execute concurrently.

use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::models::{
    truncate_prompt, Generation, Genome, OptimizationConfig, ScoredGenome,
};
use crate::domain::ports::PromptModule;

/// Members of the next generation: carried-over elites plus offspring that
/// still need scoring.
#[derive(Debug, Clone, Default)]
pub struct Population {
    pub elites: Vec<ScoredGenome>,
    pub offspring: Vec<Genome>,
}

impl Population {
    /// Unscored seed genomes for generation 0.
    pub fn seeded(genomes: Vec<Genome>) -> Self {
        Self {
            elites: Vec::new(),
            offspring: genomes,
        }
    }

    pub fn len(&self) -> usize {
        self.elites.len() + self.offspring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Directive handed to the reflection capability for every mutation.
pub fn mutation_directive(best_fitness: f64) -> String {
    format!(
        "Rewrite this prompt so the module scores higher on its task. Keep the original \
         intent, make the instructions clearer and more specific, and reply with the \
         improved prompt only. Best fitness so far: {best_fitness:.4}."
    )
}

pub struct GeneticOperators {
    config: OptimizationConfig,
    rng: StdRng,
}

impl GeneticOperators {
    /// Operators with a seeded RNG, or an entropy-seeded one when `seed` is `None`.
    pub fn new(config: OptimizationConfig, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self { config, rng }
    }

    /// Tournament selection; returns the index of the winner in `population`.
    ///
    /// Samples `tournament_size` distinct individuals and returns the fittest,
    /// the first sampled one winning ties.
    pub fn select_parent(&mut self, population: &[ScoredGenome]) -> usize {
        if population.is_empty() {
            return 0;
        }
        let size = self.config.tournament_size.clamp(1, population.len());
        let sampled = index::sample(&mut self.rng, population.len(), size);

        let mut winner: Option<usize> = None;
        for idx in sampled.iter() {
            match winner {
                Some(best) if population[best].fitness >= population[idx].fitness => {}
                _ => winner = Some(idx),
            }
        }
        winner.unwrap_or(0)
    }

    /// Recombine two parents. With probability `crossover_rate` every
    /// parameter is inherited from a parent chosen uniformly at random;
    /// otherwise the children are copies of their parents.
    pub fn crossover(&mut self, first: &Genome, second: &Genome) -> (Genome, Genome) {
        if !self.rng.gen_bool(self.config.crossover_rate) {
            return (first.clone(), second.clone());
        }

        let mut ids: Vec<Uuid> = first.parameter_ids().chain(second.parameter_ids()).copied().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut child_a = Genome::new();
        let mut child_b = Genome::new();
        for id in ids {
            let from_first = first.get(&id).or_else(|| second.get(&id)).unwrap_or_default();
            let from_second = second.get(&id).or_else(|| first.get(&id)).unwrap_or_default();

            if self.rng.gen_bool(0.5) {
                child_a.set(id, from_first.to_string());
                child_b.set(id, from_second.to_string());
            } else {
                child_a.set(id, from_second.to_string());
                child_b.set(id, from_first.to_string());
            }
        }
        (child_a, child_b)
    }

    /// The `elitism_count` fittest individuals, ties kept in population order.
    pub fn elites(&self, generation: &Generation) -> Vec<ScoredGenome> {
        generation
            .ranked()
            .into_iter()
            .take(self.config.elitism_count)
            .cloned()
            .collect()
    }

    /// Produce exactly `count` children by selection and crossover.
    pub fn breed(&mut self, generation: &Generation, count: usize) -> Vec<Genome> {
        let individuals = &generation.individuals;
        let mut offspring = Vec::with_capacity(count);
        if individuals.is_empty() {
            return offspring;
        }

        while offspring.len() < count {
            let first = self.select_parent(individuals);
            let second = self.select_parent(individuals);
            let (child_a, child_b) =
                self.crossover(&individuals[first].genome, &individuals[second].genome);
            offspring.push(child_a);
            if offspring.len() < count {
                offspring.push(child_b);
            }
        }
        offspring
    }

    /// Decide which `(child, parameter)` pairs get rewritten.
    pub fn plan_mutations(&mut self, offspring: &[Genome]) -> Vec<(usize, Uuid)> {
        let mut plan = Vec::new();
        for (child_idx, child) in offspring.iter().enumerate() {
            for id in child.parameter_ids() {
                if self.rng.gen_bool(self.config.mutation_rate) {
                    plan.push((child_idx, *id));
                }
            }
        }
        plan
    }

    /// Apply planned rewrites through the module's reflection capability.
    ///
    /// At most `concurrency` rewrites are in flight. A failed rewrite leaves the
    /// parameter's text unchanged. Returns the number of successful rewrites.
    pub async fn mutate(
        &self,
        module: &dyn PromptModule,
        offspring: &mut [Genome],
        plan: Vec<(usize, Uuid)>,
        directive: &str,
        concurrency: usize,
    ) -> usize {
        let requests: Vec<(usize, Uuid, String)> = plan
            .into_iter()
            .filter_map(|(child_idx, id)| {
                offspring
                    .get(child_idx)
                    .and_then(|child| child.get(&id))
                    .map(|text| (child_idx, id, text.to_string()))
            })
            .collect();

        let max_len = self.config.max_prompt_length;
        let results: Vec<(usize, Uuid, Option<String>)> = stream::iter(requests)
            .map(|(child_idx, id, text)| async move {
                match module.rewrite(&text, directive).await {
                    Ok(rewritten) => (child_idx, id, Some(truncate_prompt(&rewritten, max_len))),
                    Err(err) => {
                        warn!(parameter_id = %id, error = %err, "reflection failed, keeping parent text");
                        (child_idx, id, None)
                    }
                }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let mut applied = 0;
        for (child_idx, id, rewritten) in results {
            if let (Some(text), Some(child)) = (rewritten, offspring.get_mut(child_idx)) {
                child.set(id, text);
                applied += 1;
            }
        }
        applied
    }

    /// Build the next population: elites first, then `population_size - elites`
    /// mutated offspring.
    pub async fn next_population(
        &mut self,
        generation: &Generation,
        module: &dyn PromptModule,
        concurrency: usize,
    ) -> Population {
        let elites = self.elites(generation);
        let count = self.config.population_size.saturating_sub(elites.len());
        let mut offspring = self.breed(generation, count);

        let plan = self.plan_mutations(&offspring);
        let planned = plan.len();
        let directive = mutation_directive(generation.best_fitness);
        let applied = self
            .mutate(module, &mut offspring, plan, &directive, concurrency)
            .await;

        debug!(
            generation = generation.index,
            elites = elites.len(),
            offspring = offspring.len(),
            mutations_planned = planned,
            mutations_applied = applied,
            "bred next population"
        );

        Population { elites, offspring }
    }
}
