use rand::Rng;
use rand::seq::SliceRandom;

use super::Network;
use crate::config::MlpSettings;

/// One training example: flattened input and target output index.
#[derive(Debug, Clone)]
pub struct Example {
    pub input: Vec<f64>,
    pub target: usize,
}

/// Why backpropagation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TotalError,
    IndividualError,
    MaxIterations,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingOutcome {
    pub epochs: usize,
    pub mean_squared_error: f64,
    pub stop: StopReason,
}

/// Repeat the examples of smaller classes cyclically until every class has
/// as many examples as the largest.
pub fn balance(examples: Vec<Example>, outputs: usize) -> Vec<Example> {
    let mut by_class: Vec<Vec<Example>> = vec![Vec::new(); outputs];
    for example in examples {
        if example.target < outputs {
            by_class[example.target].push(example);
        }
    }
    let largest = by_class.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = Vec::with_capacity(largest * outputs);
    for members in by_class.iter().filter(|members| !members.is_empty()) {
        out.extend(members.iter().cycle().take(largest).cloned());
    }
    out
}

/// Online backpropagation with momentum until one stopping criterion holds.
pub fn backpropagate<R: Rng>(
    network: &mut Network,
    examples: &[Example],
    settings: &MlpSettings,
    rng: &mut R,
) -> TrainingOutcome {
    let outputs = network.output_units();
    let mut order: Vec<usize> = (0..examples.len()).collect();
    let mut target = vec![0.0; outputs];
    let mut mse = f64::INFINITY;
    for epoch in 1..=settings.max_iterations {
        order.shuffle(rng);
        let mut squared = 0.0;
        let mut worst = 0.0f64;
        for &idx in &order {
            let example = &examples[idx];
            target.fill(0.0);
            target[example.target] = 1.0;
            let errors = network.train_sample(
                &example.input,
                &target,
                settings.learning_rate,
                settings.momentum,
            );
            for error in errors {
                squared += error * error;
                worst = worst.max(error.abs());
            }
        }
        mse = squared / (examples.len() * outputs).max(1) as f64;
        if epoch % 100 == 0 {
            tracing::debug!("Epoch {epoch}: mse {mse:.6}, worst error {worst:.6}");
        }
        if mse < settings.total_error {
            return TrainingOutcome {
                epochs: epoch,
                mean_squared_error: mse,
                stop: StopReason::TotalError,
            };
        }
        if worst < settings.individual_error {
            return TrainingOutcome {
                epochs: epoch,
                mean_squared_error: mse,
                stop: StopReason::IndividualError,
            };
        }
    }
    TrainingOutcome {
        epochs: settings.max_iterations,
        mean_squared_error: mse,
        stop: StopReason::MaxIterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn example(target: usize, x: f64) -> Example {
        Example {
            input: vec![x],
            target,
        }
    }

    #[test]
    fn balancing_oversamples_cyclically() {
        let examples = vec![example(0, 0.0), example(0, 0.1), example(0, 0.2), example(2, 9.0), example(2, 8.0)];
        let balanced = balance(examples, 3);
        assert_eq!(balanced.len(), 6);
        let inputs: Vec<f64> = balanced.iter().filter(|e| e.target == 2).map(|e| e.input[0]).collect();
        assert_eq!(inputs, vec![9.0, 8.0, 9.0]);
    }

    #[test]
    fn iteration_cap_stops_training() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut network = Network::random(vec![1, 2, 2], 10.0, &mut rng).unwrap();
        let settings = MlpSettings {
            max_iterations: 3,
            total_error: 0.0,
            individual_error: 0.0,
            ..MlpSettings::default()
        };
        let outcome = backpropagate(&mut network, &[example(0, 0.0), example(1, 1.0)], &settings, &mut rng);
        assert_eq!(outcome.epochs, 3);
        assert_eq!(outcome.stop, StopReason::MaxIterations);
    }

    #[test]
    fn loose_total_error_stops_after_first_epoch() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut network = Network::random(vec![1, 2, 2], 10.0, &mut rng).unwrap();
        let settings = MlpSettings {
            total_error: 1.0,
            ..MlpSettings::default()
        };
        let outcome = backpropagate(&mut network, &[example(0, 0.0), example(1, 1.0)], &settings, &mut rng);
        assert_eq!(outcome.epochs, 1);
        assert_eq!(outcome.stop, StopReason::TotalError);
    }
}
