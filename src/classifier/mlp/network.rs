use rand::Rng;

use crate::classifier::ShapeRecError;

/// Fully connected sigmoid network.
///
/// `weights[l]` connects layer `l` to layer `l + 1` and holds
/// `(layers[l] + 1) * layers[l + 1]` values, unit-major: the weights into
/// unit `j` occupy `j * (layers[l] + 1) ..`, bias last. `deltas` mirrors
/// `weights` with the previous update of each weight, for momentum.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    layers: Vec<usize>,
    weights: Vec<Vec<f64>>,
    deltas: Vec<Vec<f64>>,
}

fn sigmoid(net: f64) -> f64 {
    1.0 / (1.0 + (-net).exp())
}

impl Network {
    /// Random weights drawn uniformly from `(-1/factor, 1/factor)`.
    pub fn random<R: Rng>(
        layers: Vec<usize>,
        normalization_factor: f64,
        rng: &mut R,
    ) -> Result<Self, ShapeRecError> {
        Self::check_layers(&layers)?;
        let bound = 1.0 / normalization_factor;
        let weights: Vec<Vec<f64>> = layers
            .windows(2)
            .map(|pair| {
                (0..(pair[0] + 1) * pair[1])
                    .map(|_| (rng.random::<f64>() * 2.0 - 1.0) * bound)
                    .collect()
            })
            .collect();
        let deltas = weights.iter().map(|w| vec![0.0; w.len()]).collect();
        Ok(Self {
            layers,
            weights,
            deltas,
        })
    }

    pub fn from_parts(
        layers: Vec<usize>,
        weights: Vec<Vec<f64>>,
        deltas: Vec<Vec<f64>>,
    ) -> Result<Self, ShapeRecError> {
        Self::check_layers(&layers)?;
        let connections = layers.len() - 1;
        if weights.len() != connections || deltas.len() != connections {
            return Err(ShapeRecError::InputFormat(format!(
                "{} layers need {connections} weight and delta blocks",
                layers.len()
            )));
        }
        for (l, pair) in layers.windows(2).enumerate() {
            let expected = (pair[0] + 1) * pair[1];
            if weights[l].len() != expected || deltas[l].len() != expected {
                return Err(ShapeRecError::InputFormat(format!(
                    "layer {l} needs {expected} weights, found {} and {} deltas",
                    weights[l].len(),
                    deltas[l].len()
                )));
            }
        }
        Ok(Self {
            layers,
            weights,
            deltas,
        })
    }

    fn check_layers(layers: &[usize]) -> Result<(), ShapeRecError> {
        if layers.len() < 2 || layers.contains(&0) {
            return Err(ShapeRecError::InputFormat(format!(
                "invalid layer sizes {layers:?}"
            )));
        }
        Ok(())
    }

    pub fn layers(&self) -> &[usize] {
        &self.layers
    }

    pub fn weights(&self) -> &[Vec<f64>] {
        &self.weights
    }

    pub fn deltas(&self) -> &[Vec<f64>] {
        &self.deltas
    }

    pub fn input_units(&self) -> usize {
        self.layers[0]
    }

    pub fn output_units(&self) -> usize {
        self.layers[self.layers.len() - 1]
    }

    /// Activations of every layer, input first.
    pub fn forward(&self, input: &[f64]) -> Vec<Vec<f64>> {
        let mut activations = Vec::with_capacity(self.layers.len());
        activations.push(input.to_vec());
        for (l, weights) in self.weights.iter().enumerate() {
            let previous = &activations[l];
            let stride = self.layers[l] + 1;
            let next: Vec<f64> = weights
                .chunks_exact(stride)
                .map(|unit| {
                    let net: f64 = unit[..stride - 1]
                        .iter()
                        .zip(previous)
                        .map(|(w, a)| w * a)
                        .sum::<f64>()
                        + unit[stride - 1];
                    sigmoid(net)
                })
                .collect();
            activations.push(next);
        }
        activations
    }

    pub fn outputs(&self, input: &[f64]) -> Vec<f64> {
        self.forward(input).pop().unwrap_or_default()
    }

    /// One online backpropagation step towards `target`.
    ///
    /// Returns `target - output` per output unit, measured before the update.
    pub fn train_sample(
        &mut self,
        input: &[f64],
        target: &[f64],
        learning_rate: f64,
        momentum: f64,
    ) -> Vec<f64> {
        let activations = self.forward(input);
        let output = &activations[activations.len() - 1];
        let errors: Vec<f64> = target.iter().zip(output).map(|(t, o)| t - o).collect();

        let mut gradient: Vec<f64> = errors
            .iter()
            .zip(output)
            .map(|(e, o)| e * o * (1.0 - o))
            .collect();
        for l in (0..self.weights.len()).rev() {
            let below = &activations[l];
            let stride = self.layers[l] + 1;
            // Gradient for layer l, computed with the weights before this update.
            let propagated: Vec<f64> = (0..self.layers[l])
                .map(|i| {
                    let downstream: f64 = gradient
                        .iter()
                        .enumerate()
                        .map(|(j, g)| g * self.weights[l][j * stride + i])
                        .sum();
                    downstream * below[i] * (1.0 - below[i])
                })
                .collect();
            for (j, g) in gradient.iter().enumerate() {
                for i in 0..stride {
                    let activation = if i + 1 == stride { 1.0 } else { below[i] };
                    let idx = j * stride + i;
                    let delta = learning_rate * g * activation + momentum * self.deltas[l][idx];
                    self.weights[l][idx] += delta;
                    self.deltas[l][idx] = delta;
                }
            }
            gradient = propagated;
        }
        errors
    }
}
