//! Dense feed-forward network driving the default rocket population.

use moonshot_core::{Controller, INPUT_SIZE, LAYER_SIZES, OUTPUT_SIZE};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Weights and biases for one fully connected layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LayerParams {
    inputs: usize,
    outputs: usize,
    /// Row-major `outputs x inputs` weight matrix.
    weights: Vec<f64>,
    biases: Vec<f64>,
}

impl LayerParams {
    fn random(inputs: usize, outputs: usize, rng: &mut dyn RngCore) -> Self {
        let mut weights = vec![0.0; inputs * outputs];
        for weight in &mut weights {
            *weight = rng.random_range(-1.0..1.0);
        }
        let mut biases = vec![0.0; outputs];
        for bias in &mut biases {
            *bias = rng.random_range(-1.0..1.0);
        }
        Self {
            inputs,
            outputs,
            weights,
            biases,
        }
    }

    fn forward(&self, inputs: &[f64]) -> Vec<f64> {
        let mut outputs = Vec::with_capacity(self.outputs);
        for row in 0..self.outputs {
            let mut acc = self.biases[row];
            let weights = &self.weights[row * self.inputs..(row + 1) * self.inputs];
            for (weight, input) in weights.iter().zip(inputs) {
                acc += weight * input;
            }
            outputs.push(sigmoid(acc));
        }
        outputs
    }

    fn perturb(&mut self, rate: f64, rng: &mut dyn RngCore) {
        for weight in &mut self.weights {
            *weight += gaussian(rng) * rate;
        }
        for bias in &mut self.biases {
            *bias += gaussian(rng) * rate;
        }
    }
}

fn sigmoid(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

fn gaussian(rng: &mut dyn RngCore) -> f64 {
    const TWO_PI: f64 = std::f64::consts::TAU;
    let u1 = (rng.random::<f64>()).clamp(f64::MIN_POSITIVE, 1.0);
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (TWO_PI * u2).cos()
}

/// Fixed-topology feed-forward network with sigmoid activations.
///
/// The layer widths come from [`LAYER_SIZES`]; the first entry matches the
/// rocket sensor count and the last the actuation count. Evaluation is a
/// pure function of the parameters, so a shared reference is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnnController {
    layers: Vec<LayerParams>,
}

impl DnnController {
    /// Construct a randomly initialized network.
    #[must_use]
    pub fn random(rng: &mut dyn RngCore) -> Self {
        let mut layers = Vec::with_capacity(LAYER_SIZES.len() - 1);
        for pair in LAYER_SIZES.windows(2) {
            layers.push(LayerParams::random(pair[0], pair[1], rng));
        }
        Self { layers }
    }
}

impl Controller for DnnController {
    fn evaluate(&self, inputs: &[f64; INPUT_SIZE]) -> [f64; OUTPUT_SIZE] {
        let mut activations = inputs.to_vec();
        for layer in &self.layers {
            activations = layer.forward(&activations);
        }
        let mut outputs = [0.0; OUTPUT_SIZE];
        outputs.copy_from_slice(&activations);
        outputs
    }

    fn mutate(&self, rate: f64, rng: &mut dyn RngCore) -> Box<dyn Controller> {
        let mut child = self.clone();
        for layer in &mut child.layers {
            layer.perturb(rate, rng);
        }
        Box::new(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn random_network_has_expected_topology() {
        let mut rng = SmallRng::seed_from_u64(0xDEADBEEF);
        let net = DnnController::random(&mut rng);
        assert_eq!(net.layers.len(), LAYER_SIZES.len() - 1);
        for (layer, pair) in net.layers.iter().zip(LAYER_SIZES.windows(2)) {
            assert_eq!(layer.inputs, pair[0]);
            assert_eq!(layer.outputs, pair[1]);
            assert_eq!(layer.weights.len(), pair[0] * pair[1]);
            assert_eq!(layer.biases.len(), pair[1]);
        }
    }

    #[test]
    fn outputs_stay_in_unit_interval() {
        let mut rng = SmallRng::seed_from_u64(123);
        let net = DnnController::random(&mut rng);
        let outputs = net.evaluate(&[0.5; INPUT_SIZE]);
        assert!(outputs.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let mut rng = SmallRng::seed_from_u64(456);
        let net = DnnController::random(&mut rng);
        let inputs = [0.25; INPUT_SIZE];
        assert_eq!(net.evaluate(&inputs), net.evaluate(&inputs));
    }

    #[test]
    fn mutation_leaves_parent_untouched() {
        let mut rng = SmallRng::seed_from_u64(789);
        let parent = DnnController::random(&mut rng);
        let before = parent.layers[0].weights.clone();
        let child = parent.mutate(0.5, &mut rng);
        assert_eq!(parent.layers[0].weights, before);
        let inputs = [0.5; INPUT_SIZE];
        assert_ne!(parent.evaluate(&inputs), child.evaluate(&inputs));
    }

    #[test]
    fn zero_rate_mutation_is_an_exact_copy() {
        let mut rng = SmallRng::seed_from_u64(42);
        let parent = DnnController::random(&mut rng);
        let child = parent.mutate(0.0, &mut rng);
        let inputs = [0.75; INPUT_SIZE];
        assert_eq!(parent.evaluate(&inputs), child.evaluate(&inputs));
    }
}
