//! Small feed-forward sequence regressor
//!
//! A window of scaled values passes through one `tanh` hidden layer and a
//! linear output unit. Parameters are updated with Adam on mean squared
//! error.

use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::traits::SequenceModel;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-7;

/// Fully connected layer: `outputs = weights · inputs + bias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Dense {
    /// Shape (outputs, inputs)
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl Dense {
    /// Glorot-uniform initialised layer with zero bias.
    fn new(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights = Array2::from_shape_fn((outputs, inputs), |_| rng.random_range(-limit..limit));
        Self {
            weights,
            bias: Array1::zeros(outputs),
        }
    }

    /// Batch forward pass; `x` has one sample per row.
    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.weights.t()) + &self.bias
    }

    fn zeros_like(&self) -> Self {
        Self {
            weights: Array2::zeros(self.weights.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }
}

/// Gradients of the loss with respect to every network parameter.
#[derive(Debug, Clone)]
pub struct Gradients {
    hidden: Dense,
    output: Dense,
}

/// The trained window → next value regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastModel {
    window_size: usize,
    hidden: Dense,
    output: Dense,
}

impl ForecastModel {
    pub fn new(window_size: usize, hidden_units: usize, rng: &mut StdRng) -> Self {
        Self {
            window_size,
            hidden: Dense::new(window_size, hidden_units, rng),
            output: Dense::new(hidden_units, 1, rng),
        }
    }

    pub fn hidden_units(&self) -> usize {
        self.hidden.bias.len()
    }

    /// Predict one value per row of `x`.
    pub fn predict_batch(&self, x: &Array2<f64>) -> Array1<f64> {
        let activations = self.hidden.forward(x).mapv(f64::tanh);
        self.output.forward(&activations).column(0).to_owned()
    }

    /// Mean squared error over a batch.
    pub fn mse(&self, x: &Array2<f64>, y: &Array1<f64>) -> f64 {
        if y.is_empty() {
            return 0.0;
        }
        let errors = self.predict_batch(x) - y;
        errors.mapv(|e| e * e).mean().unwrap_or(0.0)
    }

    /// Backpropagate mean squared error for a batch.
    ///
    /// Returns the batch loss together with the gradients.
    pub fn gradients(&self, x: &Array2<f64>, y: &Array1<f64>) -> (f64, Gradients) {
        let n = y.len().max(1) as f64;

        let activations = self.hidden.forward(x).mapv(f64::tanh);
        let predictions = self.output.forward(&activations).column(0).to_owned();
        let errors = &predictions - y;
        let loss = errors.mapv(|e| e * e).sum() / n;

        // dL/dŷ, shape (batch, 1)
        let d_out = (errors * (2.0 / n)).insert_axis(Axis(1));

        let output = Dense {
            weights: d_out.t().dot(&activations),
            bias: d_out.sum_axis(Axis(0)),
        };

        let d_hidden = d_out.dot(&self.output.weights) * activations.mapv(|a| 1.0 - a * a);
        let hidden = Dense {
            weights: d_hidden.t().dot(x),
            bias: d_hidden.sum_axis(Axis(0)),
        };

        (loss, Gradients { hidden, output })
    }
}

impl SequenceModel for ForecastModel {
    fn window_size(&self) -> usize {
        self.window_size
    }

    fn predict_next(&self, window: &[f64]) -> f64 {
        assert_eq!(
            window.len(),
            self.window_size,
            "window length does not match the model"
        );
        let x = Array1::from(window.to_vec()).insert_axis(Axis(0));
        self.predict_batch(&x)[0]
    }
}

/// Adam optimiser state for a [`ForecastModel`].
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    step: i32,
    m: Gradients,
    v: Gradients,
}

impl Adam {
    pub fn new(network: &ForecastModel, learning_rate: f64) -> Self {
        let zeros = Gradients {
            hidden: network.hidden.zeros_like(),
            output: network.output.zeros_like(),
        };
        Self {
            learning_rate,
            step: 0,
            m: zeros.clone(),
            v: zeros,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    /// Apply one update step.
    pub fn apply(&mut self, network: &mut ForecastModel, grads: &Gradients) {
        self.step += 1;
        let lr_t = self.learning_rate * (1.0 - BETA2.powi(self.step)).sqrt()
            / (1.0 - BETA1.powi(self.step));

        let (m, v) = (&mut self.m, &mut self.v);
        update(
            &mut network.hidden.weights,
            &grads.hidden.weights,
            &mut m.hidden.weights,
            &mut v.hidden.weights,
            lr_t,
        );
        update(
            &mut network.hidden.bias,
            &grads.hidden.bias,
            &mut m.hidden.bias,
            &mut v.hidden.bias,
            lr_t,
        );
        update(
            &mut network.output.weights,
            &grads.output.weights,
            &mut m.output.weights,
            &mut v.output.weights,
            lr_t,
        );
        update(
            &mut network.output.bias,
            &grads.output.bias,
            &mut m.output.bias,
            &mut v.output.bias,
            lr_t,
        );
    }
}

fn update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    lr_t: f64,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + EPSILON);
        });
}

/// Stack windows into a (samples, window) matrix.
///
/// Fails if any row is not exactly `window_size` long.
pub fn to_matrix(rows: &[Vec<f64>], window_size: usize) -> Result<Array2<f64>, CoreError> {
    if let Some(row) = rows.iter().find(|r| r.len() != window_size) {
        return Err(CoreError::invalid_parameter(
            "window",
            format!("expected {window_size} values, got {}", row.len()),
        ));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), window_size), flat)
        .map_err(|e| CoreError::invalid_parameter("window", e.to_string()))
}
