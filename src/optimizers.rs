use ndarray::Array2;
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training
///
/// `step` is called once per mini-batch before the parameter updates of that
/// batch; stateful optimizers use it to advance their time step.
pub trait Optimizer {
    fn step(&mut self);
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn reset(&mut self);
    fn learning_rate(&self) -> f64;
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected estimates
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m: HashMap<String, Array2<f64>>,
    v: HashMap<String, Array2<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-7)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: HashMap::new(),
            v: HashMap::new(),
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self) {
        self.t += 1;
    }

    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        // Updates issued before the first step() still get a valid bias correction
        let t = self.t.max(1);

        let m_t = self
            .m
            .entry(param_id.to_string())
            .or_insert_with(|| Array2::zeros(param.raw_dim()));
        *m_t = self.beta1 * &*m_t + (1.0 - self.beta1) * gradient;
        let m_hat = &*m_t / (1.0 - self.beta1.powi(t));

        let v_t = self
            .v
            .entry(param_id.to_string())
            .or_insert_with(|| Array2::zeros(param.raw_dim()));
        *v_t = self.beta2 * &*v_t + (1.0 - self.beta2) * gradient * gradient;
        let v_hat = &*v_t / (1.0 - self.beta2.powi(t));

        let update = self.learning_rate * m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon);
        *param = &*param - update;
    }

    fn reset(&mut self) {
        self.t = 0;
        self.m.clear();
        self.v.clear();
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}
