//! Interfaces of the neural networks used in the agents.
use anyhow::Result;
use candle_nn::VarBuilder;

/// Neural network model with a single input, e.g. a policy.
pub trait SubModel1 {
    /// Configuration from which the model is constructed.
    type Config;

    /// Input of the model.
    type Input;

    /// Output of the model.
    type Output;

    /// Builds the model, creating its variables through `vb`.
    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// A generalized forward function.
    fn forward(&self, input: &Self::Input) -> Result<Self::Output>;
}

/// Neural network model with two inputs, e.g. an action-value function.
pub trait SubModel2 {
    /// Configuration from which the model is constructed.
    type Config;

    /// First input of the model, e.g. an observation.
    type Input1;

    /// Second input of the model, e.g. an action.
    type Input2;

    /// Output of the model.
    type Output;

    /// Builds the model, creating its variables through `vb`.
    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// A generalized forward function.
    fn forward(&self, input1: &Self::Input1, input2: &Self::Input2) -> Result<Self::Output>;
}
