use rnlt_core::{Tensor, TensorResult};
use serde::{Deserialize, Serialize};

/// What a parameter tensor is for. The initializer dispatches on this
/// instead of inspecting module types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamRole {
    ConvWeight,
    ConvBias,
    NormScale,
    NormShift,
    LinearWeight,
    LinearBias,
}

/// A named, role-tagged parameter tensor. `name` is the dotted path from
/// the root module, e.g. `stage2.0.shortcut.conv.weight`.
#[derive(Debug)]
pub struct Param<R> {
    pub name: String,
    pub role: ParamRole,
    pub tensor: R,
}

pub type Parameter<'a> = Param<&'a Tensor<f32>>;
pub type ParameterMut<'a> = Param<&'a mut Tensor<f32>>;

impl<R> Param<R> {
    pub fn new(name: &str, role: ParamRole, tensor: R) -> Self {
        Param {
            name: name.to_string(),
            role,
            tensor,
        }
    }

    /// Prepend a parent scope to the name.
    pub fn scoped(mut self, scope: &str) -> Self {
        self.name = format!("{}.{}", scope, self.name);
        self
    }
}

/// Prefix every parameter in `params` with `scope`.
pub(crate) fn scope_all<R>(scope: &str, params: Vec<Param<R>>) -> Vec<Param<R>> {
    params.into_iter().map(|p| p.scoped(scope)).collect()
}

/// A network component with a forward pass and an ordered parameter list.
///
/// `parameters` and `parameters_mut` must yield the same tensors in the same
/// order; seeded initialization relies on it.
pub trait Module {
    fn forward(&self, input: &Tensor<f32>) -> TensorResult<Tensor<f32>>;

    fn parameters(&self) -> Vec<Parameter<'_>>;

    fn parameters_mut(&mut self) -> Vec<ParameterMut<'_>>;

    /// Switch between training and inference behaviour. Only layers with
    /// mode-dependent behaviour (batch normalization) override this.
    fn set_training(&mut self, _training: bool) {}

    /// Total number of trainable scalars.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.tensor.numel()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_names() {
        let t: Tensor<f32> = Tensor::zeros(vec![2]);
        let p = Parameter::new("weight", ParamRole::NormScale, &t)
            .scoped("bn1")
            .scoped("stage1.0");
        assert_eq!(p.name, "stage1.0.bn1.weight");
        assert_eq!(p.role, ParamRole::NormScale);
    }

    #[test]
    fn test_role_serde_names() {
        let json = serde_json::to_string(&ParamRole::ConvWeight).unwrap();
        assert_eq!(json, "\"conv-weight\"");
        let role: ParamRole = serde_json::from_str("\"norm-shift\"").unwrap();
        assert_eq!(role, ParamRole::NormShift);
    }
}
