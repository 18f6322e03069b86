use rnlt_core::ops::gemm;
use rnlt_core::{Tensor, TensorError, TensorResult};

use crate::module::{Module, ParamRole, Parameter, ParameterMut};

/// 2D convolution over `[batch, in_channels, height, width]` input.
///
/// Output shape: `[batch, out_channels, out_h, out_w]` with
/// `out = (in + 2 * padding - kernel) / stride + 1`.
///
/// The weight `[out_channels, in_channels, k, k]` starts at zero; the
/// network initializer fills it.
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub weight: Tensor<f32>,
    pub bias: Option<Tensor<f32>>,
}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
    ) -> Self {
        Conv2d {
            in_channels,
            out_channels,
            kernel_size,
            stride: stride.max(1),
            padding,
            weight: Tensor::zeros(vec![out_channels, in_channels, kernel_size, kernel_size]),
            bias: bias.then(|| Tensor::zeros(vec![out_channels])),
        }
    }

    fn out_dim(&self, input_dim: usize) -> Option<usize> {
        let padded = input_dim + 2 * self.padding;
        if padded < self.kernel_size {
            return None;
        }
        Some((padded - self.kernel_size) / self.stride + 1)
    }

    fn is_pointwise(&self) -> bool {
        self.kernel_size == 1 && self.stride == 1 && self.padding == 0
    }

    /// Unfold one `[c, h, w]` image into a `[c * k * k, out_h * out_w]`
    /// column matrix. Taps that fall in the padding stay zero.
    fn im2col(
        &self,
        image: &[f32],
        h: usize,
        w: usize,
        out_h: usize,
        out_w: usize,
        col: &mut [f32],
    ) {
        let k = self.kernel_size;
        let cols = out_h * out_w;
        let pad = self.padding as isize;
        col.fill(0.0);
        for ic in 0..self.in_channels {
            let plane = &image[ic * h * w..(ic + 1) * h * w];
            for kh in 0..k {
                for kw in 0..k {
                    let row = (ic * k + kh) * k + kw;
                    let dst = &mut col[row * cols..(row + 1) * cols];
                    for oh in 0..out_h {
                        let ih = (oh * self.stride + kh) as isize - pad;
                        if ih < 0 || ih >= h as isize {
                            continue;
                        }
                        let src_row = &plane[ih as usize * w..(ih as usize + 1) * w];
                        for ow in 0..out_w {
                            let iw = (ow * self.stride + kw) as isize - pad;
                            if iw >= 0 && iw < w as isize {
                                dst[oh * out_w + ow] = src_row[iw as usize];
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Module for Conv2d {
    fn forward(&self, input: &Tensor<f32>) -> TensorResult<Tensor<f32>> {
        let (batch, c, h, w) = input.shape().nchw()?;
        if c != self.in_channels {
            return Err(TensorError::ShapeMismatch {
                expected: vec![batch, self.in_channels, h, w],
                got: input.shape_vec(),
            });
        }
        let (out_h, out_w) = match (self.out_dim(h), self.out_dim(w)) {
            (Some(oh), Some(ow)) => (oh, ow),
            _ => {
                return Err(TensorError::InvalidOperation(format!(
                    "Conv2d: input {}x{} with padding {} is smaller than kernel {}",
                    h, w, self.padding, self.kernel_size
                )))
            }
        };

        let rows = self.in_channels * self.kernel_size * self.kernel_size;
        let cols = out_h * out_w;
        let in_len = c * h * w;
        let out_len = self.out_channels * cols;
        let mut output = vec![0.0f32; batch * out_len];
        if in_len == 0 || out_len == 0 {
            return Tensor::new(output, vec![batch, self.out_channels, out_h, out_w]);
        }
        let mut col = if self.is_pointwise() {
            Vec::new()
        } else {
            vec![0.0f32; rows * cols]
        };

        for (image, out) in input
            .data()
            .chunks_exact(in_len)
            .zip(output.chunks_exact_mut(out_len))
        {
            if let Some(bias) = &self.bias {
                for (plane, &b) in out.chunks_exact_mut(cols).zip(bias.data()) {
                    plane.fill(b);
                }
            }
            if self.is_pointwise() {
                gemm(self.out_channels, rows, cols, self.weight.data(), image, out)?;
            } else {
                self.im2col(image, h, w, out_h, out_w, &mut col);
                gemm(self.out_channels, rows, cols, self.weight.data(), &col, out)?;
            }
        }

        Tensor::new(output, vec![batch, self.out_channels, out_h, out_w])
    }

    fn parameters(&self) -> Vec<Parameter<'_>> {
        let mut params = vec![Parameter::new("weight", ParamRole::ConvWeight, &self.weight)];
        if let Some(bias) = &self.bias {
            params.push(Parameter::new("bias", ParamRole::ConvBias, bias));
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<ParameterMut<'_>> {
        let mut params = vec![ParameterMut::new("weight", ParamRole::ConvWeight, &mut self.weight)];
        if let Some(bias) = &mut self.bias {
            params.push(ParameterMut::new("bias", ParamRole::ConvBias, bias));
        }
        params
    }
}

/// Non-overlapping average pooling (`stride == kernel_size`, no padding).
pub struct AvgPool2d {
    pub kernel_size: usize,
}

impl AvgPool2d {
    pub fn new(kernel_size: usize) -> Self {
        AvgPool2d {
            kernel_size: kernel_size.max(1),
        }
    }
}

impl Module for AvgPool2d {
    fn forward(&self, input: &Tensor<f32>) -> TensorResult<Tensor<f32>> {
        let (batch, c, h, w) = input.shape().nchw()?;
        let k = self.kernel_size;
        if h < k || w < k {
            return Err(TensorError::InvalidOperation(format!(
                "AvgPool2d: input {}x{} is smaller than window {}",
                h, w, k
            )));
        }
        let (out_h, out_w) = (h / k, w / k);
        let scale = 1.0 / (k * k) as f32;
        let mut output = Vec::with_capacity(batch * c * out_h * out_w);

        for plane in input.data().chunks_exact(h * w) {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut sum = 0.0f32;
                    for kh in 0..k {
                        let row = &plane[(oh * k + kh) * w..];
                        sum += row[ow * k..ow * k + k].iter().sum::<f32>();
                    }
                    output.push(sum * scale);
                }
            }
        }

        Tensor::new(output, vec![batch, c, out_h, out_w])
    }

    fn parameters(&self) -> Vec<Parameter<'_>> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<ParameterMut<'_>> {
        Vec::new()
    }
}
