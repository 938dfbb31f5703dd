use crate::{
  tensor::Tensor,
  scalar::Real,
};


/// Geometry of a valid, stride 1 convolution.

#[derive(Debug, Clone, Copy)]
pub(crate) struct ConvShape {
  pub batch: usize,
  pub channels: usize,
  pub height: usize,
  pub width: usize,
  pub filters: usize,
  pub kernel_h: usize,
  pub kernel_w: usize,
}

impl ConvShape {
  pub fn new<T: Real>(input: &Tensor<T>, kernels: &Tensor<T>) -> Self {
    assert_eq!(input.rank(), 4, "Convolution input must be [N, C, H, W], got {}", input.shape());
    assert_eq!(kernels.rank(), 4, "Convolution kernels must be [O, C, KH, KW], got {}", kernels.shape());
    let dims = &input.shape().dims;
    let kdims = &kernels.shape().dims;
    assert_eq!(dims[1], kdims[1],
      "Input with {} channels cannot be convolved with {} kernels", dims[1], kernels.shape());
    assert!(dims[2] >= kdims[2] && dims[3] >= kdims[3],
      "Kernels {} exceed input {}", kernels.shape(), input.shape());
    Self {
      batch: dims[0],
      channels: dims[1],
      height: dims[2],
      width: dims[3],
      filters: kdims[0],
      kernel_h: kdims[2],
      kernel_w: kdims[3],
    }
  }

  pub fn out_h(&self) -> usize { self.height - self.kernel_h + 1 }
  pub fn out_w(&self) -> usize { self.width - self.kernel_w + 1 }
  pub fn patch(&self) -> usize { self.channels * self.kernel_h * self.kernel_w }
  pub fn windows(&self) -> usize { self.out_h() * self.out_w() }
  pub fn sample(&self) -> usize { self.channels * self.height * self.width }
}


fn per_sample<O, F>(n: usize, cb: F) -> Vec<O>
where
  O: Send,
  F: Fn(usize) -> O + Send + Sync,
{
  #[cfg(feature = "rayon")]
  {
    use rayon::prelude::*;
    (0..n).into_par_iter().map(cb).collect()
  }
  #[cfg(not(feature = "rayon"))]
  {
    (0..n).map(cb).collect()
  }
}


// Unfold one sample into a [C * KH * KW, OH * OW] patch matrix

fn im2col<T: Real>(sample: &[T], geo: &ConvShape) -> Vec<T> {
  let (oh, ow) = (geo.out_h(), geo.out_w());
  let mut cols = vec![T::zero(); geo.patch() * geo.windows()];
  for c in 0..geo.channels {
    for ki in 0..geo.kernel_h {
      for kj in 0..geo.kernel_w {
        let row = (c * geo.kernel_h + ki) * geo.kernel_w + kj;
        let dest = &mut cols[row * oh * ow..(row + 1) * oh * ow];
        for y in 0..oh {
          let src = (c * geo.height + y + ki) * geo.width + kj;
          dest[y * ow..(y + 1) * ow].copy_from_slice(&sample[src..src + ow]);
        }
      }
    }
  }
  cols
}

// Fold a patch matrix back onto a sample, accumulating overlaps

fn col2im<T: Real>(cols: &[T], geo: &ConvShape) -> Vec<T> {
  let (oh, ow) = (geo.out_h(), geo.out_w());
  let mut sample = vec![T::zero(); geo.sample()];
  for c in 0..geo.channels {
    for ki in 0..geo.kernel_h {
      for kj in 0..geo.kernel_w {
        let row = (c * geo.kernel_h + ki) * geo.kernel_w + kj;
        let src = &cols[row * oh * ow..(row + 1) * oh * ow];
        for y in 0..oh {
          let dest = (c * geo.height + y + ki) * geo.width + kj;
          for x in 0..ow {
            sample[dest + x] += src[y * ow + x];
          }
        }
      }
    }
  }
  sample
}


pub(crate) fn conv2d<T: Real>(input: &Tensor<T>, kernels: &Tensor<T>, bias: &Tensor<T>) -> Tensor<T> {
  let geo = ConvShape::new(input, kernels);
  assert_eq!(bias.shape().dims, vec![geo.filters],
    "Bias {} doesn't match {} filters", bias.shape(), geo.filters);
  let windows = geo.windows();
  let outputs = per_sample(geo.batch, |n| {
    let sample = &input.raw()[n * geo.sample()..(n + 1) * geo.sample()];
    let cols = im2col(sample, &geo);
    let mut out = vec![T::zero(); geo.filters * windows];
    T::gemm(geo.filters, geo.patch(), windows, kernels.raw(), &cols, &mut out);
    for (f, row) in out.chunks_mut(windows).enumerate() {
      let b = bias.raw()[f];
      row.iter_mut().for_each(|a| *a += b );
    }
    out
  });
  Tensor::new(&[geo.batch, geo.filters, geo.out_h(), geo.out_w()], outputs.concat())
}

/// Gradients of [conv2d] with respect to input, kernels and bias.

pub(crate) fn conv2d_backward<T: Real>(
  input: &Tensor<T>,
  kernels: &Tensor<T>,
  grad: &Tensor<T>,
) -> (Tensor<T>, Tensor<T>, Tensor<T>) {
  let geo = ConvShape::new(input, kernels);
  let windows = geo.windows();
  let kernels_t = Tensor::new(&[geo.filters, geo.patch()], kernels.raw().to_vec()).transpose();

  let partials = per_sample(geo.batch, |n| {
    let sample = &input.raw()[n * geo.sample()..(n + 1) * geo.sample()];
    let grad_n = &grad.raw()[n * geo.filters * windows..(n + 1) * geo.filters * windows];
    let cols = Tensor::new(&[geo.patch(), windows], im2col(sample, &geo));

    let mut grad_kernels = vec![T::zero(); geo.filters * geo.patch()];
    T::gemm(geo.filters, windows, geo.patch(), grad_n, cols.transpose().raw(), &mut grad_kernels);

    let mut grad_cols = vec![T::zero(); geo.patch() * windows];
    T::gemm(geo.patch(), geo.filters, windows, kernels_t.raw(), grad_n, &mut grad_cols);

    let grad_bias: Vec<T> = grad_n.chunks(windows).map(|row| row.iter().copied().sum() ).collect();

    (col2im(&grad_cols, &geo), grad_kernels, grad_bias)
  });

  let mut grad_input = Vec::with_capacity(geo.batch * geo.sample());
  let mut grad_kernels = vec![T::zero(); geo.filters * geo.patch()];
  let mut grad_bias = vec![T::zero(); geo.filters];
  for (gi, gk, gb) in partials {
    grad_input.extend(gi);
    grad_kernels.iter_mut().zip(gk).for_each(|(a, b)| *a += b );
    grad_bias.iter_mut().zip(gb).for_each(|(a, b)| *a += b );
  }

  (
    Tensor::new(&input.shape().dims, grad_input),
    Tensor::new(&kernels.shape().dims, grad_kernels),
    Tensor::new(&[geo.filters], grad_bias),
  )
}


// Flat input index of the maximum in every pooling window

fn pool_indices<T: Real>(input: &Tensor<T>, size: usize) -> (Vec<usize>, Vec<usize>) {
  assert!(input.rank() >= 2 && size > 0, "Cannot pool {} with window {size}", input.shape());
  let (h, w) = (input.dim(-2), input.dim(-1));
  let (oh, ow) = (h / size, w / size);
  let planes = input.size() / (h * w).max(1);
  let data = input.raw();
  let mut indices = Vec::with_capacity(planes * oh * ow);
  for p in 0..planes {
    for y in 0..oh {
      for x in 0..ow {
        let mut best = p * h * w + y * size * w + x * size;
        for dy in 0..size {
          for dx in 0..size {
            let i = p * h * w + (y * size + dy) * w + x * size + dx;
            if data[i] > data[best] { best = i }
          }
        }
        indices.push(best);
      }
    }
  }
  let mut dims = input.shape().dims.clone();
  let rank = dims.len();
  dims[rank - 2] = oh;
  dims[rank - 1] = ow;
  (dims, indices)
}

pub(crate) fn max_pool2d<T: Real>(input: &Tensor<T>, size: usize) -> Tensor<T> {
  let (dims, indices) = pool_indices(input, size);
  let data = indices.iter().map(|&i| input.raw()[i] ).collect();
  Tensor::new(&dims, data)
}

pub(crate) fn max_pool2d_backward<T: Real>(input: &Tensor<T>, size: usize, grad: &Tensor<T>) -> Tensor<T> {
  let (_, indices) = pool_indices(input, size);
  let mut out = Tensor::zeros(&input.shape().dims);
  let raw = out.raw_mut();
  for (&i, &g) in indices.iter().zip(grad.raw()) {
    raw[i] += g;
  }
  out
}
