// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `approx` comparison support for [`Variable`], enabled by the
//! `approx` crate feature. Dims, unit and dtype must match exactly;
//! only the element values are compared approximately.

use approx::{AbsDiffEq, RelativeEq};

use crate::dtype::DType;
use crate::variable::Variable;

fn comparable(a: &Variable, b: &Variable) -> bool {
    a.dims() == b.dims()
        && a.unit() == b.unit()
        && a.dtype() == b.dtype()
        && a.has_variances() == b.has_variances()
        && a.dtype().is_float()
        && !a.is_binned()
}

fn values_f64(v: &Variable) -> Vec<f64> {
    match v.dtype() {
        DType::Float64 => v.to_vec::<f64>().expect("dtype checked"),
        _ => v
            .to_vec::<f32>()
            .expect("dtype checked")
            .into_iter()
            .map(f64::from)
            .collect(),
    }
}

impl AbsDiffEq for Variable {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Variable, epsilon: f64) -> bool {
        if !comparable(self, other) {
            return false;
        }
        values_f64(self)
            .iter()
            .zip(values_f64(other).iter())
            .all(|(a, b)| a.abs_diff_eq(b, epsilon))
    }
}

impl RelativeEq for Variable {
    fn default_max_relative() -> f64 {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Variable, epsilon: f64, max_relative: f64) -> bool {
        if !comparable(self, other) {
            return false;
        }
        values_f64(self)
            .iter()
            .zip(values_f64(other).iter())
            .all(|(a, b)| a.relative_eq(b, epsilon, max_relative))
    }
}
