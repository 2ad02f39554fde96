use quickcheck::{quickcheck, TestResult};

use dimarray::{add, multiply, rebin, sum, Dim, Dimensions, Unit, Variable};

fn dims1(label: &str, extent: usize) -> Dimensions {
    Dimensions::from_pairs(&[(Dim::new(label), extent)]).unwrap()
}

quickcheck! {
    fn copy_equals_original(values: Vec<i32>) -> bool {
        let dims = dims1("x", values.len());
        let v = Variable::from_values(dims, Unit::m(), values).unwrap();
        v.copy() == v
    }

    fn slice_commutes_with_add(values: Vec<i32>, begin: usize, end: usize) -> TestResult {
        if values.is_empty() {
            return TestResult::discard();
        }
        let x = Dim::new("x");
        let n = values.len();
        let (begin, end) = (begin % (n + 1), end % (n + 1));
        if begin > end {
            return TestResult::discard();
        }
        let a = Variable::from_values(dims1("x", n), Unit::one(), values.clone()).unwrap();
        let doubled: Vec<i32> = values.iter().map(|v| v.wrapping_mul(2)).collect();
        let b = Variable::from_values(dims1("x", n), Unit::one(), doubled).unwrap();
        let sliced_after = add(&a, &b).unwrap().slice(x, begin, end).unwrap().copy();
        let sliced_before = add(
            &a.slice(x, begin, end).unwrap(),
            &b.slice(x, begin, end).unwrap(),
        )
        .unwrap();
        TestResult::from_bool(sliced_after == sliced_before)
    }

    fn transpose_invariance(values: Vec<i32>) -> TestResult {
        if values.len() < 2 {
            return TestResult::discard();
        }
        let (x, y) = (Dim::new("x"), Dim::new("y"));
        let cols = values.len() / 2;
        let values = values[..2 * cols].to_vec();
        let dims = Dimensions::from_pairs(&[(x, 2), (y, cols)]).unwrap();
        let a = Variable::from_values(dims, Unit::one(), values.clone()).unwrap();
        let shifted: Vec<i32> = values.iter().map(|v| v.wrapping_add(1)).collect();
        let b = Variable::from_values(dims, Unit::one(), shifted).unwrap();
        let direct = add(&a, &b).unwrap();
        let via = add(&b, &a.transpose(&[y, x]).unwrap()).unwrap();
        TestResult::from_bool(via.transpose(&[x, y]).unwrap().copy() == direct)
    }

    fn product_unit_is_unit_product(scale: i32) -> bool {
        let a = Variable::scalar_with_unit(scale as f64, Unit::m());
        let b = Variable::scalar_with_unit(2.0, Unit::s());
        multiply(&a, &b).unwrap().unit() == Unit::m() * Unit::s()
    }

    fn rebin_conserves_counts(counts: Vec<u8>, cut: usize) -> TestResult {
        if counts.is_empty() {
            return TestResult::discard();
        }
        let x = Dim::new("x");
        let n = counts.len();
        let values: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
        let v = Variable::from_values(dims1("x", n), Unit::counts(), values).unwrap();
        let old_edges: Vec<f64> = (0..=n).map(|i| i as f64).collect();
        let old = Variable::from_values(dims1("x", n + 1), Unit::one(), old_edges).unwrap();
        // A coarser grid covering the full old range keeps the total.
        let cut = 1 + cut % n.max(1);
        let mut new_edges = vec![0.0, n as f64];
        if (cut as f64) < n as f64 {
            new_edges.insert(1, cut as f64 - 0.5);
        }
        let new = Variable::from_values(dims1("x", new_edges.len()), Unit::one(), new_edges).unwrap();
        let rebinned = rebin(&v, x, &old, &new).unwrap();
        let before = sum(&v, x).unwrap().value::<f64>().unwrap();
        let after = sum(&rebinned, x).unwrap().value::<f64>().unwrap();
        TestResult::from_bool((before - after).abs() < 1e-9 * (1.0 + before))
    }
}
