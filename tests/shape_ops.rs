use itertools::Itertools;

use dimarray::{
    concat, flatten, fold, rebin, resize, squeeze, sum, DType, Dim, Dimensions, ErrorKind, Unit,
    Variable,
};

fn dims1(label: &str, extent: usize) -> Dimensions {
    Dimensions::from_pairs(&[(Dim::new(label), extent)]).unwrap()
}

fn dims2(a: (&str, usize), b: (&str, usize)) -> Dimensions {
    Dimensions::from_pairs(&[(Dim::new(a.0), a.1), (Dim::new(b.0), b.1)]).unwrap()
}

#[test]
fn concat_1d() {
    let x = Dim::new("x");
    let a = Variable::from_values(dims1("x", 2), Unit::m(), vec![1.0, 2.0]).unwrap();
    let b = Variable::from_values(dims1("x", 3), Unit::m(), vec![3.0, 4.0, 5.0]).unwrap();
    let joined = concat(&a, &b, x).unwrap();
    assert_eq!(joined.dims().extent(x).unwrap(), 5);
    assert_eq!(joined.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[test]
fn concat_checks_unit_dtype_variances() {
    let x = Dim::new("x");
    let a = Variable::from_values(dims1("x", 1), Unit::m(), vec![1.0]).unwrap();
    let wrong_unit = Variable::from_values(dims1("x", 1), Unit::s(), vec![1.0]).unwrap();
    assert_eq!(concat(&a, &wrong_unit, x).unwrap_err().kind(), ErrorKind::Unit);
    let wrong_dtype = Variable::from_values(dims1("x", 1), Unit::m(), vec![1i64]).unwrap();
    assert_eq!(concat(&a, &wrong_dtype, x).unwrap_err().kind(), ErrorKind::Type);
    let with_var =
        Variable::from_values_and_variances(dims1("x", 1), Unit::m(), vec![1.0], vec![0.1]).unwrap();
    assert_eq!(concat(&a, &with_var, x).unwrap_err().kind(), ErrorKind::Variances);
}

#[test]
fn concat_interior_dim_interleaves() {
    let (x, y) = (Dim::new("x"), Dim::new("y"));
    let a = Variable::from_values(dims2(("x", 2), ("y", 2)), Unit::one(), vec![1, 2, 3, 4i64]).unwrap();
    let b = Variable::from_values(dims2(("x", 2), ("y", 1)), Unit::one(), vec![9, 10i64]).unwrap();
    let joined = concat(&a, &b, y).unwrap();
    assert_eq!(joined.dims().shape(), &[2, 3]);
    assert_eq!(joined.to_vec::<i64>().unwrap(), vec![1, 2, 9, 3, 4, 10]);
    let _ = x;
}

#[test]
fn concat_slices_reassembles() {
    let x = Dim::new("x");
    let v = Variable::arange(x, 6).unwrap();
    let joined = concat(&v.slice(x, 0, 3).unwrap(), &v.slice(x, 3, 6).unwrap(), x).unwrap();
    assert_eq!(joined, v);
}

#[test]
fn rebin_merges_counts() {
    let x = Dim::new("x");
    let v = Variable::from_values(dims1("x", 2), Unit::counts(), vec![1.0, 2.0]).unwrap();
    let old = Variable::from_values(dims1("x", 3), Unit::one(), vec![1.0, 2.0, 3.0]).unwrap();
    let new = Variable::from_values(dims1("x", 2), Unit::one(), vec![1.0, 3.0]).unwrap();
    let out = rebin(&v, x, &old, &new).unwrap();
    assert_eq!(out.dims().extent(x).unwrap(), 1);
    assert_eq!(out.unit(), Unit::counts());
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![3.0]);
    // Integer counts rebin to f64 too.
    let ints = Variable::from_values(dims1("x", 2), Unit::counts(), vec![1i64, 2]).unwrap();
    assert_eq!(rebin(&ints, x, &old, &new).unwrap(), out);
}

#[test]
fn rebin_splits_with_fractional_overlap() {
    let x = Dim::new("x");
    let v = Variable::from_values(dims1("x", 2), Unit::counts(), vec![2.0, 4.0]).unwrap();
    let old = Variable::from_values(dims1("x", 3), Unit::one(), vec![0.0, 1.0, 2.0]).unwrap();
    let new = Variable::from_values(dims1("x", 3), Unit::one(), vec![0.0, 0.5, 2.0]).unwrap();
    let out = rebin(&v, x, &old, &new).unwrap();
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![1.0, 5.0]);
}

#[test]
fn rebin_descending_edges() {
    let x = Dim::new("x");
    let v = Variable::from_values(
        dims1("x", 10),
        Unit::counts(),
        (1..=10).map(|i| i as f64).collect::<Vec<_>>(),
    )
    .unwrap();
    let old = Variable::from_values(
        dims1("x", 11),
        Unit::one(),
        vec![10.0, 9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0],
    )
    .unwrap();
    let new = Variable::from_values(dims1("x", 6), Unit::one(), vec![11.0, 7.5, 6.0, 4.5, 2.0, 0.0])
        .unwrap();
    let out = rebin(&v, x, &old, &new).unwrap();
    let values = out.to_vec::<f64>().unwrap();
    let expected = [4.5, 5.5, 8.0, 18.0, 19.0];
    for (a, b) in values.iter().zip_eq(expected.iter()) {
        assert!((a - b).abs() < 1e-12, "{} vs {}", a, b);
    }
}

#[test]
fn rebin_outer_dim_uses_general_strides() {
    let y = Dim::new("y");
    // 6x2 layout, rebinned along the outer dim.
    let v = Variable::from_values(
        dims2(("y", 6), ("x", 2)),
        Unit::counts(),
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
    )
    .unwrap();
    let old = Variable::from_values(dims1("y", 7), Unit::one(), (1..=7).map(|i| i as f64).collect::<Vec<_>>())
        .unwrap();
    let new = Variable::from_values(dims1("y", 3), Unit::one(), vec![0.0, 3.0, 8.0]).unwrap();
    let out = rebin(&v, y, &old, &new).unwrap();
    assert_eq!(out.dims().shape(), &[2, 2]);
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![4.0, 6.0, 14.0, 18.0]);
}

#[test]
fn rebin_conserves_mass() {
    let x = Dim::new("x");
    let v = Variable::from_values(dims1("x", 5), Unit::counts(), vec![1.0, 4.0, 2.0, 8.0, 5.0]).unwrap();
    let old = Variable::from_values(dims1("x", 6), Unit::one(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])
        .unwrap();
    let new = Variable::from_values(dims1("x", 4), Unit::one(), vec![0.0, 0.7, 3.3, 5.0]).unwrap();
    let out = rebin(&v, x, &old, &new).unwrap();
    let total_before = sum(&v, x).unwrap().value::<f64>().unwrap();
    let total_after = sum(&out, x).unwrap().value::<f64>().unwrap();
    assert!((total_before - total_after).abs() < 1e-12);
}

#[test]
fn rebin_requires_counts_and_sorted_edges() {
    let x = Dim::new("x");
    let not_counts = Variable::from_values(dims1("x", 2), Unit::m(), vec![1.0, 2.0]).unwrap();
    let old = Variable::from_values(dims1("x", 3), Unit::one(), vec![1.0, 2.0, 3.0]).unwrap();
    let new = Variable::from_values(dims1("x", 2), Unit::one(), vec![1.0, 3.0]).unwrap();
    assert_eq!(rebin(&not_counts, x, &old, &new).unwrap_err().kind(), ErrorKind::Unit);
    let v = not_counts.with_unit(Unit::counts());
    let unsorted = Variable::from_values(dims1("x", 3), Unit::one(), vec![1.0, 3.0, 2.0]).unwrap();
    assert_eq!(rebin(&v, x, &unsorted, &new).unwrap_err().kind(), ErrorKind::BinEdge);
}

#[test]
fn rebin_bool_gives_covered_fraction() {
    let x = Dim::new("x");
    let mask = Variable::from_values(dims1("x", 2), Unit::none(), vec![true, false]).unwrap();
    let old = Variable::from_values(dims1("x", 3), Unit::one(), vec![0.0, 1.0, 2.0]).unwrap();
    let new = Variable::from_values(dims1("x", 2), Unit::one(), vec![0.0, 2.0]).unwrap();
    let out = rebin(&mask, x, &old, &new).unwrap();
    assert_eq!(out.dtype(), DType::Float64);
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![1.0]);
}

#[test]
fn fold_then_flatten_round_trips() {
    let (x, row, time, y) = (Dim::new("x"), Dim::new("row"), Dim::new("time"), Dim::new("y"));
    let v = Variable::arange(x, 24).unwrap();
    let folded = fold(&v, x, &[(row, 2), (time, 3), (y, 4)]).unwrap();
    assert_eq!(folded.dims().shape(), &[2, 3, 4]);
    let back = flatten(&folded, &[row, time, y], x).unwrap();
    assert_eq!(back, v);
}

#[test]
fn fold_requires_matching_volume() {
    let (x, a, b) = (Dim::new("x"), Dim::new("a"), Dim::new("b"));
    let v = Variable::arange(x, 6).unwrap();
    assert_eq!(
        fold(&v, x, &[(a, 2), (b, 2)]).unwrap_err().kind(),
        ErrorKind::Dimension
    );
}

#[test]
fn flatten_requires_contiguous_dims() {
    let (x, y, z, flat) = (Dim::new("x"), Dim::new("y"), Dim::new("z"), Dim::new("flat"));
    let dims = Dimensions::from_pairs(&[(x, 2), (y, 2), (z, 2)]).unwrap();
    let v = Variable::from_values(dims, Unit::one(), (0..8i64).collect::<Vec<_>>()).unwrap();
    assert_eq!(
        flatten(&v, &[x, z], flat).unwrap_err().kind(),
        ErrorKind::Dimension
    );
    let ok = flatten(&v, &[y, z], flat).unwrap();
    assert_eq!(ok.dims().shape(), &[2, 4]);
}

#[test]
fn squeeze_drops_unit_extents() {
    let (x, y) = (Dim::new("x"), Dim::new("y"));
    let v = Variable::from_values(dims2(("x", 1), ("y", 3)), Unit::one(), vec![1, 2, 3i64]).unwrap();
    let squeezed = squeeze(&v, None).unwrap();
    assert_eq!(squeezed.dims(), &dims1("y", 3));
    assert_eq!(squeezed.to_vec::<i64>().unwrap(), vec![1, 2, 3]);
    assert_eq!(squeeze(&v, Some(&[y])).unwrap_err().kind(), ErrorKind::Dimension);
    let explicit = squeeze(&v, Some(&[x])).unwrap();
    assert_eq!(explicit, squeezed);
}

#[test]
fn resize_discards_data() {
    let x = Dim::new("x");
    let v = Variable::from_values(dims1("x", 3), Unit::counts(), vec![1.0, 2.0, 3.0]).unwrap();
    let resized = resize(&v, x, 5).unwrap();
    assert_eq!(resized.dims().extent(x).unwrap(), 5);
    assert_eq!(resized.unit(), Unit::counts());
    assert_eq!(resized.to_vec::<f64>().unwrap(), vec![0.0; 5]);
}

#[test]
fn concat_carries_variances() {
    let x = Dim::new("x");
    let a = Variable::from_values_and_variances(dims1("x", 1), Unit::m(), vec![1.0], vec![0.1]).unwrap();
    let b = Variable::from_values_and_variances(dims1("x", 2), Unit::m(), vec![2.0, 3.0], vec![0.2, 0.3])
        .unwrap();
    let joined = concat(&a, &b, x).unwrap();
    assert_eq!(joined.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(joined.variances_to_vec::<f64>().unwrap(), vec![0.1, 0.2, 0.3]);
}
