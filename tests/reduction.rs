use dimarray::{
    all, any, max, mean, min, sum, DType, DataArray, Dim, Dimensions, ErrorKind, Unit, Variable,
};

fn dims1(label: &str, extent: usize) -> Dimensions {
    Dimensions::from_pairs(&[(Dim::new(label), extent)]).unwrap()
}

fn dims2(a: (&str, usize), b: (&str, usize)) -> Dimensions {
    Dimensions::from_pairs(&[(Dim::new(a.0), a.1), (Dim::new(b.0), b.1)]).unwrap()
}

#[test]
fn sum_over_one_dim_and_all() {
    let (x, y) = (Dim::new("x"), Dim::new("y"));
    let v = Variable::from_values(dims2(("x", 2), ("y", 3)), Unit::m(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        .unwrap();
    let over_y = sum(&v, y).unwrap();
    assert_eq!(over_y.dims(), &dims1("x", 2));
    assert_eq!(over_y.to_vec::<f64>().unwrap(), vec![6.0, 15.0]);
    let over_x = sum(&v, x).unwrap();
    assert_eq!(over_x.to_vec::<f64>().unwrap(), vec![5.0, 7.0, 9.0]);
    let total = sum(&v, None).unwrap();
    assert_eq!(total.ndim(), 0);
    assert_eq!(total.value::<f64>().unwrap(), 21.0);
    assert_eq!(total.unit(), Unit::m());
    assert_eq!(sum(&v, Dim::new("z")).unwrap_err().kind(), ErrorKind::Dimension);
}

#[test]
fn sum_adds_variances() {
    let x = Dim::new("x");
    let v = Variable::from_values_and_variances(
        dims1("x", 3),
        Unit::m(),
        vec![1.0, 2.0, 3.0],
        vec![0.1, 0.2, 0.3],
    )
    .unwrap();
    let out = sum(&v, x).unwrap();
    assert!((out.variance::<f64>().unwrap() - 0.6).abs() < 1e-12);
}

#[test]
fn mean_divides_variance_by_n_squared() {
    let x = Dim::new("x");
    let v = Variable::from_values_and_variances(
        dims1("x", 2),
        Unit::m(),
        vec![1.0, 3.0],
        vec![0.4, 0.4],
    )
    .unwrap();
    let out = mean(&v, x).unwrap();
    assert_eq!(out.value::<f64>().unwrap(), 2.0);
    assert!((out.variance::<f64>().unwrap() - 0.2).abs() < 1e-12);
    // Integer input becomes f64.
    let ints = Variable::from_values(dims1("x", 4), Unit::one(), vec![1i64, 2, 3, 4]).unwrap();
    let out = mean(&ints, x).unwrap();
    assert_eq!(out.dtype(), DType::Float64);
    assert_eq!(out.value::<f64>().unwrap(), 2.5);
}

#[test]
fn min_max_keep_selected_variance() {
    let x = Dim::new("x");
    let v = Variable::from_values_and_variances(
        dims1("x", 3),
        Unit::m(),
        vec![3.0, 1.0, 2.0],
        vec![0.3, 0.1, 0.2],
    )
    .unwrap();
    let lowest = min(&v, x).unwrap();
    assert_eq!(lowest.value::<f64>().unwrap(), 1.0);
    assert_eq!(lowest.variance::<f64>().unwrap(), 0.1);
    let highest = max(&v, x).unwrap();
    assert_eq!(highest.value::<f64>().unwrap(), 3.0);
    assert_eq!(highest.variance::<f64>().unwrap(), 0.3);
}

#[test]
fn all_any_over_bool() {
    let x = Dim::new("x");
    let v = Variable::from_values(dims1("x", 3), Unit::none(), vec![true, false, true]).unwrap();
    assert!(!all(&v, x).unwrap().value::<bool>().unwrap());
    assert!(any(&v, x).unwrap().value::<bool>().unwrap());
    let numeric = Variable::from_values(dims1("x", 3), Unit::none(), vec![1i64, 0, 1]).unwrap();
    assert_eq!(all(&numeric, x).unwrap_err().kind(), ErrorKind::Type);
}

#[test]
fn masked_sum_skips_entries() {
    let x = Dim::new("x");
    let data = Variable::from_values(dims1("x", 4), Unit::counts(), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let mask = Variable::from_values(dims1("x", 4), Unit::none(), vec![false, true, false, true])
        .unwrap();
    let da = DataArray::new(data.clone())
        .with_mask("bad", mask.clone())
        .unwrap();
    let out = da.sum(x).unwrap();
    assert_eq!(out.data().value::<f64>().unwrap(), 4.0);

    // Equivalent to zeroing the masked entries first.
    let zeroed = Variable::from_values(dims1("x", 4), Unit::counts(), vec![1.0, 0.0, 3.0, 0.0]).unwrap();
    assert_eq!(
        out.data().value::<f64>().unwrap(),
        dimarray::sum(&zeroed, x).unwrap().value::<f64>().unwrap()
    );
}

#[test]
fn masked_mean_counts_unmasked_only() {
    let x = Dim::new("x");
    let data = Variable::from_values(dims1("x", 3), Unit::m(), vec![1.0, 100.0, 3.0]).unwrap();
    let mask = Variable::from_values(dims1("x", 3), Unit::none(), vec![false, true, false]).unwrap();
    let da = DataArray::new(data).with_mask("outlier", mask).unwrap();
    assert_eq!(da.mean(x).unwrap().data().value::<f64>().unwrap(), 2.0);
}

#[test]
fn fully_masked_subsets_yield_identities() {
    let x = Dim::new("x");
    let everything = Variable::from_values(dims1("x", 2), Unit::none(), vec![true, true]).unwrap();
    let floats = Variable::from_values(dims1("x", 2), Unit::m(), vec![1.0, 2.0]).unwrap();
    let da = DataArray::new(floats).with_mask("all", everything.clone()).unwrap();
    assert_eq!(da.sum(x).unwrap().data().value::<f64>().unwrap(), 0.0);
    assert!(da.mean(x).unwrap().data().value::<f64>().unwrap().is_nan());
    assert_eq!(da.min(x).unwrap().data().value::<f64>().unwrap(), f64::MAX);
    assert_eq!(da.max(x).unwrap().data().value::<f64>().unwrap(), f64::MIN);

    let flags = Variable::from_values(dims1("x", 2), Unit::none(), vec![true, false]).unwrap();
    let da = DataArray::new(flags).with_mask("all", everything).unwrap();
    assert!(da.all(x).unwrap().data().value::<bool>().unwrap());
    assert!(!da.any(x).unwrap().data().value::<bool>().unwrap());
}

#[test]
fn reduction_over_strided_view() {
    let (x, y) = (Dim::new("x"), Dim::new("y"));
    let v = Variable::from_values(dims2(("x", 2), ("y", 3)), Unit::one(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        .unwrap();
    let t = v.transpose(&[y, x]).unwrap();
    let over_x = sum(&t, x).unwrap();
    assert_eq!(over_x.dims(), &dims1("y", 3));
    assert_eq!(over_x.to_vec::<f64>().unwrap(), vec![5.0, 7.0, 9.0]);
}

#[test]
fn partial_mask_on_2d_reduction() {
    let (x, y) = (Dim::new("x"), Dim::new("y"));
    let data = Variable::from_values(dims2(("x", 2), ("y", 2)), Unit::one(), vec![1.0, 2.0, 3.0, 4.0])
        .unwrap();
    // Mask along y only; it applies to every x row.
    let mask = Variable::from_values(dims1("y", 2), Unit::none(), vec![true, false]).unwrap();
    let da = DataArray::new(data).with_mask("m", mask).unwrap();
    let out = da.sum(y).unwrap();
    assert_eq!(out.data().to_vec::<f64>().unwrap(), vec![2.0, 4.0]);
    let out = da.sum(x).unwrap();
    // The y mask does not involve x, so it survives instead.
    assert_eq!(out.data().to_vec::<f64>().unwrap(), vec![4.0, 6.0]);
    assert!(out.masks().contains("m"));
}
