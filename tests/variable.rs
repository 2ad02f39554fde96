use dimarray::{DType, Dim, Dimensions, ErrorKind, Unit, Variable};

fn dims1(label: &str, extent: usize) -> Dimensions {
    Dimensions::from_pairs(&[(Dim::new(label), extent)]).unwrap()
}

fn dims2(a: (&str, usize), b: (&str, usize)) -> Dimensions {
    Dimensions::from_pairs(&[(Dim::new(a.0), a.1), (Dim::new(b.0), b.1)]).unwrap()
}

#[test]
fn from_values_round_trip() {
    let v = Variable::from_values(dims1("x", 3), Unit::m(), vec![1.0, 2.0, 3.0]).unwrap();
    assert_eq!(v.dtype(), DType::Float64);
    assert_eq!(v.unit(), Unit::m());
    assert_eq!(v.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(v.values::<f64>().unwrap(), &[1.0, 2.0, 3.0]);
    assert!(v.values::<i64>().is_err());
}

#[test]
fn copy_is_equal_but_independent() {
    let mut v =
        Variable::from_values_and_variances(dims1("x", 3), Unit::m(), vec![1.0, 2.0, 3.0], vec![0.1, 0.2, 0.3])
            .unwrap();
    let copied = v.copy();
    assert_eq!(copied, v);
    let patch = Variable::from_values(dims1("x", 1), Unit::m(), vec![9.0]).unwrap();
    let mut view = v.slice_mut(Dim::new("x"), 0, 1).unwrap();
    // Writing needs matching variance presence.
    assert_eq!(view.assign(&patch).unwrap_err().kind(), ErrorKind::Variances);
    let patch = Variable::from_values_and_variances(dims1("x", 1), Unit::m(), vec![9.0], vec![0.9]).unwrap();
    view.assign(&patch).unwrap();
    assert_eq!(v.to_vec::<f64>().unwrap(), vec![9.0, 2.0, 3.0]);
    assert_eq!(copied.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn clone_shares_until_written() {
    let v = Variable::from_values(dims1("x", 2), Unit::one(), vec![1i64, 2]).unwrap();
    let mut w = v.clone();
    let patch = Variable::from_values(dims1("x", 2), Unit::one(), vec![7i64, 8]).unwrap();
    w.view_mut().assign(&patch).unwrap();
    assert_eq!(v.to_vec::<i64>().unwrap(), vec![1, 2]);
    assert_eq!(w.to_vec::<i64>().unwrap(), vec![7, 8]);
}

#[test]
fn slice_range_and_index() {
    let x = Dim::new("x");
    let v = Variable::arange(x, 10).unwrap();
    let s = v.slice(x, 2, 5).unwrap();
    assert_eq!(s.to_vec::<i64>().unwrap(), vec![2, 3, 4]);
    let e = v.slice_index(x, -1).unwrap();
    assert_eq!(e.ndim(), 0);
    assert_eq!(e.value::<i64>().unwrap(), 9);
    assert_eq!(v.slice(x, 4, 2).unwrap_err().kind(), ErrorKind::Slice);
    assert_eq!(v.slice(x, 0, 11).unwrap_err().kind(), ErrorKind::Slice);
    assert_eq!(
        v.slice(Dim::new("y"), 0, 1).unwrap_err().kind(),
        ErrorKind::Dimension
    );
    assert_eq!(v.slice_index(x, -11).unwrap_err().kind(), ErrorKind::Slice);
}

#[test]
fn slice_of_2d_is_strided_view() {
    let (x, y) = (Dim::new("x"), Dim::new("y"));
    let v = Variable::from_values(dims2(("x", 2), ("y", 3)), Unit::one(), vec![1, 2, 3, 4, 5, 6i64])
        .unwrap();
    let column = v.slice(y, 1, 2).unwrap();
    assert_eq!(column.dims().shape(), &[2, 1]);
    assert_eq!(column.to_vec::<i64>().unwrap(), vec![2, 5]);
    let row = v.slice_index(x, 1).unwrap();
    assert_eq!(row.to_vec::<i64>().unwrap(), vec![4, 5, 6]);
}

#[test]
fn transpose_is_a_view() {
    let (x, y) = (Dim::new("x"), Dim::new("y"));
    let v = Variable::from_values(dims2(("x", 2), ("y", 3)), Unit::one(), vec![1, 2, 3, 4, 5, 6i64])
        .unwrap();
    let t = v.transpose(&[y, x]).unwrap();
    assert_eq!(t.dims().shape(), &[3, 2]);
    assert_eq!(t.to_vec::<i64>().unwrap(), vec![1, 4, 2, 5, 3, 6]);
    // Empty order reverses.
    assert_eq!(v.transpose(&[]).unwrap(), t);
    assert_eq!(t.transpose(&[x, y]).unwrap(), v);
    assert_eq!(
        v.transpose(&[x]).unwrap_err().kind(),
        ErrorKind::Dimension
    );
}

#[test]
fn broadcast_adds_stride_zero_dims() {
    let (x, y) = (Dim::new("x"), Dim::new("y"));
    let v = Variable::from_values(dims1("y", 3), Unit::one(), vec![1, 2, 3i64]).unwrap();
    let target = dims2(("x", 2), ("y", 3));
    let b = v.broadcast(&target).unwrap();
    assert_eq!(b.dims(), &target);
    assert_eq!(b.to_vec::<i64>().unwrap(), vec![1, 2, 3, 1, 2, 3]);
    let wrong = Dimensions::from_pairs(&[(x, 2), (y, 4)]).unwrap();
    assert_eq!(v.broadcast(&wrong).unwrap_err().kind(), ErrorKind::Dimension);
}

#[test]
fn set_variances_contract() {
    let mut v = Variable::from_values(dims1("x", 2), Unit::m(), vec![1.0, 2.0]).unwrap();
    let bad_unit = Variable::from_values(dims1("x", 2), Unit::s(), vec![0.1, 0.2]).unwrap();
    assert_eq!(v.set_variances(Some(&bad_unit)).unwrap_err().kind(), ErrorKind::Variances);
    let bad_dims = Variable::from_values(dims1("x", 3), Unit::m(), vec![0.1, 0.2, 0.3]).unwrap();
    assert_eq!(v.set_variances(Some(&bad_dims)).unwrap_err().kind(), ErrorKind::Variances);
    let good = Variable::from_values(dims1("x", 2), Unit::m(), vec![0.1, 0.2]).unwrap();
    v.set_variances(Some(&good)).unwrap();
    assert_eq!(v.variances_to_vec::<f64>().unwrap(), vec![0.1, 0.2]);
    v.set_variances(None).unwrap();
    assert!(!v.has_variances());

    let mut ints = Variable::from_values(dims1("x", 2), Unit::one(), vec![1i64, 2]).unwrap();
    let int_var = Variable::from_values(dims1("x", 2), Unit::one(), vec![1i64, 2]).unwrap();
    assert_eq!(ints.set_variances(Some(&int_var)).unwrap_err().kind(), ErrorKind::Variances);
}

#[test]
fn rename_dims_contract() {
    let (x, y) = (Dim::new("x"), Dim::new("y"));
    let mut v = Variable::from_values(dims2(("x", 2), ("y", 3)), Unit::one(), vec![0i64; 6]).unwrap();
    assert_eq!(v.rename_dims(x, y).unwrap_err().kind(), ErrorKind::Dimension);
    v.rename_dims(x, Dim::new("z")).unwrap();
    assert!(v.dims().contains(Dim::new("z")));
    assert!(!v.dims().contains(x));
}

#[test]
fn equality_ignores_layout() {
    let (x, y) = (Dim::new("x"), Dim::new("y"));
    let v = Variable::from_values(dims2(("x", 2), ("y", 2)), Unit::one(), vec![1, 2, 3, 4i64]).unwrap();
    let t = v.transpose(&[y, x]).unwrap().copy();
    // Same elements, different dim order: not equal.
    assert_ne!(t, v);
    assert_eq!(t.transpose(&[x, y]).unwrap(), v);
    // Unit participates.
    let w = v.with_unit(Unit::m());
    assert_ne!(w, v);
}

#[test]
fn scalar_accessors() {
    let s = Variable::scalar_with_variance(2.5f64, 0.5, Unit::kg()).unwrap();
    assert_eq!(s.ndim(), 0);
    assert_eq!(s.volume(), 1);
    assert_eq!(s.value::<f64>().unwrap(), 2.5);
    assert_eq!(s.variance::<f64>().unwrap(), 0.5);
    let v = Variable::arange(Dim::new("x"), 3).unwrap();
    assert_eq!(v.value::<i64>().unwrap_err().kind(), ErrorKind::Dimension);
}

#[test]
fn rank_cap_is_enforced() {
    let mut pairs = Vec::new();
    for i in 0..7 {
        pairs.push((Dim::new(&format!("d{}", i)), 1));
    }
    assert_eq!(
        Dimensions::from_pairs(&pairs).unwrap_err().kind(),
        ErrorKind::Dimension
    );
}
