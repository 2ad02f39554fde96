use dimarray::{
    add, bins_max, bins_mean, bins_min, bins_sum, concat, multiply, Dim, Dimensions, ErrorKind,
    IndexPair, Unit, Variable,
};

fn dims1(label: &str, extent: usize) -> Dimensions {
    Dimensions::from_pairs(&[(Dim::new(label), extent)]).unwrap()
}

fn event_buffer(values: Vec<f64>) -> Variable {
    Variable::from_values(dims1("event", values.len()), Unit::one(), values).unwrap()
}

fn simple_binned() -> Variable {
    // Two bins over y: [1, 2, 3] and [4, 5].
    let indices = Variable::from_values(
        dims1("y", 2),
        Unit::none(),
        vec![IndexPair::new(0, 3), IndexPair::new(3, 5)],
    )
    .unwrap();
    Variable::make_bins(&indices, Dim::new("event"), event_buffer(vec![1.0, 2.0, 3.0, 4.0, 5.0]))
        .unwrap()
}

#[test]
fn make_bins_validates_ranges() {
    let event = Dim::new("event");
    let buffer = event_buffer(vec![1.0, 2.0, 3.0]);
    let bad = Variable::from_values(dims1("y", 1), Unit::none(), vec![IndexPair::new(1, 4)]).unwrap();
    assert_eq!(
        Variable::make_bins(&bad, event, buffer.clone()).unwrap_err().kind(),
        ErrorKind::BinnedData
    );
    let reversed = Variable::from_values(dims1("y", 1), Unit::none(), vec![IndexPair::new(2, 1)]).unwrap();
    assert_eq!(
        Variable::make_bins(&reversed, event, buffer.clone()).unwrap_err().kind(),
        ErrorKind::BinnedData
    );
    let not_pairs = Variable::from_values(dims1("y", 1), Unit::none(), vec![1i64]).unwrap();
    assert_eq!(
        Variable::make_bins(&not_pairs, event, buffer.clone()).unwrap_err().kind(),
        ErrorKind::Type
    );
    // Permuted and empty ranges are fine.
    let permuted = Variable::from_values(
        dims1("y", 3),
        Unit::none(),
        vec![IndexPair::new(2, 3), IndexPair::new(0, 2), IndexPair::new(1, 1)],
    )
    .unwrap();
    let binned = Variable::make_bins(&permuted, event, buffer).unwrap();
    assert_eq!(binned.bin_sizes().unwrap().to_vec::<i64>().unwrap(), vec![1, 2, 0]);
}

#[test]
fn binned_times_dense_broadcasts_per_bin() {
    let binned = simple_binned();
    let dense = Variable::from_values(dims1("y", 2), Unit::one(), vec![10.0, 20.0]).unwrap();
    let out = multiply(&binned, &dense).unwrap();
    assert!(out.is_binned());
    assert_eq!(
        out.bin_buffer().unwrap().to_vec::<f64>().unwrap(),
        vec![10.0, 20.0, 30.0, 80.0, 100.0]
    );
    // The original is untouched.
    assert_eq!(
        simple_binned().bin_buffer().unwrap().to_vec::<f64>().unwrap(),
        vec![1.0, 2.0, 3.0, 4.0, 5.0]
    );
    // Reversed operand order reaches the same elements.
    let swapped = multiply(&dense, &binned).unwrap();
    assert_eq!(out, swapped);
}

#[test]
fn binned_pair_requires_matching_indices() {
    let binned = simple_binned();
    let other = simple_binned();
    let summed = add(&binned, &other).unwrap();
    assert_eq!(
        summed.bin_buffer().unwrap().to_vec::<f64>().unwrap(),
        vec![2.0, 4.0, 6.0, 8.0, 10.0]
    );

    let mismatched_indices = Variable::from_values(
        dims1("y", 2),
        Unit::none(),
        vec![IndexPair::new(0, 2), IndexPair::new(2, 5)],
    )
    .unwrap();
    let mismatched = Variable::make_bins(
        &mismatched_indices,
        Dim::new("event"),
        event_buffer(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
    )
    .unwrap();
    assert_eq!(add(&binned, &mismatched).unwrap_err().kind(), ErrorKind::BinnedData);
}

#[test]
fn bin_descent_equals_buffer_op() {
    let binned = simple_binned();
    let other = simple_binned();
    let summed = add(&binned, &other).unwrap();
    let buffer_sum = add(binned.bin_buffer().unwrap(), other.bin_buffer().unwrap()).unwrap();
    let expected =
        Variable::make_bins(&binned.bin_indices().unwrap(), Dim::new("event"), buffer_sum).unwrap();
    assert_eq!(summed, expected);
}

#[test]
fn bin_reductions() {
    let binned = simple_binned();
    assert_eq!(bins_sum(&binned).unwrap().to_vec::<f64>().unwrap(), vec![6.0, 9.0]);
    assert_eq!(bins_mean(&binned).unwrap().to_vec::<f64>().unwrap(), vec![2.0, 4.5]);
    assert_eq!(bins_min(&binned).unwrap().to_vec::<f64>().unwrap(), vec![1.0, 4.0]);
    assert_eq!(bins_max(&binned).unwrap().to_vec::<f64>().unwrap(), vec![3.0, 5.0]);

    // An empty bin yields the identities.
    let indices = Variable::from_values(
        dims1("y", 2),
        Unit::none(),
        vec![IndexPair::new(0, 2), IndexPair::new(2, 2)],
    )
    .unwrap();
    let with_empty =
        Variable::make_bins(&indices, Dim::new("event"), event_buffer(vec![1.0, 2.0])).unwrap();
    assert_eq!(bins_sum(&with_empty).unwrap().to_vec::<f64>().unwrap(), vec![3.0, 0.0]);
    assert!(bins_mean(&with_empty).unwrap().to_vec::<f64>().unwrap()[1].is_nan());
    assert_eq!(bins_max(&with_empty).unwrap().to_vec::<f64>().unwrap()[1], f64::MIN);
}

#[test]
fn concat_binned_along_outer_dim() {
    let y = Dim::new("y");
    let a = simple_binned();
    let b = {
        let indices =
            Variable::from_values(dims1("y", 1), Unit::none(), vec![IndexPair::new(0, 2)]).unwrap();
        Variable::make_bins(&indices, Dim::new("event"), event_buffer(vec![7.0, 8.0])).unwrap()
    };
    let joined = concat(&a, &b, y).unwrap();
    assert_eq!(joined.dims().extent(y).unwrap(), 3);
    assert_eq!(joined.bin_sizes().unwrap().to_vec::<i64>().unwrap(), vec![3, 2, 2]);
    assert_eq!(
        joined.bin_buffer().unwrap().to_vec::<f64>().unwrap(),
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 7.0, 8.0]
    );
}

#[test]
fn concat_binned_event_wise() {
    let event = Dim::new("event");
    let a = simple_binned();
    let b = {
        let indices = Variable::from_values(
            dims1("y", 2),
            Unit::none(),
            vec![IndexPair::new(0, 1), IndexPair::new(1, 2)],
        )
        .unwrap();
        Variable::make_bins(&indices, event, event_buffer(vec![7.0, 8.0])).unwrap()
    };
    let joined = concat(&a, &b, event).unwrap();
    assert_eq!(joined.dims(), a.dims());
    assert_eq!(joined.bin_sizes().unwrap().to_vec::<i64>().unwrap(), vec![4, 3]);
    assert_eq!(
        joined.bin_buffer().unwrap().to_vec::<f64>().unwrap(),
        vec![1.0, 2.0, 3.0, 7.0, 4.0, 5.0, 8.0]
    );
}

#[test]
fn copy_compacts_permuted_bins() {
    let event = Dim::new("event");
    let indices = Variable::from_values(
        dims1("y", 2),
        Unit::none(),
        vec![IndexPair::new(3, 5), IndexPair::new(0, 2)],
    )
    .unwrap();
    let binned =
        Variable::make_bins(&indices, event, event_buffer(vec![1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
    let compact = binned.copy();
    assert_eq!(compact, binned);
    assert_eq!(
        compact.bin_buffer().unwrap().to_vec::<f64>().unwrap(),
        vec![4.0, 5.0, 1.0, 2.0]
    );
    assert_eq!(
        compact.bin_indices().unwrap().to_vec::<IndexPair>().unwrap(),
        vec![IndexPair::new(0, 2), IndexPair::new(2, 4)]
    );
}

#[test]
fn in_place_rejects_overlapping_bins() {
    let event = Dim::new("event");
    let indices = Variable::from_values(
        dims1("y", 2),
        Unit::none(),
        vec![IndexPair::new(0, 3), IndexPair::new(2, 5)],
    )
    .unwrap();
    let mut overlapping =
        Variable::make_bins(&indices, event, event_buffer(vec![1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
    // Reading overlapping bins is fine.
    assert_eq!(overlapping.bin_sizes().unwrap().to_vec::<i64>().unwrap(), vec![3, 3]);
    let dense = Variable::from_values(dims1("y", 2), Unit::one(), vec![1.0, 1.0]).unwrap();
    assert_eq!(
        dimarray::add_assign(&mut overlapping, &dense).unwrap_err().kind(),
        ErrorKind::BinnedData
    );
}

#[test]
fn binned_slicing_views_outer_dim() {
    let y = Dim::new("y");
    let binned = simple_binned();
    let tail = binned.slice(y, 1, 2).unwrap();
    assert_eq!(tail.bin_sizes().unwrap().to_vec::<i64>().unwrap(), vec![2]);
    assert_eq!(bins_sum(&tail).unwrap().to_vec::<f64>().unwrap(), vec![9.0]);
}
