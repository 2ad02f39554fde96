use dimarray::{
    groupby, groupby_bins, DataArray, Dim, Dimensions, ErrorKind, IndexPair, Unit, Variable,
};

fn dims1(label: &str, extent: usize) -> Dimensions {
    Dimensions::from_pairs(&[(Dim::new(label), extent)]).unwrap()
}

fn labeled_array() -> DataArray {
    let (x, labels) = (Dim::new("x"), Dim::new("labels"));
    let data = Variable::from_values(dims1("x", 3), Unit::counts(), vec![1.0, 2.0, 3.0]).unwrap();
    let tags = Variable::from_values(
        Dimensions::from_pairs(&[(x, 3)]).unwrap(),
        Unit::none(),
        vec!["a".to_owned(), "a".to_owned(), "b".to_owned()],
    )
    .unwrap();
    DataArray::new(data).with_coord(labels, tags).unwrap()
}

#[test]
fn groupby_sum_over_labels() {
    let (x, labels) = (Dim::new("x"), Dim::new("labels"));
    let grouped = groupby(&labeled_array(), labels).unwrap();
    assert_eq!(grouped.len(), 2);
    let out = grouped.sum(x).unwrap();
    assert_eq!(out.data().dims(), &dims1("labels", 2));
    assert_eq!(out.data().to_vec::<f64>().unwrap(), vec![3.0, 3.0]);
    let key = out.coords().get(labels).unwrap();
    assert_eq!(
        key.to_vec::<String>().unwrap(),
        vec!["a".to_owned(), "b".to_owned()]
    );
}

#[test]
fn groupby_other_reductions() {
    let (x, labels) = (Dim::new("x"), Dim::new("labels"));
    let grouped = groupby(&labeled_array(), labels).unwrap();
    assert_eq!(
        grouped.mean(x).unwrap().data().to_vec::<f64>().unwrap(),
        vec![1.5, 3.0]
    );
    assert_eq!(
        grouped.min(x).unwrap().data().to_vec::<f64>().unwrap(),
        vec![1.0, 3.0]
    );
    assert_eq!(
        grouped.max(x).unwrap().data().to_vec::<f64>().unwrap(),
        vec![2.0, 3.0]
    );
    // Only the grouped dim can be reduced.
    assert_eq!(grouped.sum(labels).unwrap_err().kind(), ErrorKind::Dimension);
}

#[test]
fn groupby_respects_masks() {
    let (x, labels) = (Dim::new("x"), Dim::new("labels"));
    let mask = Variable::from_values(dims1("x", 3), Unit::none(), vec![true, false, false]).unwrap();
    let array = labeled_array().with_mask("bad", mask).unwrap();
    let out = groupby(&array, labels).unwrap().sum(x).unwrap();
    assert_eq!(out.data().to_vec::<f64>().unwrap(), vec![2.0, 3.0]);
}

#[test]
fn groupby_bins_classifies_and_drops_outliers() {
    let (x, height) = (Dim::new("x"), Dim::new("height"));
    let data = Variable::from_values(dims1("x", 5), Unit::counts(), vec![1.0, 2.0, 3.0, 4.0, 5.0])
        .unwrap();
    let key = Variable::from_values(dims1("x", 5), Unit::m(), vec![0.1, 1.5, 0.9, 7.0, 1.1]).unwrap();
    let da = DataArray::new(data).with_coord(height, key).unwrap();
    let edges = Variable::from_values(dims1("height", 3), Unit::m(), vec![0.0, 1.0, 2.0]).unwrap();
    let grouped = groupby_bins(&da, height, &edges).unwrap();
    assert_eq!(grouped.len(), 2);
    // 7.0 is outside the edges and dropped.
    let out = grouped.sum(x).unwrap();
    assert_eq!(out.data().to_vec::<f64>().unwrap(), vec![4.0, 7.0]);
    // The group coord carries the bin edges.
    let coord = out.coords().get(height).unwrap();
    assert_eq!(coord.to_vec::<f64>().unwrap(), vec![0.0, 1.0, 2.0]);

    let wrong_unit = Variable::from_values(dims1("height", 3), Unit::s(), vec![0.0, 1.0, 2.0]).unwrap();
    assert_eq!(groupby_bins(&da, height, &wrong_unit).unwrap_err().kind(), ErrorKind::Unit);
}

#[test]
fn groupby_concat_dense_equal_groups() {
    let (x, labels) = (Dim::new("x"), Dim::new("labels"));
    let data = Variable::from_values(dims1("x", 4), Unit::one(), vec![10.0, 20.0, 30.0, 40.0]).unwrap();
    let tags = Variable::from_values(
        Dimensions::from_pairs(&[(x, 4)]).unwrap(),
        Unit::none(),
        vec!["a".to_owned(), "b".to_owned(), "a".to_owned(), "b".to_owned()],
    )
    .unwrap();
    let da = DataArray::new(data).with_coord(labels, tags).unwrap();
    let out = groupby(&da, labels).unwrap().concat(x).unwrap();
    assert_eq!(out.data().dims().shape(), &[2, 2]);
    assert_eq!(out.data().to_vec::<f64>().unwrap(), vec![10.0, 30.0, 20.0, 40.0]);
}

#[test]
fn groupby_concat_binned_merges_events() {
    let (y, labels, event) = (Dim::new("y"), Dim::new("labels"), Dim::new("event"));
    let indices = Variable::from_values(
        dims1("y", 3),
        Unit::none(),
        vec![IndexPair::new(0, 2), IndexPair::new(2, 3), IndexPair::new(3, 5)],
    )
    .unwrap();
    let buffer = Variable::from_values(
        dims1("event", 5),
        Unit::one(),
        vec![1.0, 2.0, 3.0, 4.0, 5.0],
    )
    .unwrap();
    let binned = Variable::make_bins(&indices, event, buffer).unwrap();
    let tags = Variable::from_values(
        Dimensions::from_pairs(&[(y, 3)]).unwrap(),
        Unit::none(),
        vec!["a".to_owned(), "b".to_owned(), "a".to_owned()],
    )
    .unwrap();
    let da = DataArray::new(binned).with_coord(labels, tags).unwrap();
    let out = groupby(&da, labels).unwrap().concat(y).unwrap();
    assert_eq!(out.data().dims(), &dims1("labels", 2));
    let sizes = out.data().bin_sizes().unwrap();
    assert_eq!(sizes.to_vec::<i64>().unwrap(), vec![4, 1]);
    assert_eq!(
        dimarray::bins_sum(out.data()).unwrap().to_vec::<f64>().unwrap(),
        vec![1.0 + 2.0 + 4.0 + 5.0, 3.0]
    );
}
