//! End-to-end tests of the `HierarchicalSoftmax` layer.

use approx::assert_abs_diff_eq;
use ndarray::{array, Array1};
use rstest::rstest;

use hsoftmax::testing::{balanced_tree, random_inputs, random_targets, random_tree};
use hsoftmax::{ClassTree, HierarchicalSoftmax, HsmConfig, HsmError, Input};

fn config(n_threads: usize) -> HsmConfig {
    HsmConfig::builder().n_threads(n_threads).build().unwrap()
}

#[test]
fn single_vector_matches_batch_of_one() {
    let mut layer = HierarchicalSoftmax::<f64>::new(random_tree(10, 1), 4, config(1)).unwrap();
    let x = array![0.3, -1.2, 0.8, 0.0];
    let batch = x.clone().insert_axis(ndarray::Axis(0));

    let single = layer.update_output(&x, &[7]).unwrap();
    let single_grad = layer.update_grad_input(array![1.0].view()).unwrap();
    let batched = layer.update_output(&batch, &[7]).unwrap();
    let batched_grad = layer.update_grad_input(array![1.0].view()).unwrap();

    assert_eq!(single, batched);
    assert_eq!(single_grad, batched_grad);
    assert_eq!(single_grad.dim(), (1, 4));
}

#[test]
fn accepts_input_enum_directly() {
    let mut layer = HierarchicalSoftmax::<f32>::new(balanced_tree(4), 2, config(1)).unwrap();
    let x = array![1.0f32, 2.0];
    let output = layer.update_output(Input::Single(x.view()), &[3]).unwrap();
    assert_eq!(output.len(), 1);
    assert!(output[0] < 0.0);
}

#[rstest]
fn threaded_layer_matches_sequential(#[values(0, 2, 4)] n_threads: usize) {
    let tree = random_tree(50, 3);
    let input = random_inputs::<f64>(128, 6, 4, 1.0);
    let targets = random_targets(128, 50, 5);
    let grad_output = Array1::from_elem(128, -1.0 / 128.0);

    let mut sequential = HierarchicalSoftmax::<f64>::new(tree.clone(), 6, config(1)).unwrap();
    let mut threaded = HierarchicalSoftmax::<f64>::new(tree, 6, config(n_threads)).unwrap();
    assert_eq!(sequential.weight(), threaded.weight());

    for layer in [&mut sequential, &mut threaded] {
        layer.update_output(&input, &targets).unwrap();
        layer.zero_grad_parameters();
        layer.acc_grad_parameters(&input, grad_output.view(), 1.0).unwrap();
    }

    assert_eq!(
        sequential.update_grad_input(grad_output.view()).unwrap(),
        threaded.update_grad_input(grad_output.view()).unwrap()
    );
    assert_eq!(sequential.grad_weight(), threaded.grad_weight());
    assert_eq!(sequential.grad_bias(), threaded.grad_bias());
}

#[test]
fn gradient_descent_lowers_negative_log_likelihood() {
    let n = 64;
    let tree = balanced_tree(8);
    let input = random_inputs::<f64>(n, 4, 10, 1.0);
    let targets = random_targets(n, 8, 11);
    // d(-mean ln P) / d ln P_i
    let grad_output = Array1::from_elem(n, -1.0 / n as f64);

    let mut layer = HierarchicalSoftmax::<f64>::new(tree, 4, config(1)).unwrap();
    let mut losses = Vec::new();
    for _ in 0..30 {
        let log_probs = layer.update_output(&input, &targets).unwrap();
        losses.push(-log_probs.mean().unwrap());

        layer.zero_grad_parameters();
        layer.acc_grad_parameters(&input, grad_output.view(), 1.0).unwrap();
        layer.update_parameters(0.5);
    }

    assert!(losses.windows(2).all(|w| w[1] <= w[0]), "losses: {losses:?}");
    assert!(losses[losses.len() - 1] < losses[0]);
}

#[test]
fn backward_requires_forward() {
    let mut layer = HierarchicalSoftmax::<f64>::new(balanced_tree(4), 2, config(1)).unwrap();
    assert_eq!(
        layer.update_grad_input(array![1.0].view()),
        Err(HsmError::MissingForward)
    );

    let input = array![[1.0, 0.0]];
    layer.update_output(&input, &[1]).unwrap();
    assert!(layer.update_grad_input(array![1.0].view()).is_ok());
    assert_eq!(layer.last_path().map(|p| p.n_decisions()), Some(2));
}

#[test]
fn acc_grad_parameters_checks_input_width() {
    let mut layer = HierarchicalSoftmax::<f64>::new(balanced_tree(4), 2, config(1)).unwrap();
    layer.update_output(&array![[1.0, 0.0]], &[1]).unwrap();

    let err = layer
        .acc_grad_parameters(&array![[1.0, 0.0, 2.0]], array![1.0].view(), 1.0)
        .unwrap_err();
    assert_eq!(
        err,
        HsmError::ShapeMismatch {
            what: "input columns",
            expected: 2,
            actual: 3
        }
    );
}

#[test]
fn invalid_config_is_rejected() {
    let config = HsmConfig {
        score_clamp: Some(-1.0),
        ..HsmConfig::default()
    };
    let err = HierarchicalSoftmax::<f64>::new(balanced_tree(4), 2, config).unwrap_err();
    assert!(matches!(err, HsmError::Config(_)));
}

#[test]
fn clamped_layer_stays_finite() {
    let config = HsmConfig::builder()
        .n_threads(1)
        .score_clamp(20.0)
        .build()
        .unwrap();
    let mut layer = HierarchicalSoftmax::<f64>::with_params(
        balanced_tree(2),
        array![[500.0]],
        array![0.0],
        config,
    )
    .unwrap();

    let output = layer.update_output(&array![[1.0]], &[1]).unwrap();
    assert!(output[0].is_finite());
    assert_abs_diff_eq!(output[0], -20.0, epsilon = 1e-6);
}

// =============================================================================
// Serialization
// =============================================================================

#[test]
fn tree_json_round_trip() {
    let tree = ClassTree::from_signed(3, &[4, -4, 5, -5, 0], &[1, 0]).unwrap();
    let json = serde_json::to_string(&tree).unwrap();
    assert_eq!(json, r#"{"n_leaves":3,"parents":[4,-4,5,-5,0],"depth":[1,0]}"#);

    let back: ClassTree = serde_json::from_str(&json).unwrap();
    assert_eq!(back, tree);
}

#[test]
fn tree_json_rejects_malformed_descriptor() {
    let negative_depth = r#"{"n_leaves":3,"parents":[4,-4,5,-5,0],"depth":[1,-1]}"#;
    assert!(serde_json::from_str::<ClassTree>(negative_depth).is_err());

    let parent_past_end = r#"{"n_leaves":3,"parents":[4,-4,9,-5,0],"depth":[1,0]}"#;
    assert!(serde_json::from_str::<ClassTree>(parent_past_end).is_err());
}

#[test]
fn config_json_round_trip() {
    let config = HsmConfig::builder()
        .n_threads(3)
        .score_clamp(15.0)
        .seed(7)
        .build()
        .unwrap();
    let json = serde_json::to_string(&config).unwrap();
    let back: HsmConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}
