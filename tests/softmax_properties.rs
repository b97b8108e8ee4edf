//! Property tests for the softmax forward kernel.
//!
//! 1. **Sum to one** – every work unit's outputs sum to 1.
//! 2. **Shift invariance** – adding a constant to the logits changes nothing.
//! 3. **Monotonicity** – larger logit, larger or equal probability.
//! 4. **Independence** – perturbing one work unit leaves the others untouched.
//! 5. **Uniform input** – constant logits give `1 / num_classes` everywhere.
//! 6. **Schedule agreement** – serial, threaded, and grid loops agree exactly.

use mobula_op::{
    softmax_forward_inplace, softmax_forward_kernel, softmax_loss_forward, AxisLayout, GridLoop,
    SerialLoop, ThreadLoop,
};
use proptest::prelude::*;

fn layout_and_logits() -> impl Strategy<Value = (AxisLayout, Vec<f32>)> {
    (1usize..5, 1usize..12, 1usize..5).prop_flat_map(|(outer, classes, inner)| {
        let layout = AxisLayout::new(outer, classes, inner).unwrap();
        (Just(layout), prop::collection::vec(-30.0f32..30.0, layout.len()))
    })
}

fn axis_values(buf: &[f32], layout: AxisLayout, index: usize) -> Vec<f32> {
    let j = layout.axis_offset(index);
    (0..layout.num_classes()).map(|k| buf[j + k * layout.inner_size()]).collect()
}

fn forward(data: &[f32], layout: AxisLayout) -> Vec<f32> {
    let mut probs = vec![0.0f32; data.len()];
    softmax_loss_forward(data, layout.num_classes(), layout.outer_size(), layout.inner_size(), &mut probs)
        .unwrap();
    probs
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_sums_to_one((layout, data) in layout_and_logits()) {
        let probs = forward(&data, layout);
        for index in 0..layout.num_work_units() {
            let row = axis_values(&probs, layout, index);
            let sum: f32 = row.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-5, "work unit {} sums to {}", index, sum);
            for p in row {
                prop_assert!(p > 0.0 && p <= 1.0, "probability {} out of (0, 1]", p);
            }
        }
    }

    #[test]
    fn prop_shift_invariant((layout, data) in layout_and_logits(), c in -50.0f32..50.0) {
        let base = forward(&data, layout);
        let shifted: Vec<f32> = data.iter().map(|x| x + c).collect();
        let moved = forward(&shifted, layout);
        for (a, b) in base.iter().zip(&moved) {
            prop_assert!((a - b).abs() < 1e-4, "{} vs {} after shift {}", a, b, c);
        }
    }

    #[test]
    fn prop_monotone((layout, data) in layout_and_logits()) {
        let probs = forward(&data, layout);
        for index in 0..layout.num_work_units() {
            let x = axis_values(&data, layout, index);
            let p = axis_values(&probs, layout, index);
            for a in 0..x.len() {
                for b in 0..x.len() {
                    if x[a] > x[b] {
                        prop_assert!(p[a] >= p[b], "x[{}]={} > x[{}]={} but p {} < {}", a, x[a], b, x[b], p[a], p[b]);
                    }
                }
            }
        }
    }

    #[test]
    fn prop_work_units_are_independent(
        (layout, data) in layout_and_logits(),
        pick in any::<prop::sample::Index>(),
        delta in 0.5f32..10.0,
    ) {
        let before = forward(&data, layout);
        let target = pick.index(layout.num_work_units());
        let j = layout.axis_offset(target);
        let mut perturbed = data.clone();
        for k in 0..layout.num_classes() {
            perturbed[j + k * layout.inner_size()] += delta * (k as f32 + 1.0);
        }
        let after = forward(&perturbed, layout);
        for index in (0..layout.num_work_units()).filter(|&i| i != target) {
            let a = axis_values(&before, layout, index);
            let b = axis_values(&after, layout, index);
            prop_assert_eq!(
                a.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
                b.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn prop_uniform_input(layout in (1usize..4, 1usize..20, 1usize..4)
        .prop_map(|(o, c, i)| AxisLayout::new(o, c, i).unwrap()), c in -100.0f32..100.0)
    {
        let probs = forward(&vec![c; layout.len()], layout);
        let expected = 1.0 / layout.num_classes() as f32;
        for p in probs {
            prop_assert!((p - expected).abs() < 1e-6, "{} != {}", p, expected);
        }
    }

    #[test]
    fn prop_schedules_agree((layout, data) in layout_and_logits(), block_dim in 1usize..9) {
        let mut serial = vec![0.0f32; data.len()];
        softmax_forward_kernel(&SerialLoop, &data, layout, &mut serial).unwrap();
        let mut threads = vec![0.0f32; data.len()];
        softmax_forward_kernel(&ThreadLoop::new(), &data, layout, &mut threads).unwrap();
        let mut grid = data.clone();
        softmax_forward_inplace(&GridLoop::new(block_dim), &mut grid, layout).unwrap();
        prop_assert_eq!(&serial, &threads);
        prop_assert_eq!(&serial, &grid);
    }
}

// ---------------------------------------------------------------------------
// Fixed examples
// ---------------------------------------------------------------------------

#[test]
fn three_logits_example() {
    let probs = forward(&[1.0, 2.0, 3.0], AxisLayout::new(1, 3, 1).unwrap());
    for (p, e) in probs.iter().zip([0.0900f32, 0.2447, 0.6652]) {
        assert!((p - e).abs() < 1e-4, "{probs:?}");
    }
}

#[test]
fn single_class_gives_one() {
    let layout = AxisLayout::new(3, 1, 4).unwrap();
    let data: Vec<f32> = (0..layout.len()).map(|i| i as f32 * 13.0 - 50.0).collect();
    assert!(forward(&data, layout).iter().all(|&p| p == 1.0));
}

#[test]
fn f64_matches_f32_within_tolerance() {
    let layout = AxisLayout::new(2, 5, 3).unwrap();
    let data32: Vec<f32> = (0..layout.len()).map(|i| (i as f32 * 0.7).sin() * 4.0).collect();
    let data64: Vec<f64> = data32.iter().map(|&x| f64::from(x)).collect();
    let p32 = forward(&data32, layout);
    let mut p64 = vec![0.0f64; layout.len()];
    softmax_loss_forward(&data64, 5, 2, 3, &mut p64).unwrap();
    for (a, b) in p32.iter().zip(&p64) {
        assert!((f64::from(*a) - b).abs() < 1e-6);
    }
}
