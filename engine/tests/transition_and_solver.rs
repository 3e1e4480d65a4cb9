// tests/transition_and_solver.rs

use adp_engine::adp::{
    check_concavity, pre_decision, total_wealth, transition, AdpConfig, AllocationSolver,
    BoundedInspectionSolver, InspectionSolver, LinearValueFunction, Solver, Trades,
    compact_adp_config_demo,
};
use adp_engine::AdpError;

fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}

fn apply(h_prev: &[f64], r: &[f64], trades: &Trades, theta: f64) -> Vec<f64> {
    transition(h_prev, r, &trades.buys, &trades.sells, theta).expect("transition")
}

#[test]
fn transition_conserves_wealth_minus_cost_leakage() {
    let h_prev = [100.0, 50.0, 20.0];
    let r = [1.01, 1.1, 0.9];
    let buys = [0.0, 10.0];
    let sells = [5.0, 0.0];
    let theta = 0.01;

    let h = transition(&h_prev, &r, &buys, &sells, theta).unwrap();

    assert!(approx_eq(h[0], 95.85, 1e-9), "cash after trades was {}", h[0]);
    assert!(approx_eq(h[1], 50.0, 1e-9));
    assert!(approx_eq(h[2], 28.0, 1e-9));

    let before = total_wealth(&pre_decision(&h_prev, &r).unwrap());
    let leakage = theta * (5.0 + 10.0);
    assert!(
        approx_eq(total_wealth(&h), before - leakage, 1e-9),
        "wealth {} must equal pre-decision wealth {} minus leakage {}",
        total_wealth(&h),
        before,
        leakage
    );
}

#[test]
fn transition_rejects_mismatched_lengths() {
    let err = transition(&[1.0, 1.0], &[1.0, 1.0, 1.0], &[0.0], &[0.0], 0.0).unwrap_err();
    assert!(matches!(err, AdpError::DimensionMismatch { .. }), "got {:?}", err);

    let err = transition(&[1.0, 1.0], &[1.0, 1.0], &[0.0, 0.0], &[0.0], 0.0).unwrap_err();
    assert!(matches!(err, AdpError::DimensionMismatch { what: "buys", .. }));
}

#[test]
fn single_asset_with_higher_slope_takes_all_cash() {
    let solver = InspectionSolver { theta: 0.0 };
    let v = LinearValueFunction::new(vec![1.0, 1.5]);
    let h_prev = [1_000_000.0, 0.0];
    let r = [1.0, 1.0];

    let trades = solver.solve(&r, &h_prev, &v).unwrap();
    assert!(approx_eq(trades.buys[0], 1_000_000.0, 1e-6), "buys {:?}", trades.buys);
    assert_eq!(trades.sells, vec![0.0]);

    let h = apply(&h_prev, &r, &trades, 0.0);
    assert!(approx_eq(h[0], 0.0, 1e-6));
    assert!(approx_eq(h[1], 1_000_000.0, 1e-6));
}

#[test]
fn single_asset_with_positive_sell_slope_is_liquidated() {
    let solver = InspectionSolver { theta: 0.0 };
    let v = LinearValueFunction::new(vec![1.0, 0.5]);
    let h_prev = [0.0, 100.0];
    let r = [1.0, 1.2];

    let trades = solver.solve(&r, &h_prev, &v).unwrap();
    assert!(approx_eq(trades.sells[0], 120.0, 1e-9), "sells {:?}", trades.sells);
    assert_eq!(trades.buys, vec![0.0]);

    let h = apply(&h_prev, &r, &trades, 0.0);
    assert!(approx_eq(h[0], 120.0, 1e-9));
    assert!(approx_eq(h[1], 0.0, 1e-9));
}

#[test]
fn buying_with_costs_spends_exactly_the_cash() {
    let theta = 0.01;
    let solver = InspectionSolver { theta };
    let v = LinearValueFunction::new(vec![1.0, 1.5]);
    let h_prev = [1_000_000.0, 0.0];
    let r = [1.0, 1.0];

    let trades = solver.solve(&r, &h_prev, &v).unwrap();
    assert!(approx_eq(trades.buys[0], 1_000_000.0 / 1.01, 1e-6));

    let h = apply(&h_prev, &r, &trades, theta);
    assert!(approx_eq(h[0], 0.0, 1e-6), "cash must be used up, got {}", h[0]);
}

#[test]
fn equal_buy_slopes_pick_lowest_index() {
    let solver = InspectionSolver { theta: 0.0 };
    let v = LinearValueFunction::new(vec![1.0, 2.0, 2.0]);

    let trades = solver.solve(&[1.0, 1.0, 1.0], &[500.0, 0.0, 0.0], &v).unwrap();
    assert!(approx_eq(trades.buys[0], 500.0, 1e-9), "buys {:?}", trades.buys);
    assert_eq!(trades.buys[1], 0.0);
}

#[test]
fn sell_set_is_liquidated_and_proceeds_go_to_best_buy() {
    let solver = InspectionSolver { theta: 0.0 };
    // instrument 0: l = 1 − 0.5 > 0 → verkopen; instrument 1: k = 1 > 0
    let v = LinearValueFunction::new(vec![1.0, 0.5, 2.0]);

    let trades = solver.solve(&[1.0, 1.0, 1.0], &[0.0, 100.0, 0.0], &v).unwrap();
    assert!(approx_eq(trades.sells[0], 100.0, 1e-9));
    assert!(approx_eq(trades.buys[1], 100.0, 1e-9));
    assert_eq!(trades.sells[1], 0.0);
    assert_eq!(trades.buys[0], 0.0);
}

#[test]
fn sell_to_buy_converts_directly_and_keeps_cash_at_zero() {
    let theta = 0.01;
    let solver = InspectionSolver { theta };
    // instrument 0 is geen sell-kandidaat (l < 0), maar omzetten naar 1 loont
    let v = LinearValueFunction::new(vec![1.0, 1.0, 2.0]);
    let h_prev = [0.0, 100.0, 0.0];
    let r = [1.0, 1.0, 1.0];

    let trades = solver.solve(&r, &h_prev, &v).unwrap();
    let ratio = (1.0 - theta) / (1.0 + theta);

    assert!(approx_eq(trades.sells[0], 100.0, 1e-9), "sells {:?}", trades.sells);
    assert!(approx_eq(trades.buys[1], 100.0 * ratio, 1e-9), "buys {:?}", trades.buys);

    let h = apply(&h_prev, &r, &trades, theta);
    assert!(approx_eq(h[0], 0.0, 1e-9), "sell-to-buy must be cash neutral, got {}", h[0]);
    assert!(h.iter().all(|x| *x >= -1e-9), "state must stay feasible: {:?}", h);
}

#[test]
fn no_trades_when_nothing_beats_costs() {
    let solver = InspectionSolver { theta: 0.01 };
    let v = LinearValueFunction::new(vec![1.0, 1.0, 1.0]);

    let trades = solver.solve(&[1.0, 1.0, 1.0], &[100.0, 50.0, 50.0], &v).unwrap();
    assert_eq!(trades, Trades::none(2));
    assert_eq!(trades.turnover(), 0.0);
}

#[test]
fn concavity_violation_is_reported_before_trading() {
    // u0 < 0: k = 0.1 en l = 0.1 tegelijk positief
    let u = [-1.0, -1.0];
    let err = check_concavity(&u, 0.1).unwrap_err();
    match err {
        AdpError::ConcavityViolation {
            instrument,
            buy_slope,
            sell_slope,
        } => {
            assert_eq!(instrument, 0);
            assert!(approx_eq(buy_slope, 0.1, 1e-12));
            assert!(approx_eq(sell_slope, 0.1, 1e-12));
        }
        other => panic!("expected ConcavityViolation, got {:?}", other),
    }

    let solver = InspectionSolver { theta: 0.1 };
    let v = LinearValueFunction::new(u.to_vec());
    let err = solver.solve(&[1.0, 1.0], &[100.0, 0.0], &v).unwrap_err();
    assert!(err.is_solver_failure(), "solver should flag {:?} as solver failure", err);
}

#[test]
fn empty_slopes_are_a_dimension_error() {
    let err = check_concavity(&[], 0.01).unwrap_err();
    assert!(matches!(err, AdpError::DimensionMismatch { .. }), "got {:?}", err);
}

#[test]
fn initial_state_holds_only_cash() {
    let cfg = compact_adp_config_demo();
    let h0 = cfg.initial_state(3);
    assert_eq!(h0.len(), 4);
    assert_eq!(h0[0], cfg.initial_capital);
    assert!(h0[1..].iter().all(|x| *x == 0.0));
}

#[test]
fn dimension_errors_are_not_solver_failures() {
    let solver = InspectionSolver { theta: 0.0 };
    let v = LinearValueFunction::new(vec![1.0, 2.0]);
    let err = solver.solve(&[1.0, 1.0, 1.0], &[1.0, 0.0, 0.0], &v).unwrap_err();
    assert!(!err.is_solver_failure());
}

#[test]
fn bounded_solver_fills_up_to_cap_then_moves_on() {
    let solver = BoundedInspectionSolver { theta: 0.0, cap: 300.0 };
    let v = LinearValueFunction::new(vec![1.0, 2.0, 1.5]);

    let trades = solver.solve(&[1.0, 1.0, 1.0], &[1_000.0, 0.0, 0.0], &v).unwrap();
    assert!(approx_eq(trades.buys[0], 300.0, 1e-9), "buys {:?}", trades.buys);
    assert!(approx_eq(trades.buys[1], 300.0, 1e-9), "buys {:?}", trades.buys);

    let h = apply(&[1_000.0, 0.0, 0.0], &[1.0, 1.0, 1.0], &trades, 0.0);
    assert!(approx_eq(h[0], 400.0, 1e-9), "leftover cash stays in cash, got {}", h[0]);
}

#[test]
fn bounded_solver_force_sells_above_cap() {
    let solver = BoundedInspectionSolver { theta: 0.0, cap: 100.0 };
    let v = LinearValueFunction::new(vec![1.0, 1.0, 1.0]);

    let trades = solver.solve(&[1.0, 1.0, 1.0], &[0.0, 250.0, 0.0], &v).unwrap();
    assert!(approx_eq(trades.sells[0], 150.0, 1e-9), "sells {:?}", trades.sells);

    let h = apply(&[0.0, 250.0, 0.0], &[1.0, 1.0, 1.0], &trades, 0.0);
    assert!(approx_eq(h[1], 100.0, 1e-9));
    assert!(approx_eq(h[0], 150.0, 1e-9));
}

#[test]
fn bounded_sell_to_buy_respects_cap() {
    let theta = 0.0;
    let solver = BoundedInspectionSolver { theta, cap: 60.0 };
    let v = LinearValueFunction::new(vec![1.0, 1.0, 2.0]);
    let h_prev = [0.0, 100.0, 0.0];

    let trades = solver.solve(&[1.0, 1.0, 1.0], &h_prev, &v).unwrap();
    let h = apply(&h_prev, &[1.0, 1.0, 1.0], &trades, theta);

    assert!(approx_eq(h[2], 60.0, 1e-9), "best buy filled to cap, got {}", h[2]);
    assert!(approx_eq(h[1], 40.0, 1e-9), "rest of the source stays, got {}", h[1]);
    assert!(approx_eq(h[0], 0.0, 1e-9));
}

#[test]
fn solver_variant_follows_position_cap() {
    let mut cfg: AdpConfig = compact_adp_config_demo();
    cfg.position_cap_frac = Some(0.25);
    match Solver::from_config(&cfg) {
        Solver::Bounded(s) => {
            assert!(approx_eq(s.cap, 0.25 * cfg.initial_capital, 1e-9));
            assert!(approx_eq(s.theta, cfg.theta, 1e-12));
        }
        other => panic!("expected bounded solver, got {:?}", other),
    }

    cfg.position_cap_frac = None;
    assert!(matches!(Solver::from_config(&cfg), Solver::Inspection(_)));
}
