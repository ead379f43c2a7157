//! End-to-end resolution scenarios driven through the coordinator.

use std::sync::Arc;

use parking_lot::Mutex;
use rstest::rstest;

use microgrid_dispatcher::dispatch::{
    ActionJournal, ChargeSellPolicy, DecisionThresholds, DeficitResolver, DispatchLoop,
    ImbalanceCoordinator, Microgrid, SurplusResolver, TickOutcome,
};
use microgrid_dispatcher::domain::{
    BatteryStore, Capability, DeviceKind, GenerationDevice, GridContract, LoadDevice,
};

fn adjustable_gen(name: &str, priority: u32, min: f64, max: f64) -> GenerationDevice {
    GenerationDevice::new(
        name,
        DeviceKind::FuelTurbine,
        priority,
        Capability::Adjustable {
            min_kw: min,
            max_kw: max,
        },
    )
}

fn binary_load(name: &str, priority: u32, rated: f64) -> LoadDevice {
    LoadDevice::new(name, priority, Capability::Binary { rated_kw: rated }).with_state(true, rated)
}

/// Surplus of 100 kW with battery headroom and a cheap tariff: everything
/// lands in the battery, nothing is sold.
#[test]
fn surplus_charges_battery_when_tariff_favors_charging() {
    let mut grid = Microgrid::new(
        vec![adjustable_gen("pv", 1, 0.0, 400.0).with_state(true, 250.0)],
        vec![binary_load("plant", 1, 150.0)],
        BatteryStore::new(300.0, 150.0),
        GridContract::new(1000.0, 1000.0, true, 0.45, 0.2),
    );
    let mut coordinator = ImbalanceCoordinator::new(DecisionThresholds::default());

    let result = coordinator.evaluate_tick(&mut grid);

    assert_eq!(result.outcome, TickOutcome::Surplus);
    assert!((result.managed_kw - 100.0).abs() < 1e-6);
    assert!(result.remaining_kw < 1e-6);
    assert!((grid.battery.charge_kwh() - 250.0).abs() < 1e-6);
    assert_eq!(grid.contract.sold_kwh(), 0.0);
}

/// Surplus with a full battery and export disallowed: generation is
/// curtailed, least essential devices first.
#[test]
fn surplus_curtails_generation_when_storage_and_export_are_closed() {
    let mut grid = Microgrid::new(
        vec![
            adjustable_gen("fuel-cell", 1, 20.0, 150.0).with_state(true, 100.0),
            GenerationDevice::new("wind", DeviceKind::Wind, 3, Capability::Binary { rated_kw: 40.0 })
                .with_state(true, 40.0),
        ],
        vec![binary_load("plant", 1, 40.0)],
        BatteryStore::new(100.0, 100.0),
        GridContract::new(0.0, 1000.0, false, 0.45, 0.2),
    );
    let mut coordinator = ImbalanceCoordinator::new(DecisionThresholds::default());

    let result = coordinator.evaluate_tick(&mut grid);

    assert_eq!(result.outcome, TickOutcome::Surplus);
    assert!((result.managed_kw - 100.0).abs() < 1e-6);
    // Wind (priority 3) dropped first, then the fuel cell throttled.
    assert!(!grid.generation[1].is_online());
    assert!((grid.generation[0].output_kw() - 40.0).abs() < 1e-6);
}

/// A deficit covered entirely by activating a cold generator and setting it
/// to the exact needed output.
#[test]
fn deficit_activates_standby_generator_at_needed_output() {
    let mut grid = Microgrid::new(
        vec![adjustable_gen("turbine", 1, 0.0, 200.0)],
        vec![binary_load("plant", 1, 150.0)],
        BatteryStore::offline(100.0),
        GridContract::new(0.0, 0.0, false, 0.45, 0.2),
    );
    let mut coordinator = ImbalanceCoordinator::new(DecisionThresholds::default());

    let result = coordinator.evaluate_tick(&mut grid);

    assert_eq!(result.outcome, TickOutcome::Deficit);
    assert!((result.managed_kw - 150.0).abs() < 1e-6);
    assert!(result.remaining_kw < 1e-6);
    assert!(grid.generation[0].is_online());
    assert!((grid.generation[0].output_kw() - 150.0).abs() < 1e-6);
}

/// Purchases cover what they can; the rest comes off the least essential
/// tier with enough sheddable power.
#[test]
fn deficit_buys_then_sheds_lowest_priority_tier() {
    let mut grid = Microgrid::new(
        vec![],
        vec![
            binary_load("critical", 1, 20.0),
            LoadDevice::new(
                "flexible",
                6,
                Capability::Adjustable {
                    min_kw: 0.0,
                    max_kw: 40.0,
                },
            )
            .with_state(true, 30.0),
        ],
        BatteryStore::offline(100.0),
        GridContract::new(0.0, 30.0, false, 0.45, 0.2),
    );
    let mut coordinator = ImbalanceCoordinator::new(DecisionThresholds::default());

    // Demand 50, generation 0.
    let result = coordinator.evaluate_tick(&mut grid);

    assert_eq!(result.outcome, TickOutcome::Deficit);
    assert!((result.managed_kw - 50.0).abs() < 1e-6);
    assert!(result.remaining_kw < 1e-6);
    assert!((grid.contract.bought_kwh() - 30.0).abs() < 1e-6);
    assert!((grid.loads[1].draw_kw() - 10.0).abs() < 1e-6);
    assert!((grid.loads[0].draw_kw() - 20.0).abs() < 1e-6);
}

/// All levers exhausted: the loop exits without panicking and reports the
/// unresolved remainder.
#[test]
fn deficit_with_no_levers_reports_full_remainder() {
    let mut grid = Microgrid::new(
        vec![],
        vec![
            // Adjustable load already at its floor: nothing sheddable.
            LoadDevice::new(
                "base",
                1,
                Capability::Adjustable {
                    min_kw: 60.0,
                    max_kw: 120.0,
                },
            )
            .with_state(true, 60.0),
        ],
        BatteryStore::offline(100.0),
        GridContract::new(0.0, 0.0, false, 0.45, 0.2),
    );
    let mut coordinator = ImbalanceCoordinator::new(DecisionThresholds::default());

    let result = coordinator.evaluate_tick(&mut grid);

    assert_eq!(result.outcome, TickOutcome::Deficit);
    assert_eq!(result.managed_kw, 0.0);
    assert!((result.remaining_kw - 60.0).abs() < 1e-6);
}

/// Conservation holds whatever the imbalance magnitude.
#[rstest]
#[case(5.0)]
#[case(80.0)]
#[case(250.0)]
#[case(1000.0)]
fn managed_plus_remaining_equals_surplus(#[case] surplus: f64) {
    let mut grid = Microgrid::new(
        vec![adjustable_gen("gen", 1, 10.0, 2000.0).with_state(true, 10.0 + surplus)],
        vec![binary_load("plant", 1, 10.0)],
        BatteryStore::new(120.0, 90.0),
        GridContract::new(50.0, 50.0, true, 0.45, 0.2),
    );
    let mut journal = ActionJournal::default();
    let mut resolver = SurplusResolver::new(DecisionThresholds::default());

    let res = resolver.resolve(&mut grid, &mut journal, surplus).unwrap();

    assert!((res.managed_kw + res.remaining_kw - surplus).abs() < 1e-6);
    assert!(res.remaining_kw >= 0.0);
    assert!(grid.battery.charge_kwh() <= grid.battery.capacity_kwh() + 1e-9);
    assert!(grid.contract.sold_kwh() <= grid.contract.sale_limit_kwh() + 1e-9);
}

#[rstest]
#[case(5.0)]
#[case(80.0)]
#[case(400.0)]
fn managed_plus_remaining_equals_deficit(#[case] deficit: f64) {
    let mut grid = Microgrid::new(
        vec![adjustable_gen("gen", 1, 0.0, 60.0).with_state(true, 20.0)],
        vec![
            binary_load("critical", 1, 50.0),
            binary_load("flexible", 5, 35.0),
        ],
        BatteryStore::new(120.0, 40.0),
        GridContract::new(50.0, 70.0, true, 0.45, 0.2),
    );
    let mut journal = ActionJournal::default();
    let mut resolver = DeficitResolver::new(DecisionThresholds::default());

    let res = resolver.resolve(&mut grid, &mut journal, deficit).unwrap();

    assert!((res.managed_kw + res.remaining_kw - deficit).abs() < 1e-6);
    assert!(res.remaining_kw >= 0.0);
    assert!(grid.battery.charge_kwh() >= -1e-9);
    assert!(grid.contract.bought_kwh() <= grid.contract.purchase_limit_kwh() + 1e-9);
}

/// The charge/sell decision must not flip while the inputs sit exactly on
/// the threshold boundary.
#[test]
fn boundary_inputs_do_not_flip_the_tie_break() {
    let thresholds = DecisionThresholds::default();
    let mut policy = ChargeSellPolicy::default();

    let first = policy.prioritize_charging(&thresholds, 10.0, 50.0, 0.5);
    for _ in 0..10 {
        // Free percent oscillating around the boundary by less than the band.
        assert_eq!(policy.prioritize_charging(&thresholds, 10.0, 49.0, 0.5), first);
        assert_eq!(policy.prioritize_charging(&thresholds, 10.0, 51.0, 0.5), first);
    }
}

/// Journal entries survive a tick and keep their boundary shape.
#[test]
fn journal_records_tick_actions() {
    let mut grid = Microgrid::new(
        vec![adjustable_gen("pv", 1, 0.0, 400.0).with_state(true, 250.0)],
        vec![binary_load("plant", 1, 150.0)],
        BatteryStore::new(300.0, 150.0),
        GridContract::new(1000.0, 1000.0, true, 0.45, 0.2),
    );
    let mut coordinator = ImbalanceCoordinator::new(DecisionThresholds::default());
    coordinator.evaluate_tick(&mut grid);

    let actions = coordinator.recent_actions(10);
    assert!(!actions.is_empty());
    let json = serde_json::to_value(&actions[0]).unwrap();
    for field in ["id", "at", "target", "verb", "requested_kw", "applied_kw", "succeeded"] {
        assert!(json.get(field).is_some(), "missing field {field}");
    }
}

#[tokio::test]
async fn dispatch_loop_start_stop_lifecycle() {
    let grid = Arc::new(Mutex::new(Microgrid::new(
        vec![adjustable_gen("pv", 1, 0.0, 400.0).with_state(true, 250.0)],
        vec![binary_load("plant", 1, 150.0)],
        BatteryStore::new(300.0, 150.0),
        GridContract::new(1000.0, 1000.0, true, 0.45, 0.2),
    )));
    let dispatch = DispatchLoop::new(grid.clone(), ImbalanceCoordinator::new(DecisionThresholds::default()));

    let handle = dispatch.spawn(30);
    // The first interval tick fires immediately.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    dispatch.stop();
    handle.await.unwrap();
    assert!(dispatch.is_stopped());
    assert!(!dispatch.recent_actions(10).is_empty());
}
