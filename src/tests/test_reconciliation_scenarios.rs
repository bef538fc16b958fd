mod reconciliation_scenario_tests {
    use crate::core::reconciliation::{
        Diagnostic, ResolutionMethod, TerminationReason, DEFAULT_STAGNATION_WINDOW,
    };
    use crate::errors::DisaggError;
    use crate::tests::{run_inputs_from, scenario_json};
    use crate::{run_inputs, RunFlags, RunResults};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use serde_json::{json, Value};

    fn run(scenario: Value, flags: RunFlags) -> Result<RunResults, DisaggError> {
        run_inputs(&run_inputs_from(scenario), flags, None)
    }

    #[fixture]
    fn conflicting_scenario() -> Value {
        let mut scenario = scenario_json();
        scenario["regional_totals"]["values"] = json!({"1001": 200.0, "1002": 0.0, "1003": 0.0});
        scenario
    }

    #[rstest]
    fn test_consistent_totals_converge() {
        let results = run(scenario_json(), RunFlags::empty()).unwrap();

        assert!(results.converged);
        assert_eq!(results.termination, TerminationReason::Converged);
        assert!(results.iterations_used < 25);
        assert!(results.final_residual() < 1e-6);
        assert_relative_eq!(results.table.sector_total("5").unwrap(), 100., max_relative = 1e-12);
        assert_relative_eq!(results.table.sector_total("6").unwrap(), 50., max_relative = 1e-12);
        for (region, target) in [("1001", 60.), ("1002", 40.), ("1003", 50.)] {
            assert_relative_eq!(
                results
                    .table
                    .region_total_for(region, ResolutionMethod::Iterative)
                    .unwrap(),
                target,
                max_relative = 1e-6
            );
        }
        assert!(results.diagnostics.is_empty());
    }

    #[rstest]
    fn test_residual_trace_does_not_increase() {
        let results = run(scenario_json(), RunFlags::empty()).unwrap();

        assert_eq!(results.trace.len(), results.iterations_used);
        for pair in results.trace.windows(2) {
            assert!(pair[1].combined() <= pair[0].combined() * (1. + 1e-9));
        }
    }

    #[rstest]
    fn test_runs_are_deterministic() {
        let inputs = run_inputs_from(scenario_json());

        let first = run_inputs(&inputs, RunFlags::empty(), None).unwrap();
        let second = run_inputs(&inputs, RunFlags::empty(), None).unwrap();

        assert_eq!(first.iterations_used, second.iterations_used);
        assert_eq!(first.trace, second.trace);
        assert_eq!(
            first.table.rows().collect::<Vec<_>>(),
            second.table.rows().collect::<Vec<_>>()
        );
    }

    #[rstest]
    fn test_conflicting_totals_stagnate(conflicting_scenario: Value) {
        let results = run(conflicting_scenario, RunFlags::empty()).unwrap();

        assert!(!results.converged);
        assert_eq!(results.termination, TerminationReason::Stagnated);
        assert_eq!(results.iterations_used, DEFAULT_STAGNATION_WINDOW + 1);
        assert_relative_eq!(results.final_residual(), 0.25, max_relative = 1e-9);
        // national totals still hold exactly and nothing is left in zero-target regions
        assert_relative_eq!(results.table.sector_total("5").unwrap(), 100., max_relative = 1e-12);
        assert_relative_eq!(results.table.sector_total("6").unwrap(), 50., max_relative = 1e-12);
        assert_eq!(results.table.value("5", "1002"), Some(0.));
        assert_eq!(results.table.value("6", "1003"), Some(0.));
        assert!(matches!(
            results.diagnostics.last(),
            Some(Diagnostic::NonConvergence {
                reason: TerminationReason::Stagnated,
                ..
            })
        ));
    }

    #[rstest]
    fn test_conflicting_totals_run_to_iteration_cap_without_stagnation_check(
        mut conflicting_scenario: Value,
    ) {
        conflicting_scenario["config"] = json!({"max_iterations": 40, "stagnation_window": null});

        let results = run(conflicting_scenario, RunFlags::empty()).unwrap();

        assert!(!results.converged);
        assert_eq!(results.termination, TerminationReason::MaxIterationsReached);
        assert_eq!(results.iterations_used, 40);
        assert_relative_eq!(results.final_residual(), 0.25, max_relative = 1e-9);
    }

    #[rstest]
    fn test_non_convergence_can_be_rejected(conflicting_scenario: Value) {
        let result = run(conflicting_scenario, RunFlags::REJECT_NON_CONVERGED);

        match result {
            Err(DisaggError::NotConverged {
                iterations,
                residual,
            }) => {
                assert_eq!(iterations, DEFAULT_STAGNATION_WINDOW + 1);
                assert_relative_eq!(residual, 0.25, max_relative = 1e-9);
            }
            other => panic!("expected non-convergence, got {other:?}"),
        }
    }

    #[rstest]
    fn test_sector_without_employees_is_left_empty() {
        let mut scenario = scenario_json();
        scenario["employment"]["6"] = json!({});
        scenario["regional_totals"]["values"] = json!({"1001": 25.0, "1002": 50.0, "1003": 25.0});

        let results = run(scenario, RunFlags::empty()).unwrap();

        assert!(results.converged);
        assert_eq!(results.iterations_used, 1);
        assert!(results.table.is_zero_allocation("6"));
        assert_eq!(results.table.sector_row("6"), Some(vec![0., 0., 0.]));
        assert_relative_eq!(results.table.total(), 100.);
        assert_eq!(
            results.diagnostics,
            vec![Diagnostic::ZeroAllocation {
                sector: "6".to_string(),
                resolution_method: ResolutionMethod::Iterative,
            }]
        );
    }

    #[rstest]
    fn test_cells_without_employees_stay_empty_at_every_iteration() {
        let mut scenario = scenario_json();
        scenario["employment"]["6"] = json!({"1001": 5, "1003": 10});

        for max_iterations in 1..=12 {
            scenario["config"] =
                json!({"max_iterations": max_iterations, "stagnation_window": null});

            let results = run(scenario.clone(), RunFlags::empty()).unwrap();

            assert_eq!(
                results.table.value("6", "1002"),
                Some(0.),
                "after {max_iterations} iteration(s)"
            );
            assert_relative_eq!(
                results.table.sector_total("6").unwrap(),
                50.,
                max_relative = 1e-12
            );
        }
    }

    #[rstest]
    fn test_direct_sectors_are_resolved_by_employee_share() {
        let mut scenario = scenario_json();
        scenario["national_totals"]["values"]["45"] = json!(30.0);
        scenario["employment"]["45"] = json!({"1001": 1, "1002": 2});

        let results = run(scenario.clone(), RunFlags::empty()).unwrap();

        assert!(results.converged);
        assert_eq!(
            results.table.resolution_method("45"),
            Some(ResolutionMethod::Direct)
        );
        assert_eq!(results.table.sector_row("45"), Some(vec![10., 20., 0.]));
        assert_relative_eq!(results.table.total(), 180.);

        let skipped = run(scenario, RunFlags::SKIP_DIRECT_SECTORS).unwrap();
        assert!(!skipped.table.sectors().contains("45"));
        assert_relative_eq!(skipped.table.total(), 150., max_relative = 1e-12);
    }

    #[rstest]
    fn test_region_without_employment_is_flagged_unreachable() {
        let mut scenario = scenario_json();
        scenario["regional_totals"]["values"]["1004"] = json!(10.0);

        let results = run(scenario, RunFlags::empty()).unwrap();

        assert!(!results.converged);
        assert!(results
            .diagnostics
            .contains(&Diagnostic::UnreachableRegionalTarget {
                region: "1004".to_string(),
                target: 10.,
            }));
        assert_eq!(results.table.regions().len(), 4);
        assert_eq!(results.table.value("5", "1004"), Some(0.));
    }

    #[rstest]
    fn test_direct_sectors_without_employees_are_left_empty() {
        let mut scenario = scenario_json();
        scenario["national_totals"]["values"]["45"] = json!(30.0);
        scenario["national_totals"]["values"]["41-42"] = json!(10.0);

        let results = run(scenario, RunFlags::empty()).unwrap();

        assert!(results.converged);
        for sector in ["41", "42", "45"] {
            assert_eq!(results.table.sector_row(sector), Some(vec![0., 0., 0.]));
            assert!(results.table.is_zero_allocation(sector));
            assert!(results.diagnostics.contains(&Diagnostic::ZeroAllocation {
                sector: sector.to_string(),
                resolution_method: ResolutionMethod::Direct,
            }));
        }
        assert_relative_eq!(results.table.total(), 150., max_relative = 1e-12);
    }
}
