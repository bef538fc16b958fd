mod end_to_end_tests {
    use crate::input::ConfigOverrides;
    use crate::output::SinkOutput;
    use crate::tests::{scenario_json, MemoryOutput};
    use crate::{run_project, RunFlags};
    use pretty_assertions::assert_eq;
    use rstest::*;
    use serde_json::{json, Value};

    fn input_bytes(scenario: &Value) -> Vec<u8> {
        scenario.to_string().into_bytes()
    }

    #[rstest]
    fn test_writes_consumption_table_as_csv() {
        let output = MemoryOutput::default();

        let results = run_project(
            input_bytes(&scenario_json()).as_slice(),
            output.clone(),
            &ConfigOverrides::default(),
            RunFlags::empty(),
        )
        .unwrap();

        assert_eq!(output.keys(), vec!["2015_power_consumption.csv"]);
        let csv = output.contents("2015_power_consumption.csv").unwrap();
        let lines = csv.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "sector_id,region_id,value,resolution_method");
        assert_eq!(lines.len(), 1 + results.table.len());
        assert!(lines[1].starts_with("5,1001,"));
        assert!(lines[1].ends_with(",iterative"));
        assert!(lines[6].starts_with("6,1003,"));
    }

    #[rstest]
    fn test_writes_diagnostics_when_asked() {
        let output = MemoryOutput::default();
        let mut scenario = scenario_json();
        scenario["regional_totals"]["values"] = json!({"1001": 200.0, "1002": 0.0, "1003": 0.0});

        run_project(
            input_bytes(&scenario).as_slice(),
            output.clone(),
            &ConfigOverrides::default(),
            RunFlags::WRITE_DIAGNOSTICS,
        )
        .unwrap();

        let diagnostics: Value =
            serde_json::from_str(&output.contents("2015_power_diagnostics.json").unwrap())
                .unwrap();
        assert_eq!(diagnostics["year"], json!(2015));
        assert_eq!(diagnostics["fuel_type"], json!("power"));
        assert_eq!(diagnostics["converged"], json!(false));
        assert_eq!(diagnostics["termination"], json!("stagnated"));
        assert_eq!(diagnostics["diagnostics"][0]["kind"], json!("non_convergence"));
        assert_eq!(
            diagnostics["trace"].as_array().unwrap().len(),
            diagnostics["iterations_used"].as_u64().unwrap() as usize
        );
        assert!(diagnostics["summary"]["max_column_deviation"].as_f64().unwrap() > 0.2);
    }

    #[rstest]
    fn test_overrides_apply_before_running() {
        let mut scenario = scenario_json();
        scenario["regional_totals"]["values"] = json!({"1001": 200.0, "1002": 0.0, "1003": 0.0});

        let results = run_project(
            input_bytes(&scenario).as_slice(),
            SinkOutput,
            &ConfigOverrides {
                tolerance: None,
                max_iterations: Some(12),
                disable_stagnation_check: true,
            },
            RunFlags::empty(),
        )
        .unwrap();

        assert_eq!(results.iterations_used, 12);
    }

    #[rstest]
    fn test_sink_output_skips_writing() {
        let results = run_project(
            input_bytes(&scenario_json()).as_slice(),
            SinkOutput,
            &ConfigOverrides::default(),
            RunFlags::WRITE_DIAGNOSTICS,
        )
        .unwrap();

        assert!(results.converged);
    }

    #[rstest]
    fn test_invalid_request_is_reported() {
        let mut scenario = scenario_json();
        scenario["fuel_type"] = json!("coal");

        let result = run_project(
            input_bytes(&scenario).as_slice(),
            SinkOutput,
            &ConfigOverrides::default(),
            RunFlags::empty(),
        );

        assert!(matches!(
            result,
            Err(crate::errors::DisaggError::InvalidRequest(_))
        ));
    }
}
