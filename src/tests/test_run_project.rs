mod test_run_project {
    use crate::output::{Output, SinkOutput};
    use crate::{
        daily_volume, run_project, write_consumption, write_summary, write_usage_events, ProjectFlags,
        RunOverrides,
    };
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io::{self, Write};
    use std::rc::Rc;

    const DEMO: &str = include_str!("../../demos/household.json");

    #[fixture]
    fn overrides() -> RunOverrides {
        RunOverrides {
            seed: Some(7),
            ..Default::default()
        }
    }

    #[rstest]
    fn test_run_demo(overrides: RunOverrides) {
        let results = run_project(DEMO.as_bytes(), SinkOutput, &overrides, &ProjectFlags::empty()).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].simulation.house, "house_1");
        assert_eq!(results[0].simulation.users, vec!["alex", "sam"]);
        assert_eq!(results[1].simulation.users[0], "house_2_user_0");
        for house in &results {
            let simulation = &house.simulation;
            assert_eq!(simulation.arrays.horizon(), 2 * 1_440);
            assert!(simulation.arrays.discharge().is_some());
            assert!(!simulation.usage_events.is_empty());
            assert!(house.nutrients.is_some());
            assert!(daily_volume(simulation) > 0.);
        }
    }

    #[rstest]
    fn test_run_is_reproducible(overrides: RunOverrides) {
        let first = run_project(DEMO.as_bytes(), SinkOutput, &overrides, &ProjectFlags::empty()).unwrap();
        let second = run_project(DEMO.as_bytes(), SinkOutput, &overrides, &ProjectFlags::empty()).unwrap();

        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.simulation.usage_events, b.simulation.usage_events);
            assert_eq!(a.simulation.arrays.consumption(), b.simulation.arrays.consumption());
        }
    }

    #[rstest]
    fn test_overrides(overrides: RunOverrides) {
        let overrides = RunOverrides {
            days: Some(1),
            patterns: Some(3),
            ..overrides
        };
        let results = run_project(DEMO.as_bytes(), SinkOutput, &overrides, &ProjectFlags::empty()).unwrap();

        let arrays = &results[0].simulation.arrays;
        assert_eq!(arrays.horizon(), 1_440);
        assert_eq!(arrays.patterns(), 3);
    }

    #[rstest]
    fn test_zero_patterns_are_rejected(overrides: RunOverrides) {
        let overrides = RunOverrides {
            patterns: Some(0),
            ..overrides
        };
        assert!(run_project(DEMO.as_bytes(), SinkOutput, &overrides, &ProjectFlags::empty()).is_err());
    }

    /// Keeps every written location in memory.
    #[derive(Debug, Default)]
    struct MemoryOutput {
        files: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    }

    struct MemoryWriter {
        key: String,
        files: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    }

    impl Write for MemoryWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.files
                .borrow_mut()
                .entry(self.key.clone())
                .or_default()
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Output for MemoryOutput {
        fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
            Ok(MemoryWriter {
                key: location_key.to_string(),
                files: self.files.clone(),
            })
        }
    }

    #[rstest]
    fn test_output_locations(overrides: RunOverrides) {
        let output = MemoryOutput::default();
        let results = run_project(DEMO.as_bytes(), &output, &overrides, &ProjectFlags::empty()).unwrap();

        let files = output.files.borrow();
        for key in [
            "house_1__consumption",
            "house_1__discharge",
            "house_1__events",
            "house_1__discharge_events",
            "house_1__nutrients",
            "house_2__consumption",
            "summary",
        ] {
            assert!(files.contains_key(key), "missing output {key}");
        }

        let consumption = String::from_utf8(files["house_1__consumption"].clone()).unwrap();
        let mut lines = consumption.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Pattern,Step,Total,BathroomTap,KitchenTap,NormalShower,WashingMachine,WcNormalSave,Hot water equivalent"
        );
        assert_eq!(lines.next().unwrap(), "[count],[count],[L/s],[L/s],[L/s],[L/s],[L/s],[L/s],[L/s]");
        assert_eq!(lines.count(), 2 * 1_440);

        let events = String::from_utf8(files["house_1__events"].clone()).unwrap();
        assert_eq!(events.lines().count(), 2 + results[0].simulation.usage_events.len());
    }

    #[rstest]
    fn test_skip_event_output(overrides: RunOverrides) {
        let output = MemoryOutput::default();
        run_project(DEMO.as_bytes(), &output, &overrides, &ProjectFlags::SKIP_EVENT_OUTPUT).unwrap();

        let files = output.files.borrow();
        assert!(files.contains_key("house_1__consumption"));
        assert!(!files.contains_key("house_1__events"));
        assert!(!files.contains_key("house_1__discharge_events"));
    }

    #[rstest]
    fn test_writers(overrides: RunOverrides) {
        let results = run_project(DEMO.as_bytes(), SinkOutput, &overrides, &ProjectFlags::empty()).unwrap();

        let mut buffer = vec![];
        write_usage_events(&mut buffer, &results[0].simulation).unwrap();
        let events = String::from_utf8(buffer).unwrap();
        assert!(events.starts_with("End-use,User,Pattern,Start,End,Intensity,Temperature,Volume\n"));

        let mut buffer = vec![];
        write_consumption(&mut buffer, &results[1].simulation).unwrap();
        assert!(!buffer.is_empty());

        let mut buffer = vec![];
        write_summary(&mut buffer, &results).unwrap();
        let summary = String::from_utf8(buffer).unwrap();
        let rows = summary.lines().collect::<Vec<_>>();
        assert_eq!(rows[0], "House,Daily volume");
        assert!(rows[2].starts_with("house_1,"));
        assert!(rows[3].starts_with("house_2,"));
        assert!(rows[4].starts_with("mean,"));
        assert_eq!(rows.len(), 8);
    }
}
