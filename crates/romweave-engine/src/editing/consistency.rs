use crate::editing::Model;

impl Model {
    /// Check the structural invariants and describe every violation.
    ///
    /// - runs never overlap
    /// - every pointer source of a run reads back the run's start, and every
    ///   element source of a table reads back its element's start
    /// - every registered pointer cell with an in-range destination is
    ///   listed by the run or table element at that destination
    /// - every anchor name sits on a run
    pub fn verify_consistency(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();
        let runs: Vec<_> = self.runs.iter().collect();

        for pair in runs.windows(2) {
            if pair[0].end() > pair[1].start {
                problems.push(format!(
                    "run at {:#08X} overlaps run at {:#08X}",
                    pair[0].start, pair[1].start
                ));
            }
        }

        for run in &runs {
            for &source in &run.pointer_sources {
                if self.data.read_pointer(source) != Some(run.start) {
                    problems.push(format!(
                        "source {source:#08X} of run at {:#08X} does not point there",
                        run.start
                    ));
                }
            }
            for (index, sources) in run.element_sources() {
                let element = run.element_start(index);
                for &source in sources {
                    if element.is_none() || self.data.read_pointer(source) != element {
                        problems.push(format!(
                            "source {source:#08X} of element {index} of run at {:#08X} does not point there",
                            run.start
                        ));
                    }
                }
            }

            for cell in run.pointer_cells() {
                let Some(destination) = self.data.read_pointer(cell) else {
                    continue;
                };
                if destination >= self.data.len() {
                    continue;
                }
                match self.runs.get(destination) {
                    Some(target) if target.pointer_sources.contains(&cell) => {}
                    Some(target) => problems.push(format!(
                        "run at {:#08X} does not list pointer {cell:#08X}",
                        target.start
                    )),
                    None => {
                        let containing = self.runs.get_next_run(destination);
                        if let Some(index) = containing.element_index(destination) {
                            let listed = containing
                                .element_sources()
                                .any(|(i, sources)| i == index && sources.contains(&cell));
                            if !listed {
                                problems.push(format!(
                                    "element {index} of run at {:#08X} does not list pointer {cell:#08X}",
                                    containing.start
                                ));
                            }
                            continue;
                        }
                        let exempt = containing.contains(destination)
                            && (containing.as_table().is_some() || containing.contains(cell));
                        if !exempt {
                            problems.push(format!(
                                "pointer {cell:#08X} targets {destination:#08X} where no run starts"
                            ));
                        }
                    }
                }
            }
        }

        for (address, name) in self.anchors.iter() {
            if self.runs.get(address).is_none() {
                problems.push(format!("anchor `{name}` at {address:#08X} has no run"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}
