use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};
use std::path::Path;

use crate::report::SimReport;
use crate::TbError;

pub(crate) fn write_junit_xml(report: &SimReport, path: &Path) -> Result<(), TbError> {
    let mut test_cases = Vec::new();

    for t in report.tests.iter() {
        let tc = match &t.result {
            Ok(_) => TestCaseBuilder::success(&t.name, Duration::seconds_f64(t.real_secs)),
            Err(e) => TestCaseBuilder::failure(
                &t.name,
                Duration::seconds_f64(t.real_secs),
                if e.is_hung() { "hung" } else { "failure" },
                &e.to_string(),
            ),
        }
        .build();
        test_cases.push(tc);
    }

    let test_suite = TestSuiteBuilder::new(&report.suite)
        .add_testcases(test_cases)
        .build();
    let junit = ReportBuilder::new().add_testsuite(test_suite).build();
    let file = std::fs::File::create(path)
        .map_err(|e| TbError::Report(format!("can't create {}: {}", path.display(), e)))?;
    junit
        .write_xml(file)
        .map_err(|e| TbError::Report(format!("{:?}", e)))
}
