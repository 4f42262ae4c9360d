//! Python binding: a `RuleGraph` object that parses DRL into memory and
//! answers analysis queries with plain dicts and lists.

use pyo3::prelude::*;
use serde::Serialize;

use crate::analysis::AnalysisEngine;
use crate::config::{AnalysisConfig, Config, ParserConfig};
use crate::parser::diagnostics::Diagnostic;
use crate::parser::{diagnostics, DrlParser};
use crate::store::InMemoryRepository;

/// Round-trip a serializable value through `json.loads` so callers get
/// native Python objects.
fn to_py<T: Serialize>(py: Python<'_>, value: &T) -> PyResult<PyObject> {
    let json_str = serde_json::to_string(value)
        .map_err(|e| pyo3::exceptions::PyRuntimeError::new_err(e.to_string()))?;
    let json_module = py.import("json")?;
    json_module
        .call_method1("loads", (json_str,))
        .map(|o| o.into())
}

#[pyclass]
pub struct RuleGraph {
    parser_config: ParserConfig,
    engine: AnalysisEngine<InMemoryRepository>,
    diagnostics: Vec<Diagnostic>,
}

impl RuleGraph {
    fn parser(&self) -> DrlParser {
        DrlParser::new(self.parser_config.clone())
    }
}

#[pymethods]
impl RuleGraph {
    /// `config_json` uses the same document shape as the JSON config file.
    #[new]
    #[pyo3(signature = (config_json=None))]
    fn new(config_json: Option<&str>) -> PyResult<Self> {
        let config = match config_json {
            Some(text) => Config::from_json_str(text)?,
            None => Config::default(),
        };
        config.validate()?;
        Ok(Self {
            parser_config: config.parser,
            engine: AnalysisEngine::new(InMemoryRepository::new(), config.analysis),
            diagnostics: Vec::new(),
        })
    }

    #[pyo3(signature = (text, path="<memory>"))]
    fn parse_text(&mut self, py: Python<'_>, text: &str, path: &str) -> PyResult<PyObject> {
        let mut parser = self.parser();
        let rule_file = parser.parse_text(text, path);
        self.diagnostics = parser.diagnostics().to_vec();
        let result = to_py(py, &rule_file)?;
        self.engine.repository_mut().upsert_file(rule_file);
        Ok(result)
    }

    fn parse_file(&mut self, py: Python<'_>, path: &str) -> PyResult<PyObject> {
        let mut parser = self.parser();
        let parsed = parser.parse_file(path);
        self.diagnostics = parser.diagnostics().to_vec();
        let parsed = parsed?;
        let result = to_py(py, &parsed)?;
        self.engine.repository_mut().upsert_file(parsed.rule_file);
        Ok(result)
    }

    /// Returns `{"files": [...], "failures": [...]}`; unreadable files land in
    /// `failures` instead of raising.
    fn parse_directory(&mut self, py: Python<'_>, path: &str) -> PyResult<PyObject> {
        let mut parser = self.parser();
        let parsed = parser.parse_directory(path);
        self.diagnostics = parser.diagnostics().to_vec();
        let parsed = parsed?;
        let result = to_py(py, &parsed)?;
        let repository = self.engine.repository_mut();
        for file in parsed.files {
            repository.upsert_file(file.rule_file);
        }
        Ok(result)
    }

    fn remove_file(&mut self, path: &str) -> bool {
        self.engine.repository_mut().remove_file(path).is_some()
    }

    fn file_count(&self) -> usize {
        self.engine.repository().len()
    }

    /// Diagnostics from the most recent parse call.
    fn diagnostics(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py(py, &self.diagnostics)
    }

    fn diagnostic_summary(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py(py, &diagnostics::summarize(&self.diagnostics))
    }

    fn analysis_config(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py::<AnalysisConfig>(py, self.engine.config())
    }

    fn find_rules_by_name(&self, py: Python<'_>, pattern: &str) -> PyResult<PyObject> {
        to_py(py, &self.engine.find_rules_by_name(pattern)?)
    }

    #[pyo3(signature = (name, package=None))]
    fn find_rule(&self, py: Python<'_>, name: &str, package: Option<&str>) -> PyResult<PyObject> {
        to_py(py, &self.engine.find_rule(name, package)?)
    }

    fn find_rules_by_class_reference(&self, py: Python<'_>, fact_type: &str) -> PyResult<PyObject> {
        to_py(py, &self.engine.find_rules_by_class_reference(fact_type)?)
    }

    fn all_rules(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py(py, &self.engine.all_rules()?)
    }

    fn rules_by_package(&self, py: Python<'_>, package: &str) -> PyResult<PyObject> {
        to_py(py, &self.engine.rules_by_package(package)?)
    }

    fn all_packages(&self) -> PyResult<Vec<String>> {
        Ok(self.engine.all_packages()?)
    }

    fn all_classes(&self) -> PyResult<Vec<String>> {
        Ok(self.engine.all_classes()?)
    }

    #[pyo3(signature = (name, package=None))]
    fn find_rule_dependencies(
        &self,
        py: Python<'_>,
        name: &str,
        package: Option<&str>,
    ) -> PyResult<PyObject> {
        to_py(py, &self.engine.find_rule_dependencies(name, package)?)
    }

    fn find_unused_rules(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py(py, &self.engine.find_unused_rules()?)
    }

    fn find_circular_dependencies(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py(py, &self.engine.find_circular_dependencies()?)
    }

    fn find_dependency_cycles(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py(py, &self.engine.find_dependency_cycles()?)
    }

    #[pyo3(signature = (threshold=None))]
    fn find_complex_rules(&self, py: Python<'_>, threshold: Option<usize>) -> PyResult<PyObject> {
        to_py(py, &self.engine.find_complex_rules(threshold)?)
    }

    fn find_conflicting_rules(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py(py, &self.engine.find_conflicting_rules()?)
    }

    #[pyo3(signature = (rule_names=None))]
    fn analyze_execution_order(
        &self,
        py: Python<'_>,
        rule_names: Option<Vec<String>>,
    ) -> PyResult<PyObject> {
        to_py(
            py,
            &self.engine.analyze_execution_order(rule_names.as_deref())?,
        )
    }

    fn find_rule_patterns(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py(py, &self.engine.find_rule_patterns()?)
    }

    /// Node/edge document for visualization.
    fn export_graph(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py(py, &self.engine.export_graph()?)
    }
}

#[pyfunction]
fn is_drools_file(path: &str) -> bool {
    crate::parser::filesystem::is_drools_file(std::path::Path::new(path))
}

pub(crate) fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<RuleGraph>()?;
    m.add_function(wrap_pyfunction!(is_drools_file, m)?)?;
    m.add("SCHEMA_VERSION", crate::store::schema::SCHEMA_VERSION)?;
    Ok(())
}
