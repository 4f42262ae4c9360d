//! Shared typed models produced by the parser and consumed by the store and
//! analysis layers.
//!
//! All values are plain owned records. A [`RuleFile`] owns everything parsed
//! out of one source text and is replaced wholesale when that file is
//! re-parsed.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Reduce a possibly qualified type name (`com.acme.Customer`) to its simple
/// name (`Customer`). Fact types are identified by simple name across the
/// corpus.
pub fn simple_type_name(type_name: &str) -> &str {
    let trimmed = type_name.trim();
    match trimmed.rfind('.') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

// ---------------------------------------------------------------------------
// 1. Import / Global
// ---------------------------------------------------------------------------

/// An `import` declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub package: String,
    pub class_name: String,
}

impl Import {
    pub fn full_name(&self) -> String {
        if self.package.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}.{}", self.package, self.class_name)
        }
    }
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "import {};", self.full_name())
    }
}

/// A `global` declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Global {
    #[serde(rename = "type")]
    pub type_: String,
    pub name: String,
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "global {} {};", self.type_, self.name)
    }
}

// ---------------------------------------------------------------------------
// 2. Constraint / Condition
// ---------------------------------------------------------------------------

/// Comparison operator of a field constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Assign,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "matches")]
    Matches,
}

impl Operator {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "=" => Some(Operator::Assign),
            "==" => Some(Operator::Eq),
            "!=" => Some(Operator::Ne),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            "matches" => Some(Operator::Matches),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Assign => "=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Matches => "matches",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `field operator value` test inside a pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Constraint {
    pub field: String,
    pub operator: Operator,
    /// Raw literal; surrounding quotes are stripped when both ends match.
    pub value: String,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// A fact pattern in a `when` section: `$variable : Type(constraints)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Binding name without the `$` prefix; empty for unbound patterns.
    pub variable: String,
    #[serde(rename = "type")]
    pub fact_type: String,
    pub constraints: Vec<Constraint>,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let constraints = self
            .constraints
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" && ");
        if self.variable.is_empty() {
            write!(f, "{}({})", self.fact_type, constraints)
        } else {
            write!(f, "${} : {}({})", self.variable, self.fact_type, constraints)
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Action
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    MethodCall,
    Assignment,
    Statement,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::MethodCall => "method_call",
            ActionKind::Assignment => "assignment",
            ActionKind::Statement => "statement",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "method_call" => Some(ActionKind::MethodCall),
            "assignment" => Some(ActionKind::Assignment),
            "statement" => Some(ActionKind::Statement),
            _ => None,
        }
    }
}

/// One statement of a `then` section.
///
/// - `MethodCall`: `target` is the receiver, `method` the called name.
/// - `Assignment`: `target` is the left-hand side, `arguments[0]` the right.
/// - `Statement`: `target` holds the whole raw statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub target: String,
    pub method: Option<String>,
    pub arguments: Vec<String>,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.method) {
            (ActionKind::MethodCall, Some(method)) => {
                write!(f, "{}.{}({})", self.target, method, self.arguments.join(", "))
            }
            (ActionKind::Assignment, _) => write!(
                f,
                "{} = {}",
                self.target,
                self.arguments.first().map(String::as_str).unwrap_or("")
            ),
            _ => f.write_str(&self.target),
        }
    }
}

// ---------------------------------------------------------------------------
// 4. Rule
// ---------------------------------------------------------------------------

/// A parsed `rule ... end` block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    /// Package of the enclosing file; `(name, package)` identifies the rule.
    pub package: String,
    /// Name of the parent rule. Resolved lazily and may dangle.
    pub extends: Option<String>,
    pub salience: Option<i64>,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    /// Remaining header attributes (`no-loop`, `agenda-group`, ...), raw.
    pub attributes: IndexMap<String, String>,
}

impl Rule {
    pub fn new(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            extends: None,
            salience: None,
            conditions: Vec::new(),
            actions: Vec::new(),
            attributes: IndexMap::new(),
        }
    }

    pub fn constraint_count(&self) -> usize {
        self.conditions.iter().map(|c| c.constraints.len()).sum()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rule \"{}\"", self.name)?;
        if let Some(parent) = &self.extends {
            writeln!(f, "    extends \"{parent}\"")?;
        }
        if let Some(salience) = self.salience {
            writeln!(f, "    salience {salience}")?;
        }
        for (key, value) in &self.attributes {
            writeln!(f, "    {key} {value}")?;
        }
        writeln!(f, "    when")?;
        for condition in &self.conditions {
            writeln!(f, "        {condition}")?;
        }
        writeln!(f, "    then")?;
        for action in &self.actions {
            writeln!(f, "        {action};")?;
        }
        write!(f, "end")
    }
}

// ---------------------------------------------------------------------------
// 5. Query / Function
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub type_: String,
    pub name: String,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.type_, self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub conditions: Vec<Condition>,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query \"{}\"", self.name)?;
        if !self.parameters.is_empty() {
            let params = self
                .parameters
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " ({params})")?;
        }
        writeln!(f)?;
        for condition in &self.conditions {
            writeln!(f, "    {condition}")?;
        }
        write!(f, "end")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub return_type: String,
    pub name: String,
    pub parameters: Vec<Parameter>,
    /// Raw text between the outermost braces; never parsed further.
    pub body: String,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .parameters
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "function {} {}({}) {{", self.return_type, self.name, params)?;
        writeln!(f, "    {}", self.body)?;
        write!(f, "}}")
    }
}

// ---------------------------------------------------------------------------
// 6. DeclaredType
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    #[serde(rename = "type")]
    pub type_: String,
    pub name: String,
    pub annotations: IndexMap<String, String>,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.name, self.type_)?;
        for (key, value) in &self.annotations {
            write!(f, " @{key}({value})")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredType {
    pub name: String,
    pub annotations: IndexMap<String, String>,
    pub fields: Vec<Field>,
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "declare {}", self.name)?;
        for (key, value) in &self.annotations {
            writeln!(f, "    @{key}({value})")?;
        }
        for field in &self.fields {
            writeln!(f, "    {field}")?;
        }
        write!(f, "end")
    }
}

// ---------------------------------------------------------------------------
// 7. RuleFile
// ---------------------------------------------------------------------------

/// Everything parsed from one source file. `path` is unique per repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFile {
    pub path: String,
    pub package: String,
    pub imports: Vec<Import>,
    pub globals: Vec<Global>,
    pub rules: Vec<Rule>,
    pub queries: Vec<Query>,
    pub functions: Vec<Function>,
    pub declared_types: Vec<DeclaredType>,
}

impl RuleFile {
    pub fn new(path: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            package: package.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for RuleFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "package {};", self.package)?;
        writeln!(f)?;
        for import in &self.imports {
            writeln!(f, "{import}")?;
        }
        if !self.imports.is_empty() {
            writeln!(f)?;
        }
        for global in &self.globals {
            writeln!(f, "{global}")?;
        }
        if !self.globals.is_empty() {
            writeln!(f)?;
        }
        for declared in &self.declared_types {
            writeln!(f, "{declared}\n")?;
        }
        for function in &self.functions {
            writeln!(f, "{function}\n")?;
        }
        for rule in &self.rules {
            writeln!(f, "{rule}\n")?;
        }
        for query in &self.queries {
            writeln!(f, "{query}\n")?;
        }
        Ok(())
    }
}
