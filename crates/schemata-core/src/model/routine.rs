//! Functions and triggers.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::object::{ObjectId, ObjectKind};

/// Function volatility category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    /// `IMMUTABLE`
    Immutable,
    /// `STABLE`
    Stable,
    /// `VOLATILE` (default).
    #[default]
    Volatile,
}

impl Volatility {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Immutable => "IMMUTABLE",
            Self::Stable => "STABLE",
            Self::Volatile => "VOLATILE",
        }
    }

    /// Decodes `pg_proc.provolatile`.
    #[must_use]
    pub const fn from_catalog_code(code: char) -> Option<Self> {
        match code {
            'i' => Some(Self::Immutable),
            's' => Some(Self::Stable),
            'v' => Some(Self::Volatile),
            _ => None,
        }
    }
}

/// Function parallel safety.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelSafety {
    /// `PARALLEL SAFE`
    Safe,
    /// `PARALLEL RESTRICTED`
    Restricted,
    /// `PARALLEL UNSAFE` (default).
    #[default]
    Unsafe,
}

impl ParallelSafety {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Restricted => "RESTRICTED",
            Self::Unsafe => "UNSAFE",
        }
    }

    /// Decodes `pg_proc.proparallel`.
    #[must_use]
    pub const fn from_catalog_code(code: char) -> Option<Self> {
        match code {
            's' => Some(Self::Safe),
            'r' => Some(Self::Restricted),
            'u' => Some(Self::Unsafe),
            _ => None,
        }
    }
}

/// A custom SQL function.
///
/// The body is opaque. Whatever the body touches must be listed in
/// `depends_on`; nothing else is inferred.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// Argument list as written between the parentheses, e.g. `text` or
    /// `input text, fallback text`.
    #[serde(default)]
    pub arguments: String,
    /// Return type, e.g. `trigger` or `text`.
    pub returns: String,
    /// Implementation language.
    #[serde(default = "default_language")]
    pub language: String,
    /// Function body.
    pub body: String,
    /// Volatility category.
    #[serde(default)]
    pub volatility: Volatility,
    /// Parallel safety.
    #[serde(default)]
    pub parallel: ParallelSafety,
    /// Objects the body uses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ObjectId>,
}

fn default_language() -> String {
    String::from("plpgsql")
}

static DEFAULT_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+default\b|\s*=").expect("default clause pattern is valid")
});

impl Function {
    /// Argument list without `DEFAULT` clauses.
    ///
    /// `DROP FUNCTION` and `ALTER FUNCTION` only accept mode, name and type
    /// for each argument.
    ///
    /// ```rust
    /// use schemata_core::model::FunctionBuilder;
    ///
    /// let f = FunctionBuilder::new("uuid_v7")
    ///     .arguments("p_timestamp timestamp with time zone DEFAULT clock_timestamp()")
    ///     .build();
    /// assert_eq!(f.identity_arguments(), "p_timestamp timestamp with time zone");
    /// ```
    #[must_use]
    pub fn identity_arguments(&self) -> String {
        split_arguments(&self.arguments)
            .into_iter()
            .map(strip_default)
            .filter(|argument| !argument.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Splits an argument list on commas outside parentheses and quotes.
fn split_arguments(arguments: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in arguments.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                parts.push(&arguments[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&arguments[start..]);
    parts
}

fn strip_default(argument: &str) -> &str {
    let end = DEFAULT_CLAUSE
        .find(argument)
        .map_or(argument.len(), |clause| clause.start());
    argument[..end].trim()
}

/// Fluent function builder.
///
/// # Example
///
/// ```rust
/// use schemata_core::model::{FunctionBuilder, Volatility};
///
/// let f = FunctionBuilder::new("updated_at")
///     .returns("trigger")
///     .body("BEGIN new.\"updatedAt\" = now(); RETURN new; END;")
///     .build();
///
/// assert_eq!(f.language, "plpgsql");
/// assert_eq!(f.volatility, Volatility::Volatile);
/// ```
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    function: Function,
}

impl FunctionBuilder {
    /// Creates a builder for function `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            function: Function {
                name: name.into(),
                arguments: String::new(),
                returns: String::from("void"),
                language: default_language(),
                body: String::new(),
                volatility: Volatility::default(),
                parallel: ParallelSafety::default(),
                depends_on: Vec::new(),
            },
        }
    }

    /// Sets the argument list.
    #[must_use]
    pub fn arguments(mut self, arguments: impl Into<String>) -> Self {
        self.function.arguments = arguments.into();
        self
    }

    /// Sets the return type.
    #[must_use]
    pub fn returns(mut self, returns: impl Into<String>) -> Self {
        self.function.returns = returns.into();
        self
    }

    /// Sets the implementation language.
    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.function.language = language.into();
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.function.body = body.into();
        self
    }

    /// Sets the volatility category.
    #[must_use]
    pub const fn volatility(mut self, volatility: Volatility) -> Self {
        self.function.volatility = volatility;
        self
    }

    /// Sets the parallel safety.
    #[must_use]
    pub const fn parallel(mut self, parallel: ParallelSafety) -> Self {
        self.function.parallel = parallel;
        self
    }

    /// Declares a dependency of the body.
    #[must_use]
    pub fn depends_on(mut self, kind: ObjectKind, name: impl Into<String>) -> Self {
        self.function.depends_on.push(ObjectId::new(kind, name));
        self
    }

    /// Builds the function.
    #[must_use]
    pub fn build(self) -> Function {
        self.function
    }
}

/// When a trigger fires relative to the event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerTiming {
    /// `BEFORE`
    Before,
    /// `AFTER` (default).
    #[default]
    After,
    /// `INSTEAD OF`
    InsteadOf,
}

impl TriggerTiming {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::After => "AFTER",
            Self::InsteadOf => "INSTEAD OF",
        }
    }
}

/// Event that fires a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    /// `INSERT`
    Insert,
    /// `UPDATE`
    Update,
    /// `DELETE`
    Delete,
    /// `TRUNCATE`
    Truncate,
}

impl TriggerEvent {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
        }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Whether a trigger fires per row or per statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerScope {
    /// `FOR EACH ROW`
    Row,
    /// `FOR EACH STATEMENT` (default).
    #[default]
    Statement,
}

/// A trigger bound to one table and one function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger name, unique per table.
    pub name: String,
    /// Table the trigger is attached to.
    #[serde(default)]
    pub table: String,
    /// Function executed by the trigger.
    pub function: String,
    /// Firing time.
    #[serde(default)]
    pub timing: TriggerTiming,
    /// Events, kept sorted.
    pub events: Vec<TriggerEvent>,
    /// Row or statement level.
    #[serde(default)]
    pub scope: TriggerScope,
    /// `REFERENCING OLD TABLE AS name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_table: Option<String>,
    /// `REFERENCING NEW TABLE AS name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_table: Option<String>,
    /// `WHEN (condition)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

/// Fluent trigger builder; the table is set when the trigger is added to a
/// [`TableBuilder`](super::table::TableBuilder).
#[derive(Debug, Clone)]
pub struct TriggerBuilder {
    trigger: Trigger,
}

impl TriggerBuilder {
    /// Creates a builder for trigger `name` running `function`.
    #[must_use]
    pub fn new(name: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            trigger: Trigger {
                name: name.into(),
                table: String::new(),
                function: function.into(),
                timing: TriggerTiming::default(),
                events: Vec::new(),
                scope: TriggerScope::default(),
                old_table: None,
                new_table: None,
                when: None,
            },
        }
    }

    /// Sets the firing time.
    #[must_use]
    pub const fn timing(mut self, timing: TriggerTiming) -> Self {
        self.trigger.timing = timing;
        self
    }

    /// Adds a firing event.
    #[must_use]
    pub fn on(mut self, event: TriggerEvent) -> Self {
        if !self.trigger.events.contains(&event) {
            self.trigger.events.push(event);
            self.trigger.events.sort();
        }
        self
    }

    /// Fires once per row.
    #[must_use]
    pub const fn for_each_row(mut self) -> Self {
        self.trigger.scope = TriggerScope::Row;
        self
    }

    /// Exposes the old rows as a transition table.
    #[must_use]
    pub fn old_table(mut self, name: impl Into<String>) -> Self {
        self.trigger.old_table = Some(name.into());
        self
    }

    /// Exposes the new rows as a transition table.
    #[must_use]
    pub fn new_table(mut self, name: impl Into<String>) -> Self {
        self.trigger.new_table = Some(name.into());
        self
    }

    /// Adds a `WHEN` condition.
    #[must_use]
    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.trigger.when = Some(condition.into());
        self
    }

    /// Builds the trigger for `table`.
    #[must_use]
    pub fn build(mut self, table: &str) -> Trigger {
        self.trigger.table = table.to_string();
        self.trigger
    }
}
