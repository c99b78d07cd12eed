use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigurationError;
use super::rule::Rule;
use crate::selection::RuleSelection;

/// The six supported control-flow patterns. Serialized with their wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pattern {
    ConditionalChaining,
    SequentialDependency,
    ResultBasedRouting,
    AccumulativeChaining,
    ComplexWorkflow,
    FluentBuilder,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pattern::ConditionalChaining => "conditional-chaining",
            Pattern::SequentialDependency => "sequential-dependency",
            Pattern::ResultBasedRouting => "result-based-routing",
            Pattern::AccumulativeChaining => "accumulative-chaining",
            Pattern::ComplexWorkflow => "complex-workflow",
            Pattern::FluentBuilder => "fluent-builder",
        };
        write!(f, "{name}")
    }
}

/// Chain-level execution switches, flattened into the chain object on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecutionOptions {
    /// Stop a rule list at its first non-matching rule.
    #[serde(default)]
    pub stop_on_first_failure: bool,
    /// Evaluate independent rule lists (and workflow stage waves) concurrently.
    #[serde(default)]
    pub parallel_execution: bool,
    /// A conditional branch only counts as matched if every rule in it matched.
    #[serde(default)]
    pub require_all: bool,
    /// Upper bound on a single expression evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_timeout_ms: Option<u64>,
}

impl ExecutionOptions {
    #[must_use]
    pub fn rule_timeout(&self) -> Option<Duration> {
        self.rule_timeout_ms.map(Duration::from_millis)
    }
}

/// A list of rules, as used by routes and conditional sub-branches.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RuleList {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl From<Vec<Rule>> for RuleList {
    fn from(rules: Vec<Rule>) -> Self {
        Self { rules }
    }
}

// -- conditional-chaining ---------------------------------------------------

/// One trigger rule selecting between two rule lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConditionalChaining {
    pub trigger_rule: Rule,
    #[serde(default)]
    pub conditional_rules: ConditionalRules,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConditionalRules {
    #[serde(default)]
    pub on_trigger: Vec<Rule>,
    #[serde(default)]
    pub on_no_trigger: Vec<Rule>,
}

impl ConditionalChaining {
    #[must_use]
    pub fn new(trigger_rule: Rule) -> Self {
        Self {
            trigger_rule,
            conditional_rules: ConditionalRules::default(),
        }
    }

    #[must_use]
    pub fn on_trigger(mut self, rule: Rule) -> Self {
        self.conditional_rules.on_trigger.push(rule);
        self
    }

    #[must_use]
    pub fn on_no_trigger(mut self, rule: Rule) -> Self {
        self.conditional_rules.on_no_trigger.push(rule);
        self
    }
}

// -- sequential-dependency --------------------------------------------------

/// Ordered stages, each writing its rule's value under an output name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SequentialDependency {
    pub stages: Vec<SequentialStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SequentialStage {
    #[serde(default)]
    pub name: String,
    pub rule: Rule,
    pub output_variable: String,
    /// Output names of earlier stages this stage reads.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl SequentialStage {
    #[must_use]
    pub fn new(name: &str, output_variable: &str, rule: Rule) -> Self {
        Self {
            name: name.to_owned(),
            rule,
            output_variable: output_variable.to_owned(),
            depends_on: Vec::new(),
        }
    }

    #[must_use]
    pub fn depends_on(mut self, output: &str) -> Self {
        self.depends_on.push(output.to_owned());
        self
    }

    /// The stage's display name, falling back to its output variable.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.output_variable
        } else {
            &self.name
        }
    }
}

impl SequentialDependency {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage named after its output variable.
    #[must_use]
    pub fn stage(mut self, output_variable: &str, rule: Rule) -> Self {
        self.stages
            .push(SequentialStage::new(output_variable, output_variable, rule));
        self
    }

    #[must_use]
    pub fn push(mut self, stage: SequentialStage) -> Self {
        self.stages.push(stage);
        self
    }
}

// -- result-based-routing ---------------------------------------------------

/// A router rule whose value selects one of several rule lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ResultBasedRouting {
    pub router_rule: Rule,
    pub routes: BTreeMap<String, RuleList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_route: Option<String>,
}

impl ResultBasedRouting {
    #[must_use]
    pub fn new(router_rule: Rule) -> Self {
        Self {
            router_rule,
            routes: BTreeMap::new(),
            default_route: None,
        }
    }

    #[must_use]
    pub fn route(mut self, key: &str, rules: Vec<Rule>) -> Self {
        self.routes.insert(key.to_owned(), RuleList::from(rules));
        self
    }

    #[must_use]
    pub fn default_route(mut self, key: &str) -> Self {
        self.default_route = Some(key.to_owned());
        self
    }
}

// -- accumulative-chaining --------------------------------------------------

/// Weighted rules whose evaluated values are summed into an accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AccumulativeChaining {
    #[serde(default = "default_accumulator")]
    pub accumulator_variable: String,
    #[serde(default)]
    pub initial_value: f64,
    pub accumulation_rules: Vec<Rule>,
    #[serde(default)]
    pub rule_selection: RuleSelection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_decision_rule: Option<Rule>,
    /// Named numbers bound into the context before the decision rule runs.
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
}

fn default_accumulator() -> String {
    "totalScore".to_owned()
}

impl AccumulativeChaining {
    #[must_use]
    pub fn new(accumulator_variable: &str) -> Self {
        Self {
            accumulator_variable: accumulator_variable.to_owned(),
            initial_value: 0.0,
            accumulation_rules: Vec::new(),
            rule_selection: RuleSelection::default(),
            final_decision_rule: None,
            thresholds: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn initial_value(mut self, value: f64) -> Self {
        self.initial_value = value;
        self
    }

    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.accumulation_rules.push(rule);
        self
    }

    #[must_use]
    pub fn selection(mut self, selection: RuleSelection) -> Self {
        self.rule_selection = selection;
        self
    }

    #[must_use]
    pub fn final_decision(mut self, rule: Rule) -> Self {
        self.final_decision_rule = Some(rule);
        self
    }

    #[must_use]
    pub fn threshold(mut self, name: &str, value: f64) -> Self {
        self.thresholds.insert(name.to_owned(), value);
        self
    }
}

// -- complex-workflow -------------------------------------------------------

/// Named stages ordered by their `depends-on` graph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ComplexWorkflow {
    pub stages: Vec<WorkflowStage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureAction {
    Terminate,
    #[default]
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConditionalExecution {
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_true: Option<RuleList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_false: Option<RuleList>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WorkflowStage {
    pub stage: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_execution: Option<ConditionalExecution>,
    #[serde(default)]
    pub failure_action: FailureAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_variable: Option<String>,
}

impl WorkflowStage {
    #[must_use]
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_owned(),
            name: String::new(),
            depends_on: Vec::new(),
            rules: Vec::new(),
            conditional_execution: None,
            failure_action: FailureAction::default(),
            output_variable: None,
        }
    }

    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn depends_on(mut self, stage: &str) -> Self {
        self.depends_on.push(stage.to_owned());
        self
    }

    #[must_use]
    pub fn failure_action(mut self, action: FailureAction) -> Self {
        self.failure_action = action;
        self
    }

    #[must_use]
    pub fn output(mut self, name: &str) -> Self {
        self.output_variable = Some(name.to_owned());
        self
    }

    /// Replace the stage's rules with a condition-selected pair of branches.
    #[must_use]
    pub fn conditional(mut self, condition: &str, on_true: Vec<Rule>, on_false: Vec<Rule>) -> Self {
        self.conditional_execution = Some(ConditionalExecution {
            condition: condition.to_owned(),
            on_true: Some(RuleList::from(on_true)),
            on_false: Some(RuleList::from(on_false)),
        });
        self
    }
}

impl ComplexWorkflow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a stage. The closure configures rules, dependencies and failure action.
    #[must_use]
    pub fn stage(mut self, id: &str, f: impl FnOnce(WorkflowStage) -> WorkflowStage) -> Self {
        self.stages.push(f(WorkflowStage::new(id)));
        self
    }
}

// -- fluent-builder ---------------------------------------------------------

/// A binary decision tree of rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DecisionTree {
    pub root_rule: DecisionNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DecisionNode {
    #[serde(flatten)]
    pub rule: Rule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Box<DecisionBranch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<Box<DecisionBranch>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionBranch {
    pub rule: DecisionNode,
}

impl DecisionNode {
    #[must_use]
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            on_success: None,
            on_failure: None,
        }
    }

    #[must_use]
    pub fn on_success(mut self, node: DecisionNode) -> Self {
        self.on_success = Some(Box::new(DecisionBranch { rule: node }));
        self
    }

    #[must_use]
    pub fn on_failure(mut self, node: DecisionNode) -> Self {
        self.on_failure = Some(Box::new(DecisionBranch { rule: node }));
        self
    }
}

impl DecisionTree {
    #[must_use]
    pub fn new(root: DecisionNode) -> Self {
        Self { root_rule: root }
    }

    /// Every node's rule, depth-first, without recursion.
    pub(crate) fn rules(&self) -> Vec<&Rule> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root_rule];
        while let Some(node) = stack.pop() {
            out.push(&node.rule);
            if let Some(branch) = &node.on_failure {
                stack.push(&branch.rule);
            }
            if let Some(branch) = &node.on_success {
                stack.push(&branch.rule);
            }
        }
        out
    }
}

// -- chain ------------------------------------------------------------------

/// Pattern-specific configuration. Each variant carries only what its pattern
/// needs, so a chain's pattern always agrees with its configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainConfiguration {
    ConditionalChaining(ConditionalChaining),
    SequentialDependency(SequentialDependency),
    ResultBasedRouting(ResultBasedRouting),
    AccumulativeChaining(AccumulativeChaining),
    ComplexWorkflow(ComplexWorkflow),
    FluentBuilder(DecisionTree),
}

impl ChainConfiguration {
    #[must_use]
    pub fn pattern(&self) -> Pattern {
        match self {
            ChainConfiguration::ConditionalChaining(_) => Pattern::ConditionalChaining,
            ChainConfiguration::SequentialDependency(_) => Pattern::SequentialDependency,
            ChainConfiguration::ResultBasedRouting(_) => Pattern::ResultBasedRouting,
            ChainConfiguration::AccumulativeChaining(_) => Pattern::AccumulativeChaining,
            ChainConfiguration::ComplexWorkflow(_) => Pattern::ComplexWorkflow,
            ChainConfiguration::FluentBuilder(_) => Pattern::FluentBuilder,
        }
    }

    /// Parse a raw `configuration` object as the variant `pattern` selects.
    pub(crate) fn from_json(
        pattern: Pattern,
        raw: serde_json::Value,
    ) -> Result<Self, ConfigurationError> {
        let invalid = |e: serde_json::Error| ConfigurationError::InvalidConfiguration {
            pattern,
            reason: e.to_string(),
        };
        Ok(match pattern {
            Pattern::ConditionalChaining => {
                Self::ConditionalChaining(serde_json::from_value(raw).map_err(invalid)?)
            }
            Pattern::SequentialDependency => {
                Self::SequentialDependency(serde_json::from_value(raw).map_err(invalid)?)
            }
            Pattern::ResultBasedRouting => {
                Self::ResultBasedRouting(serde_json::from_value(raw).map_err(invalid)?)
            }
            Pattern::AccumulativeChaining => {
                Self::AccumulativeChaining(serde_json::from_value(raw).map_err(invalid)?)
            }
            Pattern::ComplexWorkflow => {
                Self::ComplexWorkflow(serde_json::from_value(raw).map_err(invalid)?)
            }
            Pattern::FluentBuilder => {
                Self::FluentBuilder(serde_json::from_value(raw).map_err(invalid)?)
            }
        })
    }

    /// Every rule the configuration references, in declaration order.
    #[must_use]
    pub fn rules(&self) -> Vec<&Rule> {
        match self {
            ChainConfiguration::ConditionalChaining(c) => std::iter::once(&c.trigger_rule)
                .chain(&c.conditional_rules.on_trigger)
                .chain(&c.conditional_rules.on_no_trigger)
                .collect(),
            ChainConfiguration::SequentialDependency(c) => {
                c.stages.iter().map(|s| &s.rule).collect()
            }
            ChainConfiguration::ResultBasedRouting(c) => std::iter::once(&c.router_rule)
                .chain(c.routes.values().flat_map(|r| &r.rules))
                .collect(),
            ChainConfiguration::AccumulativeChaining(c) => c
                .accumulation_rules
                .iter()
                .chain(&c.final_decision_rule)
                .collect(),
            ChainConfiguration::ComplexWorkflow(c) => c
                .stages
                .iter()
                .flat_map(|s| {
                    let branches = s.conditional_execution.iter().flat_map(|ce| {
                        ce.on_true
                            .iter()
                            .chain(&ce.on_false)
                            .flat_map(|list| &list.rules)
                    });
                    s.rules.iter().chain(branches)
                })
                .collect(),
            ChainConfiguration::FluentBuilder(c) => c.rules(),
        }
    }
}

impl From<ConditionalChaining> for ChainConfiguration {
    fn from(c: ConditionalChaining) -> Self {
        Self::ConditionalChaining(c)
    }
}

impl From<SequentialDependency> for ChainConfiguration {
    fn from(c: SequentialDependency) -> Self {
        Self::SequentialDependency(c)
    }
}

impl From<ResultBasedRouting> for ChainConfiguration {
    fn from(c: ResultBasedRouting) -> Self {
        Self::ResultBasedRouting(c)
    }
}

impl From<AccumulativeChaining> for ChainConfiguration {
    fn from(c: AccumulativeChaining) -> Self {
        Self::AccumulativeChaining(c)
    }
}

impl From<ComplexWorkflow> for ChainConfiguration {
    fn from(c: ComplexWorkflow) -> Self {
        Self::ComplexWorkflow(c)
    }
}

impl From<DecisionTree> for ChainConfiguration {
    fn from(c: DecisionTree) -> Self {
        Self::FluentBuilder(c)
    }
}

/// A declared chain of rules plus its execution pattern.
///
/// Built in code with [`RuleChain::new`] or loaded from the JSON wire shape
/// with [`RuleChain::from_json`]. Loading validates the chain; chains built in
/// code are validated when first dispatched by the runner.
///
/// # Example
///
/// ```
/// use rulechain::{ConditionalChaining, Rule, RuleChain};
///
/// let chain = RuleChain::new(
///     "high-value",
///     ConditionalChaining::new(Rule::new("trigger", "amount > 100000"))
///         .on_trigger(Rule::new("edd", "accountAge >= 3"))
///         .on_no_trigger(Rule::new("standard", "true")),
/// )
/// .name("High-Value Transaction Processing");
/// assert!(chain.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RuleChainDef")]
pub struct RuleChain {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub priority: i32,
    pub options: ExecutionOptions,
    pub configuration: ChainConfiguration,
}

impl RuleChain {
    #[must_use]
    pub fn new(id: &str, configuration: impl Into<ChainConfiguration>) -> Self {
        Self {
            id: id.to_owned(),
            name: String::new(),
            enabled: true,
            priority: 0,
            options: ExecutionOptions::default(),
            configuration: configuration.into(),
        }
    }

    /// Build a chain from an explicitly declared pattern, rejecting a
    /// configuration of a different pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::PatternMismatch`] when they disagree.
    pub fn from_parts(
        id: &str,
        pattern: Pattern,
        configuration: impl Into<ChainConfiguration>,
    ) -> Result<Self, ConfigurationError> {
        let configuration = configuration.into();
        if configuration.pattern() != pattern {
            return Err(ConfigurationError::PatternMismatch {
                declared: pattern,
                actual: configuration.pattern(),
            });
        }
        Ok(Self::new(id, configuration))
    }

    #[must_use]
    pub fn pattern(&self) -> Pattern {
        self.configuration.pattern()
    }

    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn stop_on_first_failure(mut self, stop: bool) -> Self {
        self.options.stop_on_first_failure = stop;
        self
    }

    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.options.parallel_execution = parallel;
        self
    }

    #[must_use]
    pub fn require_all(mut self, require_all: bool) -> Self {
        self.options.require_all = require_all;
        self
    }

    #[must_use]
    pub fn rule_timeout(mut self, timeout: Duration) -> Self {
        self.options.rule_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Run the static checks the runner performs before dispatch.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        crate::validate::validate(self)
    }

    /// Parse and validate a chain from its JSON wire shape.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError`](crate::ChainError) on malformed JSON or an invalid chain.
    pub fn from_json(input: &str) -> Result<Self, crate::ChainError> {
        let def: RuleChainDef = serde_json::from_str(input)?;
        Ok(Self::try_from(def)?)
    }

    /// Read a JSON file and parse it with [`from_json`](Self::from_json).
    ///
    /// # Errors
    ///
    /// Returns [`ChainError`](crate::ChainError) on I/O, JSON, or validation failure.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, crate::ChainError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_json(&input)
    }
}

impl fmt::Display for RuleChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuleChain({}, {}, {} rules, priority {}, {})",
            self.id,
            self.pattern(),
            self.configuration.rules().len(),
            self.priority,
            if self.enabled { "enabled" } else { "disabled" },
        )
    }
}

/// Wire shape of a chain before the configuration payload is resolved.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RuleChainDef {
    id: String,
    #[serde(default)]
    name: String,
    pattern: Pattern,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    configuration: serde_json::Value,
    #[serde(flatten)]
    options: ExecutionOptions,
}

fn default_enabled() -> bool {
    true
}

impl TryFrom<RuleChainDef> for RuleChain {
    type Error = ConfigurationError;

    fn try_from(def: RuleChainDef) -> Result<Self, Self::Error> {
        let configuration = ChainConfiguration::from_json(def.pattern, def.configuration)?;
        let chain = RuleChain {
            id: def.id,
            name: def.name,
            enabled: def.enabled,
            priority: def.priority,
            options: def.options,
            configuration,
        };
        chain.validate()?;
        Ok(chain)
    }
}
