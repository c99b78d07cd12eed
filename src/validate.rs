use std::collections::{BTreeSet, HashMap, HashSet};

use crate::parse;
use crate::{
    AccumulativeChaining, ChainConfiguration, ComplexWorkflow, ConfigurationError, Pattern,
    ResultBasedRouting, Rule, RuleChain, SequentialDependency, WorkflowStage,
};

/// Static checks run at load time and again before dispatch. A chain that
/// passes never fails for configuration reasons once it starts executing.
pub(crate) fn validate(chain: &RuleChain) -> Result<(), ConfigurationError> {
    if chain.options.rule_timeout_ms == Some(0) {
        return Err(ConfigurationError::InvalidTimeout);
    }
    check_duplicates(&chain.configuration.rules())?;

    match &chain.configuration {
        ChainConfiguration::ConditionalChaining(_) | ChainConfiguration::FluentBuilder(_) => Ok(()),
        ChainConfiguration::SequentialDependency(c) => check_sequential(c),
        ChainConfiguration::ResultBasedRouting(c) => check_routing(c),
        ChainConfiguration::AccumulativeChaining(c) => check_accumulative(c),
        ChainConfiguration::ComplexWorkflow(c) => check_workflow(c).map(|_| ()),
    }
}

fn check_duplicates(rules: &[&Rule]) -> Result<(), ConfigurationError> {
    let mut seen = HashSet::new();
    for rule in rules {
        if !seen.insert(rule.id.as_str()) {
            return Err(ConfigurationError::DuplicateRule {
                id: rule.id.clone(),
            });
        }
    }
    Ok(())
}

fn non_empty<T>(items: &[T], pattern: Pattern, field: &str) -> Result<(), ConfigurationError> {
    if items.is_empty() {
        return Err(ConfigurationError::EmptyConfiguration {
            pattern,
            field: field.to_owned(),
        });
    }
    Ok(())
}

/// Every declared dependency and every scanned reference to a stage output
/// must be produced by a strictly earlier stage.
fn check_sequential(config: &SequentialDependency) -> Result<(), ConfigurationError> {
    non_empty(&config.stages, Pattern::SequentialDependency, "stages")?;

    let mut producer: HashMap<&str, usize> = HashMap::new();
    for (idx, stage) in config.stages.iter().enumerate() {
        if producer.insert(stage.output_variable.as_str(), idx).is_some() {
            return Err(ConfigurationError::DuplicateOutput {
                name: stage.output_variable.clone(),
            });
        }
    }

    for (idx, stage) in config.stages.iter().enumerate() {
        let unresolved = |reference: &str| ConfigurationError::UnresolvedDependency {
            stage: stage.label().to_owned(),
            reference: reference.to_owned(),
        };
        for dep in &stage.depends_on {
            match producer.get(dep.as_str()) {
                Some(&at) if at < idx => {}
                _ => return Err(unresolved(dep.as_str())),
            }
        }
        for reference in parse::references(&stage.rule.condition) {
            if let Some(&at) = producer.get(reference.as_str()) {
                if at >= idx {
                    return Err(unresolved(reference.as_str()));
                }
            }
        }
    }
    Ok(())
}

fn check_routing(config: &ResultBasedRouting) -> Result<(), ConfigurationError> {
    if config.routes.is_empty() {
        return Err(ConfigurationError::EmptyConfiguration {
            pattern: Pattern::ResultBasedRouting,
            field: "routes".to_owned(),
        });
    }
    if let Some(route) = &config.default_route {
        if !config.routes.contains_key(route) {
            return Err(ConfigurationError::UnknownDefaultRoute {
                route: route.clone(),
            });
        }
    }
    Ok(())
}

fn check_accumulative(config: &AccumulativeChaining) -> Result<(), ConfigurationError> {
    if config.accumulator_variable.trim().is_empty() {
        return Err(ConfigurationError::EmptyAccumulator);
    }
    non_empty(
        &config.accumulation_rules,
        Pattern::AccumulativeChaining,
        "accumulation-rules",
    )
}

/// Validate a workflow and return its execution waves.
pub(crate) fn check_workflow(
    config: &ComplexWorkflow,
) -> Result<Vec<Vec<usize>>, ConfigurationError> {
    non_empty(&config.stages, Pattern::ComplexWorkflow, "stages")?;

    let mut index: HashMap<&str, usize> = HashMap::new();
    for (idx, stage) in config.stages.iter().enumerate() {
        if index.insert(stage.stage.as_str(), idx).is_some() {
            return Err(ConfigurationError::DuplicateStage {
                stage: stage.stage.clone(),
            });
        }
    }
    for stage in &config.stages {
        for dep in &stage.depends_on {
            if !index.contains_key(dep.as_str()) {
                return Err(ConfigurationError::UndefinedStage {
                    stage: stage.stage.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let waves = topological_waves(&config.stages, &index);
    if waves.iter().map(Vec::len).sum::<usize>() < config.stages.len() {
        return Err(ConfigurationError::CyclicDependency {
            path: find_cycle(&config.stages, &index),
        });
    }
    Ok(waves)
}

/// Execution waves of a validated workflow: every stage's dependencies sit in
/// earlier waves, and each wave lists its stages in declaration order.
pub(crate) fn workflow_waves(config: &ComplexWorkflow) -> Vec<Vec<usize>> {
    let index: HashMap<&str, usize> = config
        .stages
        .iter()
        .enumerate()
        .map(|(idx, stage)| (stage.stage.as_str(), idx))
        .collect();
    topological_waves(&config.stages, &index)
}

/// Level-by-level Kahn's algorithm. Stages on a cycle never become ready and
/// are left out.
fn topological_waves(stages: &[WorkflowStage], index: &HashMap<&str, usize>) -> Vec<Vec<usize>> {
    // dependents[x] = stages that must wait for x
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); stages.len()];
    let mut in_degree: Vec<usize> = vec![0; stages.len()];
    for (idx, stage) in stages.iter().enumerate() {
        let deps: BTreeSet<usize> = stage
            .depends_on
            .iter()
            .filter_map(|d| index.get(d.as_str()).copied())
            .collect();
        for dep in deps {
            dependents[dep].push(idx);
            in_degree[idx] += 1;
        }
    }

    let mut waves = Vec::new();
    let mut ready: BTreeSet<usize> = (0..stages.len()).filter(|&i| in_degree[i] == 0).collect();
    while !ready.is_empty() {
        let wave: Vec<usize> = ready.into_iter().collect();
        ready = BTreeSet::new();
        for &done in &wave {
            for &dependent in &dependents[done] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }
        waves.push(wave);
    }
    waves
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DfsState {
    Unvisited,
    InStack,
    Done,
}

/// DFS-based cycle finder for error reporting.
fn find_cycle(stages: &[WorkflowStage], index: &HashMap<&str, usize>) -> Vec<String> {
    let adj: Vec<Vec<usize>> = stages
        .iter()
        .map(|s| {
            s.depends_on
                .iter()
                .filter_map(|d| index.get(d.as_str()).copied())
                .collect()
        })
        .collect();
    let mut state = vec![DfsState::Unvisited; stages.len()];
    let mut stack = Vec::new();

    for start in 0..stages.len() {
        if state[start] == DfsState::Unvisited {
            if let Some(cycle) = dfs(start, &adj, &mut state, &mut stack) {
                return cycle
                    .into_iter()
                    .map(|i| stages[i].stage.clone())
                    .collect();
            }
        }
    }
    Vec::new()
}

fn dfs(
    node: usize,
    adj: &[Vec<usize>],
    state: &mut [DfsState],
    stack: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    state[node] = DfsState::InStack;
    stack.push(node);

    for &neighbor in &adj[node] {
        match state[neighbor] {
            DfsState::InStack => {
                let pos = stack.iter().position(|&n| n == neighbor)?;
                let mut cycle = stack[pos..].to_vec();
                cycle.push(neighbor);
                return Some(cycle);
            }
            DfsState::Unvisited => {
                if let Some(cycle) = dfs(neighbor, adj, state, stack) {
                    return Some(cycle);
                }
            }
            DfsState::Done => {}
        }
    }

    stack.pop();
    state[node] = DfsState::Done;
    None
}
