use std::collections::HashMap;

use toolflow_config::FlowDefinition;

use crate::error::FlowError;
use crate::graph::Graph;

/// Steps launched together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepGroup {
  /// The `parallel_group` name, or `None` for an ungrouped step.
  pub name: Option<String>,
  /// Member step ids in topological order.
  pub members: Vec<String>,
}

impl StepGroup {
  /// Label used in logs and errors.
  pub fn label(&self) -> &str {
    self
      .name
      .as_deref()
      .or_else(|| self.members.first().map(String::as_str))
      .unwrap_or_default()
  }
}

/// Scheduling derived from a valid flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
  /// Every step id in topological order.
  pub order: Vec<String>,
  /// Parallel groups in dependency order.
  pub groups: Vec<StepGroup>,
  /// Indices into `groups`, layered by group dependency depth.
  pub waves: Vec<Vec<usize>>,
  /// Non-fatal findings from validation.
  pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
  Named(String),
  Single(usize),
}

impl ExecutionPlan {
  /// A plan where every step is its own group.
  pub(crate) fn sequential(graph: &Graph, order: &[usize]) -> Self {
    let groups: Vec<StepGroup> = order
      .iter()
      .map(|&i| StepGroup {
        name: None,
        members: vec![graph.node(i).to_string()],
      })
      .collect();
    let waves = (0..groups.len()).map(|g| vec![g]).collect();

    Self {
      order: order.iter().map(|&i| graph.node(i).to_string()).collect(),
      groups,
      waves,
      warnings: Vec::new(),
    }
  }

  /// Group steps by `parallel_group` and order the groups.
  ///
  /// Collects every same-group dependency; a cycle between groups is reported
  /// on its own since it only shows up once intra-group edges are excluded.
  pub(crate) fn grouped(
    flow: &FlowDefinition,
    graph: &Graph,
    order: &[usize],
  ) -> Result<Self, Vec<FlowError>> {
    let key_of = |i: usize| match &flow.steps[i].parallel_group {
      Some(name) => GroupKey::Named(name.clone()),
      None => GroupKey::Single(i),
    };

    // Walking in topological order numbers groups by their earliest member
    let mut group_of = vec![0usize; graph.len()];
    let mut keys: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<StepGroup> = Vec::new();
    for &i in order {
      let key = key_of(i);
      let g = *keys.entry(key).or_insert_with(|| {
        groups.push(StepGroup {
          name: flow.steps[i].parallel_group.clone(),
          members: Vec::new(),
        });
        groups.len() - 1
      });
      groups[g].members.push(graph.node(i).to_string());
      group_of[i] = g;
    }

    let mut errors = Vec::new();
    let mut group_edges = Vec::new();
    for from in 0..graph.len() {
      for &to in graph.downstream(from) {
        let (gf, gt) = (group_of[from], group_of[to]);
        if gf == gt {
          errors.push(FlowError::SameGroupDependency {
            group: groups[gf].label().to_string(),
            from: graph.node(from).to_string(),
            to: graph.node(to).to_string(),
          });
        } else {
          group_edges.push((gf, gt));
        }
      }
    }
    if !errors.is_empty() {
      return Err(errors);
    }

    let group_graph = Graph::new(
      groups.iter().map(|g| g.label().to_string()).collect(),
      group_edges,
    );
    if let Some(cycle) = group_graph.find_cycle() {
      return Err(vec![FlowError::GroupCycle { cycle }]);
    }
    let group_order = group_graph
      .topological_order()
      .map_err(|cycle| vec![FlowError::GroupCycle { cycle }])?;

    // Depth of a group = longest chain of upstream groups
    let mut depth = vec![0usize; groups.len()];
    for &g in &group_order {
      depth[g] = group_graph
        .upstream(g)
        .iter()
        .map(|&up| depth[up] + 1)
        .max()
        .unwrap_or(0);
    }

    let mut ordered = Vec::with_capacity(groups.len());
    let mut position = vec![0usize; groups.len()];
    for (pos, &g) in group_order.iter().enumerate() {
      position[g] = pos;
      ordered.push(groups[g].clone());
    }

    let max_depth = depth.iter().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<usize>> = vec![Vec::new(); max_depth + 1];
    for &g in &group_order {
      waves[depth[g]].push(position[g]);
    }
    waves.retain(|w| !w.is_empty());

    Ok(Self {
      order: order.iter().map(|&i| graph.node(i).to_string()).collect(),
      groups: ordered,
      waves,
      warnings: Vec::new(),
    })
  }

  /// The ids of every step in a wave.
  pub fn wave_members(&self, wave: usize) -> impl Iterator<Item = &str> {
    self
      .waves
      .get(wave)
      .into_iter()
      .flatten()
      .flat_map(|&g| self.groups[g].members.iter().map(String::as_str))
  }
}
