use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use toolflow_config::ToolStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
  White,
  Gray,
  Black,
}

/// Dependency graph over indexed nodes.
///
/// Edges point from a dependency to its dependent. Node indices follow
/// declaration order, which is also the tie-break order for topological sorting.
#[derive(Debug, Clone)]
pub struct Graph {
  nodes: Vec<String>,
  index: HashMap<String, usize>,
  /// Adjacency list: node -> downstream nodes.
  adjacency: Vec<Vec<usize>>,
  /// Reverse adjacency: node -> upstream nodes.
  reverse_adjacency: Vec<Vec<usize>>,
}

impl Graph {
  /// Build a graph from node labels and `(from, to)` index pairs.
  ///
  /// Duplicate edges are collapsed. Out-of-range indices are ignored.
  pub fn new(nodes: Vec<String>, edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
    let n = nodes.len();
    let mut adjacency = vec![Vec::new(); n];
    let mut reverse_adjacency = vec![Vec::new(); n];

    for (from, to) in edges {
      if from >= n || to >= n || adjacency[from].contains(&to) {
        continue;
      }
      adjacency[from].push(to);
      reverse_adjacency[to].push(from);
    }

    let mut index = HashMap::with_capacity(n);
    for (i, id) in nodes.iter().enumerate() {
      index.entry(id.clone()).or_insert(i);
    }

    Self {
      nodes,
      index,
      adjacency,
      reverse_adjacency,
    }
  }

  /// Build the step dependency graph.
  ///
  /// Self-dependencies and dependencies naming unknown steps are left out; the
  /// validator reports those separately.
  pub fn from_steps(steps: &[ToolStep]) -> Self {
    let nodes: Vec<String> = steps.iter().map(|s| s.tool_id.clone()).collect();
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
      index.entry(step.tool_id.as_str()).or_insert(i);
    }

    let edges: Vec<(usize, usize)> = steps
      .iter()
      .enumerate()
      .flat_map(|(to, step)| {
        let index = &index;
        step
          .dependencies
          .iter()
          .filter_map(move |dep| index.get(dep.as_str()).map(|&from| (from, to)))
          .filter(|(from, to)| from != to)
      })
      .collect();

    Self::new(nodes, edges)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn node(&self, index: usize) -> &str {
    &self.nodes[index]
  }

  pub fn index_of(&self, id: &str) -> Option<usize> {
    self.index.get(id).copied()
  }

  pub fn downstream(&self, index: usize) -> &[usize] {
    &self.adjacency[index]
  }

  pub fn upstream(&self, index: usize) -> &[usize] {
    &self.reverse_adjacency[index]
  }

  /// Nodes with no incoming edges, in declaration order.
  pub fn entry_points(&self) -> Vec<usize> {
    (0..self.len())
      .filter(|&i| self.reverse_adjacency[i].is_empty())
      .collect()
  }

  /// Find a dependency cycle, if any.
  ///
  /// Three-color DFS over an explicit stack so deep graphs cannot overflow the
  /// call stack. The returned path starts and ends on the same node.
  pub fn find_cycle(&self) -> Option<Vec<String>> {
    let mut color = vec![Color::White; self.len()];
    // (node, position of the next child to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..self.len() {
      if color[root] != Color::White {
        continue;
      }
      color[root] = Color::Gray;
      stack.push((root, 0));

      while let Some(frame) = stack.last_mut() {
        let (node, next) = *frame;
        if let Some(&child) = self.adjacency[node].get(next) {
          frame.1 += 1;
          match color[child] {
            Color::White => {
              color[child] = Color::Gray;
              stack.push((child, 0));
            }
            Color::Gray => {
              // Back edge: the cycle is the stack suffix starting at `child`
              let start = stack.iter().position(|&(n, _)| n == child).unwrap_or(0);
              let mut cycle: Vec<String> = stack[start..]
                .iter()
                .map(|&(n, _)| self.nodes[n].clone())
                .collect();
              cycle.push(self.nodes[child].clone());
              return Some(cycle);
            }
            Color::Black => {}
          }
        } else {
          color[node] = Color::Black;
          stack.pop();
        }
      }
    }

    None
  }

  /// Kahn's algorithm. Ready nodes are released lowest index first.
  ///
  /// On failure returns the nodes that could not be ordered.
  pub fn topological_order(&self) -> Result<Vec<usize>, Vec<String>> {
    let mut in_degree: Vec<usize> = self.reverse_adjacency.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
      .iter()
      .enumerate()
      .filter(|&(_, &d)| d == 0)
      .map(|(i, _)| Reverse(i))
      .collect();

    let mut order = Vec::with_capacity(self.len());
    while let Some(Reverse(node)) = ready.pop() {
      order.push(node);
      for &child in &self.adjacency[node] {
        in_degree[child] -= 1;
        if in_degree[child] == 0 {
          ready.push(Reverse(child));
        }
      }
    }

    if order.len() == self.len() {
      Ok(order)
    } else {
      Err(
        (0..self.len())
          .filter(|&i| in_degree[i] > 0)
          .map(|i| self.nodes[i].clone())
          .collect(),
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn graph(nodes: &[&str], edges: &[(usize, usize)]) -> Graph {
    Graph::new(
      nodes.iter().map(|s| s.to_string()).collect(),
      edges.iter().copied(),
    )
  }

  #[test]
  fn test_topological_order_prefers_declaration_order() {
    // c depends on a; b is independent
    let g = graph(&["c", "a", "b"], &[(1, 0)]);
    let order = g.topological_order().unwrap();
    assert_eq!(order, vec![1, 0, 2]);
  }

  #[test]
  fn test_find_cycle_reports_path() {
    let g = graph(&["a", "b", "c", "d"], &[(0, 1), (1, 2), (2, 1), (2, 3)]);
    let cycle = g.find_cycle().unwrap();
    assert_eq!(cycle, vec!["b", "c", "b"]);
    assert!(g.topological_order().is_err());
  }

  #[test]
  fn test_diamond_is_acyclic() {
    let g = graph(&["a", "b", "c", "d"], &[(0, 1), (0, 2), (1, 3), (2, 3)]);
    assert!(g.find_cycle().is_none());
    assert_eq!(g.topological_order().unwrap(), vec![0, 1, 2, 3]);
    assert_eq!(g.entry_points(), vec![0]);
    assert_eq!(g.upstream(3), &[1, 2]);
  }

  #[test]
  fn test_deep_chain_does_not_overflow() {
    let n = 200_000;
    let nodes: Vec<String> = (0..n).map(|i| format!("s{i}")).collect();
    let g = Graph::new(nodes, (1..n).map(|i| (i - 1, i)));
    assert!(g.find_cycle().is_none());
    assert_eq!(g.topological_order().unwrap().len(), n);

    let nodes: Vec<String> = (0..n).map(|i| format!("s{i}")).collect();
    let cyclic = Graph::new(nodes, (1..n).map(|i| (i - 1, i)).chain([(n - 1, 0)]));
    assert_eq!(cyclic.find_cycle().map(|c| c.len()), Some(n + 1));
  }

  #[test]
  fn test_from_steps_skips_unknown_dependencies() {
    let steps = vec![
      ToolStep::new("a"),
      ToolStep::new("b").depends_on("a").depends_on("ghost"),
    ];
    let g = Graph::from_steps(&steps);
    assert_eq!(g.downstream(0), &[1]);
    assert_eq!(g.upstream(1), &[0]);
    assert_eq!(g.index_of("b"), Some(1));
  }
}
