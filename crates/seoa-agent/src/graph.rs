//! Static wiring of the audit stages.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    Crawler,
    Auditor,
    OnpageAnalyzer,
    CrawlAuditor,
    MarketResearcher,
    Strategist,
    Optimizer,
    Reporter,
    End,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Crawler => "crawler",
            Self::Auditor => "auditor",
            Self::OnpageAnalyzer => "onpage_analyzer",
            Self::CrawlAuditor => "crawl_auditor",
            Self::MarketResearcher => "market_researcher",
            Self::Strategist => "strategist",
            Self::Optimizer => "optimizer",
            Self::Reporter => "reporter",
            Self::End => "END",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Start | Self::End)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    edges: BTreeMap<NodeKind, BTreeSet<NodeKind>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The audit workflow, page fetch and PageSpeed audit start together.
    pub fn audit() -> Self {
        use NodeKind::*;
        let mut graph = Self::new();
        for (from, to) in [
            (Start, Crawler),
            (Start, Auditor),
            (Crawler, OnpageAnalyzer),
            (Crawler, CrawlAuditor),
            (OnpageAnalyzer, MarketResearcher),
            (MarketResearcher, Strategist),
            (Strategist, Optimizer),
            (Optimizer, Reporter),
            (Auditor, Reporter),
            (CrawlAuditor, Reporter),
            (Reporter, End),
        ] {
            graph.add_edge(from, to);
        }
        graph
    }

    pub fn add_edge(&mut self, from: NodeKind, to: NodeKind) -> &mut Self {
        self.edges.entry(from).or_default().insert(to);
        self.edges.entry(to).or_default();
        self
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeKind> + '_ {
        self.edges.keys().copied()
    }

    pub fn successors(&self, node: NodeKind) -> impl Iterator<Item = NodeKind> + '_ {
        self.edges.get(&node).into_iter().flatten().copied()
    }

    pub fn predecessors(&self, node: NodeKind) -> impl Iterator<Item = NodeKind> + '_ {
        self.edges
            .iter()
            .filter(move |(_, to)| to.contains(&node))
            .map(|(from, _)| *from)
    }

    /// Rejects graphs with cycles, with nodes unreachable from `START` or
    /// with nodes that never lead to `END`.
    pub fn validate(&self) -> Result<()> {
        if !self.edges.contains_key(&NodeKind::Start) || !self.edges.contains_key(&NodeKind::End) {
            bail!("Graph must contain both START and END");
        }
        if self.predecessors(NodeKind::Start).next().is_some() {
            bail!("START cannot have incoming edges");
        }
        if self.successors(NodeKind::End).next().is_some() {
            bail!("END cannot have outgoing edges");
        }

        self.levels()?;

        let reachable = self.reach(NodeKind::Start, |n| self.successors(n).collect());
        if let Some(node) = self.nodes().find(|n| !reachable.contains(n)) {
            bail!("Node {node} is unreachable from START");
        }
        let finishing = self.reach(NodeKind::End, |n| self.predecessors(n).collect());
        if let Some(node) = self.nodes().find(|n| !finishing.contains(n)) {
            bail!("Node {node} never leads to END");
        }
        Ok(())
    }

    /// Topological levels of the stage nodes, nodes within a level don't
    /// depend on each other.
    pub fn waves(&self) -> Result<Vec<Vec<NodeKind>>> {
        self.validate()?;
        let waves = self
            .levels()?
            .into_iter()
            .map(|level| level.into_iter().filter(|n| !n.is_terminal()).collect::<Vec<_>>())
            .filter(|level| !level.is_empty())
            .collect();
        Ok(waves)
    }

    // Kahn's algorithm, one level at a time
    fn levels(&self) -> Result<Vec<Vec<NodeKind>>> {
        let mut in_degree = self
            .nodes()
            .map(|n| (n, self.predecessors(n).count()))
            .collect::<BTreeMap<_, _>>();

        let mut level = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect::<Vec<_>>();
        let mut levels = Vec::new();
        let mut seen = 0;

        while !level.is_empty() {
            seen += level.len();
            let mut next = Vec::new();
            for node in &level {
                for succ in self.successors(*node) {
                    if let Some(d) = in_degree.get_mut(&succ) {
                        *d -= 1;
                        if *d == 0 {
                            next.push(succ);
                        }
                    }
                }
            }
            next.sort();
            levels.push(std::mem::replace(&mut level, next));
        }

        if seen != in_degree.len() {
            let stuck = in_degree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(n, _)| n.name())
                .collect::<Vec<_>>();
            bail!("Graph has a cycle through {}", stuck.join(", "));
        }
        Ok(levels)
    }

    fn reach<F>(&self, from: NodeKind, next: F) -> BTreeSet<NodeKind>
    where
        F: Fn(NodeKind) -> Vec<NodeKind>,
    {
        let mut seen = BTreeSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            for n in next(node) {
                if seen.insert(n) {
                    queue.push_back(n);
                }
            }
        }
        seen
    }
}
