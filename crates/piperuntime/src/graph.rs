use crate::runtime::Pipeline;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use pipecore::{AlgorithmId, PipelineError, Result};
use std::collections::HashMap;

/// Producer-to-consumer graph; edges carry (output port, input port).
pub type DependencyGraph = DiGraph<AlgorithmId, (usize, usize)>;

impl Pipeline {
    /// Build a petgraph view of the current connections.
    pub fn dependency_graph(&self) -> (DependencyGraph, HashMap<AlgorithmId, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();
        for id in self.algorithm_ids() {
            index_of.insert(id, graph.add_node(id));
        }

        for (consumer, slot) in self.nodes.iter().enumerate() {
            let Some(node) = slot else {
                continue;
            };
            let consumer = AlgorithmId::new(consumer);
            for (input_port, port) in node.inputs.iter().enumerate() {
                for handle in &port.connections {
                    if let (Some(&from), Some(&to)) =
                        (index_of.get(&handle.producer()), index_of.get(&consumer))
                    {
                        graph.add_edge(from, to, (handle.index(), input_port));
                    }
                }
            }
        }
        (graph, index_of)
    }

    /// All algorithms ordered so that producers come before their consumers.
    pub fn execution_order(&self) -> Result<Vec<AlgorithmId>> {
        let (graph, _) = self.dependency_graph();
        toposort(&graph, None)
            .map(|order| order.into_iter().map(|index| graph[index]).collect())
            .map_err(|cycle| {
                let algorithm = graph[cycle.node_id()];
                tracing::error!("Pipeline graph contains a cycle through {}", algorithm);
                PipelineError::CycleDetected(algorithm)
            })
    }

    pub fn is_acyclic(&self) -> bool {
        let (graph, _) = self.dependency_graph();
        toposort(&graph, None).is_ok()
    }

    /// Algorithms with no consumers.
    pub fn sinks(&self) -> Vec<AlgorithmId> {
        self.algorithm_ids()
            .filter(|id| {
                self.node(*id)
                    .map(|node| node.outputs.iter().all(|port| port.consumers.is_empty()))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Whether connecting `producer` into `consumer` would close a cycle.
    pub(crate) fn would_create_cycle(&self, producer: AlgorithmId, consumer: AlgorithmId) -> bool {
        if producer == consumer {
            return true;
        }
        let (graph, index_of) = self.dependency_graph();
        match (index_of.get(&consumer), index_of.get(&producer)) {
            (Some(&from), Some(&to)) => has_path_connecting(&graph, from, to, None),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::test_support::{CountingFilter, CountingSource};
    use crate::Pipeline;
    use pipecore::PipelineError;

    #[test]
    fn test_execution_order_puts_producers_first() {
        let mut pipeline = Pipeline::new();
        let sink = pipeline.add_algorithm(Box::new(CountingFilter::default()));
        let filter = pipeline.add_algorithm(Box::new(CountingFilter::default()));
        let source = pipeline.add_algorithm(Box::new(CountingSource::default()));
        let ps = pipeline.output_port(source, 0).unwrap();
        let pf = pipeline.output_port(filter, 0).unwrap();
        pipeline.set_input_connection(filter, 0, Some(&ps)).unwrap();
        pipeline.set_input_connection(sink, 0, Some(&pf)).unwrap();

        let order = pipeline.execution_order().unwrap();
        let position = |id| order.iter().position(|x| *x == id).unwrap();
        assert!(position(source) < position(filter));
        assert!(position(filter) < position(sink));
        assert_eq!(pipeline.sinks(), vec![sink]);
    }

    #[test]
    fn test_cycle_reported_by_execution_order() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_algorithm(Box::new(CountingFilter::default()));
        let b = pipeline.add_algorithm(Box::new(CountingFilter::default()));
        let pa = pipeline.output_port(a, 0).unwrap();
        let pb = pipeline.output_port(b, 0).unwrap();
        pipeline.set_input_connection(b, 0, Some(&pa)).unwrap();
        assert!(pipeline.is_acyclic());

        pipeline.set_input_connection(a, 0, Some(&pb)).unwrap();
        assert!(!pipeline.is_acyclic());
        assert!(matches!(
            pipeline.execution_order(),
            Err(PipelineError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_self_loop_would_create_cycle() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_algorithm(Box::new(CountingFilter::default()));
        assert!(pipeline.would_create_cycle(a, a));
    }
}
