use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::error::{ModelError, Result};
use crate::layers::layer::Layer;

/// Layers of a model in execution order, with their wiring resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    /// Topologically sorted; every layer comes after all of its inbound layers.
    pub layers: Vec<Layer>,
    /// For each layer, the positions of its inbound layers in `layers`.
    pub inbound: Vec<Vec<usize>>,
    /// Position of the single input layer.
    pub input: usize,
    /// Positions of the output layers, in declaration order.
    pub outputs: Vec<usize>,
}

impl Topology {
    pub fn output_names(&self) -> Vec<String> {
        self.outputs.iter().map(|&i| self.layers[i].name.clone()).collect()
    }
}

/// Validates a declared layer graph and orders it for execution.
///
/// Among layers that are ready at the same time, the one declared first is
/// emitted first, so a list that is already in a valid order is returned
/// unchanged.
pub fn assemble(layers: &[Layer], outputs: &[String]) -> Result<Topology> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(layers.len());
    for (i, layer) in layers.iter().enumerate() {
        if index.insert(layer.name.as_str(), i).is_some() {
            return Err(ModelError::DuplicateLayerName(layer.name.clone()));
        }
    }

    let mut inputs = Vec::new();
    let mut predecessors: Vec<Vec<usize>> = Vec::with_capacity(layers.len());
    for (i, layer) in layers.iter().enumerate() {
        if layer.is_input() {
            if !layer.inbound.is_empty() {
                return Err(ModelError::InvalidArchitecture(format!(
                    "input layer `{}` cannot have inbound layers",
                    layer.name
                )));
            }
            inputs.push(i);
        } else if layer.inbound.is_empty() {
            return Err(ModelError::OrphanLayer(layer.name.clone()));
        }

        let mut preds = Vec::with_capacity(layer.inbound.len());
        for inbound in &layer.inbound {
            match index.get(inbound.as_str()) {
                Some(&p) => preds.push(p),
                None => {
                    return Err(ModelError::UnknownInboundLayer {
                        layer: layer.name.clone(),
                        inbound: inbound.clone(),
                    })
                }
            }
        }
        predecessors.push(preds);
    }

    let input = match inputs.as_slice() {
        [single] => *single,
        [] => return Err(ModelError::InvalidArchitecture("model has no input layer".into())),
        _ => {
            return Err(ModelError::InvalidArchitecture(format!(
                "model has {} input layers, exactly one is supported",
                inputs.len()
            )))
        }
    };

    if outputs.is_empty() {
        return Err(ModelError::InvalidArchitecture("model declares no outputs".into()));
    }
    let mut output_ids = Vec::with_capacity(outputs.len());
    for name in outputs {
        match index.get(name.as_str()) {
            Some(&i) => output_ids.push(i),
            None => {
                return Err(ModelError::InvalidArchitecture(format!(
                    "output `{name}` is not a layer of the model"
                )))
            }
        }
    }

    let order = kahn_order(&predecessors).map_err(|stuck| {
        ModelError::CyclicGraph(stuck.into_iter().map(|i| layers[i].name.clone()).collect())
    })?;

    // Walk backwards from the outputs; anything not visited is dead weight.
    let mut reachable: HashSet<usize> = HashSet::new();
    let mut stack = output_ids.clone();
    while let Some(i) = stack.pop() {
        if reachable.insert(i) {
            stack.extend(predecessors[i].iter().copied());
        }
    }
    if let Some(layer) = layers.iter().enumerate().find(|(i, _)| !reachable.contains(i)) {
        return Err(ModelError::UnreachableLayer(layer.1.name.clone()));
    }

    let mut position = vec![0; layers.len()];
    for (pos, &i) in order.iter().enumerate() {
        position[i] = pos;
    }

    Ok(Topology {
        layers: order.iter().map(|&i| layers[i].clone()).collect(),
        inbound: order
            .iter()
            .map(|&i| predecessors[i].iter().map(|&p| position[p]).collect())
            .collect(),
        input: position[input],
        outputs: output_ids.iter().map(|&i| position[i]).collect(),
    })
}

/// Kahn's algorithm with a min-heap on declaration index. On a cycle,
/// returns the indices that could never be scheduled.
fn kahn_order(predecessors: &[Vec<usize>]) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let n = predecessors.len();
    let mut in_degree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, preds) in predecessors.iter().enumerate() {
        for &p in preds {
            successors[p].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> =
        (0..n).filter(|&i| in_degree[i] == 0).map(Reverse).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &s in &successors[i] {
            in_degree[s] -= 1;
            if in_degree[s] == 0 {
                ready.push(Reverse(s));
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err((0..n).filter(|&i| in_degree[i] > 0).collect())
    }
}
