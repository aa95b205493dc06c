//! Node graph carried by newer documents.
//!
//! Plain data only: the codec persists the graph, evaluation lives in the
//! host application.

use serde::{Deserialize, Serialize};

/// A node graph: nodes plus the connections between their properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeGraph {
    pub nodes: Vec<Node>,
    pub connections: Vec<PropertyConnection>,
}

/// A single graph node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i32,
    pub name: String,
    pub unique_node_name: String,
    pub position_x: f64,
    pub position_y: f64,
    pub properties: Vec<NodeProperty>,
}

/// A named input/output slot on a node with an optional serialized value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeProperty {
    pub name: String,
    pub is_input: bool,
    pub value: Option<Vec<u8>>,
}

/// A directed edge from one node's output property to another's input.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyConnection {
    pub output_node_id: i32,
    pub output_property: String,
    pub input_node_id: i32,
    pub input_property: String,
}
