//! Declarative topology file.
//!
//! ```toml
//! [[node]]
//! name = "sensor"
//!
//! [[fireable]]
//! node = "pump"
//! hysteresis_window_ms = 1000
//!
//! [scheduler]
//! node = "compute"
//! threads = 2
//!
//! [[link]]
//! from = "sensor"
//! to = "pump"
//! kind = "fire"
//! properties = { priority = 7 }
//!
//! [[write]]
//! node = "sensor"
//! property = "temp"
//! value = 42
//! after_ms = 500
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use ripple_core::Value;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Topology {
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeDef>,
    #[serde(default, rename = "fireable")]
    pub fireables: Vec<FireableDef>,
    #[serde(default)]
    pub scheduler: Option<SchedulerDef>,
    #[serde(default, rename = "link")]
    pub links: Vec<LinkDef>,
    /// Scripted property writes, relative to start.
    #[serde(default, rename = "write")]
    pub writes: Vec<WriteDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDef {
    pub name: String,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FireableDef {
    pub node: String,
    /// Overrides `queue.hysteresis_window_ms` for this node.
    #[serde(default)]
    pub hysteresis_window_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerDef {
    pub node: String,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub execution_timeout_ms: Option<u64>,
    #[serde(default)]
    pub priority_factor: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkKindDef {
    Direct,
    DirectTo,
    Fire,
    ComputeFeed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkDef {
    pub from: String,
    pub to: String,
    pub kind: LinkKindDef,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteDef {
    pub node: String,
    pub property: String,
    pub value: Value,
    #[serde(default)]
    pub after_ms: u64,
}

impl Topology {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let topology: Self = toml::from_str(raw).context("invalid topology TOML")?;
        topology.validate()?;
        Ok(topology)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read topology {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Every name a topology refers to, declared or implied.
    pub fn node_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let declared = self.nodes.iter().map(|n| n.name.as_str());
        let implied = self
            .fireables
            .iter()
            .map(|f| f.node.as_str())
            .chain(self.scheduler.iter().map(|s| s.node.as_str()));
        declared
            .chain(implied)
            .filter(|name| seen.insert(*name))
            .map(str::to_string)
            .collect()
    }

    fn validate(&self) -> Result<()> {
        let known: HashSet<String> = self.node_names().into_iter().collect();
        let fireable: HashSet<&str> = self.fireables.iter().map(|f| f.node.as_str()).collect();

        for link in &self.links {
            for end in [&link.from, &link.to] {
                if !known.contains(end) {
                    bail!("link {} -> {} refers to unknown node '{}'", link.from, link.to, end);
                }
            }
            match link.kind {
                LinkKindDef::Fire if !fireable.contains(link.to.as_str()) => {
                    bail!("fire link target '{}' is not a fireable", link.to)
                }
                LinkKindDef::ComputeFeed => {
                    let Some(scheduler) = &self.scheduler else {
                        bail!("compute-feed link from '{}' but no [scheduler] is defined", link.from);
                    };
                    if link.to != scheduler.node {
                        bail!("compute-feed link must target the scheduler node '{}'", scheduler.node);
                    }
                    if !fireable.contains(link.from.as_str()) {
                        bail!("compute-feed source '{}' is not a fireable", link.from);
                    }
                }
                _ => {}
            }
        }
        for write in &self.writes {
            if !known.contains(&write.node) {
                bail!("write refers to unknown node '{}'", write.node);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bundled_topology_parses() {
        let topology = Topology::from_toml_str(include_str!("../topologies/plant.toml")).unwrap();
        assert!(topology.scheduler.is_some());
        assert!(!topology.links.is_empty());
        assert!(topology.node_names().contains(&"compute".to_string()));
    }

    #[test]
    fn link_properties_keep_their_types() {
        let topology = Topology::from_toml_str(
            r#"
            [[node]]
            name = "a"
            [[node]]
            name = "b"

            [[link]]
            from = "a"
            to = "b"
            kind = "direct"
            properties = { active = false, deadband-value = 5, deadband-type = "absolute" }
            "#,
        )
        .unwrap();
        let link = &topology.links[0];
        assert_eq!(link.kind, LinkKindDef::Direct);
        assert_eq!(link.properties["active"], json!(false));
        assert_eq!(link.properties["deadband-value"], json!(5));
    }

    #[test]
    fn unknown_node_is_rejected() {
        let err = Topology::from_toml_str(
            r#"
            [[link]]
            from = "a"
            to = "b"
            kind = "direct"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown node"));
    }

    #[test]
    fn compute_feed_needs_scheduler() {
        let err = Topology::from_toml_str(
            r#"
            [[fireable]]
            node = "pump"
            [[node]]
            name = "compute"

            [[link]]
            from = "pump"
            to = "compute"
            kind = "compute-feed"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no [scheduler]"));
    }

    #[test]
    fn fire_link_needs_fireable_target() {
        let err = Topology::from_toml_str(
            r#"
            [[node]]
            name = "a"
            [[node]]
            name = "b"

            [[link]]
            from = "a"
            to = "b"
            kind = "fire"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a fireable"));
    }
}
