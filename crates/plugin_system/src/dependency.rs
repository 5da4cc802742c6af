//! Dependency graph over plugin descriptors.
//!
//! The graph is rebuilt from scratch whenever the registered set changes;
//! reverse ("dependents") edges are always derived from the forward edges,
//! never maintained by hand. Validation batches every violation into
//! human-readable strings — dependency faults are data for the caller, not
//! errors to throw.

use crate::descriptor::{plugin_key, Dependency, PluginDescriptor};
use std::collections::HashMap;

/// A descriptor with its derived edges.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub descriptor: PluginDescriptor,
    /// Position in registration order; breaks load-order ties.
    pub registration_index: usize,
    /// Forward edges: keys of required dependencies, declared order.
    pub required: Vec<String>,
    /// Forward edges: keys of optional dependencies, declared order.
    pub optional: Vec<String>,
    /// Derived reverse edges: keys of plugins that depend on this one,
    /// required or optional.
    pub dependents: Vec<String>,
}

/// Three-state coloring for the cycle walk.
#[derive(Clone, Copy, PartialEq)]
enum Color {
    Unvisited,
    InProgress,
    Done,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, DependencyNode>,
    /// Keys in registration order.
    order: Vec<String>,
}

impl DependencyGraph {
    /// Builds the graph for a set of descriptors. `descriptors` must be in
    /// registration order.
    pub fn build<'a>(descriptors: impl IntoIterator<Item = &'a PluginDescriptor>) -> Self {
        let mut nodes: HashMap<String, DependencyNode> = HashMap::new();
        let mut order = Vec::new();

        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let key = plugin_key(&descriptor.name);
            let node = DependencyNode {
                descriptor: descriptor.clone(),
                registration_index: index,
                required: descriptor.required.iter().map(|dep| plugin_key(&dep.name)).collect(),
                optional: descriptor.optional.iter().map(|dep| plugin_key(&dep.name)).collect(),
                dependents: Vec::new(),
            };
            order.push(key.clone());
            nodes.insert(key, node);
        }

        // Derive the reverse edges.
        let forward: Vec<(String, Vec<String>)> = nodes
            .values()
            .map(|node| {
                let mut targets = node.required.clone();
                targets.extend(node.optional.iter().cloned());
                (plugin_key(&node.descriptor.name), targets)
            })
            .collect();
        for (source, targets) in forward {
            for target in targets {
                if let Some(node) = nodes.get_mut(&target) {
                    node.dependents.push(source.clone());
                }
            }
        }

        Self { nodes, order }
    }

    pub fn node(&self, name: &str) -> Option<&DependencyNode> {
        self.nodes.get(&plugin_key(name))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks every descriptor's dependencies, collecting all violations.
    ///
    /// Required dependencies must exist and satisfy every version
    /// requirement. Optional dependencies are checked only when present;
    /// a missing optional dependency is never an error.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for key in &self.order {
            let node = &self.nodes[key];
            let display = &node.descriptor.display_name;

            for dep in &node.descriptor.required {
                match self.nodes.get(&plugin_key(&dep.name)) {
                    None => violations.push(format!(
                        "{display} requires '{}' which is not installed",
                        dep.name
                    )),
                    Some(target) => {
                        self.check_versions(display, dep, target, &mut violations);
                    }
                }
            }
            for dep in &node.descriptor.optional {
                if let Some(target) = self.nodes.get(&plugin_key(&dep.name)) {
                    self.check_versions(display, dep, target, &mut violations);
                }
            }
        }

        violations
    }

    fn check_versions(
        &self,
        display: &str,
        dep: &Dependency,
        target: &DependencyNode,
        violations: &mut Vec<String>,
    ) {
        let installed = target.descriptor.version;
        for requirement in &dep.requirements {
            if !requirement.matches(installed) {
                violations.push(format!(
                    "{display} requires '{}' {requirement}, found {installed}",
                    dep.name
                ));
            }
        }
    }

    /// Depth-first search for a cycle over **required** edges only.
    ///
    /// Returns the cycle as the path from the repeated node back to itself
    /// (first and last element equal). Cycles formed purely through
    /// optional dependencies are deliberately not reported.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut colors: HashMap<&str, Color> = self
            .nodes
            .keys()
            .map(|key| (key.as_str(), Color::Unvisited))
            .collect();
        let mut stack: Vec<String> = Vec::new();

        for key in &self.order {
            if colors[key.as_str()] == Color::Unvisited {
                if let Some(cycle) = self.cycle_walk(key, &mut colors, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn cycle_walk<'a>(
        &'a self,
        key: &'a str,
        colors: &mut HashMap<&'a str, Color>,
        stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        colors.insert(key, Color::InProgress);
        stack.push(key.to_string());

        for dep in &self.nodes[key].required {
            let Some(dep_key) = self.nodes.get_key_value(dep).map(|(k, _)| k.as_str()) else {
                // Unregistered dependency; validation reports it.
                continue;
            };
            match colors[dep_key] {
                Color::InProgress => {
                    // Found the back edge; the cycle starts where the stack
                    // first saw this node.
                    let start = stack.iter().position(|entry| entry == dep_key).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..].to_vec();
                    cycle.push(dep_key.to_string());
                    return Some(cycle);
                }
                Color::Unvisited => {
                    if let Some(cycle) = self.cycle_walk(dep_key, colors, stack) {
                        return Some(cycle);
                    }
                }
                Color::Done => {}
            }
        }

        stack.pop();
        colors.insert(key, Color::Done);
        None
    }

    /// Dependency-first load order: every plugin appears after all of its
    /// registered dependencies (required, then optional); independent
    /// subgraphs keep registration order.
    pub fn load_order(&self) -> Vec<String> {
        let mut visited: HashMap<&str, bool> = HashMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        for key in &self.order {
            self.order_walk(key, &mut visited, &mut order);
        }
        order
    }

    fn order_walk<'a>(
        &'a self,
        key: &'a str,
        visited: &mut HashMap<&'a str, bool>,
        order: &mut Vec<String>,
    ) {
        match visited.get(key) {
            Some(true) => return,
            // In-progress: a required cycle. Load order is undefined for the
            // cycle members; find_cycle reports it, the walk just stops.
            Some(false) => return,
            None => {}
        }
        visited.insert(key, false);

        let node = &self.nodes[key];
        for dep in node.required.iter().chain(node.optional.iter()) {
            if let Some((dep_key, _)) = self.nodes.get_key_value(dep) {
                self.order_walk(dep_key, visited, order);
            }
        }

        visited.insert(key, true);
        order.push(key.to_string());
    }

    /// Plugins whose **required** chain passes through `name`, transitively.
    /// Returned in dependency-first distance order, target excluded.
    pub fn required_dependents_closure(&self, name: &str) -> Vec<String> {
        let target = plugin_key(name);
        let mut closure = Vec::new();
        let mut queue = vec![target.clone()];
        while let Some(current) = queue.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            for dependent in &node.dependents {
                let requires_current = self
                    .nodes
                    .get(dependent)
                    .map(|dep_node| dep_node.required.contains(&current))
                    .unwrap_or(false);
                if requires_current && !closure.contains(dependent) {
                    closure.push(dependent.clone());
                    queue.push(dependent.clone());
                }
            }
        }
        closure
    }

    /// Keys of plugins that cannot load: a required dependency is missing
    /// or version-incompatible, directly or anywhere up the required chain.
    pub fn unsatisfied_plugins(&self) -> Vec<String> {
        let mut unsatisfied: Vec<String> = self
            .order
            .iter()
            .filter(|key| {
                let node = &self.nodes[*key];
                node.descriptor.required.iter().any(|dep| {
                    match self.nodes.get(&plugin_key(&dep.name)) {
                        None => true,
                        Some(target) => dep
                            .requirements
                            .iter()
                            .any(|req| !req.matches(target.descriptor.version)),
                    }
                })
            })
            .cloned()
            .collect();

        // A plugin requiring an unloadable plugin is unloadable too.
        let mut index = 0;
        while index < unsatisfied.len() {
            let current = unsatisfied[index].clone();
            for dependent in self.required_dependents_closure(&current) {
                if !unsatisfied.contains(&dependent) {
                    unsatisfied.push(dependent);
                }
            }
            index += 1;
        }
        unsatisfied
    }

    /// Plugins directly listing `name` as a required dependency.
    pub fn direct_required_dependents(&self, name: &str) -> Vec<String> {
        let target = plugin_key(name);
        let Some(node) = self.nodes.get(&target) else {
            return Vec::new();
        };
        node.dependents
            .iter()
            .filter(|dependent| {
                self.nodes
                    .get(*dependent)
                    .map(|dep_node| dep_node.required.contains(&target))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Dependency;
    use crate::version::{Version, VersionRequirement};

    fn descriptor(name: &str, version: &str) -> PluginDescriptor {
        PluginDescriptor::new(name, name, Version::parse(version).unwrap())
    }

    fn graph(descriptors: &[PluginDescriptor]) -> DependencyGraph {
        DependencyGraph::build(descriptors.iter())
    }

    #[test]
    fn reverse_edges_are_derived() {
        let core = descriptor("core", "1.0");
        let ui = descriptor("ui", "1.0").with_required(Dependency::on("Core"));
        let graph = graph(&[core, ui]);

        assert_eq!(graph.node("core").unwrap().dependents, vec!["ui".to_string()]);
        assert!(graph.node("ui").unwrap().dependents.is_empty());
    }

    #[test]
    fn validation_batches_all_violations() {
        let a = descriptor("a", "1.0")
            .with_required(Dependency::on("missing"))
            .with_required(Dependency::on_version(
                "b",
                VersionRequirement::min(Version::new(2, 0, 0)),
            ));
        let b = descriptor("b", "1.5");
        let violations = graph(&[a, b]).validate();

        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("not installed"));
        assert!(violations[1].contains(">= 2.0.0"));
        assert!(violations[1].contains("found 1.5.0"));
    }

    #[test]
    fn missing_optional_dependency_is_not_a_violation() {
        let a = descriptor("a", "1.0").with_optional(Dependency::on("nice-to-have"));
        assert!(graph(&[a]).validate().is_empty());
    }

    #[test]
    fn present_optional_dependency_is_version_checked() {
        let a = descriptor("a", "1.0").with_optional(Dependency::on_version(
            "b",
            VersionRequirement::exact(Version::new(1, 0, 0)),
        ));
        let b = descriptor("b", "1.1");
        let violations = graph(&[a, b]).validate();
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn load_order_puts_dependencies_first() {
        let app = descriptor("app", "1.0")
            .with_required(Dependency::on("lib"))
            .with_optional(Dependency::on("extras"));
        let lib = descriptor("lib", "1.0").with_required(Dependency::on("base"));
        let base = descriptor("base", "1.0");
        let extras = descriptor("extras", "1.0");
        let order = graph(&[app, lib, base, extras]).load_order();

        let pos = |name: &str| order.iter().position(|entry| entry == name).unwrap();
        assert!(pos("base") < pos("lib"));
        assert!(pos("lib") < pos("app"));
        assert!(pos("extras") < pos("app"));
    }

    #[test]
    fn independent_plugins_keep_registration_order() {
        let order = graph(&[
            descriptor("zeta", "1.0"),
            descriptor("alpha", "1.0"),
            descriptor("mid", "1.0"),
        ])
        .load_order();
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn required_cycle_is_reported_as_a_path() {
        let a = descriptor("a", "1.0").with_required(Dependency::on("b"));
        let b = descriptor("b", "1.0").with_required(Dependency::on("c"));
        let c = descriptor("c", "1.0").with_required(Dependency::on("a"));
        let cycle = graph(&[a, b, c]).find_cycle().unwrap();

        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);
        assert!(cycle.contains(&"a".to_string()));
        assert!(cycle.contains(&"b".to_string()));
        assert!(cycle.contains(&"c".to_string()));
    }

    #[test]
    fn optional_only_cycle_is_not_reported() {
        let a = descriptor("a", "1.0").with_optional(Dependency::on("b"));
        let b = descriptor("b", "1.0").with_optional(Dependency::on("a"));
        assert!(graph(&[a, b]).find_cycle().is_none());
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let a = descriptor("a", "1.0").with_required(Dependency::on("b"));
        let b = descriptor("b", "1.0");
        assert!(graph(&[a, b]).find_cycle().is_none());
    }

    #[test]
    fn dependents_closure_follows_required_chains_only() {
        // ui --requires--> core, hud --requires--> ui,
        // themes --optionally--> core.
        let core = descriptor("core", "1.0");
        let ui = descriptor("ui", "1.0").with_required(Dependency::on("core"));
        let hud = descriptor("hud", "1.0").with_required(Dependency::on("ui"));
        let themes = descriptor("themes", "1.0").with_optional(Dependency::on("core"));
        let graph = graph(&[core, ui, hud, themes]);

        let mut closure = graph.required_dependents_closure("core");
        closure.sort();
        assert_eq!(closure, vec!["hud".to_string(), "ui".to_string()]);
        assert_eq!(graph.direct_required_dependents("core"), vec!["ui".to_string()]);
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let graph = graph(&[descriptor("NickDetect", "1.0")]);
        assert!(graph.node("nickdetect").is_some());
        assert!(graph.node("NICKDETECT").is_some());
    }
}
